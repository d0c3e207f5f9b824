//! Scrapo Store
//!
//! Persistence for scraped datasets: an async key-value store over opaque
//! JSON values, and the accumulator that merges each page's extraction into
//! the dataset stored under a handle.
//!
//! # Architecture
//!
//! - **Key-value layer**: [`KeyValueStore`] with an in-memory implementation
//!   and a `SQLite` one backed by `SQLx` with embedded migrations
//! - **Accumulation**: [`DatasetStore`] serializes every read-modify-write
//!   per dataset handle so two merges can never interleave
//!
//! # Example
//!
//! ```ignore
//! use scrapo_store::{DatasetStore, SqliteStore};
//!
//! let store = SqliteStore::open("scrapo.db").await?;
//! let datasets = DatasetStore::new(Arc::new(store), SchemaDriftPolicy::default());
//! let total = datasets.append_records(&handle, records).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod dataset;
pub mod error;
pub mod kv;
pub mod sqlite;

// Re-export commonly used types
pub use dataset::{merge_rows, DatasetStore};
pub use error::{Result, StoreError};
pub use kv::{KeyValueStore, MemoryStore};
pub use sqlite::SqliteStore;
