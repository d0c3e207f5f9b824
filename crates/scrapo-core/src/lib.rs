//! Scrapo Core - Foundation crate for the Scrapo listing extractor.
//!
//! This crate provides the shared data model, error handling and configuration
//! that the browser, store and scanner crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths and the timing policy
//! - [`types`] - Records, rows, dataset handles and run parameters
//!
//! # Example
//!
//! ```rust
//! use scrapo_core::{Field, Record};
//!
//! let mut record = Record::new();
//! record.insert(Field::Name, Some("  Acme Corp "));
//! record.insert(Field::Industry, Some("   "));
//!
//! assert_eq!(record.get(Field::Name), Some("Acme Corp"));
//! assert!(!record.contains(Field::Industry));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, BrowserConfig, ExportConfig, ScrollConfig, StorageConfig, TimingPolicy,
};
pub use error::{ConfigError, ConfigResult, Result, ScrapoError};
pub use types::{
    DatasetHandle, DatasetShape, ExtractionType, Field, PageBudget, Record, Row,
    SchemaDriftPolicy, TableSnapshot,
};
