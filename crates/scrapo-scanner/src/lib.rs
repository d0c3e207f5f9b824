//! Scrapo Scanner - paginated listing extraction.
//!
//! This crate turns a browser page into rows of data. It owns the extraction
//! variants, the run controller that walks a listing page by page, and the CSV
//! export of what was accumulated.
//!
//! # Features
//!
//! - Account list and lead table extractors over HTML snapshots
//! - Multi-page runs with a page budget, per-page failure tolerance and
//!   cooperative cancellation
//! - Run state published through a watch channel
//! - CSV export with column pruning and full quoting
//!
//! # Example
//!
//! ```rust,ignore
//! use scrapo_scanner::ScrapeOrchestrator;
//! use std::sync::Arc;
//!
//! let orchestrator = ScrapeOrchestrator::from_config(
//!     Arc::new(browser_engine),
//!     Arc::new(datasets),
//!     &config,
//! )?;
//!
//! let run = orchestrator
//!     .start(ExtractionType::Leads, PageBudget::new(5)?)
//!     .await?;
//! let summary = run.wait().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[allow(missing_docs)]
pub mod error;
pub mod export;
pub mod extract;
pub mod orchestrator;
pub mod state;

// Re-export commonly used types
pub use error::{Result, ScanError};
pub use export::{
    present_columns, records_to_csv, rows_to_csv, DownloadSink, FileDownloadSink, CSV_MIME,
};
pub use extract::{
    extractor_for, AccountListExtractor, Extraction, Extractor, LeadTableExtractor,
};
pub use orchestrator::{ExportReport, PageNavigator, PageScroller, RunHandle, ScrapeOrchestrator};
pub use state::{RunPhase, RunState, RunSummary, StopReason};
