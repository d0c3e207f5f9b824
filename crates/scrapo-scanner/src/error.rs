use scrapo_browser::BrowserError;
use scrapo_core::{ExtractionType, ScrapoError};
use scrapo_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("a run is already in progress on this dataset store")]
    RunInProgress,

    #[error("run lease expired and was taken by another process")]
    LeaseLost,

    #[error("no {extraction_type} data to export")]
    NothingToExport { extraction_type: ExtractionType },

    #[error("no extractor registered for {0}")]
    NoExtractor(ExtractionType),

    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("extraction setup failed: {0}")]
    Extraction(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("export failed: {0}")]
    Export(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Core(#[from] ScrapoError),

    #[error("run task failed: {0}")]
    TaskJoin(String),
}

impl ScanError {
    /// Whether this error must end a multi-page run instead of being
    /// counted as one failed page.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Store(StoreError::SchemaDrift { .. }) => false,
            Self::Store(_) | Self::TaskJoin(_) | Self::NoExtractor(_) | Self::LeaseLost => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
