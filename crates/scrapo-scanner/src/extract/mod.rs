//! Field extraction from a materialized page.
//!
//! An extractor pulls an HTML snapshot out of the page through the script
//! host and parses it in-process. Missing fields never fail an extraction;
//! only a host failure does.

mod accounts;
mod leads;

pub use accounts::AccountListExtractor;
pub use leads::LeadTableExtractor;

use crate::error::{Result, ScanError};
use regex::Regex;
use scrapo_browser::PageHandle;
use scrapo_core::{ExtractionType, Record, TableSnapshot};
use scraper::{ElementRef, Selector};
use std::sync::Arc;
use url::Url;

/// Origin that relative profile and company links are resolved against.
pub const LINK_ORIGIN: &str = "https://www.linkedin.com";

/// What one page yielded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Item-list layouts
    Records(Vec<Record>),
    /// Table layouts
    Table(TableSnapshot),
}

impl Extraction {
    /// Number of records or data rows extracted.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Records(records) => records.len(),
            Self::Table(table) => table.rows.len(),
        }
    }

    /// Whether nothing was found on the page.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Records(records) => records.is_empty(),
            Self::Table(table) => table.is_empty(),
        }
    }
}

/// Reads one page's worth of data. Never navigates or persists.
#[async_trait::async_trait]
pub trait Extractor: Send + Sync {
    /// Layout this extractor understands.
    fn extraction_type(&self) -> ExtractionType;

    /// Extract from the page as it is currently rendered.
    async fn extract(&self, page: &dyn PageHandle) -> Result<Extraction>;
}

/// The shipped extractor for a layout.
pub fn extractor_for(extraction_type: ExtractionType) -> Result<Arc<dyn Extractor>> {
    Ok(match extraction_type {
        ExtractionType::Accounts => Arc::new(AccountListExtractor::new()?),
        ExtractionType::Leads => Arc::new(LeadTableExtractor::new()?),
    })
}

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScanError::InvalidSelector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

/// Collapses whitespace runs and resolves relative links.
#[derive(Debug, Clone)]
pub(crate) struct TextCleaner {
    whitespace: Regex,
    origin: Url,
}

impl TextCleaner {
    pub(crate) fn new() -> Result<Self> {
        let whitespace =
            Regex::new(r"\s+").map_err(|e| ScanError::Extraction(e.to_string()))?;
        let origin = Url::parse(LINK_ORIGIN).map_err(|e| ScanError::Extraction(e.to_string()))?;
        Ok(Self { whitespace, origin })
    }

    pub(crate) fn clean(&self, raw: &str) -> String {
        self.whitespace.replace_all(raw, " ").trim().to_string()
    }

    /// Cleaned text of an element, `None` if blank.
    pub(crate) fn text(&self, element: ElementRef<'_>) -> Option<String> {
        let text = self.clean(&element.text().collect::<String>());
        (!text.is_empty()).then_some(text)
    }

    /// Cleaned text of the first match under `scope`.
    pub(crate) fn text_at(&self, scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
        scope.select(selector).next().and_then(|el| self.text(el))
    }

    /// Absolute URL for an href, `None` if it cannot be resolved.
    pub(crate) fn resolve(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        self.origin.join(href).ok().map(String::from)
    }
}
