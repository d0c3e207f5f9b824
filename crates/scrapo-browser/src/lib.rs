//! Browser boundary for lazily rendered, paginated listings.
//!
//! Everything here runs against live DOM state the crate does not own:
//! scripts are injected through a [`PageHandle`] and their JSON results
//! read back. The chromiumoxide-backed [`BrowserEngine`] supplies real
//! pages; tests supply scripted fakes.

pub mod engine;
pub mod error;
pub mod page;
pub mod pagination;
pub mod scroll;

pub use engine::{BrowserEngine, ChromePage};
pub use error::{BrowserError, Result};
pub use page::{evaluate_as, PageHandle, PageProvider};
pub use pagination::{NavigationOutcome, NearMiss, PaginationNavigator, NEXT_PAGE_SELECTORS};
pub use scroll::{ScrollContainer, ScrollOutcome, ScrollSimulator};
