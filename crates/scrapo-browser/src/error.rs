use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium error: {0}")]
    ChromiumError(String),

    #[error("script injection failed: {0}")]
    ScriptError(String),

    #[error("unexpected script result: {0}")]
    UnexpectedResult(String),

    #[error("no active page")]
    NoActivePage,
}
