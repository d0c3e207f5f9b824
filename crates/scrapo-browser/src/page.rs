use crate::error::{BrowserError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// A live host page that scripts can be injected into.
#[async_trait::async_trait]
pub trait PageHandle: Send + Sync {
    /// Evaluate a JavaScript expression in the page and return its JSON result.
    ///
    /// `undefined` comes back as [`Value::Null`].
    async fn evaluate(&self, script: &str) -> Result<Value>;

    /// Identity of the page's current location.
    async fn location(&self) -> Result<String> {
        match self.evaluate("window.location.href").await? {
            Value::String(href) => Ok(href),
            other => Err(BrowserError::UnexpectedResult(format!(
                "location is not a string: {other}"
            ))),
        }
    }
}

/// Supplies the currently focused page.
#[async_trait::async_trait]
pub trait PageProvider: Send + Sync {
    /// Handle to the page the user is looking at.
    async fn active_page(&self) -> Result<Arc<dyn PageHandle>>;
}

/// Evaluate a script and deserialize its result.
pub async fn evaluate_as<T: DeserializeOwned>(page: &dyn PageHandle, script: &str) -> Result<T> {
    let value = page.evaluate(script).await?;
    serde_json::from_value(value).map_err(|e| BrowserError::UnexpectedResult(e.to_string()))
}
