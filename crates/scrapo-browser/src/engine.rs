use crate::error::{BrowserError, Result};
use crate::page::{PageHandle, PageProvider};
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::Page;
use futures_util::stream::StreamExt;
use scrapo_core::BrowserConfig;
use serde_json::Value;
use std::cmp::Reverse;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Reports whether a tab is in the foreground.
const TAB_STATE_SCRIPT: &str =
    "({ visible: document.visibilityState === 'visible', focused: document.hasFocus() })";

/// A chromiumoxide page exposed through [`PageHandle`].
#[derive(Clone)]
pub struct ChromePage {
    page: Page,
}

impl ChromePage {
    #[must_use]
    pub fn new(page: Page) -> Self {
        Self { page }
    }
}

#[async_trait::async_trait]
impl PageHandle for ChromePage {
    async fn evaluate(&self, script: &str) -> Result<Value> {
        let result = self
            .page
            .evaluate(script.to_string())
            .await
            .map_err(|e| BrowserError::ScriptError(e.to_string()))?;

        Ok(result.value().cloned().unwrap_or(Value::Null))
    }
}

/// Browser automation engine
///
/// A page opened through [`BrowserEngine::open`] stays the active page until
/// it goes away. Otherwise the active page is chosen among the open tabs.
pub struct BrowserEngine {
    browser: Browser,
    config: BrowserConfig,
    handler_task: JoinHandle<()>,
    pinned: RwLock<Option<Page>>,
}

impl BrowserEngine {
    /// Attach to `config.debugger_url` when set, otherwise launch a new browser.
    pub async fn new(config: BrowserConfig) -> Result<Self> {
        let (browser, mut handler) = match &config.debugger_url {
            Some(url) => {
                tracing::info!("Connecting to running browser at {}", url);
                Browser::connect(url.clone())
                    .await
                    .map_err(|e| BrowserError::ChromiumError(e.to_string()))?
            }
            None => {
                let mut builder = ChromiumConfig::builder()
                    .no_sandbox()
                    .window_size(config.window_width, config.window_height);
                if !config.headless {
                    builder = builder.with_head();
                }
                let launch_config = builder.build().map_err(BrowserError::ChromiumError)?;

                tracing::info!(headless = config.headless, "Launching browser");
                Browser::launch(launch_config)
                    .await
                    .map_err(|e| BrowserError::ChromiumError(e.to_string()))?
            }
        };

        // Spawn browser handler
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("browser handler event error: {}", e);
                }
            }
        });

        Ok(Self {
            browser,
            config,
            handler_task,
            pinned: RwLock::new(None),
        })
    }

    /// Open `url` in a new tab and make it the active page.
    pub async fn open(&self, url: &str) -> Result<ChromePage> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        *self.pinned.write().await = Some(page.clone());
        Ok(ChromePage::new(page))
    }

    async fn pinned_page(&self) -> Option<Page> {
        let page = self.pinned.read().await.clone()?;
        match page.url().await {
            Ok(_) => Some(page),
            Err(e) => {
                tracing::debug!("Opened page is gone ({}), choosing another", e);
                *self.pinned.write().await = None;
                None
            }
        }
    }

    /// Close the browser (or the connection to it) and stop the event handler.
    pub async fn close(mut self) -> Result<()> {
        if self.config.debugger_url.is_none() {
            self.browser
                .close()
                .await
                .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        }
        self.handler_task.abort();
        Ok(())
    }
}

#[async_trait::async_trait]
impl PageProvider for BrowserEngine {
    async fn active_page(&self) -> Result<Arc<dyn PageHandle>> {
        if let Some(page) = self.pinned_page().await {
            return Ok(Arc::new(ChromePage::new(page)));
        }

        let pages = self
            .browser
            .pages()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        let mut tabs = Vec::with_capacity(pages.len());
        for page in &pages {
            tabs.push(tab_state(page).await);
        }

        let index =
            pick_page(&tabs, &self.config.page_url_prefix).ok_or(BrowserError::NoActivePage)?;
        tracing::debug!(
            url = %tabs[index].url,
            visible = tabs[index].visible,
            focused = tabs[index].focused,
            "Using active page"
        );

        Ok(Arc::new(ChromePage::new(pages[index].clone())))
    }
}

/// What the engine knows about one open tab.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct TabState {
    url: String,
    visible: bool,
    focused: bool,
}

async fn tab_state(page: &Page) -> TabState {
    let url = page.url().await.ok().flatten().unwrap_or_default();
    let state = match page.evaluate(TAB_STATE_SCRIPT.to_string()).await {
        Ok(result) => result.value().cloned().unwrap_or(Value::Null),
        Err(e) => {
            tracing::debug!(%url, "Could not read tab state: {}", e);
            Value::Null
        }
    };
    let flag = |name: &str| state.get(name).and_then(Value::as_bool).unwrap_or(false);
    TabState {
        visible: flag("visible"),
        focused: flag("focused"),
        url,
    }
}

/// Index of the tab the user is looking at.
///
/// A focused tab wins, then a visible one, then one under `prefix`, then the
/// first. Ties go to the earlier tab.
fn pick_page(tabs: &[TabState], prefix: &str) -> Option<usize> {
    tabs.iter()
        .enumerate()
        .max_by_key(|(index, tab)| {
            let listed = !prefix.is_empty() && tab.url.starts_with(prefix);
            (tab.focused, tab.visible, listed, Reverse(*index))
        })
        .map(|(index, _)| index)
}
