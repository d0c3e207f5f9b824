//! Shared state for one CLI invocation.

use anyhow::Result;
use scrapo_browser::{BrowserEngine, BrowserError, PageHandle, PageProvider};
use scrapo_core::AppConfig;
use scrapo_scanner::ScrapeOrchestrator;
use scrapo_store::{DatasetStore, SqliteStore};
use std::sync::Arc;
use tracing::{info, warn};

/// Page provider for commands that never touch a page.
struct NoBrowser;

#[async_trait::async_trait]
impl PageProvider for NoBrowser {
    async fn active_page(&self) -> scrapo_browser::Result<Arc<dyn PageHandle>> {
        Err(BrowserError::NoActivePage)
    }
}

pub struct App {
    pub config: AppConfig,
    datasets: Arc<DatasetStore>,
}

impl App {
    /// Open the dataset store named by `config`.
    pub async fn open(config: AppConfig) -> Result<Self> {
        let path = config.database_path()?;
        info!("Dataset store: {}", path.display());
        let store = SqliteStore::open(&path).await?;
        Ok(Self::with_datasets(
            config.clone(),
            Arc::new(DatasetStore::new(Arc::new(store), config.storage.schema_drift)),
        ))
    }

    pub fn with_datasets(config: AppConfig, datasets: Arc<DatasetStore>) -> Self {
        Self { config, datasets }
    }

    /// Orchestrator for store-only commands (status, export, clear).
    pub fn offline(&self) -> Result<ScrapeOrchestrator> {
        Ok(ScrapeOrchestrator::from_config(
            Arc::new(NoBrowser),
            Arc::clone(&self.datasets),
            &self.config,
        )?)
    }

    /// Attach to (or launch) the browser, optionally opening `url` first.
    pub async fn connect(&self, url: Option<&str>) -> Result<Session> {
        let engine = Arc::new(BrowserEngine::new(self.config.browser.clone()).await?);

        if let Some(url) = url {
            info!("Opening {}", url);
            engine.open(url).await?;
            tokio::time::sleep(self.config.timing.settle_delay()).await;
        }

        let orchestrator = ScrapeOrchestrator::from_config(
            engine.clone(),
            Arc::clone(&self.datasets),
            &self.config,
        )?;
        Ok(Session {
            engine,
            orchestrator,
        })
    }
}

/// A browser connection plus the orchestrator driving it.
pub struct Session {
    engine: Arc<BrowserEngine>,
    pub orchestrator: ScrapeOrchestrator,
}

impl Session {
    /// Drop the orchestrator and close the browser (or detach from it).
    pub async fn close(self) -> Result<()> {
        let Session {
            engine,
            orchestrator,
        } = self;
        drop(orchestrator);

        match Arc::try_unwrap(engine) {
            Ok(engine) => engine.close().await?,
            Err(_) => warn!("Browser still in use, leaving it open"),
        }
        Ok(())
    }
}
