//! Run controller for single-page and multi-page scrapes.
//!
//! A multi-page run is one spawned task that loops scroll, extract, merge,
//! navigate and settle until the page budget is spent, navigation fails, or
//! a stop request is observed at an iteration boundary. Only one run (or
//! single-page scrape, download, clear) may hold the controller at a time.
//!
//! Exclusivity has two layers. An in-process mutex rejects overlapping calls
//! on one orchestrator, and a lease in the dataset store rejects them across
//! every host sharing that store. A run renews its lease before each page.

use crate::error::{Result, ScanError};
use crate::export::{records_to_csv, rows_to_csv, DownloadSink, CSV_MIME};
use crate::extract::{extractor_for, Extraction, Extractor};
use crate::state::{RunPhase, RunState, RunSummary, StopReason};
use chrono::Utc;
use scrapo_browser::{
    PageHandle, PageProvider, PaginationNavigator, ScrollOutcome, ScrollSimulator,
};
use scrapo_core::{AppConfig, DatasetHandle, DatasetShape, ExtractionType, PageBudget, TimingPolicy};
use scrapo_store::DatasetStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Store-wide lease held while a run, scrape, download or clear is active.
const RUN_LEASE: &str = "scrapo.run";
/// Lifetime of the lease; a crashed host's lease lapses after this.
const RUN_LEASE_TTL: Duration = Duration::from_secs(300);

/// Brings lazily rendered content onto the page before extraction.
#[async_trait::async_trait]
pub trait PageScroller: Send + Sync {
    /// Scroll the page so every item is mounted.
    async fn materialize(&self, page: &dyn PageHandle) -> scrapo_browser::Result<()>;
}

#[async_trait::async_trait]
impl PageScroller for ScrollSimulator {
    async fn materialize(&self, page: &dyn PageHandle) -> scrapo_browser::Result<()> {
        if let ScrollOutcome::Scrolled { scroll_height, .. } =
            self.scroll_to_end_and_back(page).await?
        {
            tracing::debug!(scroll_height, "Page materialized");
        }
        Ok(())
    }
}

/// Moves the page to the next set of results.
#[async_trait::async_trait]
pub trait PageNavigator: Send + Sync {
    /// `true` only for a verified page turn. Never fails.
    async fn advance(&self, page: &dyn PageHandle) -> bool;
}

#[async_trait::async_trait]
impl PageNavigator for PaginationNavigator {
    async fn advance(&self, page: &dyn PageHandle) -> bool {
        self.go_next(page).await
    }
}

/// Result of a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    /// Dataset that was exported
    pub extraction_type: ExtractionType,
    /// Filename the sink received
    pub filename: &'static str,
    /// Where the sink put the file
    pub location: String,
    /// Records (or data rows) exported
    pub count: usize,
    /// Whether the dataset was cleared afterwards
    pub cleared: bool,
}

/// Handle to a spawned multi-page run.
#[derive(Debug)]
pub struct RunHandle {
    run_id: Uuid,
    task: JoinHandle<Result<RunSummary>>,
}

impl RunHandle {
    /// Identifier of the run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Wait for the run to end.
    ///
    /// # Errors
    /// Returns the persistence error that aborted the run, if any.
    pub async fn wait(self) -> Result<RunSummary> {
        self.task
            .await
            .map_err(|e| ScanError::TaskJoin(e.to_string()))?
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    completed: u32,
    extracted: u32,
    failed: u32,
    total: usize,
}

/// Orchestrates scrapes against the active browser page.
#[derive(Clone)]
pub struct ScrapeOrchestrator {
    pages: Arc<dyn PageProvider>,
    scroller: Arc<dyn PageScroller>,
    navigator: Arc<dyn PageNavigator>,
    extractors: HashMap<ExtractionType, Arc<dyn Extractor>>,
    datasets: Arc<DatasetStore>,
    settle_delay: Duration,
    state: Arc<watch::Sender<RunState>>,
    run_lock: Arc<Mutex<()>>,
    lease_holder: Arc<str>,
}

impl ScrapeOrchestrator {
    /// Create an orchestrator with no extractors registered.
    #[must_use]
    pub fn new(
        pages: Arc<dyn PageProvider>,
        scroller: Arc<dyn PageScroller>,
        navigator: Arc<dyn PageNavigator>,
        datasets: Arc<DatasetStore>,
        timing: &TimingPolicy,
    ) -> Self {
        let (state, _) = watch::channel(RunState::default());
        Self {
            pages,
            scroller,
            navigator,
            extractors: HashMap::new(),
            datasets,
            settle_delay: timing.settle_delay(),
            state: Arc::new(state),
            run_lock: Arc::new(Mutex::new(())),
            lease_holder: Uuid::new_v4().to_string().into(),
        }
    }

    /// Orchestrator wired with the browser scroll and pagination steps and
    /// both shipped extractors.
    pub fn from_config(
        pages: Arc<dyn PageProvider>,
        datasets: Arc<DatasetStore>,
        config: &AppConfig,
    ) -> Result<Self> {
        let scroller = Arc::new(ScrollSimulator::new(
            config.scroll.clone(),
            config.timing.clone(),
        ));
        let navigator = Arc::new(PaginationNavigator::new(config.timing.clone()));

        Ok(Self::new(pages, scroller, navigator, datasets, &config.timing)
            .with_extractor(extractor_for(ExtractionType::Accounts)?)
            .with_extractor(extractor_for(ExtractionType::Leads)?))
    }

    /// Register (or replace) the extractor for its layout.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractors
            .insert(extractor.extraction_type(), extractor);
        self
    }

    /// Current run state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Ask the running run to stop after its current page.
    ///
    /// Returns `false` if no run was running.
    pub fn request_stop(&self) -> bool {
        let signalled = self.state.send_if_modified(|state| {
            if state.phase == RunPhase::Running {
                state.phase = RunPhase::Stopping;
                true
            } else {
                false
            }
        });
        if signalled {
            tracing::info!("Stop requested, finishing current page");
        }
        signalled
    }

    /// Start a multi-page run. The dataset for `extraction_type` is cleared first.
    ///
    /// # Errors
    /// Returns `ScanError::RunInProgress` if the controller is busy.
    pub async fn start(
        &self,
        extraction_type: ExtractionType,
        budget: PageBudget,
    ) -> Result<RunHandle> {
        let guard = Arc::clone(&self.run_lock)
            .try_lock_owned()
            .map_err(|_| ScanError::RunInProgress)?;
        let extractor = self.extractor(extraction_type)?;
        let handle = extraction_type.dataset_handle();

        self.acquire_lease().await?;
        if let Err(e) = self.datasets.clear(&handle).await {
            self.release_lease().await;
            return Err(e.into());
        }

        let run_id = Uuid::new_v4();
        self.state
            .send_replace(RunState::started(run_id, extraction_type, budget.get()));
        tracing::info!(
            %run_id,
            %extraction_type,
            budget = budget.get(),
            "Starting multi-page run"
        );

        let this = self.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            let result = this
                .run_pages(run_id, extraction_type, extractor, budget.get())
                .await;
            this.release_lease().await;
            result
        });

        Ok(RunHandle { run_id, task })
    }

    /// Scrape the current page into the existing dataset.
    ///
    /// Returns the dataset's new count.
    pub async fn scrape_once(&self, extraction_type: ExtractionType) -> Result<usize> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| ScanError::RunInProgress)?;
        self.acquire_lease().await?;
        let result = self.scrape_current(extraction_type).await;
        self.release_lease().await;
        result
    }

    async fn scrape_current(&self, extraction_type: ExtractionType) -> Result<usize> {
        let extractor = self.extractor(extraction_type)?;
        let page = self.pages.active_page().await?;
        let total = self
            .process_page(page.as_ref(), extractor.as_ref(), &extraction_type.dataset_handle())
            .await?;
        tracing::info!(%extraction_type, total, "Scraped current page");
        Ok(total)
    }

    /// Records (or data rows) held for `extraction_type`.
    pub async fn count(&self, extraction_type: ExtractionType) -> Result<usize> {
        Ok(self
            .datasets
            .count(&extraction_type.dataset_handle())
            .await?)
    }

    /// Render the dataset as CSV.
    pub async fn render_csv(&self, extraction_type: ExtractionType) -> Result<String> {
        let handle = extraction_type.dataset_handle();
        match handle.shape() {
            DatasetShape::Records => records_to_csv(&self.datasets.load_records(&handle).await?),
            DatasetShape::Rows => rows_to_csv(&self.datasets.load_rows(&handle).await?),
        }
    }

    /// Render the dataset and hand it to `sink`, optionally clearing it after.
    ///
    /// # Errors
    /// `ScanError::NothingToExport` for an empty dataset,
    /// `ScanError::RunInProgress` while a run holds the controller.
    pub async fn download(
        &self,
        extraction_type: ExtractionType,
        sink: &dyn DownloadSink,
        clear_after: bool,
    ) -> Result<ExportReport> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| ScanError::RunInProgress)?;
        self.acquire_lease().await?;
        let result = self.deliver(extraction_type, sink, clear_after).await;
        self.release_lease().await;
        result
    }

    async fn deliver(
        &self,
        extraction_type: ExtractionType,
        sink: &dyn DownloadSink,
        clear_after: bool,
    ) -> Result<ExportReport> {
        let csv = self.render_csv(extraction_type).await?;
        if csv.is_empty() {
            return Err(ScanError::NothingToExport { extraction_type });
        }
        let count = self.count(extraction_type).await?;

        let filename = extraction_type.export_filename();
        let location = sink.deliver(filename, CSV_MIME, csv.as_bytes()).await?;

        if clear_after {
            self.datasets
                .clear(&extraction_type.dataset_handle())
                .await?;
        }

        tracing::info!(%extraction_type, count, location = %location, cleared = clear_after, "Dataset downloaded");
        Ok(ExportReport {
            extraction_type,
            filename,
            location,
            count,
            cleared: clear_after,
        })
    }

    /// Remove everything accumulated for `extraction_type`.
    pub async fn clear(&self, extraction_type: ExtractionType) -> Result<()> {
        let _guard = self
            .run_lock
            .try_lock()
            .map_err(|_| ScanError::RunInProgress)?;
        self.acquire_lease().await?;
        let result = self
            .datasets
            .clear(&extraction_type.dataset_handle())
            .await;
        self.release_lease().await;
        result?;
        tracing::info!(%extraction_type, "Dataset cleared");
        Ok(())
    }

    async fn acquire_lease(&self) -> Result<()> {
        if self
            .datasets
            .try_acquire_lease(RUN_LEASE, &self.lease_holder, RUN_LEASE_TTL)
            .await?
        {
            Ok(())
        } else {
            tracing::info!("Dataset store is busy in another process");
            Err(ScanError::RunInProgress)
        }
    }

    async fn renew_lease(&self) -> Result<()> {
        match self
            .datasets
            .try_acquire_lease(RUN_LEASE, &self.lease_holder, RUN_LEASE_TTL)
            .await
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(ScanError::LeaseLost),
            Err(e) => Err(e.into()),
        }
    }

    async fn release_lease(&self) {
        if let Err(e) = self
            .datasets
            .release_lease(RUN_LEASE, &self.lease_holder)
            .await
        {
            tracing::warn!("Failed to release run lease: {}", e);
        }
    }

    fn extractor(&self, extraction_type: ExtractionType) -> Result<Arc<dyn Extractor>> {
        self.extractors
            .get(&extraction_type)
            .cloned()
            .ok_or(ScanError::NoExtractor(extraction_type))
    }

    fn stop_requested(&self) -> bool {
        self.state.borrow().phase == RunPhase::Stopping
    }

    fn publish(&self, tally: Tally, current_page: u32) {
        self.state.send_modify(|state| {
            state.pages_completed = tally.completed;
            state.current_page = current_page;
            state.failed_pages = tally.failed;
            state.total_count = tally.total;
        });
    }

    async fn run_pages(
        &self,
        run_id: Uuid,
        extraction_type: ExtractionType,
        extractor: Arc<dyn Extractor>,
        budget: u32,
    ) -> Result<RunSummary> {
        let handle = extraction_type.dataset_handle();
        let mut tally = Tally::default();

        let reason = loop {
            if self.stop_requested() {
                break StopReason::Stopped;
            }

            let page_number = tally.completed + 1;
            if let Err(e) = self.renew_lease().await {
                tracing::error!(page = page_number, "Aborting run: {}", e);
                self.finish(run_id, extraction_type, tally, StopReason::Aborted(e.to_string()));
                return Err(e);
            }
            self.publish(tally, page_number);
            tracing::info!(page = page_number, budget, "Starting page");

            let page = match self.pages.active_page().await {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!(page = page_number, "No active page: {}", e);
                    tally.completed += 1;
                    tally.failed += 1;
                    self.publish(tally, page_number);
                    break StopReason::PageUnavailable;
                }
            };

            match self
                .process_page(page.as_ref(), extractor.as_ref(), &handle)
                .await
            {
                Ok(total) => {
                    tally.extracted += 1;
                    tally.total = total;
                    tracing::info!(page = page_number, total, "Page scraped");
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!(page = page_number, "Aborting run: {}", e);
                    self.finish(run_id, extraction_type, tally, StopReason::Aborted(e.to_string()));
                    return Err(e);
                }
                Err(e) => {
                    tally.failed += 1;
                    tracing::warn!(page = page_number, "Error scraping page: {}", e);
                }
            }

            tally.completed += 1;
            self.publish(tally, page_number);

            if tally.completed >= budget {
                break StopReason::BudgetExhausted;
            }
            if self.stop_requested() {
                break StopReason::Stopped;
            }

            tracing::debug!(page = page_number + 1, "Navigating to next page");
            if !self.navigator.advance(page.as_ref()).await {
                tracing::info!(page = page_number + 1, "Could not reach next page, stopping");
                break StopReason::EndOfData;
            }

            tracing::debug!(delay = ?self.settle_delay, "Waiting for next page to load");
            tokio::time::sleep(self.settle_delay).await;
        };

        Ok(self.finish(run_id, extraction_type, tally, reason))
    }

    async fn process_page(
        &self,
        page: &dyn PageHandle,
        extractor: &dyn Extractor,
        handle: &DatasetHandle,
    ) -> Result<usize> {
        self.scroller.materialize(page).await?;

        match extractor.extract(page).await? {
            Extraction::Table(table) if table.is_empty() => {
                tracing::info!(dataset = %handle, "No table on page, nothing merged");
                Ok(self.datasets.count(handle).await?)
            }
            Extraction::Table(table) => Ok(self.datasets.append_table(handle, table).await?),
            Extraction::Records(records) => {
                Ok(self.datasets.append_records(handle, records).await?)
            }
        }
    }

    fn finish(
        &self,
        run_id: Uuid,
        extraction_type: ExtractionType,
        tally: Tally,
        reason: StopReason,
    ) -> RunSummary {
        let finished_at = Utc::now();
        let started_at = self.state.borrow().started_at.unwrap_or(finished_at);

        tracing::info!(
            %run_id,
            pages_extracted = tally.extracted,
            pages_failed = tally.failed,
            total = tally.total,
            reason = %reason,
            "Run completed"
        );

        self.state.send_modify(|state| {
            state.phase = RunPhase::Completed;
            state.pages_completed = tally.completed;
            state.failed_pages = tally.failed;
            state.total_count = tally.total;
            state.stop_reason = Some(reason.clone());
        });
        self.state.send_modify(RunState::reset);

        RunSummary {
            run_id,
            extraction_type,
            pages_extracted: tally.extracted,
            pages_failed: tally.failed,
            total_count: tally.total,
            stop_reason: reason,
            started_at,
            finished_at,
        }
    }
}
