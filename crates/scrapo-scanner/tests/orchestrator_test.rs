use scrapo_browser::{BrowserError, PageHandle, PageProvider};
use scrapo_core::{
    ExtractionType, Field, PageBudget, Record, SchemaDriftPolicy, TableSnapshot, TimingPolicy,
};
use scrapo_scanner::{
    DownloadSink, Extraction, Extractor, PageNavigator, PageScroller, RunPhase, ScanError,
    ScrapeOrchestrator, StopReason,
};
use scrapo_store::{DatasetStore, KeyValueStore, MemoryStore, SqliteStore, StoreError};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

struct FakePage;

#[async_trait::async_trait]
impl PageHandle for FakePage {
    async fn evaluate(&self, _script: &str) -> scrapo_browser::Result<Value> {
        Ok(Value::Null)
    }
}

struct FakeProvider;

#[async_trait::async_trait]
impl PageProvider for FakeProvider {
    async fn active_page(&self) -> scrapo_browser::Result<Arc<dyn PageHandle>> {
        Ok(Arc::new(FakePage))
    }
}

struct NoActivePage;

#[async_trait::async_trait]
impl PageProvider for NoActivePage {
    async fn active_page(&self) -> scrapo_browser::Result<Arc<dyn PageHandle>> {
        Err(BrowserError::NoActivePage)
    }
}

#[derive(Default)]
struct CountingScroller {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl PageScroller for CountingScroller {
    async fn materialize(&self, _page: &dyn PageHandle) -> scrapo_browser::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Answers navigation attempts from a script; `true` once the script runs out.
struct ScriptedNavigator {
    answers: Mutex<VecDeque<bool>>,
    calls: AtomicUsize,
}

impl ScriptedNavigator {
    fn always() -> Self {
        Self::with_answers(&[])
    }

    fn with_answers(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PageNavigator for ScriptedNavigator {
    async fn advance(&self, _page: &dyn PageHandle) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers.lock().unwrap().pop_front().unwrap_or(true)
    }
}

/// Emits one record per page, named after the page, failing on chosen pages.
struct PagedAccounts {
    calls: AtomicUsize,
    failing_pages: Vec<usize>,
}

impl PagedAccounts {
    fn new() -> Self {
        Self::failing_on(&[])
    }

    fn failing_on(pages: &[usize]) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failing_pages: pages.to_vec(),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Extractor for PagedAccounts {
    fn extraction_type(&self) -> ExtractionType {
        ExtractionType::Accounts
    }

    async fn extract(&self, _page: &dyn PageHandle) -> scrapo_scanner::Result<Extraction> {
        let page = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_pages.contains(&page) {
            return Err(ScanError::Browser(BrowserError::ScriptError(format!(
                "page {page} detached"
            ))));
        }
        let record: Record = [(Field::Name, format!("Account {page}"))].into_iter().collect();
        Ok(Extraction::Records(vec![record]))
    }
}

/// Pauses inside the extraction of one page until the test releases it.
struct GatedAccounts {
    calls: AtomicUsize,
    gate_page: usize,
    reached: mpsc::UnboundedSender<()>,
    release: Mutex<Option<oneshot::Receiver<()>>>,
}

#[async_trait::async_trait]
impl Extractor for GatedAccounts {
    fn extraction_type(&self) -> ExtractionType {
        ExtractionType::Accounts
    }

    async fn extract(&self, _page: &dyn PageHandle) -> scrapo_scanner::Result<Extraction> {
        let page = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if page == self.gate_page {
            let release = self.release.lock().unwrap().take();
            let _ = self.reached.send(());
            if let Some(release) = release {
                let _ = release.await;
            }
        }
        let record: Record = [(Field::Name, format!("Account {page}"))].into_iter().collect();
        Ok(Extraction::Records(vec![record]))
    }
}

struct TableEachPage {
    header: Vec<&'static str>,
}

#[async_trait::async_trait]
impl Extractor for TableEachPage {
    fn extraction_type(&self) -> ExtractionType {
        ExtractionType::Leads
    }

    async fn extract(&self, _page: &dyn PageHandle) -> scrapo_scanner::Result<Extraction> {
        Ok(Extraction::Table(TableSnapshot {
            header: self.header.iter().map(ToString::to_string).collect(),
            rows: vec![vec!["Jane".to_string(), "CTO".to_string()]],
        }))
    }
}

/// Store that accepts a number of writes and then fails.
struct FailingStore {
    inner: MemoryStore,
    writes_left: AtomicUsize,
}

#[async_trait::async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, key: &str) -> scrapo_store::Result<Option<Value>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &Value) -> scrapo_store::Result<()> {
        let left = self.writes_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(StoreError::Serialization("quota exceeded".to_string()));
        }
        self.writes_left.store(left - 1, Ordering::SeqCst);
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> scrapo_store::Result<()> {
        self.inner.remove(key).await
    }

    async fn try_acquire_lease(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
    ) -> scrapo_store::Result<bool> {
        self.inner.try_acquire_lease(name, holder, ttl).await
    }

    async fn release_lease(&self, name: &str, holder: &str) -> scrapo_store::Result<()> {
        self.inner.release_lease(name, holder).await
    }
}

#[derive(Default)]
struct CapturingSink {
    delivered: Mutex<Vec<(String, String, Vec<u8>)>>,
}

#[async_trait::async_trait]
impl DownloadSink for CapturingSink {
    async fn deliver(
        &self,
        filename: &str,
        mime: &str,
        bytes: &[u8],
    ) -> scrapo_scanner::Result<String> {
        self.delivered
            .lock()
            .unwrap()
            .push((filename.to_string(), mime.to_string(), bytes.to_vec()));
        Ok(format!("memory://{filename}"))
    }
}

fn memory_datasets() -> Arc<DatasetStore> {
    Arc::new(DatasetStore::new(
        Arc::new(MemoryStore::new()),
        SchemaDriftPolicy::default(),
    ))
}

fn build(
    navigator: Arc<ScriptedNavigator>,
    extractor: Arc<dyn Extractor>,
    datasets: Arc<DatasetStore>,
) -> ScrapeOrchestrator {
    ScrapeOrchestrator::new(
        Arc::new(FakeProvider),
        Arc::new(CountingScroller::default()),
        navigator,
        datasets,
        &TimingPolicy::immediate(),
    )
    .with_extractor(extractor)
}

fn budget(pages: u32) -> PageBudget {
    PageBudget::new(pages).unwrap()
}

#[tokio::test]
async fn test_budget_of_three_extracts_three_pages() {
    let navigator = Arc::new(ScriptedNavigator::always());
    let extractor = Arc::new(PagedAccounts::new());
    let orchestrator = build(navigator.clone(), extractor.clone(), memory_datasets());

    let summary = orchestrator
        .start(ExtractionType::Accounts, budget(3))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.pages_extracted, 3);
    assert_eq!(summary.pages_failed, 0);
    assert_eq!(summary.total_count, 3);
    assert_eq!(summary.stop_reason, StopReason::BudgetExhausted);
    assert_eq!(extractor.calls(), 3);
    // No navigation after the last budgeted page.
    assert_eq!(navigator.calls(), 2);

    let state = orchestrator.state();
    assert_eq!(state.phase, RunPhase::Idle);
    assert_eq!(state.pages_completed, 0);
    assert_eq!(state.total_count, 3);
}

#[tokio::test]
async fn test_start_clears_previous_dataset() {
    let datasets = memory_datasets();
    let handle = ExtractionType::Accounts.dataset_handle();
    let stale: Record = [(Field::Name, "Stale")].into_iter().collect();
    datasets.append_records(&handle, vec![stale]).await.unwrap();

    let orchestrator = build(
        Arc::new(ScriptedNavigator::always()),
        Arc::new(PagedAccounts::new()),
        datasets.clone(),
    );
    orchestrator
        .start(ExtractionType::Accounts, budget(2))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    let names: Vec<String> = datasets
        .load_records(&handle)
        .await
        .unwrap()
        .iter()
        .filter_map(|r| r.get(Field::Name).map(String::from))
        .collect();
    assert_eq!(names, vec!["Account 1", "Account 2"]);
}

#[tokio::test]
async fn test_failed_navigation_ends_run() {
    let navigator = Arc::new(ScriptedNavigator::with_answers(&[true, false]));
    let extractor = Arc::new(PagedAccounts::new());
    let orchestrator = build(navigator.clone(), extractor.clone(), memory_datasets());

    let summary = orchestrator
        .start(ExtractionType::Accounts, budget(5))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.stop_reason, StopReason::EndOfData);
    assert_eq!(summary.pages_extracted, 2);
    assert_eq!(extractor.calls(), 2);
    assert_eq!(navigator.calls(), 2);
}

#[tokio::test]
async fn test_extraction_failure_does_not_stop_run() {
    let extractor = Arc::new(PagedAccounts::failing_on(&[2]));
    let orchestrator = build(
        Arc::new(ScriptedNavigator::always()),
        extractor.clone(),
        memory_datasets(),
    );

    let summary = orchestrator
        .start(ExtractionType::Accounts, budget(3))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.stop_reason, StopReason::BudgetExhausted);
    assert_eq!(summary.pages_extracted, 2);
    assert_eq!(summary.pages_failed, 1);
    assert_eq!(summary.total_count, 2);
    assert_eq!(extractor.calls(), 3);
}

#[tokio::test]
async fn test_stop_during_second_page() {
    let (reached_tx, mut reached_rx) = mpsc::unbounded_channel();
    let (release_tx, release_rx) = oneshot::channel();
    let extractor = Arc::new(GatedAccounts {
        calls: AtomicUsize::new(0),
        gate_page: 2,
        reached: reached_tx,
        release: Mutex::new(Some(release_rx)),
    });
    let navigator = Arc::new(ScriptedNavigator::always());
    let orchestrator = build(navigator.clone(), extractor.clone(), memory_datasets());
    let states = orchestrator.subscribe();

    let run = orchestrator
        .start(ExtractionType::Accounts, budget(5))
        .await
        .unwrap();

    reached_rx.recv().await.unwrap();
    assert_eq!(orchestrator.state().current_page, 2);
    assert!(orchestrator.request_stop());
    assert!(!orchestrator.request_stop());
    assert_eq!(orchestrator.state().phase, RunPhase::Stopping);
    release_tx.send(()).unwrap();

    let summary = run.wait().await.unwrap();
    assert_eq!(summary.stop_reason, StopReason::Stopped);
    assert_eq!(summary.pages_extracted, 2);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
    assert_eq!(navigator.calls(), 1);

    let last = states.borrow().clone();
    assert_eq!(last.phase, RunPhase::Idle);
    assert_eq!(last.stop_reason, Some(StopReason::Stopped));
}

#[tokio::test]
async fn test_second_start_is_rejected_while_running() {
    let (reached_tx, mut reached_rx) = mpsc::unbounded_channel();
    let (release_tx, release_rx) = oneshot::channel();
    let extractor = Arc::new(GatedAccounts {
        calls: AtomicUsize::new(0),
        gate_page: 1,
        reached: reached_tx,
        release: Mutex::new(Some(release_rx)),
    });
    let orchestrator = build(
        Arc::new(ScriptedNavigator::always()),
        extractor,
        memory_datasets(),
    );

    let run = orchestrator
        .start(ExtractionType::Accounts, budget(1))
        .await
        .unwrap();
    reached_rx.recv().await.unwrap();

    assert!(matches!(
        orchestrator.start(ExtractionType::Accounts, budget(1)).await,
        Err(ScanError::RunInProgress)
    ));
    assert!(matches!(
        orchestrator.scrape_once(ExtractionType::Accounts).await,
        Err(ScanError::RunInProgress)
    ));
    assert!(matches!(
        orchestrator.clear(ExtractionType::Accounts).await,
        Err(ScanError::RunInProgress)
    ));
    let sink = CapturingSink::default();
    assert!(matches!(
        orchestrator
            .download(ExtractionType::Accounts, &sink, false)
            .await,
        Err(ScanError::RunInProgress)
    ));

    release_tx.send(()).unwrap();
    run.wait().await.unwrap();

    // The controller is free again once the run has ended.
    assert_eq!(orchestrator.scrape_once(ExtractionType::Accounts).await.unwrap(), 2);
}

#[tokio::test]
async fn test_persistence_failure_aborts_run() {
    let store = FailingStore {
        inner: MemoryStore::new(),
        writes_left: AtomicUsize::new(1),
    };
    let datasets = Arc::new(DatasetStore::new(
        Arc::new(store),
        SchemaDriftPolicy::default(),
    ));
    let navigator = Arc::new(ScriptedNavigator::always());
    let extractor = Arc::new(PagedAccounts::new());
    let orchestrator = build(navigator.clone(), extractor.clone(), datasets.clone());

    let err = orchestrator
        .start(ExtractionType::Accounts, budget(5))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap_err();

    assert!(matches!(err, ScanError::Store(StoreError::Serialization(_))));
    assert_eq!(extractor.calls(), 2);
    assert_eq!(navigator.calls(), 1);

    let state = orchestrator.state();
    assert_eq!(state.phase, RunPhase::Idle);
    assert!(matches!(state.stop_reason, Some(StopReason::Aborted(_))));

    // The aborted run gave its store lease back.
    let other = build(Arc::new(ScriptedNavigator::always()), extractor, datasets);
    other.clear(ExtractionType::Accounts).await.unwrap();
}

async fn sqlite_datasets(path: &std::path::Path) -> Arc<DatasetStore> {
    Arc::new(DatasetStore::new(
        Arc::new(SqliteStore::open(path).await.unwrap()),
        SchemaDriftPolicy::default(),
    ))
}

#[tokio::test]
async fn test_run_excludes_another_orchestrator_on_same_database() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("scrapo.db");

    let (reached_tx, mut reached_rx) = mpsc::unbounded_channel();
    let (release_tx, release_rx) = oneshot::channel();
    let extractor = Arc::new(GatedAccounts {
        calls: AtomicUsize::new(0),
        gate_page: 2,
        reached: reached_tx,
        release: Mutex::new(Some(release_rx)),
    });
    let first = build(
        Arc::new(ScriptedNavigator::always()),
        extractor,
        sqlite_datasets(&path).await,
    );
    // Separate connection pool, as a second CLI process would have.
    let second = build(
        Arc::new(ScriptedNavigator::always()),
        Arc::new(PagedAccounts::new()),
        sqlite_datasets(&path).await,
    );

    let run = first
        .start(ExtractionType::Accounts, budget(3))
        .await
        .unwrap();
    reached_rx.recv().await.unwrap();

    assert!(matches!(
        second.clear(ExtractionType::Accounts).await,
        Err(ScanError::RunInProgress)
    ));
    assert!(matches!(
        second.start(ExtractionType::Accounts, budget(1)).await,
        Err(ScanError::RunInProgress)
    ));
    assert!(matches!(
        second.scrape_once(ExtractionType::Accounts).await,
        Err(ScanError::RunInProgress)
    ));
    let sink = CapturingSink::default();
    assert!(matches!(
        second.download(ExtractionType::Accounts, &sink, true).await,
        Err(ScanError::RunInProgress)
    ));
    assert!(sink.delivered.lock().unwrap().is_empty());
    assert_eq!(second.count(ExtractionType::Accounts).await.unwrap(), 1);

    release_tx.send(()).unwrap();
    let summary = run.wait().await.unwrap();
    assert_eq!(summary.pages_extracted, 3);
    assert_eq!(summary.total_count, 3);
    assert_eq!(second.count(ExtractionType::Accounts).await.unwrap(), 3);

    second.clear(ExtractionType::Accounts).await.unwrap();
    assert_eq!(first.count(ExtractionType::Accounts).await.unwrap(), 0);
}

#[tokio::test]
async fn test_missing_page_ends_run() {
    let orchestrator = ScrapeOrchestrator::new(
        Arc::new(NoActivePage),
        Arc::new(CountingScroller::default()),
        Arc::new(ScriptedNavigator::always()),
        memory_datasets(),
        &TimingPolicy::immediate(),
    )
    .with_extractor(Arc::new(PagedAccounts::new()));

    let summary = orchestrator
        .start(ExtractionType::Accounts, budget(3))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(summary.stop_reason, StopReason::PageUnavailable);
    assert_eq!(summary.pages_failed, 1);
    assert_eq!(summary.pages_extracted, 0);
}

#[tokio::test]
async fn test_table_pages_keep_one_header() {
    let orchestrator = build(
        Arc::new(ScriptedNavigator::always()),
        Arc::new(TableEachPage {
            header: vec!["Name", "Designation"],
        }),
        memory_datasets(),
    );

    let summary = orchestrator
        .start(ExtractionType::Leads, budget(3))
        .await
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(summary.total_count, 3);

    let csv = orchestrator.render_csv(ExtractionType::Leads).await.unwrap();
    assert_eq!(csv.matches("\"Name\",\"Designation\"").count(), 1);
    assert_eq!(csv.lines().count(), 4);
}

#[tokio::test]
async fn test_scrape_once_accumulates_without_clearing() {
    let orchestrator = build(
        Arc::new(ScriptedNavigator::always()),
        Arc::new(PagedAccounts::new()),
        memory_datasets(),
    );

    assert_eq!(orchestrator.scrape_once(ExtractionType::Accounts).await.unwrap(), 1);
    assert_eq!(orchestrator.scrape_once(ExtractionType::Accounts).await.unwrap(), 2);
    assert_eq!(orchestrator.count(ExtractionType::Accounts).await.unwrap(), 2);
}

#[tokio::test]
async fn test_download_then_clear() {
    let orchestrator = build(
        Arc::new(ScriptedNavigator::always()),
        Arc::new(PagedAccounts::new()),
        memory_datasets(),
    );
    let sink = CapturingSink::default();

    assert!(matches!(
        orchestrator
            .download(ExtractionType::Accounts, &sink, true)
            .await,
        Err(ScanError::NothingToExport { .. })
    ));

    orchestrator.scrape_once(ExtractionType::Accounts).await.unwrap();
    let report = orchestrator
        .download(ExtractionType::Accounts, &sink, true)
        .await
        .unwrap();

    assert_eq!(report.filename, "linkedin_accounts_data.csv");
    assert_eq!(report.location, "memory://linkedin_accounts_data.csv");
    assert_eq!(report.count, 1);
    assert!(report.cleared);

    let delivered = sink.delivered.lock().unwrap().clone();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].1, "text/csv");
    assert_eq!(delivered[0].2, b"\"Name\"\r\n\"Account 1\"\r\n".to_vec());

    assert_eq!(orchestrator.count(ExtractionType::Accounts).await.unwrap(), 0);
}

#[tokio::test]
async fn test_download_keep_leaves_dataset() {
    let orchestrator = build(
        Arc::new(ScriptedNavigator::always()),
        Arc::new(PagedAccounts::new()),
        memory_datasets(),
    );
    orchestrator.scrape_once(ExtractionType::Accounts).await.unwrap();

    let sink = CapturingSink::default();
    let report = orchestrator
        .download(ExtractionType::Accounts, &sink, false)
        .await
        .unwrap();
    assert!(!report.cleared);
    assert_eq!(orchestrator.count(ExtractionType::Accounts).await.unwrap(), 1);
}
