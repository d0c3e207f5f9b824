//! Subcommand handlers.

use crate::app::App;
use anyhow::Result;
use scrapo_core::{ExtractionType, PageBudget};
use scrapo_scanner::{FileDownloadSink, RunPhase, RunSummary};
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub async fn run(
    app: &App,
    extraction_type: ExtractionType,
    pages: u32,
    url: Option<String>,
) -> Result<()> {
    let budget = PageBudget::new(pages)?;
    let session = app.connect(url.as_deref()).await?;
    let orchestrator = session.orchestrator.clone();

    let handle = orchestrator.start(extraction_type, budget).await?;
    info!(run_id = %handle.run_id(), "Run started, press Ctrl-C to stop after the current page");

    let stopper = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                orchestrator.request_stop();
            }
        })
    };

    let mut states = orchestrator.subscribe();
    let progress = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            if state.phase == RunPhase::Running && state.current_page > 0 {
                info!(
                    page = state.current_page,
                    of = state.pages_requested,
                    total = state.total_count,
                    "Progress"
                );
            }
        }
    });

    let outcome = handle.wait().await;
    stop_tasks(vec![stopper, progress]).await;
    drop(orchestrator);
    session.close().await?;

    println!("{}", describe_summary(&outcome?));
    Ok(())
}

/// Abort background tasks and wait until they have dropped what they captured.
async fn stop_tasks(tasks: Vec<JoinHandle<()>>) {
    for task in tasks {
        task.abort();
        let _ = task.await;
    }
}

pub async fn scrape(app: &App, extraction_type: ExtractionType, url: Option<String>) -> Result<()> {
    let session = app.connect(url.as_deref()).await?;
    let outcome = session.orchestrator.scrape_once(extraction_type).await;
    session.close().await?;

    let total = outcome?;
    println!("{extraction_type}: {total} stored");
    Ok(())
}

pub async fn export(
    app: &App,
    extraction_type: ExtractionType,
    keep: bool,
    out: Option<PathBuf>,
) -> Result<()> {
    let dir = out.unwrap_or_else(|| app.config.export.output_dir.clone());
    let sink = FileDownloadSink::new(dir);
    let report = app
        .offline()?
        .download(extraction_type, &sink, !keep)
        .await?;

    println!(
        "Wrote {} {} to {}",
        report.count, report.extraction_type, report.location
    );
    if !report.cleared {
        info!("Dataset kept");
    }
    Ok(())
}

pub async fn clear(app: &App, extraction_type: ExtractionType) -> Result<()> {
    app.offline()?.clear(extraction_type).await?;
    println!("{extraction_type}: cleared");
    Ok(())
}

pub async fn status(app: &App) -> Result<()> {
    for line in status_lines(app).await? {
        println!("{line}");
    }
    Ok(())
}

async fn status_lines(app: &App) -> Result<Vec<String>> {
    let orchestrator = app.offline()?;
    let mut lines = Vec::new();
    for extraction_type in [ExtractionType::Accounts, ExtractionType::Leads] {
        let count = orchestrator.count(extraction_type).await?;
        lines.push(format!("{extraction_type}: {count} stored"));
    }
    Ok(lines)
}

fn describe_summary(summary: &RunSummary) -> String {
    if summary.pages_failed > 0 {
        warn!(failed = summary.pages_failed, "Some pages could not be extracted");
    }
    format!(
        "{}: {} page(s) extracted, {} failed, {} stored ({})",
        summary.extraction_type,
        summary.pages_extracted,
        summary.pages_failed,
        summary.total_count,
        summary.stop_reason
    )
}
