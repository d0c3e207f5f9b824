//! Observable state of a multi-page run.

use chrono::{DateTime, Utc};
use scrapo_core::ExtractionType;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Phase of the run controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// No run in flight
    #[default]
    Idle,
    /// Pages are being processed
    Running,
    /// A stop was requested; the run ends at the next iteration boundary
    Stopping,
    /// The run has finished; reported once before returning to idle
    Completed,
}

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum StopReason {
    /// Every budgeted page was attempted
    BudgetExhausted,
    /// No next-page transition could be made
    EndOfData,
    /// The user asked the run to stop
    Stopped,
    /// No page could be obtained from the browser
    PageUnavailable,
    /// A persistence failure ended the run
    Aborted(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BudgetExhausted => f.write_str("page budget exhausted"),
            Self::EndOfData => f.write_str("end of data"),
            Self::Stopped => f.write_str("stopped by user"),
            Self::PageUnavailable => f.write_str("no active page"),
            Self::Aborted(reason) => write!(f, "aborted: {reason}"),
        }
    }
}

/// Snapshot of the run controller, published after every page attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// Current phase
    pub phase: RunPhase,
    /// Identifier of the current (or last) run
    pub run_id: Option<Uuid>,
    /// Layout the run extracts
    pub extraction_type: Option<ExtractionType>,
    /// Page budget of the run
    pub pages_requested: u32,
    /// Pages attempted so far, successful or not
    pub pages_completed: u32,
    /// Page being processed, 1-based; 0 when idle
    pub current_page: u32,
    /// Pages whose scroll or extraction failed
    pub failed_pages: u32,
    /// Records (or data rows) held by the dataset after the last merge
    pub total_count: usize,
    /// When the run started
    pub started_at: Option<DateTime<Utc>>,
    /// Set once the run has ended
    pub stop_reason: Option<StopReason>,
}

impl RunState {
    /// Whether a run holds the controller.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.phase, RunPhase::Running | RunPhase::Stopping)
    }

    pub(crate) fn started(
        run_id: Uuid,
        extraction_type: ExtractionType,
        pages_requested: u32,
    ) -> Self {
        Self {
            phase: RunPhase::Running,
            run_id: Some(run_id),
            extraction_type: Some(extraction_type),
            pages_requested,
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Back to idle, keeping what the last run produced.
    pub(crate) fn reset(&mut self) {
        self.phase = RunPhase::Idle;
        self.pages_completed = 0;
        self.current_page = 0;
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Run identifier
    pub run_id: Uuid,
    /// Layout the run extracted
    pub extraction_type: ExtractionType,
    /// Pages merged without error
    pub pages_extracted: u32,
    /// Pages whose scroll or extraction failed
    pub pages_failed: u32,
    /// Records (or data rows) in the dataset at the end
    pub total_count: usize,
    /// Why the run ended
    pub stop_reason: StopReason,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run ended
    pub finished_at: DateTime<Utc>,
}
