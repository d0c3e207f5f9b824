//! Human-paced scrolling that forces lazily rendered lists to mount.
//!
//! The container is located once, tagged with a marker attribute, and then
//! driven checkpoint by checkpoint from Rust so every pause is a tokio sleep.

use crate::error::Result;
use crate::page::{evaluate_as, PageHandle};
use rand::Rng;
use scrapo_core::{ScrollConfig, TimingPolicy};
use serde::Deserialize;
use std::time::Duration;

const CONTAINER_MARKER: &str = "data-scrapo-scroll";

/// Which region the simulator drove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollContainer {
    /// An inner element with its own scrollbar
    Element,
    /// The document's root scroller
    Document,
}

/// Result of one scroll pass.
#[derive(Debug, Clone, PartialEq)]
pub enum ScrollOutcome {
    /// The container was driven to the bottom and back.
    Scrolled {
        container: ScrollContainer,
        scroll_height: f64,
    },
    /// Nothing scrollable was found; the page was left as is.
    NoContainer,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerProbe {
    kind: ScrollContainer,
    scroll_height: f64,
}

/// Drives a page's scroll container through fixed checkpoints.
#[derive(Debug, Clone)]
pub struct ScrollSimulator {
    config: ScrollConfig,
    timing: TimingPolicy,
}

impl ScrollSimulator {
    #[must_use]
    pub fn new(config: ScrollConfig, timing: TimingPolicy) -> Self {
        Self { config, timing }
    }

    /// Scroll to the bottom in stages, pause, and return to the top.
    ///
    /// A missing container is logged and reported as [`ScrollOutcome::NoContainer`].
    /// Script injection failures are returned to the caller.
    pub async fn scroll_to_end_and_back(&self, page: &dyn PageHandle) -> Result<ScrollOutcome> {
        let probe: Option<ContainerProbe> =
            evaluate_as(page, &locate_script(self.config.min_visible_height)).await?;

        let Some(probe) = probe else {
            tracing::warn!("No scrollable container found, extracting without scrolling");
            return Ok(ScrollOutcome::NoContainer);
        };

        tracing::debug!(
            container = ?probe.kind,
            scroll_height = probe.scroll_height,
            "Starting staged scroll to bottom"
        );

        for (checkpoint, offset) in self
            .config
            .checkpoints
            .iter()
            .zip(checkpoint_offsets(probe.scroll_height, &self.config.checkpoints))
        {
            let moved = page.evaluate(&scroll_script(probe.kind, offset)).await?;
            if moved != serde_json::Value::Bool(true) {
                tracing::debug!("Scroll container vanished mid-pass");
            }
            tracing::trace!("Scrolled to {:.0}%", checkpoint * 100.0);
            tokio::time::sleep(self.step_pause()).await;
        }

        tokio::time::sleep(self.timing.scroll_bottom_pause()).await;
        tracing::debug!("Reached bottom of current page, returning to top");

        page.evaluate(&scroll_script(probe.kind, 0.0)).await?;
        tokio::time::sleep(self.timing.scroll_top_pause()).await;

        Ok(ScrollOutcome::Scrolled {
            container: probe.kind,
            scroll_height: probe.scroll_height,
        })
    }

    fn step_pause(&self) -> Duration {
        let min = self.timing.scroll_step_min_ms;
        let max = self.timing.scroll_step_max_ms.max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Absolute offsets for each checkpoint fraction, clamped to the height.
fn checkpoint_offsets(scroll_height: f64, checkpoints: &[f64]) -> Vec<f64> {
    checkpoints
        .iter()
        .map(|fraction| (scroll_height * fraction).min(scroll_height))
        .collect()
}

fn locate_script(min_visible_height: u32) -> String {
    format!(
        r"(() => {{
    const marker = '{CONTAINER_MARKER}';
    document.querySelectorAll('[' + marker + ']').forEach(el => el.removeAttribute(marker));
    const el = Array.from(document.querySelectorAll('div'))
        .find(e => e.scrollHeight > e.clientHeight && e.clientHeight > {min_visible_height});
    if (el) {{
        el.setAttribute(marker, '1');
        return {{ kind: 'element', scrollHeight: el.scrollHeight }};
    }}
    const root = document.scrollingElement || document.body;
    if (root) {{
        return {{ kind: 'document', scrollHeight: root.scrollHeight }};
    }}
    return null;
}})()"
    )
}

fn scroll_script(kind: ScrollContainer, top: f64) -> String {
    match kind {
        ScrollContainer::Element => format!(
            r"(() => {{
    const el = document.querySelector('[{CONTAINER_MARKER}]');
    if (!el) return false;
    el.scrollTo({{ top: {top}, behavior: 'smooth' }});
    return true;
}})()"
        ),
        ScrollContainer::Document => format!(
            r"(() => {{
    window.scrollTo({{ top: {top}, behavior: 'smooth' }});
    return true;
}})()"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BrowserError;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Answers the locate probe with a fixed value and records every script.
    struct ProbePage {
        probe: Value,
        scripts: Mutex<Vec<String>>,
    }

    impl ProbePage {
        fn new(probe: Value) -> Self {
            Self {
                probe,
                scripts: Mutex::new(Vec::new()),
            }
        }

        fn scripts(&self) -> Vec<String> {
            self.scripts.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl PageHandle for ProbePage {
        async fn evaluate(&self, script: &str) -> Result<Value> {
            self.scripts.lock().unwrap().push(script.to_string());
            if script.contains("querySelectorAll('div')") {
                Ok(self.probe.clone())
            } else {
                Ok(Value::Bool(true))
            }
        }
    }

    struct BrokenPage;

    #[async_trait::async_trait]
    impl PageHandle for BrokenPage {
        async fn evaluate(&self, _script: &str) -> Result<Value> {
            Err(BrowserError::ScriptError("target closed".to_string()))
        }
    }

    fn simulator() -> ScrollSimulator {
        ScrollSimulator::new(ScrollConfig::default(), TimingPolicy::immediate())
    }

    #[test]
    fn test_checkpoint_offsets() {
        let offsets = checkpoint_offsets(1000.0, &[0.0, 0.05, 0.33, 0.66, 1.0]);
        assert_eq!(offsets, vec![0.0, 50.0, 330.0, 660.0, 1000.0]);
    }

    #[test]
    fn test_checkpoint_offsets_clamped() {
        let offsets = checkpoint_offsets(200.0, &[1.0]);
        assert_eq!(offsets, vec![200.0]);
    }

    #[test]
    fn test_locate_script_uses_threshold() {
        let script = locate_script(300);
        assert!(script.contains("e.clientHeight > 300"));
        assert!(script.contains(CONTAINER_MARKER));
    }

    #[tokio::test]
    async fn test_scrolls_element_through_checkpoints() {
        let page = ProbePage::new(json!({"kind": "element", "scrollHeight": 2000.0}));
        let outcome = simulator().scroll_to_end_and_back(&page).await.unwrap();

        assert_eq!(
            outcome,
            ScrollOutcome::Scrolled {
                container: ScrollContainer::Element,
                scroll_height: 2000.0
            }
        );

        let scripts = page.scripts();
        // locate + five checkpoints + return to top
        assert_eq!(scripts.len(), 7);
        assert!(scripts[1].contains("top: 0,"));
        assert!(scripts[2].contains("top: 100,"));
        assert!(scripts[5].contains("top: 2000,"));
        assert!(scripts[6].contains("top: 0,"));
        assert!(scripts[1..].iter().all(|s| s.contains(CONTAINER_MARKER)));
    }

    #[tokio::test]
    async fn test_falls_back_to_document() {
        let page = ProbePage::new(json!({"kind": "document", "scrollHeight": 800.0}));
        let outcome = simulator().scroll_to_end_and_back(&page).await.unwrap();

        assert!(matches!(
            outcome,
            ScrollOutcome::Scrolled {
                container: ScrollContainer::Document,
                ..
            }
        ));
        assert!(page.scripts()[1].contains("window.scrollTo"));
    }

    #[tokio::test]
    async fn test_no_container_returns_without_error() {
        let page = ProbePage::new(Value::Null);
        let outcome = simulator().scroll_to_end_and_back(&page).await.unwrap();
        assert_eq!(outcome, ScrollOutcome::NoContainer);
        assert_eq!(page.scripts().len(), 1);
    }

    #[tokio::test]
    async fn test_injection_failure_propagates() {
        let result = simulator().scroll_to_end_and_back(&BrokenPage).await;
        assert!(matches!(result, Err(BrowserError::ScriptError(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_pacing_totals() {
        let page = ProbePage::new(json!({"kind": "element", "scrollHeight": 1000.0}));
        let sim = ScrollSimulator::new(ScrollConfig::default(), TimingPolicy::default());

        let started = tokio::time::Instant::now();
        sim.scroll_to_end_and_back(&page).await.unwrap();
        let elapsed = started.elapsed();

        // five steps of 800..=1200ms, then 1500ms at the bottom and 1000ms at the top
        assert!(elapsed >= Duration::from_millis(5 * 800 + 1500 + 1000));
        assert!(elapsed <= Duration::from_millis(5 * 1200 + 1500 + 1000 + 50));
    }
}
