//! Next-page detection and verified page turns.
//!
//! A click is never trusted on its own: the page's location is read before
//! and after activation, and only a changed location counts as a page turn.

use crate::error::Result;
use crate::page::{evaluate_as, PageHandle};
use scrapo_core::TimingPolicy;
use serde::Deserialize;

const NEXT_MARKER: &str = "data-scrapo-next";

/// Lookup strategies for the next-page control, tried in order.
///
/// This is a fallback chain, not a ranking: the first strategy that yields an
/// enabled, rendered element wins.
pub const NEXT_PAGE_SELECTORS: &[&str] = &[
    r#"button[aria-label="Next"]"#,
    r#"button[aria-label="Go to next page"]"#,
    r#"button[data-test-pagination-page-btn="next"]"#,
    ".artdeco-pagination__button--next",
    "button.artdeco-pagination__button--next",
    ".artdeco-pagination__indicator--number + button",
    r#"button[data-control-name="page_next"]"#,
    r#"button:has([data-test-icon="chevron-right-small"])"#,
    ".pv-s-list-paging__next-text",
    ".artdeco-pagination .artdeco-pagination__pages li:last-child button",
    r#"button[data-test-icon="chevron-right"]"#,
    ".ember-view .artdeco-pagination__button--next",
];

/// A pagination-looking element that was not usable as the next control.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearMiss {
    pub tag: String,
    #[serde(default)]
    pub class_name: String,
    pub aria_label: Option<String>,
    pub disabled: bool,
    pub visible: bool,
}

#[derive(Debug, Deserialize)]
struct ControlProbe {
    found: bool,
    selector: Option<String>,
    #[serde(default)]
    candidates: Vec<NearMiss>,
}

/// What happened when moving to the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The location changed after activation.
    Advanced { from: String, to: String },
    /// The control was activated but the location stayed the same.
    Unchanged { location: String },
    /// No strategy produced a usable control.
    NoControl { near_misses: Vec<NearMiss> },
    /// The tagged control disappeared before it could be activated.
    ControlLost,
    /// The script host failed while navigating.
    HostFailure(String),
}

impl NavigationOutcome {
    /// Whether a page transition was verified.
    #[must_use]
    pub fn advanced(&self) -> bool {
        matches!(self, Self::Advanced { .. })
    }
}

/// Finds and activates the next-page control.
#[derive(Debug, Clone)]
pub struct PaginationNavigator {
    selectors: Vec<String>,
    timing: TimingPolicy,
}

impl PaginationNavigator {
    /// Navigator using [`NEXT_PAGE_SELECTORS`].
    #[must_use]
    pub fn new(timing: TimingPolicy) -> Self {
        Self::with_selectors(
            NEXT_PAGE_SELECTORS.iter().map(ToString::to_string).collect(),
            timing,
        )
    }

    /// Navigator using a custom strategy chain.
    #[must_use]
    pub fn with_selectors(selectors: Vec<String>, timing: TimingPolicy) -> Self {
        Self { selectors, timing }
    }

    /// Move to the next page. Returns `true` only for a verified page turn.
    pub async fn go_next(&self, page: &dyn PageHandle) -> bool {
        self.navigate(page).await.advanced()
    }

    /// Move to the next page and report how it went. Never fails.
    pub async fn navigate(&self, page: &dyn PageHandle) -> NavigationOutcome {
        match self.try_navigate(page).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Error navigating to next page: {}", e);
                NavigationOutcome::HostFailure(e.to_string())
            }
        }
    }

    async fn try_navigate(&self, page: &dyn PageHandle) -> Result<NavigationOutcome> {
        let probe: ControlProbe = evaluate_as(page, &self.locate_script()).await?;

        if !probe.found {
            tracing::info!(
                near_misses = probe.candidates.len(),
                "No usable next-page control found"
            );
            for (index, candidate) in probe.candidates.iter().enumerate() {
                tracing::debug!(
                    index,
                    tag = %candidate.tag,
                    class = %candidate.class_name,
                    aria_label = ?candidate.aria_label,
                    disabled = candidate.disabled,
                    visible = candidate.visible,
                    "Pagination near miss"
                );
            }
            return Ok(NavigationOutcome::NoControl {
                near_misses: probe.candidates,
            });
        }

        tracing::debug!(selector = ?probe.selector, "Next-page control found");

        page.evaluate(&reveal_script()).await?;
        tokio::time::sleep(self.timing.pre_click_pause()).await;

        let before = page.location().await?;

        let activation = page.evaluate(&activate_script()).await?;
        match activation.as_str() {
            Some("click") => {}
            Some("dispatch") => tracing::debug!("Native click failed, dispatched click event"),
            _ => return Ok(NavigationOutcome::ControlLost),
        }

        tokio::time::sleep(self.timing.post_click_pause()).await;

        let after = page.location().await?;
        if after == before {
            tracing::info!(location = %before, "Page did not change after activating next");
            Ok(NavigationOutcome::Unchanged { location: before })
        } else {
            tracing::info!(from = %before, to = %after, "Moved to next page");
            Ok(NavigationOutcome::Advanced {
                from: before,
                to: after,
            })
        }
    }

    fn locate_script(&self) -> String {
        // serde_json escapes the selectors into a valid JS array literal
        let selectors = serde_json::to_string(&self.selectors).unwrap_or_else(|_| "[]".into());
        format!(
            r#"(() => {{
    const marker = '{NEXT_MARKER}';
    document.querySelectorAll('[' + marker + ']').forEach(el => el.removeAttribute(marker));
    const selectors = {selectors};
    const usable = (el) => {{
        if (!el || el.disabled || el.hasAttribute('disabled') || el.classList.contains('disabled')) {{
            return false;
        }}
        const rect = el.getBoundingClientRect();
        return el.offsetParent !== null && rect.width > 0 && rect.height > 0;
    }};
    for (const selector of selectors) {{
        let matches;
        try {{
            matches = document.querySelectorAll(selector);
        }} catch (e) {{
            continue;
        }}
        for (const el of matches) {{
            if (usable(el)) {{
                el.setAttribute(marker, '1');
                return {{ found: true, selector, candidates: [] }};
            }}
        }}
    }}
    const near = document.querySelectorAll(
        '[class*="pagination"], [data-test*="pagination"], button[aria-label*="Next"], button[aria-label*="next"]'
    );
    return {{
        found: false,
        selector: null,
        candidates: Array.from(near).slice(0, 25).map(el => ({{
            tag: el.tagName,
            className: typeof el.className === 'string' ? el.className : '',
            ariaLabel: el.getAttribute('aria-label'),
            disabled: !!el.disabled,
            visible: el.offsetParent !== null
        }}))
    }};
}})()"#
        )
    }
}

fn reveal_script() -> String {
    format!(
        r"(() => {{
    const el = document.querySelector('[{NEXT_MARKER}]');
    if (el) el.scrollIntoView({{ behavior: 'smooth', block: 'center' }});
    return !!el;
}})()"
    )
}

fn activate_script() -> String {
    format!(
        r"(() => {{
    const el = document.querySelector('[{NEXT_MARKER}]');
    if (!el) return 'missing';
    try {{
        el.click();
        return 'click';
    }} catch (e) {{
        el.dispatchEvent(new MouseEvent('click', {{ view: window, bubbles: true, cancelable: true }}));
        return 'dispatch';
    }}
}})()"
    )
}
