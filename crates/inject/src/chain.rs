//! Ordered locator chains and bounded retry around them.

use chatmux_core::{Error, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::dom::{ElementHandle, Locator, PageDom};

/// One step in a locator chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strategy {
    /// Short name used in logs and outcomes, e.g. `"prosemirror"`.
    pub label: &'static str,
    pub locator: Locator,
}

impl Strategy {
    pub const fn css(label: &'static str, css: &'static str) -> Self {
        Self {
            label,
            locator: Locator::Css(css),
        }
    }

    pub const fn text(label: &'static str, css: &'static str, text: &'static str) -> Self {
        Self {
            label,
            locator: Locator::CssText { css, text },
        }
    }
}

/// The element a chain settled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub element: ElementHandle,
    pub label: &'static str,
    /// Position of the winning strategy in its chain.
    pub index: usize,
}

/// Result of looking something up in a page that may still be rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    /// Every strategy answered, none matched.
    NotFound,
    /// Nothing matched and at least one strategy errored; carries the last error.
    Transient(String),
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

/// Retry budget for a polling point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub attempts: u32,
    pub interval: Duration,
}

impl Budget {
    pub fn new(attempts: u32, interval_ms: u64) -> Self {
        Self {
            attempts: attempts.max(1),
            interval: Duration::from_millis(interval_ms),
        }
    }

    pub fn once() -> Self {
        Self::new(1, 0)
    }
}

/// Try each strategy in order; the first visible, attached match wins.
pub async fn resolve_chain(dom: &dyn PageDom, chain: &[Strategy]) -> Lookup<Resolved> {
    let mut last_error = None;
    for (index, strategy) in chain.iter().enumerate() {
        match dom.query(&strategy.locator).await {
            Ok(Some(element)) => {
                return Lookup::Found(Resolved {
                    element,
                    label: strategy.label,
                    index,
                });
            }
            Ok(None) => {}
            Err(e) => {
                debug!(strategy = strategy.label, error = %e, "Locator query failed");
                last_error = Some(e.to_string());
            }
        }
    }
    match last_error {
        Some(e) => Lookup::Transient(e),
        None => Lookup::NotFound,
    }
}

/// Re-run the whole chain until it matches or the budget is spent.
///
/// Cancellation is checked between attempts; an in-flight query always
/// completes first.
pub async fn resolve_with_budget(
    dom: &dyn PageDom,
    chain: &[Strategy],
    budget: Budget,
    cancel: &CancellationToken,
) -> Result<Lookup<Resolved>> {
    let mut last = Lookup::NotFound;
    for attempt in 1..=budget.attempts {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled("locator polling".into()));
        }
        last = resolve_chain(dom, chain).await;
        if last.is_found() {
            return Ok(last);
        }
        if attempt < budget.attempts {
            tokio::time::sleep(budget.interval).await;
        }
    }
    Ok(last)
}
