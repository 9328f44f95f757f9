//! Enabling an optional mode (research, incognito) on a loaded page.

use chatmux_core::config::InjectConfig;
use chatmux_core::{Error, Provider, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::chain::{resolve_chain, resolve_with_budget, Budget, Lookup};
use crate::dom::{Key, PageDom};
use crate::outcome::SoftDegradation;
use crate::providers::{ToggleSpec, Verify};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToggleReport {
    pub enabled: bool,
    /// Toggle clicks issued. Zero when the mode was already on.
    pub clicked: u32,
    pub warnings: Vec<SoftDegradation>,
}

/// Read back the mode state. Lookup failures count as "off".
async fn is_on(dom: &dyn PageDom, verify: &Verify) -> bool {
    match verify {
        Verify::Present(chain) => resolve_chain(dom, chain).await.is_found(),
        Verify::Attribute { chain, name, value } => {
            let Some(found) = resolve_chain(dom, chain).await.found() else {
                return false;
            };
            match dom.attribute(&found.element, name).await {
                Ok(Some(v)) => v == *value,
                Ok(None) => false,
                Err(e) => {
                    debug!(attribute = *name, error = %e, "Verify attribute read failed");
                    false
                }
            }
        }
    }
}

fn check(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled("mode toggle".into()));
    }
    Ok(())
}

/// Turn `spec.mode` on, or report why it could not be.
///
/// A toggle already verified on is never clicked. Each attempt opens the
/// trigger menu (when one is configured), clicks the toggle, waits the settle
/// delay and verifies. Only cancellation is returned as an error.
pub async fn enable_mode(
    dom: &dyn PageDom,
    provider: Provider,
    spec: &ToggleSpec,
    config: &InjectConfig,
    cancel: &CancellationToken,
) -> Result<ToggleReport> {
    let mode = spec.mode;
    let mut report = ToggleReport::default();

    check(cancel)?;
    if is_on(dom, &spec.verify).await {
        debug!(%provider, %mode, "Mode already on");
        report.enabled = true;
        return Ok(report);
    }

    let menu_budget = Budget::new(config.menu_attempts, config.menu_interval_ms);
    let settle = Duration::from_millis(config.toggle_settle_ms);
    let attempts = config.toggle_attempts.max(1);
    let mut exhausted = true;
    let mut last_click_error = None;

    for attempt in 1..=attempts {
        check(cancel)?;

        let menu_opened = if spec.trigger.is_empty() {
            false
        } else {
            match resolve_with_budget(dom, spec.trigger, menu_budget, cancel).await? {
                Lookup::Found(trigger) => {
                    if let Err(e) = dom.click(&trigger.element).await {
                        debug!(%provider, %mode, attempt, error = %e, "Trigger click failed");
                        if attempt == attempts {
                            report.warnings.push(SoftDegradation::TriggerFailed {
                                provider,
                                mode,
                                error: e.to_string(),
                            });
                            exhausted = false;
                        }
                        continue;
                    }
                    true
                }
                Lookup::NotFound => {
                    report
                        .warnings
                        .push(SoftDegradation::TriggerNotFound { provider, mode });
                    exhausted = false;
                    break;
                }
                Lookup::Transient(error) => {
                    report.warnings.push(SoftDegradation::TriggerFailed {
                        provider,
                        mode,
                        error,
                    });
                    exhausted = false;
                    break;
                }
            }
        };

        let toggle = match resolve_with_budget(dom, spec.toggle, menu_budget, cancel).await? {
            Lookup::Found(toggle) => toggle,
            missing => {
                report.warnings.push(match missing {
                    Lookup::Transient(error) => SoftDegradation::ToggleLookupFailed {
                        provider,
                        mode,
                        error,
                    },
                    _ => SoftDegradation::ToggleNotFound { provider, mode },
                });
                if menu_opened {
                    if let Err(e) = dom.press_key(None, Key::Escape).await {
                        debug!(%provider, %mode, error = %e, "Menu dismiss failed");
                    }
                }
                exhausted = false;
                break;
            }
        };

        match dom.click(&toggle.element).await {
            Ok(()) => report.clicked += 1,
            Err(e) => {
                debug!(%provider, %mode, attempt, error = %e, "Toggle click failed");
                last_click_error = Some(e.to_string());
                continue;
            }
        }

        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
        check(cancel)?;

        if is_on(dom, &spec.verify).await {
            debug!(%provider, %mode, attempt, strategy = toggle.label, "Mode enabled");
            report.enabled = true;
            return Ok(report);
        }
        debug!(%provider, %mode, attempt, "Toggle not verified yet");
    }

    if exhausted {
        if report.clicked == 0 {
            if let Some(error) = last_click_error {
                report.warnings.push(SoftDegradation::ToggleLookupFailed {
                    provider,
                    mode,
                    error,
                });
            }
        }
        report.warnings.push(SoftDegradation::ToggleUnverified {
            provider,
            mode,
            attempts,
        });
    }
    report
        .warnings
        .push(SoftDegradation::ContinuingWithout { provider, mode });
    Ok(report)
}
