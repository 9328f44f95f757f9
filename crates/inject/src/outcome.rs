use chatmux_core::{Mode, Provider};
use serde_json::json;
use std::fmt;

/// A non-fatal shortfall during injection. Always reported, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoftDegradation {
    ModeUnsupported { provider: Provider, mode: Mode },
    TriggerNotFound { provider: Provider, mode: Mode },
    TriggerFailed { provider: Provider, mode: Mode, error: String },
    ToggleNotFound { provider: Provider, mode: Mode },
    ToggleLookupFailed { provider: Provider, mode: Mode, error: String },
    ToggleUnverified { provider: Provider, mode: Mode, attempts: u32 },
    ContinuingWithout { provider: Provider, mode: Mode },
    NotReady { provider: Provider, checks: u32 },
    SendFailed { provider: Provider, error: String },
}

impl fmt::Display for SoftDegradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModeUnsupported { provider, mode } => {
                write!(f, "{}: {} is not supported; continuing without it", provider, mode)
            }
            Self::TriggerNotFound { provider, mode } => {
                write!(f, "{}: {} menu trigger not found", provider, mode)
            }
            Self::TriggerFailed { provider, mode, error } => {
                write!(f, "{}: {} menu could not be opened: {}", provider, mode, error)
            }
            Self::ToggleNotFound { provider, mode } => {
                write!(f, "{}: {} toggle not found", provider, mode)
            }
            Self::ToggleLookupFailed { provider, mode, error } => {
                write!(f, "{}: {} toggle lookup failed: {}", provider, mode, error)
            }
            Self::ToggleUnverified { provider, mode, attempts } => write!(
                f,
                "{}: {} toggle could not be verified after {} attempts",
                provider, mode, attempts
            ),
            Self::ContinuingWithout { provider, mode } => {
                write!(f, "{}: {} not enabled; continuing without it", provider, mode)
            }
            Self::NotReady { provider, checks } => write!(
                f,
                "{}: send control not ready after {} checks; sending anyway",
                provider, checks
            ),
            Self::SendFailed { provider, error } => {
                write!(f, "{}: send action failed: {}", provider, error)
            }
        }
    }
}

/// Result of one `submit`/`followup` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectOutcome {
    /// False only when the text was inserted but no send action went through.
    pub ok: bool,
    /// Ordered caveats.
    pub warnings: Vec<String>,
    /// Label of the composer strategy that matched.
    pub composer_strategy: &'static str,
}

impl InjectOutcome {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "ok": self.ok,
            "warnings": self.warnings,
            "composer": self.composer_strategy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_texts() {
        let w = SoftDegradation::ContinuingWithout {
            provider: Provider::ChatGpt,
            mode: Mode::Incognito,
        };
        assert_eq!(w.to_string(), "chatgpt: incognito not enabled; continuing without it");
        let w = SoftDegradation::NotReady {
            provider: Provider::Claude,
            checks: 20,
        };
        assert_eq!(
            w.to_string(),
            "claude: send control not ready after 20 checks; sending anyway"
        );
    }

    #[test]
    fn test_outcome_json() {
        let out = InjectOutcome {
            ok: true,
            warnings: vec!["a".into()],
            composer_strategy: "legacy",
        };
        let v = out.to_json();
        assert_eq!(v["ok"], true);
        assert_eq!(v["warnings"][0], "a");
        assert_eq!(v["composer"], "legacy");
    }
}
