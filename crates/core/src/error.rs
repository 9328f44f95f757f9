use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No debuggable browser could be reached or launched.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Every composer strategy was exhausted for one submit/followup call.
    #[error("Composer not found for {provider}: {detail}")]
    ComposerNotFound { provider: String, detail: String },

    /// The browser runtime lacks a protocol feature (e.g. tab groups).
    #[error("Capability unsupported: {0}")]
    CapabilityUnsupported(String),

    #[error("CDP error: {0}")]
    Cdp(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Naming error: {0}")]
    Naming(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True when a CDP reply says the flattened session or target is gone,
    /// meaning the cached page attachment must be re-established.
    pub fn is_stale_target(&self) -> bool {
        match self {
            Error::Cdp(msg) => {
                msg.contains("No session with given id")
                    || msg.contains("Session with given id not found")
                    || msg.contains("No target with given id")
                    || msg.contains("Target closed")
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
