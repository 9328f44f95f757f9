pub mod config;
pub mod error;
pub mod naming;
pub mod paths;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use naming::{sanitize_title, TitleNamer};
pub use paths::Paths;
pub use types::{Bounds, GroupColor, GroupId, Mode, Provider, TargetId, WindowId};
