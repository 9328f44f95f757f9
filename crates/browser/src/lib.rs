//! Browser side of chatmux: one CDP connection, the tabs it tracks, their
//! windows and tab groups.

pub mod cdp;
pub mod discovery;
pub mod groups;
pub mod layout;
pub mod manager;
pub mod page;

#[cfg(test)]
pub(crate) mod fake;

pub use cdp::{CdpClient, Transport};
pub use discovery::{discover, ensure_browser, find_browser_binary};
pub use groups::{ExtensionTabGroups, TabGroupBackend};
pub use layout::{arrange, plan_layout, toggle_group, MAX_TILES};
pub use manager::{BrowserSessionManager, OpenedTab, TargetInfo};
pub use page::PageHandle;
