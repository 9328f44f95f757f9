use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::Result;
use crate::paths::Paths;
use crate::types::{Bounds, GroupColor};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Launch a browser when none is listening on `host:port`.
    #[serde(default = "default_launch")]
    pub launch: bool,
    /// Explicit browser binary; otherwise well-known locations are searched.
    #[serde(default)]
    pub binary: Option<String>,
    /// Overrides `~/.chatmux/profile`.
    #[serde(default)]
    pub user_data_dir: Option<String>,
    #[serde(default = "default_discovery_attempts")]
    pub discovery_attempts: u32,
    #[serde(default = "default_discovery_interval_ms")]
    pub discovery_interval_ms: u64,
    /// Polls of `document.readyState` after opening a new tab.
    #[serde(default = "default_page_ready_attempts")]
    pub ready_attempts: u32,
    #[serde(default = "default_page_ready_interval_ms")]
    pub ready_interval_ms: u64,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9222
}

fn default_launch() -> bool {
    true
}

fn default_discovery_attempts() -> u32 {
    20
}

fn default_discovery_interval_ms() -> u64 {
    250
}

fn default_page_ready_attempts() -> u32 {
    40
}

fn default_page_ready_interval_ms() -> u64 {
    250
}

fn default_command_timeout_secs() -> u64 {
    30
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            launch: default_launch(),
            binary: None,
            user_data_dir: None,
            discovery_attempts: default_discovery_attempts(),
            discovery_interval_ms: default_discovery_interval_ms(),
            ready_attempts: default_page_ready_attempts(),
            ready_interval_ms: default_page_ready_interval_ms(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

/// Polling budgets for the injection engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectConfig {
    #[serde(default = "default_composer_attempts")]
    pub composer_attempts: u32,
    #[serde(default = "default_composer_interval_ms")]
    pub composer_interval_ms: u64,
    #[serde(default = "default_ready_attempts")]
    pub ready_attempts: u32,
    #[serde(default = "default_ready_interval_ms")]
    pub ready_interval_ms: u64,
    #[serde(default = "default_toggle_attempts")]
    pub toggle_attempts: u32,
    #[serde(default = "default_toggle_settle_ms")]
    pub toggle_settle_ms: u64,
    #[serde(default = "default_menu_attempts")]
    pub menu_attempts: u32,
    #[serde(default = "default_menu_interval_ms")]
    pub menu_interval_ms: u64,
}

fn default_composer_attempts() -> u32 {
    10
}

fn default_composer_interval_ms() -> u64 {
    300
}

fn default_ready_attempts() -> u32 {
    20
}

fn default_ready_interval_ms() -> u64 {
    150
}

fn default_toggle_attempts() -> u32 {
    3
}

fn default_toggle_settle_ms() -> u64 {
    400
}

fn default_menu_attempts() -> u32 {
    5
}

fn default_menu_interval_ms() -> u64 {
    200
}

impl Default for InjectConfig {
    fn default() -> Self {
        Self {
            composer_attempts: default_composer_attempts(),
            composer_interval_ms: default_composer_interval_ms(),
            ready_attempts: default_ready_attempts(),
            ready_interval_ms: default_ready_interval_ms(),
            toggle_attempts: default_toggle_attempts(),
            toggle_settle_ms: default_toggle_settle_ms(),
            menu_attempts: default_menu_attempts(),
            menu_interval_ms: default_menu_interval_ms(),
        }
    }
}

impl InjectConfig {
    /// Zero-delay budgets, for driving the engine against in-memory pages.
    pub fn immediate() -> Self {
        Self {
            composer_attempts: 2,
            composer_interval_ms: 0,
            ready_attempts: 3,
            ready_interval_ms: 0,
            toggle_attempts: 3,
            toggle_settle_ms: 0,
            menu_attempts: 2,
            menu_interval_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LayoutConfig {
    /// Screen area to tile into. Read from the page's `screen.avail*` when unset.
    #[serde(default)]
    pub work_area: Option<Bounds>,
    #[serde(default)]
    pub group_color: GroupColor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamingConfig {
    #[serde(default = "default_naming_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_naming_model")]
    pub model: String,
    /// Transcript characters sent to the naming service.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_max_title_len")]
    pub max_title_len: usize,
}

fn default_naming_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_naming_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_chars() -> usize {
    4000
}

fn default_max_title_len() -> usize {
    60
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            api_base: default_naming_api_base(),
            api_key: String::new(),
            model: default_naming_model(),
            max_chars: default_max_chars(),
            max_title_len: default_max_title_len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub inject: InjectConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub naming: NamingConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            debug!(path = %config_path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn discovery_url(&self) -> String {
        format!(
            "http://{}:{}/json/version",
            self.browser.host, self.browser.port
        )
    }
}
