pub mod layout;
pub mod session;

use chatmux_browser::BrowserSessionManager;
use chatmux_core::{Config, Paths};
use chatmux_storage::StateStore;
use tokio_util::sync::CancellationToken;

/// What every command starts from.
pub struct Context {
    pub paths: Paths,
    pub config: Config,
}

impl Context {
    pub fn load() -> anyhow::Result<Self> {
        let paths = Paths::new();
        paths.ensure_dirs()?;
        let config = Config::load_or_default(&paths)?;
        Ok(Self { paths, config })
    }

    pub fn store(&self) -> StateStore {
        StateStore::open(self.paths.state_file())
    }

    pub async fn connect(&self) -> anyhow::Result<BrowserSessionManager> {
        Ok(BrowserSessionManager::connect(self.config.clone(), &self.paths).await?)
    }

    /// Attach only if a browser is already running; never launches.
    pub async fn connect_existing(&self) -> anyhow::Result<BrowserSessionManager> {
        let mut config = self.config.clone();
        config.browser.launch = false;
        config.browser.discovery_attempts = 1;
        Ok(BrowserSessionManager::connect(config, &self.paths).await?)
    }
}

/// Token cancelled on Ctrl-C, for the polling loops of long commands.
pub fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    token
}
