use chatmux_core::{
    Bounds, Config, Error, GroupColor, GroupId, Paths, Provider, Result, TargetId, WindowId,
};
use chatmux_storage::{Group, StateStore, TabRef};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cdp::{CdpClient, Transport};
use crate::discovery::ensure_browser;
use crate::groups::{ExtensionTabGroups, TabGroupBackend};
use crate::page::PageHandle;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    pub target_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
}

/// A page returned by [`BrowserSessionManager::open_tab`].
#[derive(Debug, Clone)]
pub struct OpenedTab {
    pub page: PageHandle,
    pub window_id: Option<WindowId>,
    /// True when an existing registered tab was reattached.
    pub reused: bool,
}

const TITLE_GUARD_JS: &str = r#"((title) => {
  window.__chatmuxTitle = title;
  document.title = title;
  if (!window.__chatmuxTitleGuard) {
    window.__chatmuxTitleGuard = new MutationObserver(() => {
      if (document.title !== window.__chatmuxTitle) document.title = window.__chatmuxTitle;
    });
    window.__chatmuxTitleGuard.observe(document.head || document.documentElement, {
      subtree: true, childList: true, characterData: true,
    });
  }
  return true;
})"#;

/// Owns the browser connection and keeps the registry in step with it.
///
/// The registry is read before and written after every state-changing browser
/// call. Page attachments are cached per target and re-established when the
/// browser reports the session gone.
pub struct BrowserSessionManager {
    transport: Arc<dyn Transport>,
    groups: Arc<dyn TabGroupBackend>,
    store: StateStore,
    config: Config,
    attached: Mutex<HashMap<TargetId, String>>,
}

impl BrowserSessionManager {
    /// Discover or launch the browser, then connect to it.
    pub async fn connect(config: Config, paths: &Paths) -> Result<Self> {
        let profile_dir = config
            .browser
            .user_data_dir
            .as_ref()
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|| paths.profile_dir());
        let ws_url = ensure_browser(&config.browser, &profile_dir).await?;
        let timeout = Duration::from_secs(config.browser.command_timeout_secs);
        let client = CdpClient::connect(&ws_url, timeout).await?;
        info!(ws_url = %ws_url, "Connected to browser");
        Ok(Self::with_transport(
            Arc::new(client),
            StateStore::open(paths.state_file()),
            config,
        ))
    }

    pub fn with_transport(transport: Arc<dyn Transport>, store: StateStore, config: Config) -> Self {
        let groups = Arc::new(ExtensionTabGroups::new(transport.clone()));
        Self {
            transport,
            groups,
            store,
            config,
            attached: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_groups(mut self, groups: Arc<dyn TabGroupBackend>) -> Self {
        self.groups = groups;
        self
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn targets(&self) -> Result<Vec<TargetInfo>> {
        let result = self.transport.call(None, "Target.getTargets", json!({})).await?;
        let infos = result.get("targetInfos").cloned().unwrap_or(Value::Array(vec![]));
        Ok(serde_json::from_value(infos)?)
    }

    async fn target_exists(&self, target_id: &TargetId) -> Result<bool> {
        Ok(self
            .targets()
            .await?
            .iter()
            .any(|t| t.target_id == target_id.as_str()))
    }

    async fn attach(&self, target_id: &TargetId) -> Result<PageHandle> {
        let mut attached = self.attached.lock().await;
        if let Some(session) = attached.get(target_id) {
            return Ok(PageHandle::new(
                target_id.clone(),
                session.clone(),
                self.transport.clone(),
            ));
        }
        let result = self
            .transport
            .call(
                None,
                "Target.attachToTarget",
                json!({ "targetId": target_id.as_str(), "flatten": true }),
            )
            .await?;
        let session = result["sessionId"]
            .as_str()
            .ok_or_else(|| Error::Cdp(format!("attach to {} returned no session", target_id)))?
            .to_string();
        debug!(target = %target_id, session = %session, "Attached to target");
        attached.insert(target_id.clone(), session.clone());
        Ok(PageHandle::new(target_id.clone(), session, self.transport.clone()))
    }

    /// Attached handle that has answered a probe, reattaching once if the
    /// cached session went stale.
    async fn live_page(&self, target_id: &TargetId) -> Result<PageHandle> {
        let page = self.attach(target_id).await?;
        match page.evaluate("1").await {
            Ok(_) => Ok(page),
            Err(e) if e.is_stale_target() => {
                debug!(target = %target_id, "Stale page session, reattaching");
                self.attached.lock().await.remove(target_id);
                let page = self.attach(target_id).await?;
                page.evaluate("1").await?;
                Ok(page)
            }
            Err(e) => Err(e),
        }
    }

    async fn wait_ready(&self, page: &PageHandle) {
        let attempts = self.config.browser.ready_attempts.max(1);
        let interval = Duration::from_millis(self.config.browser.ready_interval_ms);
        for attempt in 1..=attempts {
            match page.evaluate("document.readyState").await {
                Ok(v) if v == "complete" || v == "interactive" => return,
                Ok(_) => {}
                Err(e) => debug!(target = %page.target_id(), error = %e, "readyState probe failed"),
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }
        warn!(target = %page.target_id(), attempts, "Page not ready; continuing");
    }

    /// Page for `(slug, provider)`: the registered tab when the browser still
    /// has it, otherwise a new window registered under that slot.
    pub async fn open_tab(&self, provider: Provider, slug: &str) -> Result<OpenedTab> {
        if let Some(tab) = self
            .store
            .get_session(slug)
            .and_then(|s| s.tabs.get(&provider).cloned())
        {
            if self.target_exists(&tab.target_id).await? {
                let page = self.live_page(&tab.target_id).await?;
                info!(slug, %provider, target = %tab.target_id, "Reusing tab");
                return Ok(OpenedTab {
                    page,
                    window_id: tab.window_id,
                    reused: true,
                });
            }
            warn!(slug, %provider, target = %tab.target_id, "Registered tab is gone; opening a new one");
            self.attached.lock().await.remove(&tab.target_id);
            self.store.remove_tab(&tab.target_id)?;
        }

        let created = self
            .transport
            .call(
                None,
                "Target.createTarget",
                json!({ "url": provider.base_url(), "newWindow": true }),
            )
            .await?;
        let target_id = created["targetId"]
            .as_str()
            .map(TargetId::new)
            .ok_or_else(|| Error::Cdp("Target.createTarget returned no targetId".into()))?;

        let page = self.attach(&target_id).await?;
        self.wait_ready(&page).await;
        let window_id = match self.window_bounds(&target_id).await {
            Ok((window, _)) => Some(window),
            Err(e) => {
                warn!(target = %target_id, error = %e, "Window lookup failed");
                None
            }
        };
        if let Err(e) = self
            .store
            .register_tab(slug, provider, target_id.clone(), window_id)
        {
            warn!(slug, %provider, target = %target_id, error = %e, "Could not register tab; closing it");
            self.attached.lock().await.remove(&target_id);
            if let Err(close_err) = self
                .transport
                .call(None, "Target.closeTarget", json!({ "targetId": target_id.as_str() }))
                .await
            {
                debug!(target = %target_id, error = %close_err, "Close after failed register failed");
            }
            return Err(e);
        }
        info!(slug, %provider, target = %target_id, "Opened tab");
        Ok(OpenedTab {
            page,
            window_id,
            reused: false,
        })
    }

    /// Live handle for a registered target.
    pub async fn page(&self, target_id: &TargetId) -> Result<PageHandle> {
        if self.store.find_by_target(target_id).is_none() {
            return Err(Error::NotFound(format!("target {} is not registered", target_id)));
        }
        if !self.target_exists(target_id).await? {
            return Err(Error::NotFound(format!("target {} no longer exists", target_id)));
        }
        self.live_page(target_id).await
    }

    /// Live handle for `(slug, provider)` without creating anything.
    pub async fn find_page(&self, slug: &str, provider: Provider) -> Result<PageHandle> {
        let session = self
            .store
            .get_session(slug)
            .ok_or_else(|| Error::NotFound(format!("session '{}'", slug)))?;
        let tab = session
            .tabs
            .get(&provider)
            .ok_or_else(|| Error::NotFound(format!("{} tab in session '{}'", provider, slug)))?;
        self.page(&tab.target_id).await
    }

    /// Close the tab if the browser lets us; the registry row goes regardless.
    pub async fn close_tab(&self, target_id: &TargetId) -> Result<Option<TabRef>> {
        if let Err(e) = self
            .transport
            .call(None, "Target.closeTarget", json!({ "targetId": target_id.as_str() }))
            .await
        {
            warn!(target = %target_id, error = %e, "Close failed; dropping registry entry anyway");
        }
        self.attached.lock().await.remove(target_id);
        self.store.remove_tab(target_id)
    }

    /// Close every tab of `slug` and forget the session.
    pub async fn stop_session(&self, slug: &str) -> Result<usize> {
        let session = self
            .store
            .get_session(slug)
            .ok_or_else(|| Error::NotFound(format!("session '{}'", slug)))?;
        let count = session.tabs.len();
        for tab in session.tabs.values() {
            self.close_tab(&tab.target_id).await?;
        }
        self.store.remove_session(slug)?;
        info!(slug, tabs = count, "Session stopped");
        Ok(count)
    }

    /// Best-effort `document.title` write that survives the site resetting it.
    pub async fn set_title(&self, page: &PageHandle, title: &str) {
        let script = format!(
            "{}({})",
            TITLE_GUARD_JS,
            Value::String(title.to_string())
        );
        if let Err(e) = page.evaluate(&script).await {
            warn!(target = %page.target_id(), error = %e, "Could not set page title");
        }
    }

    /// Visible conversation text, at most `max_chars` characters.
    pub async fn transcript(&self, page: &PageHandle, max_chars: usize) -> Result<String> {
        let text = page
            .evaluate("(document.querySelector('main') || document.body).innerText")
            .await?;
        let text = text.as_str().unwrap_or_default();
        Ok(chatmux_core::naming::excerpt(text, max_chars).to_string())
    }

    pub async fn window_bounds(&self, target_id: &TargetId) -> Result<(WindowId, Bounds)> {
        let result = self
            .transport
            .call(
                None,
                "Browser.getWindowForTarget",
                json!({ "targetId": target_id.as_str() }),
            )
            .await?;
        let window = result["windowId"]
            .as_i64()
            .map(WindowId)
            .ok_or_else(|| Error::Cdp(format!("no window for target {}", target_id)))?;
        let bounds = serde_json::from_value(result["bounds"].clone()).unwrap_or_default();
        Ok((window, bounds))
    }

    pub async fn set_window_bounds(&self, window_id: WindowId, bounds: Bounds) -> Result<()> {
        // bounds are rejected while a window is maximized or minimized
        self.transport
            .call(
                None,
                "Browser.setWindowBounds",
                json!({ "windowId": window_id.0, "bounds": { "windowState": "normal" } }),
            )
            .await?;
        self.transport
            .call(
                None,
                "Browser.setWindowBounds",
                json!({
                    "windowId": window_id.0,
                    "bounds": {
                        "left": bounds.left,
                        "top": bounds.top,
                        "width": bounds.width,
                        "height": bounds.height,
                    },
                }),
            )
            .await?;
        debug!(window = %window_id, ?bounds, "Window placed");
        Ok(())
    }

    /// Usable screen area as the page sees it.
    pub async fn screen_work_area(&self, page: &PageHandle) -> Result<Bounds> {
        let v = page
            .evaluate(
                "({ left: screen.availLeft || 0, top: screen.availTop || 0, \
                 width: screen.availWidth, height: screen.availHeight })",
            )
            .await?;
        Ok(serde_json::from_value(v)?)
    }

    async fn refresh_window(&self, target_id: &TargetId) -> Result<WindowId> {
        let (window, _) = self.window_bounds(target_id).await?;
        self.store.update_window(target_id, window)?;
        Ok(window)
    }

    fn registered(&self, target_id: &TargetId) -> Result<TabRef> {
        self.store
            .find_by_target(target_id)
            .ok_or_else(|| Error::NotFound(format!("target {} is not registered", target_id)))
    }

    /// Add the tab to the group called `name`, creating the group once.
    pub async fn move_to_group(
        &self,
        target_id: &TargetId,
        name: &str,
        color: GroupColor,
    ) -> Result<GroupId> {
        self.registered(target_id)?;
        let existing = self
            .store
            .load()
            .find_group_by_name(name)
            .map(|g| g.group_id);
        self.join_group(target_id, existing, None, name, color).await
    }

    /// Add the tab to the group owned by session `slug`, shown as `title`.
    /// Sessions never share a group, whatever their titles.
    pub async fn gather_into_session_group(
        &self,
        target_id: &TargetId,
        slug: &str,
        title: &str,
        color: GroupColor,
    ) -> Result<GroupId> {
        self.registered(target_id)?;
        let existing = self
            .store
            .load()
            .find_group_by_owner(slug)
            .map(|g| g.group_id);
        self.join_group(target_id, existing, Some(slug), title, color)
            .await
    }

    async fn join_group(
        &self,
        target_id: &TargetId,
        existing: Option<GroupId>,
        owner: Option<&str>,
        title: &str,
        color: GroupColor,
    ) -> Result<GroupId> {
        let page = self.live_page(target_id).await?;
        let group_id = self.groups.group(&page, existing, title, color).await?;
        if let Some(stale) = existing.filter(|old| *old != group_id) {
            debug!(title, group = %stale, "Browser group gone, replacing row");
            self.store.remove_group(stale)?;
        }
        self.store.upsert_group(Group {
            group_id,
            name: title.to_string(),
            color,
            owner: owner.map(str::to_string),
        })?;
        self.store.assign_group(target_id, Some(group_id))?;
        if let Err(e) = self.refresh_window(target_id).await {
            warn!(target = %target_id, error = %e, "Window refresh after grouping failed");
        }
        info!(target = %target_id, group = %group_id, title, "Tab grouped");
        Ok(group_id)
    }

    /// Take the tab out of its group. The tab stays open where it is and the
    /// group row is kept.
    pub async fn remove_from_group(&self, target_id: &TargetId) -> Result<()> {
        self.registered(target_id)?;
        let page = self.live_page(target_id).await?;
        self.groups.ungroup(&page).await?;
        self.store.assign_group(target_id, None)?;
        info!(target = %target_id, "Tab ungrouped");
        Ok(())
    }

    /// Give the tab its own window and record where it went.
    pub async fn split_to_window(&self, target_id: &TargetId) -> Result<WindowId> {
        self.registered(target_id)?;
        let page = self.live_page(target_id).await?;
        self.groups.split_to_window(&page).await?;
        self.refresh_window(target_id).await
    }
}
