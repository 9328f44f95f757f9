//! Tab groups.
//!
//! CDP has no tab-group domain. [`ExtensionTabGroups`] drives the
//! `chrome.tabGroups` API from inside a companion extension's service worker,
//! attached over the same connection as the pages.

use async_trait::async_trait;
use chatmux_core::{Error, GroupColor, GroupId, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::cdp::Transport;
use crate::page::{evaluate_in, PageHandle};

#[async_trait]
pub trait TabGroupBackend: Send + Sync {
    /// Put the page's tab into `existing` when that group still exists,
    /// otherwise into a new group. Returns the browser-assigned id.
    async fn group(
        &self,
        page: &PageHandle,
        existing: Option<GroupId>,
        name: &str,
        color: GroupColor,
    ) -> Result<GroupId>;

    /// Remove only this tab from whatever group holds it.
    async fn ungroup(&self, page: &PageHandle) -> Result<()>;

    /// Move the tab into a window of its own.
    async fn split_to_window(&self, page: &PageHandle) -> Result<()>;
}

pub struct ExtensionTabGroups {
    transport: Arc<dyn Transport>,
    worker: Mutex<Option<String>>,
}

const MARKER_POLLS: u32 = 10;

impl ExtensionTabGroups {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            worker: Mutex::new(None),
        }
    }

    /// Session on an extension service worker that can see `chrome.tabGroups`.
    async fn worker_session(&self) -> Result<String> {
        let mut cached = self.worker.lock().await;
        if let Some(session) = cached.as_ref() {
            return Ok(session.clone());
        }

        let targets = self
            .transport
            .call(None, "Target.getTargets", json!({}))
            .await?;
        let workers = targets["targetInfos"]
            .as_array()
            .map(|infos| {
                infos
                    .iter()
                    .filter(|t| {
                        t["type"] == "service_worker"
                            && t["url"]
                                .as_str()
                                .map_or(false, |u| u.starts_with("chrome-extension://"))
                    })
                    .filter_map(|t| t["targetId"].as_str().map(|s| s.to_string()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        for target_id in workers {
            let attached = self
                .transport
                .call(
                    None,
                    "Target.attachToTarget",
                    json!({ "targetId": target_id, "flatten": true }),
                )
                .await?;
            let Some(session) = attached["sessionId"].as_str() else {
                continue;
            };
            let capable = evaluate_in(
                self.transport.as_ref(),
                session,
                "typeof chrome !== 'undefined' && !!chrome.tabGroups && !!chrome.tabs",
            )
            .await
            .map(|v| v.as_bool().unwrap_or(false))
            .unwrap_or(false);
            if capable {
                debug!(worker = %target_id, "Tab-group worker attached");
                *cached = Some(session.to_string());
                return Ok(session.to_string());
            }
        }

        Err(Error::CapabilityUnsupported(
            "tab groups need the chatmux companion extension loaded in the browser".into(),
        ))
    }

    async fn run(&self, expression: &str) -> Result<Value> {
        let session = self.worker_session().await?;
        match evaluate_in(self.transport.as_ref(), &session, expression).await {
            Err(e) if e.is_stale_target() => {
                *self.worker.lock().await = None;
                let session = self.worker_session().await?;
                evaluate_in(self.transport.as_ref(), &session, expression).await
            }
            other => other,
        }
    }

    /// The extension's tab id for `page`.
    ///
    /// `chrome.debugger.getTargets()` maps CDP target ids to tab ids directly.
    /// Without the debugger permission the tab is found through a temporary
    /// title, which is put back before returning.
    async fn tab_id(&self, page: &PageHandle) -> Result<i64> {
        self.worker_session().await?;

        let target_js = Value::String(page.target_id().as_str().to_string()).to_string();
        let by_target = format!(
            "(async () => {{ if (!chrome.debugger) return null; \
             const t = (await chrome.debugger.getTargets()).find((t) => t.id === {}); \
             return t && t.tabId !== undefined ? t.tabId : null; }})()",
            target_js
        );
        if let Some(id) = self.run(&by_target).await?.as_i64() {
            return Ok(id);
        }

        debug!(target = %page.target_id(), "No debugger target map, using a title marker");
        let marker = Value::String(format!("chatmux-{}", uuid::Uuid::new_v4())).to_string();
        let previous = page.evaluate(&format!("{}({})", MARKER_SET_JS, marker)).await?;
        let found = self.find_by_title(&marker).await;

        let restore = format!("{}({})", MARKER_RESTORE_JS, previous);
        if let Err(e) = page.evaluate(&restore).await {
            debug!(target = %page.target_id(), error = %e, "Title restore failed");
        }

        found?.ok_or_else(|| {
            Error::NotFound(format!("extension tab for target {}", page.target_id()))
        })
    }

    async fn find_by_title(&self, marker_js: &str) -> Result<Option<i64>> {
        let lookup = format!(
            "(async () => {{ const [t] = await chrome.tabs.query({{ title: {} }}); return t ? t.id : null; }})()",
            marker_js
        );
        for _ in 0..MARKER_POLLS {
            if let Some(id) = self.run(&lookup).await?.as_i64() {
                return Ok(Some(id));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Ok(None)
    }
}

// The title guard installed by `set_title` reverts any other title, so the
// marker goes through the guard's own value too.
const MARKER_SET_JS: &str = r#"((marker) => {
  const previous = { title: document.title, guard: window.__chatmuxTitle ?? null };
  if (previous.guard !== null) window.__chatmuxTitle = marker;
  document.title = marker;
  return previous;
})"#;

const MARKER_RESTORE_JS: &str = r#"((previous) => {
  if (previous && previous.guard !== null) window.__chatmuxTitle = previous.guard;
  if (previous) document.title = previous.title;
  return true;
})"#;

#[async_trait]
impl TabGroupBackend for ExtensionTabGroups {
    async fn group(
        &self,
        page: &PageHandle,
        existing: Option<GroupId>,
        name: &str,
        color: GroupColor,
    ) -> Result<GroupId> {
        let tab = self.tab_id(page).await?;
        let existing = existing.map_or("null".to_string(), |g| g.0.to_string());
        let script = format!(
            r#"(async () => {{
  let gid = {existing};
  if (gid !== null) {{
    try {{ await chrome.tabGroups.get(gid); }} catch (e) {{ gid = null; }}
  }}
  const opts = gid === null ? {{ tabIds: [{tab}] }} : {{ tabIds: [{tab}], groupId: gid }};
  gid = await chrome.tabs.group(opts);
  await chrome.tabGroups.update(gid, {{ title: {name}, color: {color} }});
  return gid;
}})()"#,
            existing = existing,
            tab = tab,
            name = Value::String(name.to_string()),
            color = Value::String(color.name().to_string()),
        );
        self.run(&script)
            .await?
            .as_i64()
            .map(GroupId)
            .ok_or_else(|| Error::Cdp("chrome.tabs.group returned no id".into()))
    }

    async fn ungroup(&self, page: &PageHandle) -> Result<()> {
        let tab = self.tab_id(page).await?;
        self.run(&format!("chrome.tabs.ungroup([{}])", tab)).await?;
        Ok(())
    }

    async fn split_to_window(&self, page: &PageHandle) -> Result<()> {
        let tab = self.tab_id(page).await?;
        self.run(&format!(
            "(async () => (await chrome.windows.create({{ tabId: {} }})).id)()",
            tab
        ))
        .await?;
        Ok(())
    }
}
