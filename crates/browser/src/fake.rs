//! In-memory browser for manager and layout tests.

use async_trait::async_trait;
use chatmux_core::{Bounds, Error, GroupColor, GroupId, Result, TargetId};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::cdp::Transport;
use crate::groups::TabGroupBackend;
use crate::page::PageHandle;

#[derive(Debug, Clone)]
struct FakeTarget {
    id: String,
    url: String,
    title: String,
    window: i64,
}

#[derive(Default)]
struct State {
    targets: Vec<FakeTarget>,
    sessions: HashMap<String, String>,
    next_id: u64,
    next_window: i64,
    calls: Vec<String>,
    bounds: HashMap<i64, Bounds>,
    memberships: HashMap<String, i64>,
    live_groups: HashSet<i64>,
    next_group: i64,
}

impl State {
    fn target(&self, id: &str) -> Option<&FakeTarget> {
        self.targets.iter().find(|t| t.id == id)
    }

    fn target_mut(&mut self, id: &str) -> Option<&mut FakeTarget> {
        self.targets.iter_mut().find(|t| t.id == id)
    }

    fn new_window(&mut self) -> i64 {
        self.next_window += 1;
        self.next_window
    }

    fn add_target(&mut self, url: &str, window: i64) -> String {
        self.next_id += 1;
        let id = format!("T{}", self.next_id);
        self.targets.push(FakeTarget {
            id: id.clone(),
            url: url.to_string(),
            title: String::new(),
            window,
        });
        id
    }
}

#[derive(Default)]
pub struct FakeBrowser {
    state: Mutex<State>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn count(&self, method: &str) -> usize {
        self.with(|s| s.calls.iter().filter(|c| *c == method).count())
    }

    pub fn target_url(&self, id: &TargetId) -> Option<String> {
        self.with(|s| s.target(id.as_str()).map(|t| t.url.clone()))
    }

    pub fn title_of(&self, id: &TargetId) -> Option<String> {
        self.with(|s| s.target(id.as_str()).map(|t| t.title.clone()))
    }

    pub fn window_of(&self, id: &TargetId) -> Option<i64> {
        self.with(|s| s.target(id.as_str()).map(|t| t.window))
    }

    pub fn bounds_of(&self, window: i64) -> Option<Bounds> {
        self.with(|s| s.bounds.get(&window).copied())
    }

    pub fn group_of(&self, id: &TargetId) -> Option<i64> {
        self.with(|s| s.memberships.get(id.as_str()).copied())
    }

    pub fn page_count(&self) -> usize {
        self.with(|s| s.targets.len())
    }

    /// The target vanishes as if the user closed it.
    pub fn kill_target(&self, id: &TargetId) {
        self.with(|s| s.targets.retain(|t| t.id != id.as_str()))
    }

    /// Every flattened session is invalidated, as after a renderer swap.
    pub fn drop_sessions(&self) {
        self.with(|s| s.sessions.clear())
    }

    /// A tab chatmux does not track, opened next to `neighbour`.
    pub fn open_untracked_beside(&self, neighbour: &TargetId) -> TargetId {
        self.with(|s| {
            let window = s.target(neighbour.as_str()).map(|t| t.window).unwrap_or(0);
            TargetId::new(s.add_target("https://example.com/", window))
        })
    }

    fn page_call(&self, session: &str, method: &str, params: &Value) -> Result<Value> {
        self.with(|s| {
            let stale = || Error::Cdp(format!("{}: Session with given id not found.", method));
            let target_id = s.sessions.get(session).cloned().ok_or_else(stale)?;
            let target = s.target_mut(&target_id).ok_or_else(stale)?;
            if method != "Runtime.evaluate" {
                return Ok(json!({}));
            }
            let expr = params["expression"].as_str().unwrap_or_default();
            let value = if expr == "1" {
                json!(1)
            } else if expr.contains("document.readyState") {
                json!("complete")
            } else if expr.contains("__chatmuxTitle") {
                let arg = expr
                    .rfind("})(")
                    .map(|i| &expr[i + 3..expr.len() - 1])
                    .unwrap_or("\"\"");
                target.title = serde_json::from_str(arg).unwrap_or_default();
                json!(true)
            } else if expr.contains("screen.availWidth") {
                json!({"left": 0, "top": 0, "width": 1920, "height": 1080})
            } else if expr.contains("innerText") {
                json!(format!("conversation at {}", target.url))
            } else {
                Value::Null
            };
            Ok(json!({"result": {"type": "object", "value": value}}))
        })
    }

    fn browser_call(&self, method: &str, params: &Value) -> Result<Value> {
        self.with(|s| {
            let target_param = params["targetId"].as_str().unwrap_or_default().to_string();
            let missing = || Error::Cdp(format!("{}: No target with given id found", method));
            match method {
                "Target.getTargets" => {
                    let infos: Vec<Value> = s
                        .targets
                        .iter()
                        .map(|t| {
                            json!({"targetId": t.id, "type": "page", "url": t.url, "title": t.title})
                        })
                        .collect();
                    Ok(json!({"targetInfos": infos}))
                }
                "Target.createTarget" => {
                    let window = if params["newWindow"] == true { s.new_window() } else { 1 };
                    let url = params["url"].as_str().unwrap_or("about:blank");
                    Ok(json!({"targetId": s.add_target(url, window)}))
                }
                "Target.attachToTarget" => {
                    s.target(&target_param).ok_or_else(missing)?;
                    s.next_id += 1;
                    let session = format!("S{}", s.next_id);
                    s.sessions.insert(session.clone(), target_param);
                    Ok(json!({"sessionId": session}))
                }
                "Target.closeTarget" => {
                    s.target(&target_param).ok_or_else(missing)?;
                    s.targets.retain(|t| t.id != target_param);
                    Ok(json!({"success": true}))
                }
                "Browser.getWindowForTarget" => {
                    let window = s.target(&target_param).ok_or_else(missing)?.window;
                    let bounds = s.bounds.get(&window).copied().unwrap_or_default();
                    Ok(json!({"windowId": window, "bounds": bounds}))
                }
                "Browser.setWindowBounds" => {
                    let window = params["windowId"].as_i64().unwrap_or_default();
                    if let Ok(b) = serde_json::from_value::<Bounds>(params["bounds"].clone()) {
                        s.bounds.insert(window, b);
                    }
                    Ok(json!({}))
                }
                other => Err(Error::Cdp(format!("'{}' wasn't found", other))),
            }
        })
    }
}

#[async_trait]
impl Transport for FakeBrowser {
    async fn call(&self, session_id: Option<&str>, method: &str, params: Value) -> Result<Value> {
        self.with(|s| s.calls.push(method.to_string()));
        match session_id {
            Some(session) => self.page_call(session, method, &params),
            None => self.browser_call(method, &params),
        }
    }
}

/// Tab groups modelled on Chrome's behaviour: grouping pulls the tab into the
/// group's window and a group disappears with its last tab.
pub struct FakeGroups {
    browser: Arc<FakeBrowser>,
}

impl FakeGroups {
    pub fn new(browser: Arc<FakeBrowser>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl TabGroupBackend for FakeGroups {
    async fn group(
        &self,
        page: &PageHandle,
        existing: Option<GroupId>,
        _name: &str,
        _color: GroupColor,
    ) -> Result<GroupId> {
        let id = page.target_id().as_str().to_string();
        self.browser.with(|s| {
            let gid = match existing {
                Some(g) if s.live_groups.contains(&g.0) => g.0,
                _ => {
                    s.next_group += 1;
                    let g = 100 + s.next_group;
                    s.live_groups.insert(g);
                    g
                }
            };
            let home = s
                .memberships
                .iter()
                .find(|(t, g)| **g == gid && **t != id)
                .and_then(|(t, _)| s.target(t))
                .map(|t| t.window);
            if let (Some(window), Some(target)) = (home, s.target_mut(&id)) {
                target.window = window;
            }
            s.memberships.insert(id, gid);
            Ok(GroupId(gid))
        })
    }

    async fn ungroup(&self, page: &PageHandle) -> Result<()> {
        let id = page.target_id().as_str().to_string();
        self.browser.with(|s| {
            if let Some(gid) = s.memberships.remove(&id) {
                if !s.memberships.values().any(|g| *g == gid) {
                    s.live_groups.remove(&gid);
                }
            }
        });
        Ok(())
    }

    async fn split_to_window(&self, page: &PageHandle) -> Result<()> {
        let id = page.target_id().as_str().to_string();
        self.browser.with(|s| {
            let window = s.new_window();
            if let Some(t) = s.target_mut(&id) {
                t.window = window;
            }
        });
        Ok(())
    }
}
