//! Session/target registry: the durable map from stable session slugs to the
//! browser objects (targets, windows, tab groups) that currently back them.
//!
//! Lookups go through the slug + provider pair or the target id. The title is
//! display-only and no operation here ever derives a key from it.

use chatmux_core::{Error, GroupColor, GroupId, Provider, Result, TargetId, WindowId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Schema version written by this build.
pub const CURRENT_SCHEMA: u32 = 2;

/// One provider tab backing a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    #[serde(default)]
    pub window_id: Option<WindowId>,
    pub target_id: TargetId,
    #[serde(default)]
    pub group_id: Option<GroupId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub grouped: bool,
    #[serde(default)]
    pub tabs: BTreeMap<Provider, Tab>,
}

impl Session {
    fn new(slug: &str) -> Self {
        Self {
            title: slug.to_string(),
            slug: slug.to_string(),
            created: chrono::Utc::now().to_rfc3339(),
            grouped: false,
            tabs: BTreeMap::new(),
        }
    }

    fn refresh_grouped(&mut self) {
        self.grouped = self.tabs.values().any(|t| t.group_id.is_some());
    }

    /// Distinct window ids across this session's tabs, ascending.
    pub fn window_ids(&self) -> Vec<WindowId> {
        let mut ids: Vec<WindowId> = self.tabs.values().filter_map(|t| t.window_id).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub group_id: GroupId,
    /// Display title shown on the group.
    pub name: String,
    #[serde(default)]
    pub color: GroupColor,
    /// Slug of the session this group belongs to. Session groups are found
    /// by owner, never by name; named groups have no owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl Group {
    fn same_slot(&self, other: &Group) -> bool {
        match (&self.owner, &other.owner) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.name == other.name,
            _ => false,
        }
    }
}

/// A tab together with the session slot it occupies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabRef {
    pub slug: String,
    pub provider: Provider,
    pub tab: Tab,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    pub schema: u32,
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub groups: Vec<Group>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            schema: CURRENT_SCHEMA,
            sessions: Vec::new(),
            groups: Vec::new(),
        }
    }
}

impl Registry {
    /// Parse a state document of any known schema version, migrating it to
    /// [`CURRENT_SCHEMA`]. Migration only ever adds defaulted fields.
    pub fn from_json(raw: &str) -> Result<Self> {
        let mut value: Value = serde_json::from_str(raw)?;
        if !value.is_object() {
            return Err(Error::Registry("state root is not an object".into()));
        }

        let schema = value.get("schema").and_then(|v| v.as_u64()).unwrap_or(1);
        let schema = u32::try_from(schema)
            .map_err(|_| Error::Registry(format!("schema {} is out of range", schema)))?;

        if schema < 2 {
            debug!(from = schema, to = 2, "Migrating state file");
            migrate_v1_to_v2(&mut value);
        }
        if schema > CURRENT_SCHEMA {
            warn!(
                schema,
                supported = CURRENT_SCHEMA,
                "State file was written by a newer version; it will not be overwritten"
            );
        }
        drop_unknown_providers(&mut value);
        value["schema"] = Value::from(schema.max(CURRENT_SCHEMA));

        let registry: Registry = serde_json::from_value(value)?;
        Ok(registry)
    }

    /// True when the document came from a newer build. Such a registry is
    /// readable but must not be written back, since its unknown fields were
    /// dropped on parse.
    pub fn is_from_newer_version(&self) -> bool {
        self.schema > CURRENT_SCHEMA
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    pub fn get_session(&self, slug: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.slug == slug)
    }

    fn session_mut(&mut self, slug: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.slug == slug)
    }

    pub fn find_tab(&self, slug: &str, provider: Provider) -> Option<&Tab> {
        self.get_session(slug).and_then(|s| s.tabs.get(&provider))
    }

    pub fn find_by_target(&self, target_id: &TargetId) -> Option<TabRef> {
        self.sessions.iter().find_map(|s| {
            s.tabs
                .iter()
                .find(|(_, t)| &t.target_id == target_id)
                .map(|(p, t)| TabRef {
                    slug: s.slug.clone(),
                    provider: *p,
                    tab: t.clone(),
                })
        })
    }

    fn tab_mut(&mut self, target_id: &TargetId) -> Option<(&mut Session, Provider)> {
        let (si, provider) = self.sessions.iter().enumerate().find_map(|(i, s)| {
            s.tabs
                .iter()
                .find(|(_, t)| &t.target_id == target_id)
                .map(|(p, _)| (i, *p))
        })?;
        Some((&mut self.sessions[si], provider))
    }

    /// Change the display title. Slugs and target ids are untouched.
    pub fn rename_title(&mut self, slug: &str, new_title: &str) -> Result<()> {
        let session = self
            .session_mut(slug)
            .ok_or_else(|| Error::NotFound(format!("session '{}'", slug)))?;
        session.title = new_title.to_string();
        Ok(())
    }

    /// Record `target_id` as the tab for `(slug, provider)`, creating the
    /// session on first use. A target may occupy only one slot at a time.
    pub fn register_tab(
        &mut self,
        slug: &str,
        provider: Provider,
        target_id: TargetId,
        window_id: Option<WindowId>,
    ) -> Result<()> {
        if slug.trim().is_empty() {
            return Err(Error::Registry("session slug must not be empty".into()));
        }
        if let Some(existing) = self.find_by_target(&target_id) {
            if existing.slug != slug || existing.provider != provider {
                return Err(Error::Registry(format!(
                    "target {} already belongs to {}/{}",
                    target_id, existing.slug, existing.provider
                )));
            }
        }

        if self.get_session(slug).is_none() {
            self.sessions.push(Session::new(slug));
        }
        let session = self
            .session_mut(slug)
            .ok_or_else(|| Error::Registry(format!("session '{}' vanished", slug)))?;

        let group_id = session
            .tabs
            .get(&provider)
            .filter(|t| t.target_id == target_id)
            .and_then(|t| t.group_id);
        session.tabs.insert(
            provider,
            Tab {
                window_id,
                target_id,
                group_id,
            },
        );
        session.refresh_grouped();
        Ok(())
    }

    /// Drop the tab for `target_id`. The session itself stays until it is
    /// explicitly removed.
    pub fn remove_tab(&mut self, target_id: &TargetId) -> Option<TabRef> {
        let (session, provider) = self.tab_mut(target_id)?;
        let tab = session.tabs.remove(&provider)?;
        session.refresh_grouped();
        Some(TabRef {
            slug: session.slug.clone(),
            provider,
            tab,
        })
    }

    pub fn assign_group(&mut self, target_id: &TargetId, group_id: Option<GroupId>) -> Result<()> {
        let (session, provider) = self
            .tab_mut(target_id)
            .ok_or_else(|| Error::NotFound(format!("target {}", target_id)))?;
        if let Some(tab) = session.tabs.get_mut(&provider) {
            tab.group_id = group_id;
        }
        session.refresh_grouped();
        Ok(())
    }

    pub fn update_window(&mut self, target_id: &TargetId, window_id: WindowId) -> Result<()> {
        let (session, provider) = self
            .tab_mut(target_id)
            .ok_or_else(|| Error::NotFound(format!("target {}", target_id)))?;
        if let Some(tab) = session.tabs.get_mut(&provider) {
            tab.window_id = Some(window_id);
        }
        Ok(())
    }

    /// Named group shared by any tabs moved into it by name.
    pub fn find_group_by_name(&self, name: &str) -> Option<&Group> {
        self.groups
            .iter()
            .find(|g| g.owner.is_none() && g.name == name)
    }

    /// The group a session's tabs were gathered into.
    pub fn find_group_by_owner(&self, slug: &str) -> Option<&Group> {
        self.groups
            .iter()
            .find(|g| g.owner.as_deref() == Some(slug))
    }

    pub fn get_group(&self, group_id: GroupId) -> Option<&Group> {
        self.groups.iter().find(|g| g.group_id == group_id)
    }

    /// Cache a browser-assigned group. Replaces any row with the same id, or
    /// with the same owner (session groups) or name (named groups).
    pub fn upsert_group(&mut self, group: Group) {
        self.groups
            .retain(|g| g.group_id != group.group_id && !g.same_slot(&group));
        self.groups.push(group);
    }

    /// Remove a group row and clear every tab association pointing at it.
    pub fn remove_group(&mut self, group_id: GroupId) -> Option<Group> {
        let pos = self.groups.iter().position(|g| g.group_id == group_id)?;
        let group = self.groups.remove(pos);
        for session in &mut self.sessions {
            for tab in session.tabs.values_mut() {
                if tab.group_id == Some(group_id) {
                    tab.group_id = None;
                }
            }
            session.refresh_grouped();
        }
        Some(group)
    }

    pub fn remove_session(&mut self, slug: &str) -> Option<Session> {
        let pos = self.sessions.iter().position(|s| s.slug == slug)?;
        Some(self.sessions.remove(pos))
    }

    /// Target ids registered more than once. Always empty unless the file was
    /// edited by hand.
    pub fn duplicate_targets(&self) -> Vec<TargetId> {
        let mut seen = std::collections::HashSet::new();
        let mut dups = Vec::new();
        for tab in self.sessions.iter().flat_map(|s| s.tabs.values()) {
            if !seen.insert(&tab.target_id) {
                dups.push(tab.target_id.clone());
            }
        }
        dups
    }
}

/// Version 1 had no tab groups: add `grouped`, `tabs.*.groupId` and `groups`.
fn migrate_v1_to_v2(value: &mut Value) {
    if !value.get("groups").map_or(false, |g| g.is_array()) {
        value["groups"] = Value::Array(Vec::new());
    }
    if !value.get("sessions").map_or(false, |s| s.is_array()) {
        value["sessions"] = Value::Array(Vec::new());
    }
    let Some(sessions) = value.get_mut("sessions").and_then(|s| s.as_array_mut()) else {
        return;
    };
    for session in sessions.iter_mut() {
        let Some(obj) = session.as_object_mut() else {
            continue;
        };
        if !obj.contains_key("title") {
            let slug = obj.get("slug").cloned().unwrap_or(Value::Null);
            obj.insert("title".into(), slug);
        }
        let mut any_grouped = false;
        if let Some(tabs) = obj.get_mut("tabs").and_then(|t| t.as_object_mut()) {
            for tab in tabs.values_mut() {
                if let Some(tab) = tab.as_object_mut() {
                    let group = tab.entry("groupId").or_insert(Value::Null);
                    any_grouped |= !group.is_null();
                }
            }
        }
        obj.entry("grouped").or_insert(Value::Bool(any_grouped));
    }
}

/// Tabs of providers this build does not know would otherwise fail the whole
/// document; drop them with a warning.
fn drop_unknown_providers(value: &mut Value) {
    let Some(sessions) = value.get_mut("sessions").and_then(|s| s.as_array_mut()) else {
        return;
    };
    for session in sessions.iter_mut() {
        if let Some(tabs) = session.get_mut("tabs").and_then(|t| t.as_object_mut()) {
            tabs.retain(|name, _| {
                let known = Provider::from_name(name).is_some();
                if !known {
                    warn!(provider = %name, "Dropping tab of unknown provider from state");
                }
                known
            });
        }
    }
}
