use chatmux_core::{Error, GroupId, Provider, Result, TargetId, WindowId};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::registry::{Group, Registry, Session, TabRef};

/// Durable home of the [`Registry`].
///
/// Reads are lock-free because every write replaces the file atomically.
/// Read-modify-write cycles go through [`StateStore::update`], which holds an
/// advisory lock on a sibling `.lock` file for exactly that span. The lock
/// coordinates separate processes on one machine; it gives no in-process
/// ordering beyond the closure it wraps.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

impl StateStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn corrupt_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".corrupt");
        self.path.with_file_name(name)
    }

    fn ensure_parent(&self) -> Result<PathBuf> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;
        Ok(parent)
    }

    fn lock(&self) -> Result<LockGuard> {
        self.ensure_parent()?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())?;
        fs2::FileExt::lock_exclusive(&file)?;
        Ok(LockGuard { file })
    }

    /// Current registry. A missing or unreadable file yields an empty
    /// registry at the current schema; a corrupt one is copied aside first.
    pub fn load(&self) -> Registry {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No state file yet");
                return Registry::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "State file unreadable, starting empty");
                return Registry::default();
            }
        };

        if raw.trim().is_empty() {
            return Registry::default();
        }

        match Registry::from_json(&raw) {
            Ok(registry) => registry,
            Err(e) => {
                let aside = self.corrupt_path();
                if let Err(copy_err) = std::fs::copy(&self.path, &aside) {
                    warn!(error = %copy_err, "Failed to keep a copy of the corrupt state file");
                }
                warn!(
                    path = %self.path.display(),
                    backup = %aside.display(),
                    error = %e,
                    "State file corrupt, starting empty"
                );
                Registry::default()
            }
        }
    }

    /// Persist via write-temp-then-rename in the same directory.
    pub fn save(&self, registry: &Registry) -> Result<()> {
        if registry.is_from_newer_version() {
            return Err(Error::Registry(format!(
                "{} was written by a newer version (schema {}); refusing to overwrite it",
                self.path.display(),
                registry.schema
            )));
        }
        let parent = self.ensure_parent()?;
        let json = registry.to_json()?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    /// Locked read-modify-write. Nothing is written when `f` fails.
    pub fn update<T>(&self, f: impl FnOnce(&mut Registry) -> Result<T>) -> Result<T> {
        let _guard = self.lock()?;
        let mut registry = self.load();
        let out = f(&mut registry)?;
        self.save(&registry)?;
        Ok(out)
    }

    pub fn get_session(&self, slug: &str) -> Option<Session> {
        self.load().get_session(slug).cloned()
    }

    pub fn find_by_target(&self, target_id: &TargetId) -> Option<TabRef> {
        self.load().find_by_target(target_id)
    }

    pub fn rename_title(&self, slug: &str, new_title: &str) -> Result<()> {
        self.update(|r| r.rename_title(slug, new_title))
    }

    pub fn register_tab(
        &self,
        slug: &str,
        provider: Provider,
        target_id: TargetId,
        window_id: Option<WindowId>,
    ) -> Result<()> {
        self.update(|r| r.register_tab(slug, provider, target_id, window_id))
    }

    pub fn remove_tab(&self, target_id: &TargetId) -> Result<Option<TabRef>> {
        self.update(|r| Ok(r.remove_tab(target_id)))
    }

    pub fn assign_group(&self, target_id: &TargetId, group_id: Option<GroupId>) -> Result<()> {
        self.update(|r| r.assign_group(target_id, group_id))
    }

    pub fn update_window(&self, target_id: &TargetId, window_id: WindowId) -> Result<()> {
        self.update(|r| r.update_window(target_id, window_id))
    }

    pub fn upsert_group(&self, group: Group) -> Result<()> {
        self.update(|r| {
            r.upsert_group(group);
            Ok(())
        })
    }

    pub fn remove_group(&self, group_id: GroupId) -> Result<Option<Group>> {
        self.update(|r| Ok(r.remove_group(group_id)))
    }

    pub fn remove_session(&self, slug: &str) -> Result<Option<Session>> {
        self.update(|r| Ok(r.remove_session(slug)))
    }
}
