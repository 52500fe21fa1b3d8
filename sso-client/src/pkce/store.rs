use super::PkceParams;
use crate::persist;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Key under which the live parameter set is kept.
pub const PKCE_STORAGE_KEY: &str = "pkce_params";

/// String-keyed, string-valued storage scoped to one client session (one browser tab).
pub trait SessionStorage: Send + Sync {
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove_item(&self, key: &str) -> anyhow::Result<()>;
}

/// In-process storage. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.items().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.items().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> anyhow::Result<()> {
        self.items().remove(key);
        Ok(())
    }
}

/// Storage backed by one JSON object per named session on disk.
///
/// Outlives the process, so a flow started by one invocation can be finished by the next.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Storage for `session` inside `dir`.
    ///
    /// Session names are used as file names, so only `[A-Za-z0-9_-]` is accepted.
    pub fn new(dir: impl AsRef<Path>, session: &str) -> anyhow::Result<Self> {
        if session.is_empty() {
            anyhow::bail!("session name must not be empty");
        }
        if let Some(c) = session
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            anyhow::bail!(
                "invalid character {:?} in session name '{}' (allowed: letters, digits, '-', '_')",
                c,
                session
            );
        }
        Ok(Self {
            path: dir.as_ref().join(format!("{}.json", session)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_unlocked(&self) -> anyhow::Result<HashMap<String, String>> {
        match persist::read_optional(&self.path)? {
            Some(content) => Ok(serde_json::from_str(&content)?),
            None => Ok(HashMap::new()),
        }
    }

    fn save_unlocked(&self, items: &HashMap<String, String>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(items)?;
        persist::write_atomic(&self.path, json.as_bytes())
    }

    fn update(&self, f: impl FnOnce(&mut HashMap<String, String>)) -> anyhow::Result<()> {
        persist::with_exclusive_lock(&self.path, || {
            // A damaged session file only ever held transient values; start over.
            let mut items = self.load_unlocked().unwrap_or_default();
            f(&mut items);
            self.save_unlocked(&items)
        })
    }
}

impl SessionStorage for FileStorage {
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        persist::with_exclusive_lock(&self.path, || {
            Ok(self.load_unlocked()?.remove(key))
        })
    }

    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.update(|items| {
            items.insert(key.to_string(), value.to_string());
        })
    }

    fn remove_item(&self, key: &str) -> anyhow::Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        self.update(|items| {
            items.remove(key);
        })
    }
}

/// Holds exactly one [`PkceParams`] for the current authorization attempt.
pub struct PkceStore<S: SessionStorage> {
    storage: S,
}

impl<S: SessionStorage> PkceStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Persist `params`, replacing any earlier attempt.
    pub fn store(&self, params: &PkceParams) -> anyhow::Result<()> {
        let json = serde_json::to_string(params)?;
        self.storage.set_item(PKCE_STORAGE_KEY, &json)
    }

    /// The stored parameters, or `None` when absent or unreadable.
    pub fn load(&self) -> Option<PkceParams> {
        let raw = match self.storage.get_item(PKCE_STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Failed to read stored PKCE parameters: {:#}", e);
                return None;
            }
        };
        match serde_json::from_str::<PkceParams>(&raw) {
            Ok(params) => Some(params),
            Err(e) => {
                tracing::warn!("Discarding unreadable PKCE parameters: {}", e);
                None
            }
        }
    }

    /// Remove the stored parameters. Calling with nothing stored is a no-op.
    pub fn clear(&self) -> anyhow::Result<()> {
        self.storage.remove_item(PKCE_STORAGE_KEY)
    }
}
