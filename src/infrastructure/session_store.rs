// Session store implementations
use crate::application::session_store::SessionStore;
use anyhow::Context;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    entries: RwLock<HashMap<String, String>>,
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries
            .write()
            .map_err(|_| anyhow::anyhow!("session store lock poisoned"))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> anyhow::Result<()> {
        self.entries
            .write()
            .map_err(|_| anyhow::anyhow!("session store lock poisoned"))?
            .remove(key);
        Ok(())
    }
}

/// JSON object on disk, rewritten on every change.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileSessionStore {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => HashMap::new(),
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse session file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read session file {}", path.display()));
            }
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    fn persist(&self, entries: &HashMap<String, String>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write session file {}", self.path.display()))
    }

    fn update<F>(&self, change: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut HashMap<String, String>),
    {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow::anyhow!("session store lock poisoned"))?;
        change(&mut entries);
        self.persist(&entries)
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn clear(&self, key: &str) -> anyhow::Result<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = FileSessionStore::open(&path).unwrap();
        assert_eq!(store.get("token"), None);
        store.set("token", "abc").unwrap();
        store.set("user", "operator").unwrap();
        store.clear("user").unwrap();

        let reopened = FileSessionStore::open(&path).unwrap();
        assert_eq!(reopened.get("token").as_deref(), Some("abc"));
        assert_eq!(reopened.get("user"), None);
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(FileSessionStore::open(&path).is_err());
    }

    #[test]
    fn test_memory_store() {
        let store = InMemorySessionStore::default();
        store.set("token", "abc").unwrap();
        assert_eq!(store.get("token").as_deref(), Some("abc"));
        store.clear("token").unwrap();
        assert_eq!(store.get("token"), None);
    }
}
