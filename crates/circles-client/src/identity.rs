use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};
use uuid::Uuid;

use circles_types::CircleError;

/// Small string key/value persistence, the local-storage of this client.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryStorage {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let map = self.map.lock().map_err(|e| anyhow!("storage lock poisoned: {}", e))?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.map.lock().map_err(|e| anyhow!("storage lock poisoned: {}", e))?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut map = self.map.lock().map_err(|e| anyhow!("storage lock poisoned: {}", e))?;
        map.remove(key);
        Ok(())
    }
}

/// A JSON object on disk. The whole file is rewritten on every change via a
/// sibling temp file and a rename.
pub struct FileStorage {
    path: PathBuf,
    map: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let map = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("{} is not a JSON string map", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        debug!("Identity storage at {}", path.display());
        Ok(Self {
            path,
            map: Mutex::new(map),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, map: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(map)?)
            .with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }

    /// Apply `f` to a copy and keep it only once it is on disk.
    fn modify(&self, f: impl FnOnce(&mut HashMap<String, String>)) -> Result<()> {
        let mut map = self.map.lock().map_err(|e| anyhow!("storage lock poisoned: {}", e))?;
        let mut next = map.clone();
        f(&mut next);
        self.persist(&next)?;
        *map = next;
        Ok(())
    }
}

impl KeyValueStore for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let map = self.map.lock().map_err(|e| anyhow!("storage lock poisoned: {}", e))?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.modify(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.modify(|map| {
            map.remove(key);
        })
    }
}

/// Per-circle pseudonyms. The first request for a circle mints one and
/// every later request returns the same value.
pub struct AnonymousIds {
    storage: Arc<dyn KeyValueStore>,
    mint: Mutex<()>,
}

impl AnonymousIds {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            storage,
            mint: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    fn key(circle_id: Uuid) -> String {
        format!("anonymous-id-{}", circle_id)
    }

    pub fn get(&self, circle_id: Uuid) -> Result<String, CircleError> {
        let _guard = self
            .mint
            .lock()
            .map_err(|e| CircleError::Storage(anyhow!("identity lock poisoned: {}", e)))?;

        let key = Self::key(circle_id);
        if let Some(existing) = self.storage.get(&key).map_err(CircleError::Storage)? {
            return Ok(existing);
        }

        let id = generate();
        self.storage.set(&key, &id).map_err(CircleError::Storage)?;
        info!("New pseudonym {} for circle {}", id, circle_id);
        Ok(id)
    }

    /// Drop the pseudonym for a circle; the next `get` mints a fresh one.
    pub fn forget(&self, circle_id: Uuid) -> Result<(), CircleError> {
        self.storage
            .remove(&Self::key(circle_id))
            .map_err(CircleError::Storage)
    }
}

fn generate() -> String {
    let bytes: [u8; 4] = rand::random();
    format!("anon-{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudonym_is_stable_per_circle() {
        let ids = AnonymousIds::in_memory();
        let c1 = Uuid::new_v4();
        let c2 = Uuid::new_v4();

        let first = ids.get(c1).unwrap();
        assert_eq!(ids.get(c1).unwrap(), first);
        assert!(first.starts_with("anon-"));
        assert_eq!(first.len(), "anon-".len() + 8);

        let other = ids.get(c2).unwrap();
        assert!(other.starts_with("anon-"));
    }

    #[test]
    fn forget_mints_anew() {
        let storage = Arc::new(MemoryStorage::new());
        let ids = AnonymousIds::new(storage.clone());
        let circle = Uuid::new_v4();

        ids.get(circle).unwrap();
        ids.forget(circle).unwrap();
        assert!(storage.get(&format!("anonymous-id-{}", circle)).unwrap().is_none());
        assert!(ids.get(circle).unwrap().starts_with("anon-"));
    }

    #[test]
    fn file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("identity.json");
        let circle = Uuid::new_v4();

        let first = {
            let ids = AnonymousIds::new(Arc::new(FileStorage::open(&path).unwrap()));
            ids.get(circle).unwrap()
        };

        let reopened = AnonymousIds::new(Arc::new(FileStorage::open(&path).unwrap()));
        assert_eq!(reopened.get(circle).unwrap(), first);
    }

    #[test]
    fn failed_write_mints_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        // A directory where the temp file goes makes every write fail.
        let blocker = path.with_extension("tmp");
        std::fs::create_dir(&blocker).unwrap();

        let storage = Arc::new(FileStorage::open(&path).unwrap());
        let ids = AnonymousIds::new(storage.clone());
        let circle = Uuid::new_v4();

        assert!(matches!(ids.get(circle), Err(CircleError::Storage(_))));
        assert!(matches!(ids.get(circle), Err(CircleError::Storage(_))));
        assert!(storage.get(&format!("anonymous-id-{}", circle)).unwrap().is_none());
        assert!(!path.exists());

        std::fs::remove_dir(&blocker).unwrap();
        let minted = ids.get(circle).unwrap();
        let reopened = AnonymousIds::new(Arc::new(FileStorage::open(&path).unwrap()));
        assert_eq!(reopened.get(circle).unwrap(), minted);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(FileStorage::open(&path).is_err());
    }
}
