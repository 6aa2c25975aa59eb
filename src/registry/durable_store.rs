//! Crash-safe persistence of the registry document.
//!
//! Write order for `save`: temp file (fsync) -> copy current primary to backup -> rename
//! temp over primary. A reader never observes a partially written primary.

use crate::error::StoreError;
use crate::utils::logging::with_pretty_json_debug;
use agentry_schema::RegistrySnapshot;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, RwLock};
use tracing::{debug, info, warn};

/// One lock per primary path, shared by every `DurableStore` in the process.
static PATH_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<RwLock<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn lock_for(path: &Path) -> Arc<RwLock<()>> {
    let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut locks = PATH_LOCKS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    locks.entry(key).or_default().clone()
}

#[derive(Debug, Clone)]
pub struct DurableStore {
    path: PathBuf,
    backup_path: PathBuf,
    tmp_path: PathBuf,
    lock: Arc<RwLock<()>>,
}

impl DurableStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let backup_path = sibling(&path, "bak");
        let tmp_path = sibling(&path, "tmp");
        let lock = lock_for(&path);
        Self {
            path,
            backup_path,
            tmp_path,
            lock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Persist `snapshot`, keeping the previous primary as the single backup generation.
    pub fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), StoreError> {
        validate(snapshot).map_err(|reason| StoreError::InvalidDocument { reason })?;
        let bytes = serde_json::to_vec_pretty(snapshot)?;

        let _guard = self.lock.write().map_err(|_| StoreError::LockPoisoned {
            path: self.path.clone(),
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        write_synced(&self.tmp_path, &bytes)?;

        let had_primary = self.path.is_file();
        if had_primary {
            fs::copy(&self.path, &self.backup_path)
                .map_err(|e| StoreError::io(&self.backup_path, e))?;
            File::open(&self.backup_path)
                .and_then(|f| f.sync_all())
                .map_err(|e| StoreError::io(&self.backup_path, e))?;
        }

        fs::rename(&self.tmp_path, &self.path).map_err(|e| StoreError::io(&self.path, e))?;
        sync_parent(&self.path)?;

        info!(
            path = %self.path.display(),
            agents = snapshot.agents.len(),
            backup_written = had_primary,
            "registry saved"
        );
        with_pretty_json_debug(snapshot, |json| {
            debug!(path = %self.path.display(), "registry document:\n{json}");
        });
        Ok(())
    }

    /// Read and validate the primary. Corruption is reported, never repaired here.
    pub fn load(&self) -> Result<RegistrySnapshot, StoreError> {
        let _guard = self.lock.read().map_err(|_| StoreError::LockPoisoned {
            path: self.path.clone(),
        })?;
        read_validated(&self.path)
    }

    /// Like [`load`](Self::load), but an absent primary yields an empty snapshot.
    pub fn load_or_default(&self) -> Result<RegistrySnapshot, StoreError> {
        match self.load() {
            Err(StoreError::NotFound { .. }) => Ok(RegistrySnapshot::empty()),
            other => other,
        }
    }

    /// Replace the primary with the backup and return the restored document.
    pub fn restore_from_backup(&self) -> Result<RegistrySnapshot, StoreError> {
        let _guard = self.lock.write().map_err(|_| StoreError::LockPoisoned {
            path: self.path.clone(),
        })?;

        let bytes =
            fs::read(&self.backup_path).map_err(|e| StoreError::read(&self.backup_path, e))?;
        parse_validated(&self.backup_path, &bytes)?;

        write_synced(&self.tmp_path, &bytes)?;
        fs::rename(&self.tmp_path, &self.path).map_err(|e| StoreError::io(&self.path, e))?;
        sync_parent(&self.path)?;

        let restored = read_validated(&self.path)?;
        warn!(
            path = %self.path.display(),
            backup = %self.backup_path.display(),
            agents = restored.agents.len(),
            "registry restored from backup"
        );
        Ok(restored)
    }
}

fn sibling(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(ext);
    path.with_file_name(name)
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut file = File::create(path).map_err(|e| StoreError::io(path, e))?;
    file.write_all(bytes).map_err(|e| StoreError::io(path, e))?;
    file.sync_all().map_err(|e| StoreError::io(path, e))
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> Result<(), StoreError> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    File::open(parent)
        .and_then(|dir| dir.sync_all())
        .map_err(|e| StoreError::io(parent, e))
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

fn read_validated(path: &Path) -> Result<RegistrySnapshot, StoreError> {
    let bytes = fs::read(path).map_err(|e| StoreError::read(path, e))?;
    parse_validated(path, &bytes)
}

fn parse_validated(path: &Path, bytes: &[u8]) -> Result<RegistrySnapshot, StoreError> {
    let corrupt = |reason: String| {
        warn!(path = %path.display(), %reason, "registry document failed validation");
        StoreError::Corruption {
            path: path.to_path_buf(),
            reason,
        }
    };
    let snapshot: RegistrySnapshot =
        serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;
    validate(&snapshot).map_err(corrupt)?;
    Ok(snapshot)
}

/// Schema checks beyond what serde enforces.
pub(crate) fn validate(snapshot: &RegistrySnapshot) -> Result<(), String> {
    if snapshot.version.trim().is_empty() {
        return Err("missing version".to_string());
    }
    if !RegistrySnapshot::is_supported_version(&snapshot.version) {
        return Err(format!("unsupported version '{}'", snapshot.version));
    }
    for (key, record) in &snapshot.agents {
        if key.trim().is_empty() {
            return Err("agent with empty name".to_string());
        }
        if !record.name.is_empty() && record.name != *key {
            return Err(format!(
                "agent '{key}' carries mismatched name '{}'",
                record.name
            ));
        }
        if record.factory_reference.agent_type.trim().is_empty() {
            return Err(format!("agent '{key}' has an empty agent_type"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_schema::{AgentRecord, FactoryReference};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_registry(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before UNIX_EPOCH")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "agentry-store-{tag}-{}-{nanos}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir.join("registry.json")
    }

    fn snapshot_with(names: &[&str]) -> RegistrySnapshot {
        let mut snapshot = RegistrySnapshot::empty();
        for name in names {
            let reference = FactoryReference {
                agent_type: (*name).to_string(),
                factory_module: Some("builtin.echo".to_string()),
                factory_function: Some("create".to_string()),
                ..Default::default()
            };
            snapshot.agents.insert(
                (*name).to_string(),
                AgentRecord::new(*name, format!("{name} agent"), reference),
            );
        }
        snapshot
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = DurableStore::new(temp_registry("roundtrip"));
        let mut doc = snapshot_with(&["tickets", "billing"]);
        doc.agents
            .get_mut("billing")
            .unwrap()
            .factory_reference
            .factory_params
            .insert("region".to_string(), serde_json::json!("eu"));
        doc.agents.get_mut("tickets").unwrap().enabled = false;

        store.save(&doc).unwrap();
        assert_eq!(store.load().unwrap(), doc);
    }

    #[test]
    fn first_save_writes_no_backup() {
        let store = DurableStore::new(temp_registry("first"));
        store.save(&snapshot_with(&["a"])).unwrap();
        assert!(store.exists());
        assert!(!store.backup_path().exists());
    }

    #[test]
    fn restore_returns_previous_generation() {
        let store = DurableStore::new(temp_registry("backup"));
        let d1 = snapshot_with(&["a"]);
        let d2 = snapshot_with(&["a", "b"]);
        store.save(&d1).unwrap();
        store.save(&d2).unwrap();

        assert_eq!(store.restore_from_backup().unwrap(), d1);
        assert_eq!(store.load().unwrap(), d1);
    }

    #[test]
    fn backup_keeps_only_one_generation() {
        let store = DurableStore::new(temp_registry("single-gen"));
        let d1 = snapshot_with(&["a"]);
        let d2 = snapshot_with(&["b"]);
        let d3 = snapshot_with(&["c"]);
        store.save(&d1).unwrap();
        store.save(&d2).unwrap();
        store.save(&d3).unwrap();
        assert_eq!(store.restore_from_backup().unwrap(), d2);
    }

    #[test]
    fn load_missing_primary_is_not_found() {
        let store = DurableStore::new(temp_registry("missing"));
        assert!(store.load().unwrap_err().is_not_found());
        assert_eq!(store.load_or_default().unwrap(), RegistrySnapshot::empty());
    }

    #[test]
    fn restore_without_backup_is_not_found() {
        let store = DurableStore::new(temp_registry("no-backup"));
        store.save(&snapshot_with(&["a"])).unwrap();
        assert!(store.restore_from_backup().unwrap_err().is_not_found());
    }

    #[test]
    fn corrupt_primary_is_reported_not_repaired() {
        let store = DurableStore::new(temp_registry("corrupt"));
        let d1 = snapshot_with(&["a"]);
        store.save(&d1).unwrap();
        store.save(&snapshot_with(&["b"])).unwrap();
        fs::write(store.path(), b"{\"version\": \"1.0\", \"agents\": {").unwrap();

        assert!(store.load().unwrap_err().is_corruption());
        assert!(store.load().unwrap_err().is_corruption());
        assert!(store.load_or_default().unwrap_err().is_corruption());

        store.restore_from_backup().unwrap();
        assert_eq!(store.load().unwrap(), d1);
    }

    #[test]
    fn schema_violations_are_corruption() {
        let store = DurableStore::new(temp_registry("schema"));
        fs::write(store.path(), br#"{"version":"9.9","agents":{}}"#).unwrap();
        assert!(store.load().unwrap_err().is_corruption());

        fs::write(
            store.path(),
            br#"{"version":"1.0","agents":{"a":{"name":"b","factory_reference":{"agent_type":"a"}}}}"#,
        )
        .unwrap();
        assert!(store.load().unwrap_err().is_corruption());
    }

    #[test]
    fn invalid_backup_leaves_primary_untouched() {
        let store = DurableStore::new(temp_registry("bad-backup"));
        let d1 = snapshot_with(&["a"]);
        store.save(&d1).unwrap();
        fs::write(store.backup_path(), b"not json").unwrap();

        assert!(store.restore_from_backup().unwrap_err().is_corruption());
        assert_eq!(store.load().unwrap(), d1);
    }

    #[test]
    fn save_rejects_invalid_document() {
        let store = DurableStore::new(temp_registry("invalid"));
        let mut doc = snapshot_with(&["a"]);
        doc.version = "0.1".to_string();
        assert!(matches!(
            store.save(&doc),
            Err(StoreError::InvalidDocument { .. })
        ));
        assert!(!store.exists());
    }

    #[test]
    fn concurrent_saves_leave_a_valid_primary() {
        let path = temp_registry("concurrent");
        std::thread::scope(|s| {
            for i in 0..8 {
                let path = path.clone();
                s.spawn(move || {
                    let store = DurableStore::new(path);
                    let name = format!("agent-{i}");
                    store.save(&snapshot_with(&[name.as_str()])).unwrap();
                });
            }
        });
        let store = DurableStore::new(path);
        let loaded = store.load().unwrap();
        assert_eq!(loaded.agents.len(), 1);
        assert_eq!(store.restore_from_backup().unwrap().agents.len(), 1);
    }
}
