//! String key/value persistence for the device.
//!
//! Storage layout for [`FileKeyValueStore`]:
//! ```text
//! ~/.local/share/nutrisnap/
//! ├── foodLog-2025-01-01.json     # one bucket per calendar day
//! ├── foodLog-2025-01-02.json
//! ├── macroGoals.json
//! └── pendingAnonUid.json
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use super::LocalStoreError;

/// File extension for stored values.
const VALUE_EXTENSION: &str = "json";

/// Device-local key/value storage with browser-storage semantics.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, LocalStoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), LocalStoreError>;

    /// Removes a key. Returns whether it existed.
    fn remove(&self, key: &str) -> Result<bool, LocalStoreError>;

    fn keys(&self) -> Result<Vec<String>, LocalStoreError>;
}

/// Rejects keys that could escape the data directory.
fn validate_key(key: &str) -> Result<(), LocalStoreError> {
    if key.is_empty()
        || key.contains('/')
        || key.contains('\\')
        || key.contains("..")
        || key.starts_with('.')
    {
        return Err(LocalStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Stores each key as `<key>.json` in a data directory.
#[derive(Clone, Debug)]
pub struct FileKeyValueStore {
    data_dir: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{}.{}", key, VALUE_EXTENSION))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        validate_key(key)?;
        let path = self.value_path(key);

        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LocalStoreError::Io(path, e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LocalStoreError> {
        validate_key(key)?;
        fs::create_dir_all(&self.data_dir)
            .map_err(|e| LocalStoreError::Io(self.data_dir.clone(), e))?;

        // Write to a sibling file first so a crash never leaves half a bucket.
        let path = self.value_path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|e| LocalStoreError::Io(tmp.clone(), e))?;
        fs::rename(&tmp, &path).map_err(|e| LocalStoreError::Io(path, e))?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, LocalStoreError> {
        validate_key(key)?;
        let path = self.value_path(key);

        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LocalStoreError::Io(path, e)),
        }
    }

    fn keys(&self) -> Result<Vec<String>, LocalStoreError> {
        let entries = match fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LocalStoreError::Io(self.data_dir.clone(), e)),
        };

        let mut keys = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| LocalStoreError::Io(self.data_dir.clone(), e))?;
            let path = entry.path();

            if !path.is_file() {
                continue;
            }

            if path.extension().and_then(|s| s.to_str()) != Some(VALUE_EXTENSION) {
                continue;
            }

            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }

        keys.sort();
        Ok(keys)
    }
}

/// In-process store, useful for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LocalStoreError> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, LocalStoreError> {
        Ok(self.values().remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, LocalStoreError> {
        Ok(self.values().keys().cloned().collect())
    }
}
