//! Per-user JSON storage.
//!
//! ```text
//! <DATA_DIR>/
//!   <uid>/
//!     entries.json
//!     profile.json
//! ```
//!
//! Writes go through a temp file and a rename. Callers serialize
//! read-modify-write sequences themselves (the router holds a lock).

use nutrisnap_core::{LogEntry, ProfileUpdate, UserProfile};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const ENTRIES_FILE: &str = "entries.json";
const PROFILE_FILE: &str = "profile.json";

#[derive(Debug)]
pub enum StorageError {
    IoError(PathBuf, io::Error),
    JsonError(PathBuf, serde_json::Error),
    /// The uid would escape the data directory.
    InvalidUserId(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::IoError(path, e) => write!(f, "I/O error for {}: {}", path.display(), e),
            StorageError::JsonError(path, e) => {
                write!(f, "Malformed data in {}: {}", path.display(), e)
            }
            StorageError::InvalidUserId(uid) => write!(f, "Invalid user ID: {}", uid),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::IoError(_, e) => Some(e),
            StorageError::JsonError(_, e) => Some(e),
            StorageError::InvalidUserId(_) => None,
        }
    }
}

/// File-backed entry and profile store, one directory per uid.
#[derive(Debug, Clone)]
pub struct UserStorage {
    data_dir: PathBuf,
}

impl UserStorage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn validate_user_id(uid: &str) -> Result<(), StorageError> {
        if uid.is_empty()
            || uid.contains('/')
            || uid.contains('\\')
            || uid.contains("..")
            || uid.starts_with('.')
            || uid.chars().any(char::is_control)
        {
            return Err(StorageError::InvalidUserId(uid.to_string()));
        }
        Ok(())
    }

    fn user_file(&self, uid: &str, name: &str) -> Result<PathBuf, StorageError> {
        Self::validate_user_id(uid)?;
        Ok(self.data_dir.join(uid).join(name))
    }

    pub fn list_entries(&self, uid: &str) -> Result<Vec<LogEntry>, StorageError> {
        let path = self.user_file(uid, ENTRIES_FILE)?;
        Ok(read_json(&path)?.unwrap_or_default())
    }

    /// Stores a new entry under a fresh id and returns it.
    ///
    /// Any id in the request is replaced. A missing timestamp becomes
    /// `now_ms`.
    pub fn add_entry(
        &self,
        uid: &str,
        entry: LogEntry,
        now_ms: i64,
    ) -> Result<(LogEntry, Vec<LogEntry>), StorageError> {
        let path = self.user_file(uid, ENTRIES_FILE)?;
        let mut entries: Vec<LogEntry> = read_json(&path)?.unwrap_or_default();

        let saved = LogEntry {
            id: Some(uuid::Uuid::new_v4().to_string()),
            timestamp: Some(entry.timestamp.unwrap_or(now_ms)),
            ..entry
        };
        entries.push(saved.clone());
        write_json(&path, &entries)?;

        tracing::debug!("Stored entry {:?} for {}", saved.id, uid);
        Ok((saved, entries))
    }

    /// Removes an entry. Returns `None` when no entry has that id.
    pub fn remove_entry(&self, uid: &str, id: &str) -> Result<Option<Vec<LogEntry>>, StorageError> {
        let path = self.user_file(uid, ENTRIES_FILE)?;
        let mut entries: Vec<LogEntry> = read_json(&path)?.unwrap_or_default();

        let before = entries.len();
        entries.retain(|e| e.id.as_deref() != Some(id));
        if entries.len() == before {
            return Ok(None);
        }
        write_json(&path, &entries)?;
        Ok(Some(entries))
    }

    pub fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>, StorageError> {
        let path = self.user_file(uid, PROFILE_FILE)?;
        read_json(&path)
    }

    /// Creates the profile if needed, then merges `fields` into it.
    pub fn set_profile(
        &self,
        uid: &str,
        fields: &ProfileUpdate,
    ) -> Result<UserProfile, StorageError> {
        let path = self.user_file(uid, PROFILE_FILE)?;
        let mut profile: UserProfile = read_json(&path)?.unwrap_or_default();
        profile.merge(fields);
        write_json(&path, &profile)?;
        Ok(profile)
    }

    /// Merges `fields` into an existing profile. Returns `None` when the
    /// uid has no profile yet.
    pub fn update_profile(
        &self,
        uid: &str,
        fields: &ProfileUpdate,
    ) -> Result<Option<UserProfile>, StorageError> {
        let path = self.user_file(uid, PROFILE_FILE)?;
        let Some(mut profile) = read_json::<UserProfile>(&path)? else {
            return Ok(None);
        };
        profile.merge(fields);
        write_json(&path, &profile)?;
        Ok(Some(profile))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::JsonError(path.to_path_buf(), e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::IoError(path.to_path_buf(), e)),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| StorageError::IoError(dir.to_path_buf(), e))?;
    }
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| StorageError::JsonError(path.to_path_buf(), e))?;

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, bytes).map_err(|e| StorageError::IoError(temp_path.clone(), e))?;
    fs::rename(&temp_path, path).map_err(|e| StorageError::IoError(path.to_path_buf(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nutrisnap_core::MacroGoals;
    use tempfile::TempDir;

    fn setup() -> (UserStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = UserStorage::new(temp_dir.path());
        (storage, temp_dir)
    }

    #[test]
    fn test_validate_user_id() {
        assert!(UserStorage::validate_user_id("alice").is_ok());
        assert!(UserStorage::validate_user_id("guest-7f3a").is_ok());
        assert!(UserStorage::validate_user_id("user_123@example.com").is_ok());

        assert!(UserStorage::validate_user_id("").is_err());
        assert!(UserStorage::validate_user_id("../evil").is_err());
        assert!(UserStorage::validate_user_id("foo/bar").is_err());
        assert!(UserStorage::validate_user_id("foo\\bar").is_err());
        assert!(UserStorage::validate_user_id(".hidden").is_err());
        assert!(UserStorage::validate_user_id("tab\there").is_err());
    }

    #[test]
    fn test_invalid_uid_never_touches_disk() {
        let (storage, temp) = setup();
        let result = storage.add_entry("../outside", LogEntry::new("Apple"), 1);
        assert!(matches!(result, Err(StorageError::InvalidUserId(_))));
        assert!(std::fs::read_dir(temp.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_list_empty_user() {
        let (storage, _temp) = setup();
        assert!(storage.list_entries("alice").unwrap().is_empty());
    }

    #[test]
    fn test_add_assigns_id_and_timestamp() {
        let (storage, temp) = setup();

        let (saved, all) = storage
            .add_entry("alice", LogEntry::new("Apple").with_id("client-id"), 500)
            .unwrap();
        assert_ne!(saved.id.as_deref(), Some("client-id"));
        assert!(saved.id.is_some());
        assert_eq!(saved.timestamp, Some(500));
        assert_eq!(all, vec![saved.clone()]);

        let (kept, _) = storage
            .add_entry("alice", LogEntry::new("Rice").with_timestamp(42), 500)
            .unwrap();
        assert_eq!(kept.timestamp, Some(42));

        assert_eq!(storage.list_entries("alice").unwrap().len(), 2);
        assert!(temp.path().join("alice").join("entries.json").exists());
    }

    #[test]
    fn test_users_are_isolated() {
        let (storage, _temp) = setup();
        storage.add_entry("alice", LogEntry::new("Apple"), 1).unwrap();
        assert!(storage.list_entries("bob").unwrap().is_empty());
    }

    #[test]
    fn test_remove_entry() {
        let (storage, _temp) = setup();
        let (saved, _) = storage.add_entry("alice", LogEntry::new("Apple"), 1).unwrap();
        storage.add_entry("alice", LogEntry::new("Pear"), 2).unwrap();

        let remaining = storage
            .remove_entry("alice", saved.id.as_deref().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "Pear");

        assert!(storage.remove_entry("alice", "missing").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_entries_file_is_an_error() {
        let (storage, temp) = setup();
        let dir = temp.path().join("alice");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("entries.json"), b"not json").unwrap();

        assert!(matches!(
            storage.list_entries("alice"),
            Err(StorageError::JsonError(_, _))
        ));
    }

    #[test]
    fn test_set_profile_creates_and_merges() {
        let (storage, _temp) = setup();
        assert!(storage.get_profile("alice").unwrap().is_none());

        let created = storage
            .set_profile(
                "alice",
                &ProfileUpdate {
                    email: Some("alice@example.com".to_string()),
                    macro_goals: None,
                },
            )
            .unwrap();
        assert_eq!(created.email.as_deref(), Some("alice@example.com"));
        assert!(created.macro_goals.is_none());

        let goals = MacroGoals::new(1800.0, 120.0, 200.0, 60.0);
        let merged = storage
            .set_profile(
                "alice",
                &ProfileUpdate {
                    email: None,
                    macro_goals: Some(goals),
                },
            )
            .unwrap();
        assert_eq!(merged.email.as_deref(), Some("alice@example.com"));
        assert_eq!(merged.macro_goals, Some(goals));
        assert_eq!(storage.get_profile("alice").unwrap(), Some(merged));
    }

    #[test]
    fn test_update_profile_requires_existing() {
        let (storage, _temp) = setup();
        let fields = ProfileUpdate {
            email: None,
            macro_goals: Some(MacroGoals::default()),
        };

        assert!(storage.update_profile("alice", &fields).unwrap().is_none());
        assert!(storage.get_profile("alice").unwrap().is_none());

        storage.set_profile("alice", &ProfileUpdate::default()).unwrap();
        let updated = storage.update_profile("alice", &fields).unwrap().unwrap();
        assert_eq!(updated.macro_goals, Some(MacroGoals::default()));
    }
}
