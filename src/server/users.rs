//! API keys and per-user access rules.
//!
//! Keys are loaded from the server config file (see [`crate::config`]),
//! which `nutrisnap-admin` maintains.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::config::{ApiKeyEntry, ConfigFile};

/// Account attached to a request after authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
    pub anonymous: bool,
    /// Anonymous uids this account may list entries of.
    #[serde(skip)]
    pub merge_from: Vec<String>,
}

/// What a request wants to do with a user's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ListEntries,
    WriteEntries,
    Subscribe,
    ReadProfile,
    WriteProfile,
}

/// Maps API keys to accounts.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, AuthUser>,
    anonymous_uids: HashSet<String>,
}

impl ApiKeyStore {
    pub fn from_entries(entries: impl IntoIterator<Item = ApiKeyEntry>) -> Self {
        let mut store = Self::default();
        for entry in entries {
            if entry.anonymous {
                store.anonymous_uids.insert(entry.user_id.clone());
            }
            store.keys.insert(
                entry.key,
                AuthUser {
                    user_id: entry.user_id,
                    email: entry.email,
                    anonymous: entry.anonymous,
                    merge_from: entry.merge_from,
                },
            );
        }
        store
    }

    /// Loads keys from the config file. A missing or unreadable file
    /// yields an empty store, so every authenticated request fails.
    pub fn load(config_path: &Path) -> Self {
        match ConfigFile::load(config_path) {
            Ok(file) => {
                let store = Self::from_entries(file.api_keys);
                if store.is_empty() {
                    tracing::warn!("No API keys loaded - all authenticated requests will fail");
                } else {
                    tracing::info!("Loaded {} API key(s)", store.len());
                }
                store
            }
            Err(e) => {
                tracing::warn!("{}", e);
                tracing::warn!("No API keys loaded - all authenticated requests will fail");
                Self::default()
            }
        }
    }

    pub fn validate(&self, key: &str) -> Option<AuthUser> {
        self.keys.get(key).cloned()
    }

    /// Whether `uid` belongs to an anonymous (guest) account.
    pub fn is_anonymous(&self, uid: &str) -> bool {
        self.anonymous_uids.contains(uid)
    }

    /// A key has full access to its own uid. It may also list the entries
    /// of an anonymous uid linked to it through `merge_from`, which is how
    /// a guest's log is carried over to the account the guest signs in to.
    pub fn authorize(&self, user: &AuthUser, uid: &str, action: Action) -> bool {
        if user.user_id == uid {
            return true;
        }
        action == Action::ListEntries
            && self.is_anonymous(uid)
            && user.merge_from.iter().any(|linked| linked == uid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
