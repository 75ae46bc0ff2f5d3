//! Device-local persistence.
//!
//! [`LocalStore`] gives the food log its typed view (day buckets, goals,
//! pending anonymous uid) over any [`KeyValueStore`].

mod kv;
mod store;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use store::{bucket_key, DayBucket, LocalStore, BUCKET_PREFIX, GOALS_KEY, PENDING_ANON_UID_KEY};

/// Errors from device-local persistence.
#[derive(Error, Debug)]
pub enum LocalStoreError {
    #[error("I/O error for {}: {1}", .0.display())]
    Io(PathBuf, #[source] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}
