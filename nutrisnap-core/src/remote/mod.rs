//! Per-user remote persistence.
//!
//! The remote store keeps every user's food log (all-time, not day
//! scoped) and profile, and pushes the full collection to subscribers
//! whenever it changes.
//!
//! Two implementations ship with the crate:
//! - [`MemoryRemoteStore`]: in-process, used for tests and offline sessions
//! - [`HttpRemoteStore`]: talks to `nutrisnap-server` over HTTP and WebSocket

mod http;
mod memory;
mod subscription;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{LogEntry, ProfileUpdate, UserProfile};

pub use http::{Account, HttpRemoteStore};
pub use memory::MemoryRemoteStore;
pub use subscription::{PushSender, Subscription};

/// Errors from the remote store. All of them are transient from the
/// caller's point of view.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Permission denied for user {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Subscription closed")]
    Closed,
}

/// Per-user keyed store with a live push channel.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// All entries for `uid`.
    async fn list(&self, uid: &str) -> Result<Vec<LogEntry>, RemoteError>;

    /// Persists `entry` (its id is ignored) and returns it with the
    /// assigned id. A missing timestamp is set to the current time.
    async fn add(&self, uid: &str, entry: LogEntry) -> Result<LogEntry, RemoteError>;

    async fn remove(&self, uid: &str, id: &str) -> Result<(), RemoteError>;

    /// Opens a push channel for `uid`. The first push is the current
    /// collection.
    async fn subscribe(&self, uid: &str) -> Result<Subscription, RemoteError>;

    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>, RemoteError>;

    /// Creates the profile or merges into it.
    async fn set_profile(&self, uid: &str, fields: ProfileUpdate) -> Result<(), RemoteError>;

    /// Merges into an existing profile; `NotFound` when there is none.
    async fn update_profile(&self, uid: &str, fields: ProfileUpdate) -> Result<(), RemoteError>;
}
