//! Account backend: per-user entry and profile storage behind API keys,
//! with live entry updates over WebSocket.

pub mod hub;
pub mod routes;
pub mod storage;
pub mod users;

pub use hub::{EntriesSnapshot, EntryHub};
pub use routes::{router, ApiError, AppState};
pub use storage::{StorageError, UserStorage};
pub use users::{Action, ApiKeyStore, AuthUser};
