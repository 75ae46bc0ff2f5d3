//! NutriSnap Core Library
//!
//! The food log's reconciliation layer: device-local and remote stores,
//! identity tracking, migration of history into an account, and the
//! coordinator the presentation layer talks to.

pub mod classifier;
pub mod clock;
pub mod coordinator;
pub mod identity;
pub mod local;
pub mod migration;
pub mod models;
pub mod notice;
pub mod progress;
pub mod remote;

#[cfg(test)]
mod testing;

pub use classifier::{ClassifierError, FoodClassifier, FoodImage, HttpClassifier};
pub use clock::{Clock, FixedClock, SystemClock};
pub use coordinator::{CoordinatorEvent, LogCoordinator, StoreMode};
pub use identity::{Identity, IdentityEvents, IdentityResolver};
pub use local::{FileKeyValueStore, KeyValueStore, LocalStore, LocalStoreError, MemoryKeyValueStore};
pub use migration::{MigrationEngine, MigrationError, MigrationReport};
pub use models::{Fingerprint, FoodItem, LogEntry, MacroGoals, ProfileUpdate, UserProfile};
pub use notice::{Notice, NoticeKind, NoticeReceiver, Notifier};
pub use progress::{DailyProgress, MacroProgress, MacroTotals};
pub use remote::{
    Account, HttpRemoteStore, MemoryRemoteStore, RemoteError, RemoteStore, Subscription,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
