//! The food log façade used by the presentation layer.
//!
//! [`LogCoordinator`] owns the visible entry collection and routes every
//! write to the right backing store for the current identity:
//!
//! | Identity | Backing store | Live updates |
//! |---|---|---|
//! | loading / unauthenticated / anonymous | selected day's local bucket | none |
//! | authenticated | remote log of the uid | one subscription |
//!
//! On sign-in the coordinator upserts the profile, runs both migrations,
//! loads goals and then subscribes, strictly in that order. Writes are
//! optimistic: the collection changes first and is never rolled back when
//! the durable write fails; a notice is raised instead.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;

use crate::clock::{timestamp_for_day, Clock};
use crate::identity::{Identity, IdentityEvents};
use crate::local::LocalStore;
use crate::migration::MigrationEngine;
use crate::models::{FoodItem, LogEntry, MacroGoals, ProfileUpdate};
use crate::notice::{NoticeKind, Notifier};
use crate::progress::{entries_on_day, DailyProgress, MacroTotals};
use crate::remote::{RemoteStore, Subscription};

/// Where writes currently go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreMode {
    /// No identity resolved yet. Writes go to the local bucket.
    Loading,
    Local,
    Remote { uid: String },
}

/// What [`LogCoordinator::next_event`] applied.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    IdentityChanged(Identity),
    /// A push replaced the collection; carries the new entry count.
    EntriesPushed(usize),
    /// The live subscription ended on the remote side.
    SubscriptionClosed,
}

pub struct LogCoordinator {
    local: LocalStore,
    remote: Arc<dyn RemoteStore>,
    migration: MigrationEngine,
    clock: Arc<dyn Clock>,
    notifier: Notifier,
    identity: Option<Identity>,
    subscription: Option<Subscription>,
    entries: Vec<LogEntry>,
    goals: MacroGoals,
    selected_date: NaiveDate,
    generation: u64,
}

impl LogCoordinator {
    /// Creates a coordinator in the loading state, showing today's local
    /// bucket.
    pub fn new(
        local: LocalStore,
        remote: Arc<dyn RemoteStore>,
        clock: Arc<dyn Clock>,
        notifier: Notifier,
    ) -> Self {
        let selected_date = clock.now().with_timezone(&chrono::Local).date_naive();
        let mut coordinator = Self {
            local,
            remote,
            migration: MigrationEngine::new(clock.clone()),
            clock,
            notifier,
            identity: None,
            subscription: None,
            entries: Vec::new(),
            goals: MacroGoals::default(),
            selected_date,
            generation: 0,
        };
        coordinator.load_local_day();
        coordinator.load_local_goals();
        coordinator
    }

    // ==================== Read Side ====================

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// The visible collection filtered to the selected day.
    pub fn entries_for_selected_day(&self) -> Vec<LogEntry> {
        entries_on_day(&self.entries, self.selected_date)
    }

    pub fn goals(&self) -> MacroGoals {
        self.goals
    }

    pub fn progress(&self) -> DailyProgress {
        let day = self.entries_for_selected_day();
        DailyProgress::new(MacroTotals::of(&day), &self.goals)
    }

    pub fn selected_date(&self) -> NaiveDate {
        self.selected_date
    }

    /// `None` while the identity is still loading.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn mode(&self) -> StoreMode {
        match &self.identity {
            None => StoreMode::Loading,
            Some(identity) => match identity.durable_uid() {
                Some(uid) => StoreMode::Remote {
                    uid: uid.to_string(),
                },
                None => StoreMode::Local,
            },
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn migration(&self) -> &MigrationEngine {
        &self.migration
    }

    // ==================== Identity ====================

    /// Switches the coordinator to `identity`.
    ///
    /// The current subscription is torn down before anything else. For an
    /// authenticated identity the profile upsert, both migrations, goal
    /// loading and the new subscription then run one after another.
    pub async fn handle_identity(&mut self, identity: Identity) {
        self.generation += 1;
        let generation = self.generation;
        tracing::info!("Identity change #{}: {}", generation, identity);

        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.identity = Some(identity.clone());

        match identity {
            Identity::Unauthenticated => self.enter_local_mode(),
            Identity::Anonymous { uid } => {
                if let Err(e) = self.local.set_pending_anon_uid(&uid) {
                    self.notifier.raise(
                        NoticeKind::LocalPersistence,
                        "Could not remember this guest session",
                        &e,
                    );
                }
                self.enter_local_mode();
            }
            Identity::Authenticated { uid, email } => {
                self.enter_remote_mode(&uid, email).await;
            }
        }

        tracing::debug!("Identity change #{} done, mode {:?}", generation, self.mode());
    }

    fn enter_local_mode(&mut self) {
        self.load_local_day();
        self.load_local_goals();
    }

    async fn enter_remote_mode(&mut self, uid: &str, email: Option<String>) {
        self.entries.clear();

        if let Err(e) = self.remote.set_profile(uid, ProfileUpdate::email(email)).await {
            self.notifier
                .raise(NoticeKind::Remote, "Could not update your profile", &e);
        }

        match self
            .migration
            .migrate_local_to_remote(uid, &self.local, self.remote.as_ref())
            .await
        {
            Ok(report) if report.failed > 0 => self.notifier.raise(
                NoticeKind::Migration,
                format!(
                    "{} entries could not be moved to your account and stay on this device",
                    report.failed
                ),
                &report,
            ),
            Ok(report) if !report.is_complete() => self.notifier.raise(
                NoticeKind::Migration,
                format!(
                    "{} day(s) of history could not be moved and stay on this device",
                    report.buckets_retained
                ),
                &report,
            ),
            Ok(_) => {}
            Err(e) => self.notifier.raise(
                NoticeKind::Migration,
                "Could not move this device's history to your account",
                &e,
            ),
        }

        match self
            .migration
            .migrate_pending_anonymous(uid, &self.local, self.remote.as_ref())
            .await
        {
            Ok(Some(report)) if report.failed > 0 => self.notifier.raise(
                NoticeKind::Migration,
                "Some guest entries could not be merged; will retry next time",
                &report,
            ),
            Ok(_) => {}
            Err(e) => self.notifier.raise(
                NoticeKind::Migration,
                "Could not merge your guest history",
                &e,
            ),
        }

        self.load_remote_goals(uid).await;

        match self.remote.subscribe(uid).await {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => self
                .notifier
                .raise(NoticeKind::Remote, "Live updates are unavailable", &e),
        }
    }

    /// Waits for the next identity change or push and applies it.
    ///
    /// Returns `None` once the identity stream has ended.
    pub async fn next_event(
        &mut self,
        identities: &mut IdentityEvents,
    ) -> Option<CoordinatorEvent> {
        enum Incoming {
            Identity(Option<Identity>),
            Push(Option<Vec<LogEntry>>),
        }

        let incoming = {
            let subscription = &mut self.subscription;
            let push = async {
                match subscription.as_mut() {
                    Some(subscription) => subscription.next().await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                identity = identities.next() => Incoming::Identity(identity),
                entries = push => Incoming::Push(entries),
            }
        };

        match incoming {
            Incoming::Identity(Some(identity)) => {
                self.handle_identity(identity.clone()).await;
                Some(CoordinatorEvent::IdentityChanged(identity))
            }
            Incoming::Identity(None) => None,
            Incoming::Push(Some(entries)) => {
                self.apply_push(entries);
                Some(CoordinatorEvent::EntriesPushed(self.entries.len()))
            }
            Incoming::Push(None) => {
                self.subscription = None;
                self.notifier.raise(
                    NoticeKind::Remote,
                    "Live updates stopped",
                    &"subscription closed",
                );
                Some(CoordinatorEvent::SubscriptionClosed)
            }
        }
    }

    /// Applies the newest push, waiting up to `wait` for one to arrive.
    /// Returns whether a push was applied.
    pub async fn await_push(&mut self, wait: Duration) -> bool {
        let Some(subscription) = self.subscription.as_mut() else {
            return false;
        };
        match tokio::time::timeout(wait, subscription.next()).await {
            Ok(Some(entries)) => {
                let latest = subscription.try_latest().unwrap_or(entries);
                self.apply_push(latest);
                true
            }
            Ok(None) => {
                self.subscription = None;
                false
            }
            Err(_) => false,
        }
    }

    fn apply_push(&mut self, entries: Vec<LogEntry>) {
        tracing::debug!("Push replaced collection with {} entries", entries.len());
        self.entries = entries;
    }

    // ==================== Writes ====================

    /// Logs `items` on the selected day.
    ///
    /// Each item is stamped with the current time when the selected day is
    /// today, or the selected date at the current time of day otherwise.
    ///
    /// When signed in, an item whose remote add fails stays in memory only
    /// and a notice is raised. It is not written to a device bucket, since
    /// buckets are left alone under an account, so it is lost once the
    /// process exits unless the user logs it again.
    pub async fn add_entries(&mut self, items: &[FoodItem]) {
        if items.is_empty() {
            return;
        }
        let timestamp = timestamp_for_day(self.selected_date, self.clock.now());
        let new: Vec<LogEntry> = items
            .iter()
            .map(|item| LogEntry::from_food_item(item, timestamp))
            .collect();
        self.entries.extend(new.iter().cloned());

        match self.mode() {
            StoreMode::Remote { uid } => {
                for entry in new {
                    match self.remote.add(&uid, entry.clone()).await {
                        Ok(saved) => self.confirm(&entry, saved),
                        Err(e) => self.notifier.raise(
                            NoticeKind::Remote,
                            format!("Could not save {}", entry.name),
                            &e,
                        ),
                    }
                }
            }
            StoreMode::Local | StoreMode::Loading => self.save_local_day(),
        }
    }

    /// Replaces the optimistic copy of `pending` with the stored entry.
    fn confirm(&mut self, pending: &LogEntry, saved: LogEntry) {
        let fingerprint = pending.fingerprint();
        if let Some(slot) = self
            .entries
            .iter_mut()
            .find(|e| e.id.is_none() && e.fingerprint() == fingerprint)
        {
            *slot = saved;
        }
    }

    /// Removes the entry with `id`. Returns whether it was visible.
    pub async fn remove_entry(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id.as_deref() != Some(id));
        if self.entries.len() == before {
            return false;
        }

        match self.mode() {
            StoreMode::Remote { uid } => {
                if let Err(e) = self.remote.remove(&uid, id).await {
                    self.notifier
                        .raise(NoticeKind::Remote, "Could not delete the entry", &e);
                }
            }
            StoreMode::Local | StoreMode::Loading => self.save_local_day(),
        }
        true
    }

    /// Saves new goals on the device, and on the account when signed in.
    pub async fn set_goals(&mut self, goals: MacroGoals) {
        self.goals = goals;

        if let StoreMode::Remote { uid } = self.mode() {
            if let Err(e) = self
                .remote
                .set_profile(&uid, ProfileUpdate::goals(goals))
                .await
            {
                self.notifier
                    .raise(NoticeKind::Remote, "Could not save goals to your account", &e);
            }
        }
        self.save_local_goals();
    }

    /// Changes the selected day. In local mode the collection is reloaded
    /// from that day's bucket.
    pub fn select_date(&mut self, date: NaiveDate) {
        self.selected_date = date;
        if !matches!(self.mode(), StoreMode::Remote { .. }) {
            self.load_local_day();
        }
    }

    // ==================== Helpers ====================

    fn load_local_day(&mut self) {
        match self.local.read_day(self.selected_date) {
            Ok(entries) => self.entries = entries,
            Err(e) => {
                self.entries.clear();
                self.notifier.raise(
                    NoticeKind::LocalPersistence,
                    "Could not read the food log",
                    &e,
                );
            }
        }
    }

    fn save_local_day(&mut self) {
        match self.local.write_day(self.selected_date, &self.entries) {
            Ok(written) => self.entries = written,
            Err(e) => self.notifier.raise(
                NoticeKind::LocalPersistence,
                "Could not save the food log",
                &e,
            ),
        }
    }

    fn read_local_goals(&self) -> Option<MacroGoals> {
        match self.local.read_goals() {
            Ok(goals) => goals,
            Err(e) => {
                self.notifier
                    .raise(NoticeKind::LocalPersistence, "Could not read goals", &e);
                None
            }
        }
    }

    /// Mirrors the current goals into the device record.
    fn save_local_goals(&self) {
        if let Err(e) = self.local.write_goals(&self.goals) {
            self.notifier
                .raise(NoticeKind::LocalPersistence, "Could not save goals", &e);
        }
    }

    fn load_local_goals(&mut self) {
        self.goals = self.read_local_goals().unwrap_or_default();
    }

    /// Takes goals from the profile. A profile without goals adopts the
    /// device's goals and pushes them to the account.
    async fn load_remote_goals(&mut self, uid: &str) {
        let profile = match self.remote.get_profile(uid).await {
            Ok(profile) => profile,
            Err(e) => {
                self.notifier
                    .raise(NoticeKind::Remote, "Could not load your goals", &e);
                self.load_local_goals();
                return;
            }
        };

        if let Some(goals) = profile.and_then(|p| p.macro_goals) {
            self.goals = goals;
            self.save_local_goals();
            return;
        }

        match self.read_local_goals() {
            Some(goals) => {
                self.goals = goals;
                if let Err(e) = self
                    .remote
                    .update_profile(uid, ProfileUpdate::goals(goals))
                    .await
                {
                    self.notifier
                        .raise(NoticeKind::Remote, "Could not save goals to your account", &e);
                }
            }
            None => self.goals = MacroGoals::default(),
        }
    }
}

impl std::fmt::Debug for LogCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogCoordinator")
            .field("identity", &self.identity)
            .field("entries", &self.entries.len())
            .field("selected_date", &self.selected_date)
            .field("subscribed", &self.subscription.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityResolver;
    use crate::local::{bucket_key, KeyValueStore, MemoryKeyValueStore};
    use crate::notice::NoticeReceiver;
    use crate::testing::{
        fixed_clock, flaky_local_store, Call, FlakyKeyValueStore, RecordingRemote,
    };

    struct Harness {
        coordinator: LogCoordinator,
        remote: Arc<RecordingRemote>,
        local: LocalStore,
        notices: NoticeReceiver,
    }

    fn harness_with(local: LocalStore) -> Harness {
        let remote = Arc::new(RecordingRemote::new());
        let (notifier, notices) = Notifier::channel();
        let coordinator =
            LogCoordinator::new(local.clone(), remote.clone(), fixed_clock(), notifier);
        Harness {
            coordinator,
            remote,
            local,
            notices,
        }
    }

    fn harness() -> Harness {
        harness_with(LocalStore::new(Arc::new(MemoryKeyValueStore::new())))
    }

    fn flaky_harness() -> (Harness, Arc<FlakyKeyValueStore>) {
        let (local, kv) = flaky_local_store();
        (harness_with(local), kv)
    }

    fn rice() -> FoodItem {
        FoodItem::new("Rice").with_macros(200.0, 4.0, 44.0, 0.5)
    }

    fn signed_in(uid: &str) -> Identity {
        Identity::authenticated(uid, Some(format!("{}@example.com", uid)))
    }

    #[tokio::test]
    async fn test_starts_loading_with_default_goals() {
        let h = harness();
        assert_eq!(h.coordinator.mode(), StoreMode::Loading);
        assert!(h.coordinator.identity().is_none());
        assert_eq!(h.coordinator.goals(), MacroGoals::default());
        assert!(h.coordinator.entries().is_empty());
    }

    #[tokio::test]
    async fn test_local_add_writes_selected_bucket() {
        let mut h = harness();
        h.coordinator.handle_identity(Identity::Unauthenticated).await;
        h.coordinator.add_entries(&[rice()]).await;

        let today = h.coordinator.selected_date();
        let stored = h.local.read_day(today).unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].id.as_deref().unwrap().starts_with("local-"));
        assert_eq!(h.coordinator.entries(), stored.as_slice());
        assert!(h.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_local_remove_rewrites_bucket() {
        let mut h = harness();
        h.coordinator.handle_identity(Identity::Unauthenticated).await;
        h.coordinator
            .add_entries(&[rice(), FoodItem::new("Egg")])
            .await;
        let id = h.coordinator.entries()[0].id.clone().unwrap();

        assert!(h.coordinator.remove_entry(&id).await);
        assert!(!h.coordinator.remove_entry("missing").await);

        let stored = h.local.read_day(h.coordinator.selected_date()).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "Egg");
    }

    #[tokio::test]
    async fn test_local_write_failure_keeps_optimistic_entry() {
        let (mut h, kv) = flaky_harness();
        h.coordinator.handle_identity(Identity::Unauthenticated).await;
        kv.fail_writes(true);

        h.coordinator.add_entries(&[rice()]).await;

        assert_eq!(h.coordinator.entries().len(), 1);
        let notices = h.notices.drain();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::LocalPersistence);
    }

    #[tokio::test]
    async fn test_select_date_reloads_local_bucket() {
        let mut h = harness();
        h.coordinator.handle_identity(Identity::Unauthenticated).await;
        let other = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        h.local
            .write_day(other, &[LogEntry::new("Stollen").with_timestamp(1)])
            .unwrap();

        h.coordinator.select_date(other);
        assert_eq!(h.coordinator.entries()[0].name, "Stollen");
    }

    #[tokio::test]
    async fn test_add_on_past_day_keeps_time_of_day() {
        let mut h = harness();
        h.coordinator.handle_identity(Identity::Unauthenticated).await;
        let today = h.coordinator.selected_date();
        let yesterday = today.pred_opt().unwrap();

        h.coordinator.select_date(yesterday);
        h.coordinator.add_entries(&[rice()]).await;

        let ts = h.coordinator.entries()[0].timestamp.unwrap();
        assert_eq!(crate::clock::local_date(ts), Some(yesterday));
        assert_eq!(h.local.read_day(yesterday).unwrap().len(), 1);
        assert!(h.local.read_day(today).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sign_in_migrates_bucket_and_subscribes() {
        let mut h = harness();
        let today = h.coordinator.selected_date();
        h.local
            .write_day(today, &[LogEntry::new("Rice").with_timestamp(42)])
            .unwrap();

        h.coordinator.handle_identity(signed_in("u1")).await;

        assert_eq!(h.remote.adds(), vec![Call::Add("u1".into(), "Rice".into())]);
        assert!(h.local.day_buckets().unwrap().is_empty());
        assert!(h.coordinator.is_subscribed());
        assert_eq!(
            h.coordinator.mode(),
            StoreMode::Remote {
                uid: "u1".to_string()
            }
        );

        // First push is the migrated collection.
        assert!(h.coordinator.await_push(Duration::from_secs(1)).await);
        assert_eq!(h.coordinator.entries().len(), 1);
        assert!(h.notices.drain().is_empty());
    }

    #[tokio::test]
    async fn test_sign_in_sequence_order() {
        let mut h = harness();
        h.local.set_pending_anon_uid("anon").unwrap();

        h.coordinator.handle_identity(signed_in("u1")).await;

        let calls = h.remote.calls();
        let position = |call: &Call| calls.iter().position(|c| c == call).unwrap();
        let upsert = position(&Call::SetProfile("u1".into()));
        let local_fetch = position(&Call::List("u1".into()));
        let anon_fetch = position(&Call::List("anon".into()));
        let goals = position(&Call::GetProfile("u1".into()));
        let subscribe = position(&Call::Subscribe("u1".into()));
        assert!(upsert < local_fetch);
        assert!(local_fetch < anon_fetch);
        assert!(anon_fetch < goals);
        assert!(goals < subscribe);
    }

    #[tokio::test]
    async fn test_switching_accounts_unsubscribes_before_subscribing() {
        let mut h = harness();
        h.coordinator.handle_identity(signed_in("a")).await;
        h.coordinator.handle_identity(signed_in("b")).await;

        let subscriptions: Vec<Call> = h
            .remote
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Subscribe(_) | Call::Unsubscribe(_)))
            .collect();
        assert_eq!(
            subscriptions,
            vec![
                Call::Subscribe("a".into()),
                Call::Unsubscribe("a".into()),
                Call::Subscribe("b".into()),
            ]
        );
        assert_eq!(h.remote.inner.subscriber_count("a"), 0);
        assert_eq!(h.remote.inner.subscriber_count("b"), 1);
    }

    #[tokio::test]
    async fn test_sign_out_tears_down_subscription() {
        let mut h = harness();
        h.coordinator.handle_identity(signed_in("u1")).await;
        h.coordinator.handle_identity(Identity::Unauthenticated).await;

        assert!(!h.coordinator.is_subscribed());
        assert_eq!(h.remote.inner.subscriber_count("u1"), 0);
        assert_eq!(h.coordinator.mode(), StoreMode::Local);
    }

    #[tokio::test]
    async fn test_remote_add_failure_keeps_item_and_raises_notice() {
        let mut h = harness();
        h.coordinator.handle_identity(signed_in("u1")).await;
        h.coordinator.await_push(Duration::from_secs(1)).await;
        h.remote.fail_all_adds(true);

        h.coordinator.add_entries(&[rice()]).await;

        assert_eq!(h.coordinator.entries().len(), 1);
        assert!(h.coordinator.entries()[0].id.is_none());
        let notices = h.notices.drain();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::Remote);
        // Authenticated writes never touch device buckets.
        assert!(h.local.day_buckets().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_add_replaces_optimistic_entry() {
        let mut h = harness();
        h.coordinator.handle_identity(signed_in("u1")).await;
        h.coordinator.await_push(Duration::from_secs(1)).await;

        h.coordinator.add_entries(&[rice()]).await;
        assert!(h.coordinator.entries()[0].id.is_some());
        assert_eq!(h.remote.inner.snapshot("u1").len(), 1);

        // The push that follows replaces the collection wholesale.
        assert!(h.coordinator.await_push(Duration::from_secs(1)).await);
        assert_eq!(h.coordinator.entries(), h.remote.inner.snapshot("u1").as_slice());
    }

    #[tokio::test]
    async fn test_remote_remove() {
        let mut h = harness();
        h.remote
            .inner
            .seed("u1", vec![LogEntry::new("Toast").with_timestamp(9)]);
        h.coordinator.handle_identity(signed_in("u1")).await;
        h.coordinator.await_push(Duration::from_secs(1)).await;

        let id = h.coordinator.entries()[0].id.clone().unwrap();
        assert!(h.coordinator.remove_entry(&id).await);
        assert!(h.remote.inner.snapshot("u1").is_empty());

        h.remote.inner.seed("u1", vec![LogEntry::new("Jam").with_timestamp(10)]);
        h.coordinator.await_push(Duration::from_secs(1)).await;
        h.remote.fail_removes(true);
        let id = h.coordinator.entries()[0].id.clone().unwrap();
        assert!(h.coordinator.remove_entry(&id).await);
        assert!(h.coordinator.entries().is_empty());
        assert_eq!(h.notices.drain()[0].kind, NoticeKind::Remote);
    }

    #[tokio::test]
    async fn test_partial_migration_raises_notice() {
        let mut h = harness();
        let today = h.coordinator.selected_date();
        h.local
            .write_day(today, &[LogEntry::new("Cake").with_timestamp(1)])
            .unwrap();
        h.remote.fail_add_of("Cake");

        h.coordinator.handle_identity(signed_in("u1")).await;

        assert_eq!(h.local.read_day(today).unwrap().len(), 1);
        assert_eq!(h.coordinator.migration().last_migrated_uid(), Some("u1"));
        let notices = h.notices.drain();
        assert!(notices.iter().any(|n| n.kind == NoticeKind::Migration));
    }

    #[tokio::test]
    async fn test_unreadable_bucket_raises_notice() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.set("foodLog-2024-01-01", "not json").unwrap();
        let mut h = harness_with(LocalStore::new(kv));

        h.coordinator.handle_identity(signed_in("u1")).await;

        let keys: Vec<String> = h
            .local
            .day_buckets()
            .unwrap()
            .into_iter()
            .map(|b| b.key)
            .collect();
        assert_eq!(keys, vec!["foodLog-2024-01-01".to_string()]);
        let notices = h.notices.drain();
        assert!(notices.iter().any(|n| n.kind == NoticeKind::Migration));
    }

    #[tokio::test]
    async fn test_failed_bucket_removal_raises_notice() {
        let (mut h, kv) = flaky_harness();
        let today = h.coordinator.selected_date();
        h.local
            .write_day(today, &[LogEntry::new("Toast").with_timestamp(1)])
            .unwrap();
        kv.fail_writes(true);

        h.coordinator.handle_identity(signed_in("u1")).await;

        assert_eq!(h.remote.inner.snapshot("u1").len(), 1);
        assert_eq!(h.local.read_day(today).unwrap().len(), 1);
        let notices = h.notices.drain();
        assert!(notices.iter().any(|n| n.kind == NoticeKind::Migration));
    }

    #[tokio::test]
    async fn test_anonymous_identity_stays_local_and_remembers_uid() {
        let mut h = harness();
        h.coordinator
            .handle_identity(Identity::anonymous("anon-1"))
            .await;
        h.coordinator.add_entries(&[rice()]).await;

        assert_eq!(h.coordinator.mode(), StoreMode::Local);
        assert!(!h.coordinator.is_subscribed());
        assert!(h.remote.calls().is_empty());
        assert_eq!(h.local.pending_anon_uid().unwrap().as_deref(), Some("anon-1"));
        assert_eq!(
            h.local.read_day(h.coordinator.selected_date()).unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_anonymous_then_sign_in_merges_and_clears_marker() {
        let mut h = harness();
        h.remote
            .inner
            .seed("anon-1", vec![LogEntry::new("Plum").with_timestamp(5)]);
        h.coordinator
            .handle_identity(Identity::anonymous("anon-1"))
            .await;
        h.coordinator.add_entries(&[rice()]).await;

        h.coordinator.handle_identity(signed_in("u1")).await;

        let mut names: Vec<String> = h
            .remote
            .inner
            .snapshot("u1")
            .into_iter()
            .map(|e| e.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["Plum", "Rice"]);
        assert!(h.local.pending_anon_uid().unwrap().is_none());
        assert!(h.local.day_buckets().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_goals_default_then_local_set() {
        let mut h = harness();
        h.coordinator.handle_identity(Identity::Unauthenticated).await;
        assert_eq!(h.coordinator.goals(), MacroGoals::default());

        let goals = MacroGoals::new(1800.0, 120.0, 200.0, 60.0);
        h.coordinator.set_goals(goals).await;

        assert_eq!(h.local.read_goals().unwrap(), Some(goals));
        assert!(h.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sign_in_adopts_local_goals() {
        let mut h = harness();
        let goals = MacroGoals::new(2200.0, 160.0, 240.0, 70.0);
        h.local.write_goals(&goals).unwrap();

        h.coordinator.handle_identity(signed_in("u1")).await;

        assert_eq!(h.coordinator.goals(), goals);
        assert!(h
            .remote
            .calls()
            .contains(&Call::UpdateProfile("u1".into())));
        let profile = h.remote.inner.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.macro_goals, Some(goals));
        assert_eq!(profile.email.as_deref(), Some("u1@example.com"));
    }

    #[tokio::test]
    async fn test_remote_goals_win_over_local() {
        let mut h = harness();
        let remote_goals = MacroGoals::new(1500.0, 100.0, 150.0, 50.0);
        h.remote
            .inner
            .set_profile("u1", ProfileUpdate::goals(remote_goals))
            .await
            .unwrap();
        h.local
            .write_goals(&MacroGoals::new(9.0, 9.0, 9.0, 9.0))
            .unwrap();

        h.coordinator.handle_identity(signed_in("u1")).await;
        assert_eq!(h.coordinator.goals(), remote_goals);
        assert_eq!(h.local.read_goals().unwrap(), Some(remote_goals));

        h.coordinator.handle_identity(Identity::Unauthenticated).await;
        assert_eq!(h.coordinator.goals(), remote_goals);
    }

    #[tokio::test]
    async fn test_remote_goals_local_write_failure_raises_notice() {
        let (mut h, kv) = flaky_harness();
        let remote_goals = MacroGoals::new(1500.0, 100.0, 150.0, 50.0);
        h.remote
            .inner
            .set_profile("u1", ProfileUpdate::goals(remote_goals))
            .await
            .unwrap();
        kv.fail_writes(true);

        h.coordinator.handle_identity(signed_in("u1")).await;

        assert_eq!(h.coordinator.goals(), remote_goals);
        let notices = h.notices.drain();
        assert!(notices
            .iter()
            .any(|n| n.kind == NoticeKind::LocalPersistence));
    }

    #[tokio::test]
    async fn test_set_goals_when_signed_in_writes_both() {
        let mut h = harness();
        h.coordinator.handle_identity(signed_in("u1")).await;
        let goals = MacroGoals::new(2100.0, 155.0, 230.0, 66.0);

        h.coordinator.set_goals(goals).await;

        let profile = h.remote.inner.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.macro_goals, Some(goals));
        assert_eq!(h.local.read_goals().unwrap(), Some(goals));
    }

    #[tokio::test]
    async fn test_progress_for_selected_day() {
        let mut h = harness();
        h.coordinator.handle_identity(Identity::Unauthenticated).await;
        h.coordinator.add_entries(&[rice(), rice()]).await;

        let progress = h.coordinator.progress();
        assert_eq!(progress.calories.consumed, 400.0);
        assert_eq!(progress.calories.percent(), 20.0);
    }

    #[tokio::test]
    async fn test_next_event_applies_identity_and_pushes() {
        let mut h = harness();
        let resolver = IdentityResolver::new();
        let mut events = resolver.subscribe();

        resolver.resolve(signed_in("u1"));
        assert_eq!(
            h.coordinator.next_event(&mut events).await,
            Some(CoordinatorEvent::IdentityChanged(signed_in("u1")))
        );
        assert_eq!(
            h.coordinator.next_event(&mut events).await,
            Some(CoordinatorEvent::EntriesPushed(0))
        );

        h.remote
            .inner
            .seed("u1", vec![LogEntry::new("Kiwi").with_timestamp(3)]);
        assert_eq!(
            h.coordinator.next_event(&mut events).await,
            Some(CoordinatorEvent::EntriesPushed(1))
        );
        assert_eq!(h.coordinator.entries()[0].name, "Kiwi");

        drop(resolver);
        assert_eq!(h.coordinator.next_event(&mut events).await, None);
    }

    #[tokio::test]
    async fn test_injected_push_replaces_collection() {
        let mut h = harness();
        let (tx, subscription) = Subscription::from_channel("u1", || {});
        h.coordinator.identity = Some(signed_in("u1"));
        h.coordinator.subscription = Some(subscription);

        tx.send(vec![LogEntry::new("A").with_id("1")]).unwrap();
        tx.send(vec![
            LogEntry::new("A").with_id("1"),
            LogEntry::new("B").with_id("2"),
        ])
        .unwrap();
        assert!(h.coordinator.await_push(Duration::from_millis(100)).await);
        assert_eq!(h.coordinator.entries().len(), 2);

        drop(tx);
        let resolver = IdentityResolver::new();
        let mut events = resolver.subscribe();
        assert_eq!(
            h.coordinator.next_event(&mut events).await,
            Some(CoordinatorEvent::SubscriptionClosed)
        );
        assert!(!h.coordinator.is_subscribed());
    }

    #[tokio::test]
    async fn test_failed_subscribe_raises_notice() {
        let mut h = harness();
        h.remote.fail_subscribe(true);
        h.coordinator.handle_identity(signed_in("u1")).await;

        assert!(!h.coordinator.is_subscribed());
        assert_eq!(h.notices.drain()[0].kind, NoticeKind::Remote);
    }

    #[tokio::test]
    async fn test_local_buckets_untouched_while_signed_in() {
        let mut h = harness();
        h.coordinator.handle_identity(signed_in("u1")).await;
        let other = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        h.coordinator.select_date(other);
        h.coordinator.add_entries(&[rice()]).await;

        assert!(h.local.day_buckets().unwrap().is_empty());
        assert_eq!(bucket_key(other), "foodLog-2024-06-01");
    }
}
