//! Wires the core components together for one command invocation.

use std::sync::Arc;
use std::time::Duration;

use nutrisnap_core::{
    FileKeyValueStore, HttpClassifier, HttpRemoteStore, Identity, IdentityEvents,
    IdentityResolver, LocalStore, LogCoordinator, MemoryRemoteStore, NoticeKind, NoticeReceiver,
    Notifier, RemoteStore, StoreMode, SystemClock,
};

use crate::config::Config;

/// How long to wait for the first push after signing in.
const FIRST_PUSH_TIMEOUT: Duration = Duration::from_secs(3);

pub struct Session {
    pub coordinator: LogCoordinator,
    pub resolver: IdentityResolver,
    pub events: IdentityEvents,
    pub notices: NoticeReceiver,
    notifier: Notifier,
}

impl Session {
    /// Builds the coordinator, resolves the identity for the configured
    /// key and applies it.
    pub async fn open(config: &Config) -> Self {
        tracing::debug!("Opening food log in {}", config.data_dir.value.display());
        let local = LocalStore::new(Arc::new(FileKeyValueStore::new(
            config.data_dir.value.clone(),
        )));
        let http = match (&config.sync.server_url, &config.sync.api_key) {
            (Some(url), Some(key)) => Some(HttpRemoteStore::new(url.clone(), key.clone())),
            _ => None,
        };
        let remote: Arc<dyn RemoteStore> = match &http {
            Some(http) => Arc::new(http.clone()),
            // Unused: without a key the identity stays unauthenticated.
            None => Arc::new(MemoryRemoteStore::new()),
        };

        let (notifier, notices) = Notifier::channel();
        let coordinator =
            LogCoordinator::new(local, remote, Arc::new(SystemClock), notifier.clone());
        let resolver = IdentityResolver::new();
        let events = resolver.subscribe();

        let mut session = Self {
            coordinator,
            resolver,
            events,
            notices,
            notifier,
        };

        let identity = match &http {
            Some(http) => session.resolve_account(http).await,
            None => Identity::Unauthenticated,
        };
        tracing::debug!("Resolved identity: {}", identity);
        session.resolver.resolve(identity);
        session.coordinator.next_event(&mut session.events).await;

        if matches!(session.coordinator.mode(), StoreMode::Remote { .. }) {
            session.coordinator.await_push(FIRST_PUSH_TIMEOUT).await;
        }
        session
    }

    async fn resolve_account(&self, http: &HttpRemoteStore) -> Identity {
        match http.fetch_account().await {
            Ok(account) => account.into_identity(),
            Err(e) => {
                self.notifier.raise(
                    NoticeKind::Remote,
                    "Could not reach the sync server; using this device's log",
                    &e,
                );
                Identity::Unauthenticated
            }
        }
    }

    /// Raises a notice on this session's channel.
    pub fn raise(
        &self,
        kind: NoticeKind,
        message: impl Into<String>,
        error: &dyn std::fmt::Display,
    ) {
        self.notifier.raise(kind, message, error);
    }

    /// Prints queued notices to stderr.
    pub fn print_notices(&mut self) {
        for notice in self.notices.drain() {
            eprintln!("Warning: {}", notice);
        }
    }
}

/// The configured classifier, if any.
pub fn classifier(config: &Config) -> Result<HttpClassifier, Box<dyn std::error::Error>> {
    let url = config
        .classifier
        .url
        .as_ref()
        .ok_or("Classifier not configured. Set classifier.url in config or SNAP_CLASSIFIER_URL.")?;
    Ok(HttpClassifier::new(
        url.clone(),
        config.classifier.api_key.clone(),
    ))
}
