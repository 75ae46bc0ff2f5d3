//! Identity tracking for the food log.
//!
//! The auth provider glue calls [`IdentityResolver::resolve`] whenever the
//! session changes. Consumers call [`IdentityResolver::subscribe`] and
//! receive the current identity first, then every later transition.
//!
//! # Identity States
//!
//! 1. **Loading** - nothing resolved yet; `current()` returns `None`
//! 2. **Unauthenticated** - resolved, no user
//! 3. **Anonymous** - a throwaway session uid, not linked to credentials
//! 4. **Authenticated** - a durable account
//!
//! Transitions are never requested by this crate, only observed.

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

/// A resolved identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Unauthenticated,
    Anonymous {
        uid: String,
    },
    Authenticated {
        uid: String,
        email: Option<String>,
    },
}

impl Identity {
    pub fn anonymous(uid: impl Into<String>) -> Self {
        Identity::Anonymous { uid: uid.into() }
    }

    pub fn authenticated(uid: impl Into<String>, email: Option<String>) -> Self {
        Identity::Authenticated {
            uid: uid.into(),
            email,
        }
    }

    pub fn uid(&self) -> Option<&str> {
        match self {
            Identity::Unauthenticated => None,
            Identity::Anonymous { uid } | Identity::Authenticated { uid, .. } => Some(uid),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous { .. })
    }

    /// Returns the uid of a durable (non-anonymous) account.
    pub fn durable_uid(&self) -> Option<&str> {
        match self {
            Identity::Authenticated { uid, .. } => Some(uid),
            _ => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Unauthenticated => write!(f, "unauthenticated"),
            Identity::Anonymous { uid } => write!(f, "anonymous({})", uid),
            Identity::Authenticated { uid, .. } => write!(f, "authenticated({})", uid),
        }
    }
}

#[derive(Debug, Default)]
struct ResolverState {
    current: Option<Identity>,
    subscribers: Vec<mpsc::UnboundedSender<Identity>>,
}

/// Single subscription point for identity changes.
///
/// Cloning shares the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    state: Arc<Mutex<ResolverState>>,
}

impl IdentityResolver {
    /// Creates a resolver in the loading state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current identity, or `None` while still loading.
    pub fn current(&self) -> Option<Identity> {
        self.lock().current.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().current.is_none()
    }

    /// Records a transition and delivers it to every live subscriber.
    pub fn resolve(&self, identity: Identity) {
        let mut state = self.lock();
        match &state.current {
            Some(previous) => tracing::info!("Identity changed: {} -> {}", previous, identity),
            None => tracing::info!("Identity resolved: {}", identity),
        }
        state.current = Some(identity.clone());
        state
            .subscribers
            .retain(|tx| tx.send(identity.clone()).is_ok());
    }

    /// Subscribes to identity changes.
    ///
    /// If the identity is already resolved it is delivered immediately.
    pub fn subscribe(&self) -> IdentityEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        if let Some(current) = &state.current {
            // Receiver is alive, cannot fail.
            let _ = tx.send(current.clone());
        }
        state.subscribers.push(tx);
        IdentityEvents { rx }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ResolverState> {
        // A poisoned lock only means a subscriber panicked mid-send; the
        // state itself is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Stream of identity changes returned by [`IdentityResolver::subscribe`].
#[derive(Debug)]
pub struct IdentityEvents {
    rx: mpsc::UnboundedReceiver<Identity>,
}

impl IdentityEvents {
    /// Waits for the next identity. Returns `None` once every resolver
    /// handle has been dropped.
    pub async fn next(&mut self) -> Option<Identity> {
        self.rx.recv().await
    }

    /// Returns an already-queued identity without waiting.
    pub fn try_next(&mut self) -> Option<Identity> {
        self.rx.try_recv().ok()
    }
}
