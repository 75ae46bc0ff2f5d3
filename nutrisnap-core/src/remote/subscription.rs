use std::fmt;

use tokio::sync::mpsc;

use crate::models::LogEntry;

type Teardown = Box<dyn FnOnce() + Send>;

/// Sending half of a subscription channel.
pub type PushSender = mpsc::UnboundedSender<Vec<LogEntry>>;

/// A live push channel for one user's entries.
///
/// Each push carries the full current collection. The teardown runs
/// exactly once: on [`Subscription::unsubscribe`] or, failing that, on drop.
pub struct Subscription {
    uid: String,
    rx: mpsc::UnboundedReceiver<Vec<LogEntry>>,
    teardown: Option<Teardown>,
}

impl Subscription {
    pub fn new(
        uid: impl Into<String>,
        rx: mpsc::UnboundedReceiver<Vec<LogEntry>>,
        teardown: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            uid: uid.into(),
            rx,
            teardown: Some(Box::new(teardown)),
        }
    }

    /// Creates a subscription fed by the returned sender, for injecting
    /// pushes without a backend.
    pub fn from_channel(
        uid: impl Into<String>,
        teardown: impl FnOnce() + Send + 'static,
    ) -> (PushSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::new(uid, rx, teardown))
    }

    /// Adds work to run after the existing teardown.
    pub fn with_teardown(mut self, extra: impl FnOnce() + Send + 'static) -> Self {
        let previous = self.teardown.take();
        self.teardown = Some(Box::new(move || {
            if let Some(previous) = previous {
                previous();
            }
            extra();
        }));
        self
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Waits for the next push. `None` when the channel has closed.
    pub async fn next(&mut self) -> Option<Vec<LogEntry>> {
        self.rx.recv().await
    }

    /// Returns the most recent queued push without waiting, skipping
    /// older ones.
    pub fn try_latest(&mut self) -> Option<Vec<LogEntry>> {
        let mut latest = None;
        while let Ok(entries) = self.rx.try_recv() {
            latest = Some(entries);
        }
        latest
    }

    /// Tears the subscription down.
    pub fn unsubscribe(mut self) {
        self.run_teardown();
    }

    fn run_teardown(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            tracing::debug!("Unsubscribing from entries of {}", self.uid);
            self.rx.close();
            teardown();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_teardown();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("uid", &self.uid)
            .field("active", &self.teardown.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        (count, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_injected_pushes_arrive_in_order() {
        let (_count, teardown) = counting();
        let (tx, mut sub) = Subscription::from_channel("u1", teardown);

        tx.send(vec![LogEntry::new("A")]).unwrap();
        tx.send(vec![LogEntry::new("A"), LogEntry::new("B")]).unwrap();

        assert_eq!(sub.next().await.unwrap().len(), 1);
        assert_eq!(sub.next().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_next_returns_none_when_sender_dropped() {
        let (_count, teardown) = counting();
        let (tx, mut sub) = Subscription::from_channel("u1", teardown);
        drop(tx);
        assert!(sub.next().await.is_none());
    }

    #[test]
    fn test_try_latest_skips_stale_pushes() {
        let (_count, teardown) = counting();
        let (tx, mut sub) = Subscription::from_channel("u1", teardown);
        tx.send(vec![]).unwrap();
        tx.send(vec![LogEntry::new("A")]).unwrap();

        assert_eq!(sub.try_latest().unwrap().len(), 1);
        assert!(sub.try_latest().is_none());
    }

    #[test]
    fn test_unsubscribe_runs_teardown_once() {
        let (count, teardown) = counting();
        let (_tx, sub) = Subscription::from_channel("u1", teardown);

        sub.unsubscribe();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_with_teardown_chains() {
        let (first, teardown) = counting();
        let (second, extra) = counting();
        let (_tx, sub) = Subscription::from_channel("u1", teardown);

        sub.with_teardown(extra).unsubscribe();
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_runs_teardown() {
        let (count, teardown) = counting();
        let (_tx, sub) = Subscription::from_channel("u1", teardown);

        drop(sub);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
