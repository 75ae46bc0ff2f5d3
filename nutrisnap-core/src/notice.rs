//! User-visible, non-fatal notices.
//!
//! Failures in the reconciliation layer never abort an operation. They are
//! logged and forwarded to the presentation layer as [`Notice`]s, which it
//! shows as dismissible messages.

use std::fmt;

use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    /// Network or permission failure talking to the remote store.
    Remote,
    /// The device store could not read or write.
    LocalPersistence,
    /// Migration failed or only partially completed.
    Migration,
    /// The food classifier failed.
    Classifier,
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoticeKind::Remote => write!(f, "remote"),
            NoticeKind::LocalPersistence => write!(f, "local storage"),
            NoticeKind::Migration => write!(f, "migration"),
            NoticeKind::Classifier => write!(f, "classifier"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Sending side of the notice channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl Notifier {
    /// Creates a connected notifier and receiver.
    pub fn channel() -> (Notifier, NoticeReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Notifier { tx }, NoticeReceiver { rx })
    }

    /// Logs `error` and raises a notice with `message`.
    pub fn raise(&self, kind: NoticeKind, message: impl Into<String>, error: &dyn fmt::Display) {
        let notice = Notice::new(kind, message);
        tracing::warn!(kind = %notice.kind, error = %error, "{}", notice.message);
        // A dropped receiver just means nobody is showing notices.
        let _ = self.tx.send(notice);
    }
}

/// Receiving side of the notice channel.
#[derive(Debug)]
pub struct NoticeReceiver {
    rx: mpsc::UnboundedReceiver<Notice>,
}

impl NoticeReceiver {
    pub async fn recv(&mut self) -> Option<Notice> {
        self.rx.recv().await
    }

    /// Takes every notice queued so far.
    pub fn drain(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        while let Ok(notice) = self.rx.try_recv() {
            notices.push(notice);
        }
        notices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raise_and_drain() {
        let (notifier, mut rx) = Notifier::channel();
        notifier.raise(NoticeKind::Remote, "Could not save", &"timeout");
        notifier.raise(NoticeKind::Migration, "Partial", &"1 failed");

        let notices = rx.drain();
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0].kind, NoticeKind::Remote);
        assert_eq!(notices[1].to_string(), "[migration] Partial");
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn test_raise_without_receiver_is_harmless() {
        let (notifier, rx) = Notifier::channel();
        drop(rx);
        notifier.raise(NoticeKind::LocalPersistence, "Quota", &"full");
    }
}
