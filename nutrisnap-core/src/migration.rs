//! Moves history into a durable account.
//!
//! Two merges run when a user authenticates:
//!
//! 1. **Local → Remote**: every device day bucket is pushed into the
//!    account, skipping entries whose fingerprint already exists there.
//!    A bucket is deleted only once all of its entries were confirmed.
//! 2. **Anonymous → Authenticated**: entries stored remotely under a
//!    remembered anonymous uid are copied into the account. The anonymous
//!    collection is never modified.
//!
//! Both are idempotent: fingerprints make re-runs push nothing new.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::clock::Clock;
use crate::local::{LocalStore, LocalStoreError};
use crate::models::{fingerprint_set, Fingerprint, LogEntry};
use crate::remote::{RemoteError, RemoteStore};

/// A migration that could not run at all. Local data is untouched.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Failed to fetch entries for {uid}: {source}")]
    Fetch {
        uid: String,
        #[source]
        source: RemoteError,
    },

    #[error("Local storage error: {0}")]
    Local(#[from] LocalStoreError),
}

/// Outcome of a migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Entries written to the account.
    pub pushed: usize,
    /// Entries already present in the account.
    pub skipped: usize,
    /// Entries whose push failed.
    pub failed: usize,
    pub buckets_cleared: usize,
    /// Buckets left on the device for a later run.
    pub buckets_retained: usize,
}

impl MigrationReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.buckets_retained == 0
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pushed, {} already present, {} failed",
            self.pushed, self.skipped, self.failed
        )?;
        if self.buckets_cleared + self.buckets_retained > 0 {
            write!(
                f,
                "; {} day(s) cleared, {} kept",
                self.buckets_cleared, self.buckets_retained
            )?;
        }
        Ok(())
    }
}

pub struct MigrationEngine {
    last_migrated_uid: Option<String>,
    clock: Arc<dyn Clock>,
}

impl MigrationEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            last_migrated_uid: None,
            clock,
        }
    }

    /// The uid whose local history was already moved in this session.
    pub fn last_migrated_uid(&self) -> Option<&str> {
        self.last_migrated_uid.as_deref()
    }

    /// Pushes every device bucket into `uid`'s remote log.
    ///
    /// Runs at most once per uid per session. Pushes that fail keep their
    /// bucket on the device, but the uid is still marked migrated; a new
    /// session retries. A failed initial fetch leaves the uid unmarked.
    pub async fn migrate_local_to_remote(
        &mut self,
        uid: &str,
        local: &LocalStore,
        remote: &dyn RemoteStore,
    ) -> Result<MigrationReport, MigrationError> {
        if self.last_migrated_uid.as_deref() == Some(uid) {
            tracing::debug!("Local history already migrated to {}", uid);
            return Ok(MigrationReport::default());
        }

        let existing = remote
            .list(uid)
            .await
            .map_err(|source| MigrationError::Fetch {
                uid: uid.to_string(),
                source,
            })?;
        let mut known = fingerprint_set(&existing);
        let buckets = local.day_buckets()?;

        let mut report = MigrationReport::default();
        for bucket in buckets {
            let entries = match local.read_bucket(&bucket.key) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Skipping unreadable bucket {}: {}", bucket.key, e);
                    report.buckets_retained += 1;
                    continue;
                }
            };

            let mut bucket_failed = false;
            for entry in &entries {
                match self.push_if_new(uid, entry, &mut known, remote).await {
                    Ok(true) => report.pushed += 1,
                    Ok(false) => report.skipped += 1,
                    Err(e) => {
                        tracing::warn!(
                            "Failed to migrate {} from {}: {}",
                            entry.name,
                            bucket.key,
                            e
                        );
                        report.failed += 1;
                        bucket_failed = true;
                    }
                }
            }

            if bucket_failed {
                report.buckets_retained += 1;
                continue;
            }
            match local.remove_bucket(&bucket.key) {
                Ok(_) => report.buckets_cleared += 1,
                Err(e) => {
                    tracing::warn!("Failed to clear migrated bucket {}: {}", bucket.key, e);
                    report.buckets_retained += 1;
                }
            }
        }

        self.last_migrated_uid = Some(uid.to_string());
        tracing::info!("Migrated local history to {}: {}", uid, report);
        Ok(report)
    }

    /// Merges the remembered anonymous uid into `uid`, if there is one.
    ///
    /// Returns `None` when no anonymous session is pending.
    pub async fn migrate_pending_anonymous(
        &self,
        uid: &str,
        local: &LocalStore,
        remote: &dyn RemoteStore,
    ) -> Result<Option<MigrationReport>, MigrationError> {
        match local.pending_anon_uid()? {
            Some(anon_uid) => self
                .migrate_anonymous(&anon_uid, uid, local, remote)
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    /// Copies entries from `anon_uid` into `uid`, then forgets `anon_uid`.
    ///
    /// The marker is cleared only when every entry made it across, even if
    /// there was nothing to copy. Any failure keeps it for a later retry.
    pub async fn migrate_anonymous(
        &self,
        anon_uid: &str,
        uid: &str,
        local: &LocalStore,
        remote: &dyn RemoteStore,
    ) -> Result<MigrationReport, MigrationError> {
        let mut report = MigrationReport::default();

        if anon_uid != uid {
            let anonymous = remote
                .list(anon_uid)
                .await
                .map_err(|source| MigrationError::Fetch {
                    uid: anon_uid.to_string(),
                    source,
                })?;

            if !anonymous.is_empty() {
                let existing = remote
                    .list(uid)
                    .await
                    .map_err(|source| MigrationError::Fetch {
                        uid: uid.to_string(),
                        source,
                    })?;
                let mut known = fingerprint_set(&existing);

                for entry in &anonymous {
                    match self.push_if_new(uid, entry, &mut known, remote).await {
                        Ok(true) => report.pushed += 1,
                        Ok(false) => report.skipped += 1,
                        Err(e) => {
                            tracing::warn!(
                                "Failed to merge {} from {}: {}",
                                entry.name,
                                anon_uid,
                                e
                            );
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        if report.failed == 0 {
            local.clear_pending_anon_uid()?;
        }
        tracing::info!("Merged anonymous session {} into {}: {}", anon_uid, uid, report);
        Ok(report)
    }

    /// Pushes `entry` unless its fingerprint is already known. Returns
    /// whether it was pushed.
    async fn push_if_new(
        &self,
        uid: &str,
        entry: &LogEntry,
        known: &mut HashSet<Fingerprint>,
        remote: &dyn RemoteStore,
    ) -> Result<bool, RemoteError> {
        let fingerprint = entry.fingerprint();
        if known.contains(&fingerprint) {
            return Ok(false);
        }

        let saved = remote
            .add(uid, entry.to_unsaved(self.clock.now_millis()))
            .await?;
        tracing::debug!("Pushed {} to {}", fingerprint, uid);
        known.insert(fingerprint);
        known.insert(saved.fingerprint());
        Ok(true)
    }
}

impl fmt::Debug for MigrationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationEngine")
            .field("last_migrated_uid", &self.last_migrated_uid)
            .finish_non_exhaustive()
    }
}
