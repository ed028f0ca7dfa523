//! One-shot migration of legacy local blobs into the remote table.
//!
//! Each recognized local key is migrated independently and concurrently: one
//! parsed blob, one bulk upsert. A bad key never aborts the others, and
//! because every write is an upsert on (user, collection, question), re-runs
//! are safe and produce identical rows. Local blobs are never deleted.

use crate::identity::IdentityProvider;
use crate::local::{LocalStore, PLAYLIST_PREFIX, STUDY_PLAN_PREFIX};
use crate::progress::collection_for_key;
use crate::remote::{ProgressRow, ProgressTable};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of migrating a single local key.
#[derive(Debug, Clone)]
pub struct KeyOutcome {
    pub key: String,
    pub migrated_rows: usize,
    /// None on success.
    pub error: Option<String>,
}

impl KeyOutcome {
    fn ok(key: String, migrated_rows: usize) -> Self {
        Self {
            key,
            migrated_rows,
            error: None,
        }
    }

    fn failed(key: String, error: impl Into<String>) -> Self {
        Self {
            key,
            migrated_rows: 0,
            error: Some(error.into()),
        }
    }
}

/// Per-key outcomes of one migration run.
///
/// Partial success is reported as overall failure, but keys that succeeded
/// stay migrated; the next run re-upserts them harmlessly.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub outcomes: Vec<KeyOutcome>,
}

impl MigrationReport {
    /// True only when every key migrated (vacuously true for no keys).
    pub fn succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.error.is_none())
    }

    /// Total rows written across all successful keys.
    pub fn migrated_rows(&self) -> usize {
        self.outcomes.iter().map(|o| o.migrated_rows).sum()
    }

    pub fn failed_keys(&self) -> Vec<&KeyOutcome> {
        self.outcomes.iter().filter(|o| o.error.is_some()).collect()
    }
}

/// Migrates legacy local progress into the remote table.
pub struct Migrator {
    local: Arc<dyn LocalStore>,
    table: Arc<dyn ProgressTable>,
    identity: Arc<dyn IdentityProvider>,
}

impl Migrator {
    pub fn new(
        local: Arc<dyn LocalStore>,
        table: Arc<dyn ProgressTable>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            local,
            table,
            identity,
        }
    }

    /// Any recognized legacy key present locally, regardless of content.
    pub fn has_local_progress(&self) -> bool {
        !self.local.list_keys(PLAYLIST_PREFIX).is_empty()
            || !self.local.list_keys(STUDY_PLAN_PREFIX).is_empty()
    }

    /// Any row already on the remote side for the current user. Fail-closed:
    /// false when nobody is signed in or the probe fails.
    pub async fn has_remote_progress(&self) -> bool {
        let Some(user_id) = self.identity.current_user_id() else {
            return false;
        };
        match self.table.any_for_user(&user_id).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!("remote progress probe failed: {}", e);
                false
            }
        }
    }

    /// Migrate every recognized local key for the current user.
    ///
    /// No keys is a no-op success. No signed-in user marks every key failed
    /// and writes nothing.
    pub async fn migrate(&self) -> MigrationReport {
        let mut keys = self.local.list_keys(PLAYLIST_PREFIX);
        keys.extend(self.local.list_keys(STUDY_PLAN_PREFIX));

        if keys.is_empty() {
            debug!("migration: no local progress keys, nothing to do");
            return MigrationReport::default();
        }

        let Some(user_id) = self.identity.current_user_id() else {
            warn!("migration: no authenticated user, {} key(s) skipped", keys.len());
            return MigrationReport {
                outcomes: keys
                    .into_iter()
                    .map(|key| KeyOutcome::failed(key, "no authenticated user"))
                    .collect(),
            };
        };

        info!("migrating {} local key(s) for user {}", keys.len(), user_id);

        let futures = keys
            .into_iter()
            .map(|key| self.migrate_key(user_id.clone(), key));
        let outcomes = join_all(futures).await;

        let report = MigrationReport { outcomes };
        if report.succeeded() {
            info!("migration complete: {} row(s)", report.migrated_rows());
        } else {
            warn!(
                "migration finished with failures: {} of {} key(s) failed",
                report.failed_keys().len(),
                report.outcomes.len()
            );
        }
        report
    }

    async fn migrate_key(&self, user_id: String, key: String) -> KeyOutcome {
        let Some(raw) = self.local.get(&key) else {
            return KeyOutcome::failed(key, "missing local value");
        };

        let blob = match crate::local::parse_blob(&raw) {
            Ok(blob) => blob,
            Err(e) => {
                warn!("migration: malformed blob for {}: {}", key, e);
                return KeyOutcome::failed(key, format!("malformed blob: {e}"));
            }
        };

        let Some(collection_id) = collection_for_key(&key) else {
            return KeyOutcome::failed(key, "unrecognized key prefix");
        };

        let now = Utc::now();
        let rows: Vec<ProgressRow> = blob
            .into_iter()
            .map(|(question_id, completed)| ProgressRow {
                user_id: user_id.clone(),
                playlist_id: collection_id.clone(),
                question_id,
                completed,
                completed_at: completed.then_some(now),
                created_at: None,
                updated_at: now,
            })
            .collect();

        if rows.is_empty() {
            return KeyOutcome::ok(key, 0);
        }

        let count = rows.len();
        match self.table.upsert(&rows).await {
            Ok(()) => {
                debug!("migrated {} row(s) from {}", count, key);
                KeyOutcome::ok(key, count)
            }
            Err(e) => {
                warn!("migration: upsert failed for {}: {}", key, e);
                KeyOutcome::failed(key, e.to_string())
            }
        }
    }
}
