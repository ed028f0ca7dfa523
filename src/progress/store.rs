//! Remote-backed question-completion store.
//!
//! Boundary rules: write paths fail closed (explicit `false`, nothing
//! written), read paths fail open (empty map / None). No collaborator error
//! ever escapes a public operation; everything is logged and converted here.

use crate::identity::IdentityProvider;
use crate::progress::study_plan_collection;
use crate::remote::{ProgressRow, ProgressTable};
use crate::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Derived, read-only view of a collection's completion state.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSummary {
    pub collection_id: String,
    pub total_questions: usize,
    pub completed_questions: usize,
    pub progress_percentage: f32,
}

impl ProgressSummary {
    fn from_rows(collection_id: &str, rows: &[ProgressRow]) -> Self {
        let total = rows.len();
        let completed = rows.iter().filter(|r| r.completed).count();
        let percentage = if total == 0 {
            0.0
        } else {
            (completed as f32 / total as f32) * 100.0
        };
        Self {
            collection_id: collection_id.to_string(),
            total_questions: total,
            completed_questions: completed,
            progress_percentage: percentage,
        }
    }
}

/// Persists and retrieves per-user completion state.
pub struct ProgressStore {
    table: Arc<dyn ProgressTable>,
    identity: Arc<dyn IdentityProvider>,
}

impl ProgressStore {
    pub fn new(table: Arc<dyn ProgressTable>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { table, identity }
    }

    /// Upsert one completion record for the current user.
    ///
    /// Returns false (and writes nothing) when no user is signed in or the
    /// table call fails. Callers must check the boolean; nothing is thrown.
    pub async fn save_progress(&self, collection_id: &str, item_id: &str, completed: bool) -> bool {
        let Some(user_id) = self.identity.current_user_id() else {
            warn!(
                "save_progress: no authenticated user, dropping write for {}/{}",
                collection_id, item_id
            );
            return false;
        };

        let now = Utc::now();
        let row = ProgressRow {
            user_id,
            playlist_id: collection_id.to_string(),
            question_id: item_id.to_string(),
            completed,
            completed_at: completed.then_some(now),
            created_at: None,
            updated_at: now,
        };

        match self.table.upsert(std::slice::from_ref(&row)).await {
            Ok(()) => {
                debug!(
                    "saved progress {}/{} completed={}",
                    collection_id, item_id, completed
                );
                true
            }
            Err(e) => {
                warn!("failed to save progress {}/{}: {}", collection_id, item_id, e);
                false
            }
        }
    }

    /// Completion state for a collection, item id → completed.
    ///
    /// Fail-open: an empty map can mean "no progress", "nobody signed in", or
    /// "read failed". Use [`ProgressStore::try_load_progress`] to tell errors
    /// apart.
    pub async fn load_progress(&self, collection_id: &str) -> HashMap<String, bool> {
        match self.try_load_progress(collection_id).await {
            Ok(progress) => progress,
            Err(e) => {
                warn!("failed to load progress for {}: {}", collection_id, e);
                HashMap::new()
            }
        }
    }

    /// Fallible variant of [`ProgressStore::load_progress`]. Still returns an
    /// empty map when nobody is signed in.
    pub async fn try_load_progress(&self, collection_id: &str) -> Result<HashMap<String, bool>> {
        let Some(user_id) = self.identity.current_user_id() else {
            return Ok(HashMap::new());
        };

        let rows = self.table.select_collection(&user_id, collection_id).await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.question_id, r.completed))
            .collect())
    }

    /// Progress summary for a collection, or None when no user is signed in
    /// or the read failed.
    pub async fn progress_summary(&self, collection_id: &str) -> Option<ProgressSummary> {
        let user_id = self.identity.current_user_id()?;

        match self.table.select_collection(&user_id, collection_id).await {
            Ok(rows) => Some(ProgressSummary::from_rows(collection_id, &rows)),
            Err(e) => {
                warn!("failed to summarize progress for {}: {}", collection_id, e);
                None
            }
        }
    }

    // ─── Study-plan namespace ────────────────────────────────────────
    //
    // Same semantics as the playlist operations, against the prefixed
    // collection id.

    pub async fn save_study_plan_progress(
        &self,
        plan_id: &str,
        item_id: &str,
        completed: bool,
    ) -> bool {
        self.save_progress(&study_plan_collection(plan_id), item_id, completed)
            .await
    }

    pub async fn load_study_plan_progress(&self, plan_id: &str) -> HashMap<String, bool> {
        self.load_progress(&study_plan_collection(plan_id)).await
    }

    pub async fn study_plan_summary(&self, plan_id: &str) -> Option<ProgressSummary> {
        self.progress_summary(&study_plan_collection(plan_id)).await
    }
}
