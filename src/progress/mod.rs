//! Progress module for Prepmate
//!
//! Provides the remote-backed progress store and the one-shot migration of
//! legacy local blobs into the remote table.

mod migration;
mod store;

pub use migration::{KeyOutcome, MigrationReport, Migrator};
pub use store::{ProgressStore, ProgressSummary};

use crate::local::{PLAYLIST_PREFIX, STUDY_PLAN_PREFIX};

/// Collection id for a study plan. Study plans keep the `study-plan-` prefix
/// on the remote side so a plan and a playlist with the same numeric id never
/// collide.
pub(crate) fn study_plan_collection(plan_id: &str) -> String {
    format!("{}{}", STUDY_PLAN_PREFIX, plan_id)
}

/// Map a legacy local key to its remote collection id.
///
/// `playlist-<id>` blobs were stored under the bare playlist id remotely;
/// `study-plan-<id>` blobs keep the full prefixed key. A bare prefix with no
/// id is not a valid key.
pub(crate) fn collection_for_key(key: &str) -> Option<String> {
    if let Some(id) = key.strip_prefix(PLAYLIST_PREFIX) {
        if id.is_empty() {
            return None;
        }
        return Some(id.to_string());
    }
    if let Some(id) = key.strip_prefix(STUDY_PLAN_PREFIX) {
        if id.is_empty() {
            return None;
        }
        return Some(key.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_for_key() {
        assert_eq!(collection_for_key("playlist-101").as_deref(), Some("101"));
        assert_eq!(
            collection_for_key("study-plan-7").as_deref(),
            Some("study-plan-7")
        );
        assert!(collection_for_key("settings").is_none());
    }

    #[test]
    fn test_bare_prefix_is_not_a_collection() {
        assert!(collection_for_key("playlist-").is_none());
        assert!(collection_for_key("study-plan-").is_none());
    }
}
