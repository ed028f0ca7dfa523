//! Integration tests for the progress store, migration engine, and chat memory

use prepmate::chat::{ConversationMemory, SessionRegistry, TurnRole};
use prepmate::local::BlobDir;
use prepmate::remote::{MemoryTable, ProgressTable};
use prepmate::{Migrator, ProgressStore, SessionIdentity};
use std::sync::Arc;
use tempfile::TempDir;

fn store_with_user(table: Arc<MemoryTable>, user: &str) -> ProgressStore {
    ProgressStore::new(table, Arc::new(SessionIdentity::signed_in(user)))
}

/// Saving with no signed-in user fails closed: false, nothing written
#[tokio::test]
async fn test_save_progress_without_user() {
    let table = Arc::new(MemoryTable::new());
    let store = ProgressStore::new(table.clone(), Arc::new(SessionIdentity::anonymous()));

    assert!(!store.save_progress("interview-101", "1", true).await);
    assert_eq!(table.row_count(), 0);
}

/// Save then load round-trips through the remote table
#[tokio::test]
async fn test_save_and_load_progress() {
    let table = Arc::new(MemoryTable::new());
    let store = store_with_user(table, "u1");

    assert!(store.save_progress("interview-101", "1", true).await);

    let progress = store.load_progress("interview-101").await;
    assert_eq!(progress.len(), 1);
    assert_eq!(progress.get("1"), Some(&true));
}

/// Repeated saves on one (user, collection, item) keep exactly one row,
/// reflecting the last call
#[tokio::test]
async fn test_save_progress_upserts() {
    let table = Arc::new(MemoryTable::new());
    let store = store_with_user(table.clone(), "u1");

    assert!(store.save_progress("interview-101", "1", true).await);
    assert!(store.save_progress("interview-101", "1", false).await);
    assert!(store.save_progress("interview-101", "1", true).await);

    assert_eq!(table.row_count(), 1);
    let row = &table.snapshot()[0];
    assert!(row.completed);
    assert!(row.completed_at.is_some());
}

/// completed_at is cleared when a question is marked incomplete
#[tokio::test]
async fn test_completed_at_cleared_on_undo() {
    let table = Arc::new(MemoryTable::new());
    let store = store_with_user(table.clone(), "u1");

    assert!(store.save_progress("interview-101", "1", true).await);
    assert!(store.save_progress("interview-101", "1", false).await);

    let row = &table.snapshot()[0];
    assert!(!row.completed);
    assert!(row.completed_at.is_none());
}

/// Playlist and study-plan progress never collide, even with equal ids
#[tokio::test]
async fn test_study_plan_namespace_isolation() {
    let table = Arc::new(MemoryTable::new());
    let store = store_with_user(table.clone(), "u1");

    assert!(store.save_progress("75", "1", true).await);
    assert!(store.save_study_plan_progress("75", "1", false).await);

    assert_eq!(table.row_count(), 2);
    assert_eq!(
        store.load_progress("75").await.get("1"),
        Some(&true)
    );
    assert_eq!(
        store.load_study_plan_progress("75").await.get("1"),
        Some(&false)
    );
}

/// Summary counts completed/total and computes the percentage
#[tokio::test]
async fn test_progress_summary() {
    let table = Arc::new(MemoryTable::new());
    let store = store_with_user(table, "u1");

    for (question, completed) in [("1", true), ("2", true), ("3", false), ("4", false)] {
        assert!(store.save_progress("interview-101", question, completed).await);
    }

    let summary = store.progress_summary("interview-101").await.unwrap();
    assert_eq!(summary.total_questions, 4);
    assert_eq!(summary.completed_questions, 2);
    assert!((summary.progress_percentage - 50.0).abs() < f32::EPSILON);
}

/// Summary with zero rows is 0/0 at 0%, not an error
#[tokio::test]
async fn test_progress_summary_empty_collection() {
    let table = Arc::new(MemoryTable::new());
    let store = store_with_user(table, "u1");

    let summary = store.progress_summary("interview-101").await.unwrap();
    assert_eq!(summary.total_questions, 0);
    assert_eq!(summary.completed_questions, 0);
    assert_eq!(summary.progress_percentage, 0.0);
}

/// Reads fail open and writes fail closed under transport failure
#[tokio::test]
async fn test_transport_failure_boundary() {
    let table = Arc::new(MemoryTable::new());
    let store = store_with_user(table.clone(), "u1");
    assert!(store.save_progress("interview-101", "1", true).await);

    table.set_failing(true);
    assert!(!store.save_progress("interview-101", "2", true).await);
    assert!(store.load_progress("interview-101").await.is_empty());
    assert!(store.try_load_progress("interview-101").await.is_err());
    assert!(store.progress_summary("interview-101").await.is_none());
}

// ─── Migration ───────────────────────────────────────────────────────

fn migrator(tmp: &TempDir, table: Arc<MemoryTable>, user: Option<&str>) -> Migrator {
    let identity = match user {
        Some(u) => SessionIdentity::signed_in(u),
        None => SessionIdentity::anonymous(),
    };
    Migrator::new(
        Arc::new(BlobDir::new(tmp.path())),
        table,
        Arc::new(identity),
    )
}

/// Migration with no legacy keys is a no-op success
#[tokio::test]
async fn test_migrate_nothing_to_do() {
    let tmp = TempDir::new().unwrap();
    let table = Arc::new(MemoryTable::new());
    let report = migrator(&tmp, table.clone(), Some("u1")).migrate().await;

    assert!(report.succeeded());
    assert_eq!(report.migrated_rows(), 0);
    assert_eq!(table.row_count(), 0);
}

/// Legacy blobs land as remote rows under the right collection ids
#[tokio::test]
async fn test_migrate_local_blobs() {
    let tmp = TempDir::new().unwrap();
    let blobs = BlobDir::new(tmp.path());
    blobs.put("playlist-101", r#"{"1":true,"2":false}"#).unwrap();
    blobs.put("study-plan-75", r#"{"9":true}"#).unwrap();

    let table = Arc::new(MemoryTable::new());
    let report = migrator(&tmp, table.clone(), Some("u1")).migrate().await;

    assert!(report.succeeded());
    assert_eq!(report.migrated_rows(), 3);
    assert_eq!(table.row_count(), 3);

    // playlist-101 becomes bare collection id 101; study plans keep the prefix
    let playlist = table.select_collection("u1", "101").await.unwrap();
    assert_eq!(playlist.len(), 2);
    let plan = table.select_collection("u1", "study-plan-75").await.unwrap();
    assert_eq!(plan.len(), 1);
    assert!(plan[0].completed);
}

/// Running migration twice yields the same remote row set
#[tokio::test]
async fn test_migration_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let blobs = BlobDir::new(tmp.path());
    blobs.put("playlist-101", r#"{"1":true,"2":true}"#).unwrap();

    let table = Arc::new(MemoryTable::new());
    let engine = migrator(&tmp, table.clone(), Some("u1"));

    assert!(engine.migrate().await.succeeded());
    let first: Vec<_> = table
        .snapshot()
        .iter()
        .map(|r| (r.playlist_id.clone(), r.question_id.clone(), r.completed))
        .collect();

    assert!(engine.migrate().await.succeeded());
    let second: Vec<_> = table
        .snapshot()
        .iter()
        .map(|r| (r.playlist_id.clone(), r.question_id.clone(), r.completed))
        .collect();

    assert_eq!(first, second);
}

/// A malformed blob fails its own key only; the rest still migrate
#[tokio::test]
async fn test_partial_failure_isolation() {
    let tmp = TempDir::new().unwrap();
    let blobs = BlobDir::new(tmp.path());
    blobs.put("playlist-101", r#"{"1":true}"#).unwrap();
    blobs.put("playlist-102", "definitely not json").unwrap();

    let table = Arc::new(MemoryTable::new());
    let report = migrator(&tmp, table.clone(), Some("u1")).migrate().await;

    assert!(!report.succeeded());
    assert_eq!(report.failed_keys().len(), 1);
    assert_eq!(report.failed_keys()[0].key, "playlist-102");

    // The well-formed key still landed
    assert_eq!(table.row_count(), 1);
    assert_eq!(report.migrated_rows(), 1);
}

/// A key that is nothing but the prefix fails its own key instead of
/// writing rows under an empty collection id
#[tokio::test]
async fn test_bare_prefix_key_fails_cleanly() {
    let tmp = TempDir::new().unwrap();
    let blobs = BlobDir::new(tmp.path());
    blobs.put("playlist-", r#"{"1":true}"#).unwrap();
    blobs.put("playlist-101", r#"{"2":true}"#).unwrap();

    let table = Arc::new(MemoryTable::new());
    let report = migrator(&tmp, table.clone(), Some("u1")).migrate().await;

    assert!(!report.succeeded());
    assert_eq!(report.failed_keys().len(), 1);
    assert_eq!(report.failed_keys()[0].key, "playlist-");

    // Only the valid key landed, and nothing under an empty collection id
    assert_eq!(table.row_count(), 1);
    assert!(table.select_collection("u1", "").await.unwrap().is_empty());
}

/// With no signed-in user every key is reported failed and nothing is written
#[tokio::test]
async fn test_migrate_without_user() {
    let tmp = TempDir::new().unwrap();
    let blobs = BlobDir::new(tmp.path());
    blobs.put("playlist-101", r#"{"1":true}"#).unwrap();

    let table = Arc::new(MemoryTable::new());
    let report = migrator(&tmp, table.clone(), None).migrate().await;

    assert!(!report.succeeded());
    assert_eq!(table.row_count(), 0);
}

/// Migration never deletes the legacy blobs
#[tokio::test]
async fn test_migration_leaves_local_data() {
    let tmp = TempDir::new().unwrap();
    let blobs = BlobDir::new(tmp.path());
    blobs.put("playlist-101", r#"{"1":true}"#).unwrap();

    let table = Arc::new(MemoryTable::new());
    let engine = migrator(&tmp, table, Some("u1"));
    assert!(engine.migrate().await.succeeded());

    assert!(engine.has_local_progress());
}

/// Existence probes are fail-closed
#[tokio::test]
async fn test_existence_probes() {
    let tmp = TempDir::new().unwrap();
    let table = Arc::new(MemoryTable::new());
    let engine = migrator(&tmp, table.clone(), Some("u1"));

    assert!(!engine.has_local_progress());
    assert!(!engine.has_remote_progress().await);

    BlobDir::new(tmp.path())
        .put("study-plan-1", r#"{"1":false}"#)
        .unwrap();
    assert!(engine.has_local_progress());

    assert!(engine.migrate().await.succeeded());
    assert!(engine.has_remote_progress().await);

    table.set_failing(true);
    assert!(!engine.has_remote_progress().await);
}

// ─── Conversation memory ─────────────────────────────────────────────

/// Full exchange flow through a registry-managed session
#[tokio::test]
async fn test_chat_session_flow() {
    let mut registry = SessionRegistry::with_max_exchanges(2);

    let memory = registry.session("s1");
    memory.add_user_turn("what's a good approach for two-sum?");
    let window = memory.build_context_window("be a tutor", "what's a good approach for two-sum?");
    assert_eq!(window.len(), 2); // system + current; no committed history yet

    memory.add_assistant_turn("consider a hash map of seen values");
    assert_eq!(memory.history().len(), 2);
    assert_eq!(memory.history()[0].role, TurnRole::User);
    assert_eq!(memory.summary().session_id, "s1");
}

/// Window keeps only the most recent exchanges, system first, current last
#[test]
fn test_window_bounds() {
    let mut memory = ConversationMemory::new("s1").with_max_exchanges(2);
    for i in 0..4 {
        memory.add_user_turn(format!("q{}", i));
        memory.add_assistant_turn(format!("a{}", i));
    }

    let window = memory.build_context_window("sys", "q4");
    assert_eq!(window.len(), 6); // system + 2 exchanges + current
    assert_eq!(window[0].role, "system");
    assert_eq!(window[1].content, "q2");
    assert_eq!(window[4].content, "a3");
    assert_eq!(window[5].content, "q4");
}

/// Clearing a session keeps its id usable for a fresh conversation
#[test]
fn test_registry_clear_and_reuse() {
    let mut registry = SessionRegistry::new();
    registry.session("s1").add_user_turn("q");
    registry.session("s1").add_assistant_turn("a");
    assert_eq!(registry.session("s1").history().len(), 2);

    registry.clear_session("s1");
    assert!(registry.session("s1").history().is_empty());

    registry.session("s1").add_user_turn("q2");
    registry.session("s1").add_assistant_turn("a2");
    assert_eq!(registry.session("s1").history().len(), 2);
}
