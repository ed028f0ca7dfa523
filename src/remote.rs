//! Remote progress table collaborator.
//!
//! One row per (user, collection, question); all writes are upserts on that
//! triple, so re-sending a row overwrites in place and never duplicates. The
//! production client speaks a PostgREST-style REST API; [`MemoryTable`] is the
//! in-memory implementation used by tests and offline mode.

use crate::{PrepmateError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Request timeout for table calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Table name on the remote endpoint
const PROGRESS_TABLE: &str = "question_progress";

/// Conflict key for upserts, matching the table's uniqueness constraint
const CONFLICT_COLUMNS: &str = "user_id,playlist_id,question_id";

/// One completion record on the wire.
///
/// `playlist_id` doubles as the collection id; study-plan collections carry
/// the `study-plan-` prefix so they never collide with playlist ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRow {
    pub user_id: String,
    pub playlist_id: String,
    pub question_id: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    /// None on client writes; the table fills it on first insert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Async access to the remote progress table.
///
/// Every method returns the crate `Result` so callers see a tagged
/// success/failure instead of a loose `{data, error}` shape. No multi-row
/// transactional guarantees are assumed beyond a single bulk upsert call.
#[async_trait]
pub trait ProgressTable: Send + Sync {
    /// Insert-or-overwrite rows keyed on (user_id, playlist_id, question_id).
    async fn upsert(&self, rows: &[ProgressRow]) -> Result<()>;

    /// All rows for one user and collection.
    async fn select_collection(
        &self,
        user_id: &str,
        collection_id: &str,
    ) -> Result<Vec<ProgressRow>>;

    /// Cheap existence probe: does the user have any row at all?
    async fn any_for_user(&self, user_id: &str) -> Result<bool>;
}

// ─── REST client ─────────────────────────────────────────────────────

/// PostgREST-style client for the hosted progress table.
pub struct RestTableClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestTableClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("prepmate/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, PROGRESS_TABLE)
    }

    fn apply_auth(&self, mut req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(key) = &self.api_key {
            req = req
                .header("apikey", key.as_str())
                .header("Authorization", format!("Bearer {}", key));
        }
        req
    }

    async fn check_response_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let detail = Self::extract_error_detail(&body);
        if detail.is_empty() {
            Err(PrepmateError::Table(format!("API error {status}")))
        } else {
            Err(PrepmateError::Table(format!("API error {status}: {detail}")))
        }
    }

    fn extract_error_detail(body: &str) -> String {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return String::new();
        }
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            if let Some(msg) = value.get("message").and_then(|m| m.as_str()) {
                return msg.to_string();
            }
            if let Some(msg) = value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
            {
                return msg.to_string();
            }
        }
        trimmed.to_string()
    }

    fn map_reqwest_error(e: reqwest::Error) -> PrepmateError {
        if e.is_timeout() {
            PrepmateError::Table(format!("timeout: {e}"))
        } else if e.is_connect() {
            PrepmateError::Table(format!("network: {e}"))
        } else {
            PrepmateError::Table(e.to_string())
        }
    }
}

#[async_trait]
impl ProgressTable for RestTableClient {
    async fn upsert(&self, rows: &[ProgressRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        debug!("upserting {} row(s) to {}", rows.len(), PROGRESS_TABLE);

        let req = self
            .client
            .post(self.table_url())
            .query(&[("on_conflict", CONFLICT_COLUMNS)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows);

        let response = self
            .apply_auth(req)
            .send()
            .await
            .map_err(Self::map_reqwest_error)?;
        Self::check_response_status(response).await?;
        Ok(())
    }

    async fn select_collection(
        &self,
        user_id: &str,
        collection_id: &str,
    ) -> Result<Vec<ProgressRow>> {
        let req = self.client.get(self.table_url()).query(&[
            ("user_id", format!("eq.{user_id}")),
            ("playlist_id", format!("eq.{collection_id}")),
            ("select", "*".to_string()),
        ]);

        let response = self
            .apply_auth(req)
            .send()
            .await
            .map_err(Self::map_reqwest_error)?;
        let response = Self::check_response_status(response).await?;

        response
            .json::<Vec<ProgressRow>>()
            .await
            .map_err(|e| PrepmateError::Table(format!("malformed response: {e}")))
    }

    async fn any_for_user(&self, user_id: &str) -> Result<bool> {
        let req = self.client.get(self.table_url()).query(&[
            ("user_id", format!("eq.{user_id}")),
            ("select", "question_id".to_string()),
            ("limit", "1".to_string()),
        ]);

        let response = self
            .apply_auth(req)
            .send()
            .await
            .map_err(Self::map_reqwest_error)?;
        let response = Self::check_response_status(response).await?;

        let rows: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| PrepmateError::Table(format!("malformed response: {e}")))?;
        Ok(!rows.is_empty())
    }
}

// ─── In-memory table ─────────────────────────────────────────────────

/// In-memory progress table for tests and offline use.
///
/// `set_failing(true)` makes every call return a transport error, which is how
/// the fail-open/fail-closed boundary behavior gets exercised.
#[derive(Default)]
pub struct MemoryTable {
    rows: Mutex<BTreeMap<(String, String, String), ProgressRow>>,
    fail: AtomicBool,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated transport failure.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn row_count(&self) -> usize {
        self.lock_rows().len()
    }

    /// All rows, in key order.
    pub fn snapshot(&self) -> Vec<ProgressRow> {
        self.lock_rows().values().cloned().collect()
    }

    /// Lock the row map, recovering from a poisoned lock: the map stays
    /// consistent even if a holder panicked mid-call, and the no-panic
    /// boundary must hold either way.
    fn lock_rows(&self) -> MutexGuard<'_, BTreeMap<(String, String, String), ProgressRow>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            Err(PrepmateError::Table("simulated transport failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ProgressTable for MemoryTable {
    async fn upsert(&self, rows: &[ProgressRow]) -> Result<()> {
        self.check_available()?;
        let mut map = self.lock_rows();
        for row in rows {
            let key = (
                row.user_id.clone(),
                row.playlist_id.clone(),
                row.question_id.clone(),
            );
            let mut stored = row.clone();
            // First insert stamps created_at; later upserts preserve it.
            stored.created_at = map
                .get(&key)
                .and_then(|existing| existing.created_at)
                .or(row.created_at)
                .or_else(|| Some(Utc::now()));
            map.insert(key, stored);
        }
        Ok(())
    }

    async fn select_collection(
        &self,
        user_id: &str,
        collection_id: &str,
    ) -> Result<Vec<ProgressRow>> {
        self.check_available()?;
        let map = self.lock_rows();
        Ok(map
            .values()
            .filter(|r| r.user_id == user_id && r.playlist_id == collection_id)
            .cloned()
            .collect())
    }

    async fn any_for_user(&self, user_id: &str) -> Result<bool> {
        self.check_available()?;
        let map = self.lock_rows();
        Ok(map.values().any(|r| r.user_id == user_id))
    }
}
