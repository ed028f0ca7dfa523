//! Prepmate - progress sync and chat-hint core
//!
//! The engine behind a coding-interview practice app:
//! - Persist per-user question-completion state in a remote table
//! - Migrate legacy per-browser progress blobs into that table
//! - Maintain bounded per-session conversation memory for the hint assistant

pub mod chat;
pub mod identity;
pub mod local;
pub mod progress;
pub mod remote;

pub use chat::{ChatMessage, ConversationMemory, ConversationTurn, SessionRegistry, TurnRole};
pub use identity::{IdentityProvider, SessionIdentity};
pub use progress::{MigrationReport, Migrator, ProgressStore, ProgressSummary};
pub use remote::{ProgressRow, ProgressTable};

use std::path::PathBuf;

/// Configuration for Prepmate
#[derive(Debug, Clone)]
pub struct PrepmateConfig {
    /// Root data directory (legacy blobs live under `local/`)
    pub data_dir: PathBuf,

    /// Base URL of the remote progress table (PostgREST-style endpoint)
    pub api_base_url: Option<String>,

    /// API key for the remote table
    pub api_key: Option<String>,

    /// Base URL for the LLM completion endpoint
    pub llm_base_url: String,

    /// API key for the LLM endpoint
    pub llm_api_key: Option<String>,

    /// Model used by the hint assistant
    pub llm_model: String,

    /// Maximum retained exchanges per chat session
    pub max_exchanges: usize,
}

impl PrepmateConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            api_base_url: None,
            api_key: None,
            llm_base_url: "https://api.openai.com/v1".to_string(),
            llm_api_key: None,
            llm_model: "gpt-4o-mini".to_string(),
            max_exchanges: chat::DEFAULT_MAX_EXCHANGES,
        }
    }

    pub fn with_remote(mut self, base_url: String, api_key: Option<String>) -> Self {
        self.api_base_url = Some(base_url);
        self.api_key = api_key;
        self
    }

    pub fn with_llm(mut self, base_url: String, api_key: Option<String>, model: String) -> Self {
        self.llm_base_url = base_url;
        self.llm_api_key = api_key;
        self.llm_model = model;
        self
    }

    pub fn with_max_exchanges(mut self, max: usize) -> Self {
        self.max_exchanges = max;
        self
    }

    /// Directory holding the legacy local progress blobs
    pub fn local_blob_dir(&self) -> PathBuf {
        self.data_dir.join("local")
    }
}

/// Result type for Prepmate operations
pub type Result<T> = std::result::Result<T, PrepmateError>;

/// Errors that can occur in Prepmate
#[derive(Debug, thiserror::Error)]
pub enum PrepmateError {
    #[error("No authenticated user")]
    NoIdentity,

    #[error("Remote table error: {0}")]
    Table(String),

    #[error("LLM completion error: {0}")]
    Llm(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
