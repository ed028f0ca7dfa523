//! Session registry: session id → conversation memory.
//!
//! Owned by the calling layer and passed down explicitly; there is no ambient
//! global map. Sessions are created lazily on first access and live until
//! removed. No automatic expiry.

use super::memory::ConversationMemory;
use super::DEFAULT_MAX_EXCHANGES;
use std::collections::HashMap;
use tracing::debug;

pub struct SessionRegistry {
    max_exchanges: usize,
    sessions: HashMap<String, ConversationMemory>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_max_exchanges(DEFAULT_MAX_EXCHANGES)
    }

    /// All sessions created by this registry use the given exchange budget.
    pub fn with_max_exchanges(max_exchanges: usize) -> Self {
        Self {
            max_exchanges,
            sessions: HashMap::new(),
        }
    }

    /// Memory for a session, created on first access.
    pub fn session(&mut self, session_id: &str) -> &mut ConversationMemory {
        let max = self.max_exchanges;
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!("creating chat session {}", session_id);
                ConversationMemory::new(session_id).with_max_exchanges(max)
            })
    }

    /// Drop a session's turns in place; the id stays usable.
    pub fn clear_session(&mut self, session_id: &str) {
        if let Some(memory) = self.sessions.get_mut(session_id) {
            memory.clear();
        }
    }

    /// Evict a session entirely. Returns true if it existed.
    pub fn remove(&mut self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn session_ids(&self) -> Vec<&str> {
        self.sessions.keys().map(String::as_str).collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
