//! Per-session conversation memory.
//!
//! History only ever grows in whole exchanges: a user turn sits in a pending
//! slot until the assistant reply commits the pair. A second user turn before
//! a reply replaces the pending one (latest question wins), and an assistant
//! turn with nothing pending is ignored.

use super::client::ChatMessage;
use super::DEFAULT_MAX_EXCHANGES;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One committed turn in a session's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    fn new(role: TurnRole, content: String) -> Self {
        Self {
            role,
            content,
            timestamp: Utc::now(),
        }
    }
}

/// Lightweight session stats for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub session_id: String,
    pub turn_count: usize,
}

/// Bounded exchange history for one chat session.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    session_id: String,
    max_exchanges: usize,
    /// Committed turns, oldest first. Always whole (user, assistant) pairs.
    turns: Vec<ConversationTurn>,
    /// User turn awaiting its assistant reply. Not part of exported history.
    pending_user: Option<String>,
}

impl ConversationMemory {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            max_exchanges: DEFAULT_MAX_EXCHANGES,
            turns: Vec::new(),
            pending_user: None,
        }
    }

    pub fn with_max_exchanges(mut self, max: usize) -> Self {
        self.max_exchanges = max;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Stage a user turn as the pending half of an exchange.
    ///
    /// If a turn is already pending, the new content replaces it and the old
    /// one is dropped without ever reaching history.
    pub fn add_user_turn(&mut self, content: impl Into<String>) {
        let content = content.into();
        if self.pending_user.is_some() {
            debug!(
                "session {}: replacing unanswered pending user turn",
                self.session_id
            );
        }
        self.pending_user = Some(content);
    }

    /// Commit the pending exchange with the assistant's reply.
    ///
    /// No-op when nothing is pending: replies are only recorded in response
    /// to a user turn.
    pub fn add_assistant_turn(&mut self, content: impl Into<String>) {
        let Some(user_content) = self.pending_user.take() else {
            debug!(
                "session {}: ignoring assistant turn with no pending user turn",
                self.session_id
            );
            return;
        };
        self.turns
            .push(ConversationTurn::new(TurnRole::User, user_content));
        self.turns
            .push(ConversationTurn::new(TurnRole::Assistant, content.into()));
    }

    /// Committed history, oldest first.
    pub fn history(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Build the exact message sequence handed to the LLM client:
    /// system prompt, then the most recent `max_exchanges` committed
    /// exchanges, then the current user message. The pending turn is never
    /// included.
    pub fn build_context_window(
        &self,
        system_prompt: &str,
        current_user_message: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.max_exchanges * 2 + 2);
        messages.push(ChatMessage {
            role: TurnRole::System.as_str().to_string(),
            content: system_prompt.to_string(),
        });

        let start = self.turns.len().saturating_sub(self.max_exchanges * 2);
        for turn in &self.turns[start..] {
            messages.push(ChatMessage {
                role: turn.role.as_str().to_string(),
                content: turn.content.clone(),
            });
        }

        messages.push(ChatMessage {
            role: TurnRole::User.as_str().to_string(),
            content: current_user_message.to_string(),
        });
        messages
    }

    /// True when committed turns exceed the retention budget.
    pub fn should_truncate(&self) -> bool {
        self.turns.len() > self.max_exchanges * 2
    }

    /// Drop all but the most recent `max_exchanges` exchanges. History grows
    /// in pairs and the budget is an even turn count, so the cut never splits
    /// an exchange.
    pub fn truncate(&mut self) {
        let keep = self.max_exchanges * 2;
        if self.turns.len() > keep {
            let dropped = self.turns.len() - keep;
            self.turns.drain(..dropped);
            debug!(
                "session {}: truncated {} old turn(s)",
                self.session_id, dropped
            );
        }
    }

    /// Drop all committed and pending state. The session id stays valid.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.pending_user = None;
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            session_id: self.session_id.clone(),
            turn_count: self.turns.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exchange_commits_as_pair() {
        let mut mem = ConversationMemory::new("s1");
        mem.add_user_turn("how do I reverse a list?");
        assert!(mem.history().is_empty());

        mem.add_assistant_turn("think about two pointers");
        assert_eq!(mem.history().len(), 2);
        assert_eq!(mem.history()[0].role, TurnRole::User);
        assert_eq!(mem.history()[1].role, TurnRole::Assistant);
    }

    #[test]
    fn test_pending_replacement_is_last_write_wins() {
        let mut mem = ConversationMemory::new("s1");
        mem.add_user_turn("a");
        mem.add_user_turn("b");
        mem.add_assistant_turn("r");

        assert_eq!(mem.history().len(), 2);
        assert_eq!(mem.history()[0].content, "b");
        assert!(mem.history().iter().all(|t| t.content != "a"));
    }

    #[test]
    fn test_orphan_assistant_turn_is_noop() {
        let mut mem = ConversationMemory::new("s1");
        mem.add_assistant_turn("unsolicited");
        assert!(mem.history().is_empty());
    }

    #[test]
    fn test_truncate_preserves_pairing() {
        let mut mem = ConversationMemory::new("s1").with_max_exchanges(2);
        for i in 0..5 {
            mem.add_user_turn(format!("q{}", i));
            mem.add_assistant_turn(format!("a{}", i));
        }
        assert!(mem.should_truncate());

        mem.truncate();
        assert_eq!(mem.history().len(), 4);
        for (i, turn) in mem.history().iter().enumerate() {
            let expected = if i % 2 == 0 {
                TurnRole::User
            } else {
                TurnRole::Assistant
            };
            assert_eq!(turn.role, expected);
        }
        // Most recent exchanges survive
        assert_eq!(mem.history()[2].content, "q4");
    }

    #[test]
    fn test_context_window_shape() {
        let mut mem = ConversationMemory::new("s1").with_max_exchanges(1);
        mem.add_user_turn("q0");
        mem.add_assistant_turn("a0");
        mem.add_user_turn("q1");
        mem.add_assistant_turn("a1");

        // Stage a pending turn; it must not leak into the window.
        mem.add_user_turn("q2");
        let window = mem.build_context_window("be helpful", "q2");

        assert_eq!(window.len(), 4); // system + 1 exchange + current
        assert_eq!(window[0].role, "system");
        assert_eq!(window[1].content, "q1");
        assert_eq!(window[2].content, "a1");
        assert_eq!(window.last().unwrap().content, "q2");
        assert!(window.iter().filter(|m| m.content == "q2").count() == 1);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut mem = ConversationMemory::new("s1");
        mem.add_user_turn("q");
        mem.add_assistant_turn("a");
        mem.add_user_turn("pending");

        mem.clear();
        assert!(mem.history().is_empty());
        assert_eq!(mem.summary().turn_count, 0);

        // Orphan reply after clear stays a no-op: pending was dropped too.
        mem.add_assistant_turn("late reply");
        assert!(mem.history().is_empty());
    }
}
