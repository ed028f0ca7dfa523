//! Chat module for Prepmate
//!
//! Provides per-session conversation memory, the session registry, and the
//! LLM completion client used by the hint assistant.

mod client;
mod memory;
mod registry;

pub use client::{ChatMessage, CompletionClient, HintClient, HINT_SYSTEM_PROMPT};
pub use memory::{ConversationMemory, ConversationSummary, ConversationTurn, TurnRole};
pub use registry::SessionRegistry;

/// Default number of retained exchanges (one exchange = user turn + reply).
pub const DEFAULT_MAX_EXCHANGES: usize = 10;
