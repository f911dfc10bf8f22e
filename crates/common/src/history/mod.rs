//! Conversation history
//!
//! The store is owned by the surrounding service; the orchestrator only
//! appends finished exchanges to it.

use crate::config::HistoryConfig;
use crate::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Who produced a chat turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Ai,
}

/// One message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
    pub at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            citation: None,
            at: Utc::now(),
        }
    }

    pub fn ai(text: impl Into<String>, citation: Option<String>) -> Self {
        Self {
            role: Role::Ai,
            text: text.into(),
            citation,
            at: Utc::now(),
        }
    }
}

/// Storage for per-session conversations
#[async_trait]
pub trait ConversationHistory: Send + Sync {
    /// Append turns to the end of a session's conversation
    async fn append(&self, session: &str, turns: Vec<ChatTurn>) -> Result<()>;

    /// All turns of a session, oldest first
    async fn turns(&self, session: &str) -> Result<Vec<ChatTurn>>;

    /// Forget a session's conversation
    async fn clear(&self, session: &str) -> Result<()>;
}

/// Process-local history store
///
/// Bounded on both axes: a session keeps at most `max_turns` turns (oldest
/// dropped first) and at most `max_sessions` sessions are held, evicting the
/// one appended to least recently.
#[derive(Debug)]
pub struct InMemoryHistory {
    sessions: RwLock<Sessions>,
    max_sessions: usize,
    max_turns: usize,
}

#[derive(Debug, Default)]
struct Sessions {
    logs: HashMap<String, SessionLog>,
    clock: u64,
}

#[derive(Debug, Default)]
struct SessionLog {
    turns: Vec<ChatTurn>,
    touched: u64,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::from_config(&HistoryConfig::default())
    }

    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::with_limits(config.max_sessions, config.max_turns_per_session)
    }

    /// Limits below one are raised to one
    pub fn with_limits(max_sessions: usize, max_turns: usize) -> Self {
        Self {
            sessions: RwLock::new(Sessions::default()),
            max_sessions: max_sessions.max(1),
            max_turns: max_turns.max(1),
        }
    }

    /// Number of sessions currently held
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.logs.len()
    }
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl Sessions {
    fn evict_oldest(&mut self) {
        let oldest = self
            .logs
            .iter()
            .min_by_key(|(_, log)| log.touched)
            .map(|(session, _)| session.clone());

        if let Some(session) = oldest {
            tracing::debug!(session = %session, "Evicting least recently used chat session");
            self.logs.remove(&session);
        }
    }
}

#[async_trait]
impl ConversationHistory for InMemoryHistory {
    async fn append(&self, session: &str, turns: Vec<ChatTurn>) -> Result<()> {
        let mut sessions = self.sessions.write().await;

        if !sessions.logs.contains_key(session) && sessions.logs.len() >= self.max_sessions {
            sessions.evict_oldest();
        }

        sessions.clock += 1;
        let clock = sessions.clock;
        let log = sessions.logs.entry(session.to_string()).or_default();
        log.touched = clock;
        log.turns.extend(turns);

        if log.turns.len() > self.max_turns {
            let excess = log.turns.len() - self.max_turns;
            log.turns.drain(..excess);
        }
        Ok(())
    }

    async fn turns(&self, session: &str) -> Result<Vec<ChatTurn>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .logs
            .get(session)
            .map(|log| log.turns.clone())
            .unwrap_or_default())
    }

    async fn clear(&self, session: &str) -> Result<()> {
        self.sessions.write().await.logs.remove(session);
        Ok(())
    }
}
