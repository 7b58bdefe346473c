//! Chat log boundary
//!
//! The surrounding conversation is an external collaborator; the pipeline
//! consumes exactly one operation: append a completed turn. State is
//! ephemeral by design, so the provided implementation is in-memory only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::turn::CompletedTurn;

/// A completed exchange as recorded in the conversation
#[derive(Debug, Clone)]
pub struct ChatTurn {
    /// Record identifier
    pub id: Uuid,
    /// What the user said
    pub user: String,
    /// What the model replied
    pub model: String,
    /// When the turn completed
    pub created_at: DateTime<Utc>,
}

impl ChatTurn {
    /// Stamp a completed turn into a chat record
    #[must_use]
    pub fn new(turn: CompletedTurn) -> Self {
        Self {
            id: Uuid::new_v4(),
            user: turn.user,
            model: turn.model,
            created_at: Utc::now(),
        }
    }
}

/// The external chat log consumed by the pipeline
#[async_trait]
pub trait ChatLog: Send + Sync {
    /// Append one completed turn to the ongoing conversation
    async fn append_turn(&self, turn: ChatTurn);
}

/// In-memory chat log
#[derive(Debug, Default)]
pub struct MemoryChatLog {
    turns: tokio::sync::Mutex<Vec<ChatTurn>>,
}

impl MemoryChatLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded turns
    pub async fn turns(&self) -> Vec<ChatTurn> {
        self.turns.lock().await.clone()
    }
}

#[async_trait]
impl ChatLog for MemoryChatLog {
    async fn append_turn(&self, turn: ChatTurn) {
        tracing::debug!(id = %turn.id, "turn appended to chat log");
        self.turns.lock().await.push(turn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn turns_append_in_order() {
        let log = MemoryChatLog::new();
        log.append_turn(ChatTurn::new(CompletedTurn {
            user: "first".to_string(),
            model: "one".to_string(),
        }))
        .await;
        log.append_turn(ChatTurn::new(CompletedTurn {
            user: "second".to_string(),
            model: "two".to_string(),
        }))
        .await;

        let turns = log.turns().await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].user, "first");
        assert_eq!(turns[1].model, "two");
    }
}
