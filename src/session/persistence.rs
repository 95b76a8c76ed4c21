//! Conversation persistence contract and the in-memory reference store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One persisted message. Appended once, never edited; the embedding is
/// computed at append time from the content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub embedding: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Set on user messages whose turn failed, so retries stay auditable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MessageRecord {
    pub fn new(role: Role, content: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            embedding,
            confidence: None,
            model: None,
            error: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("conversation write failed: {0}")]
    WriteFailed(String),
    #[error("conversation {0} not found")]
    NotFound(Uuid),
}

/// Append-only conversation log.
///
/// `append_turn` is transaction-scoped: the user and assistant messages of
/// one turn land atomically or not at all.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append one turn. `conversation` of `None` starts a new conversation;
    /// the (new or existing) conversation id is returned.
    async fn append_turn(
        &self,
        conversation: Option<Uuid>,
        user: MessageRecord,
        assistant: Option<MessageRecord>,
    ) -> Result<Uuid, PersistenceError>;

    async fn messages(&self, conversation: Uuid) -> Result<Vec<MessageRecord>, PersistenceError>;
}

/// In-memory reference store. Supports write-failure injection so the
/// `persisted = false` path stays testable.
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<Uuid, Vec<MessageRecord>>>,
    fail_writes: AtomicBool,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `append_turn` fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations
            .read()
            .expect("conversation store lock poisoned")
            .len()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append_turn(
        &self,
        conversation: Option<Uuid>,
        user: MessageRecord,
        assistant: Option<MessageRecord>,
    ) -> Result<Uuid, PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::WriteFailed(
                "injected write failure".to_string(),
            ));
        }

        let id = conversation.unwrap_or_else(Uuid::new_v4);
        let mut conversations = self
            .conversations
            .write()
            .expect("conversation store lock poisoned");
        let log = conversations.entry(id).or_default();
        log.push(user);
        if let Some(assistant) = assistant {
            log.push(assistant);
        }
        Ok(id)
    }

    async fn messages(&self, conversation: Uuid) -> Result<Vec<MessageRecord>, PersistenceError> {
        self.conversations
            .read()
            .expect("conversation store lock poisoned")
            .get(&conversation)
            .cloned()
            .ok_or(PersistenceError::NotFound(conversation))
    }
}
