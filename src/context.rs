//! Uniform message model and external collaborator seams.
//!
//! Conversation history, file content, and persistence live outside the
//! streaming engine; they are consumed through the traits below so the
//! engine can be driven in tests without any of them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// Role of one message in the uniform message list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One message in provider-neutral shape. Adapters translate these into each
/// provider's native request format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Fetches prior conversation turns in uniform shape.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn prior_turns(
        &self,
        conversation_id: &str,
        thread_id: Option<&str>,
    ) -> Result<Vec<ChatMessage>, StreamError>;
}

/// Turns stored file records into message parts.
#[async_trait]
pub trait FileFormatter: Send + Sync {
    async fn messages_for_files(&self, file_ids: &[String])
        -> Result<Vec<ChatMessage>, StreamError>;
}

/// Stores final per-model text after the terminal frame.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn store_result(
        &self,
        conversation_id: &str,
        model: &str,
        text: &str,
    ) -> Result<(), StreamError>;
}

/// No-op collaborator set for wiring and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopContext;

#[async_trait]
impl ConversationStore for NoopContext {
    async fn prior_turns(
        &self,
        _conversation_id: &str,
        _thread_id: Option<&str>,
    ) -> Result<Vec<ChatMessage>, StreamError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl FileFormatter for NoopContext {
    async fn messages_for_files(
        &self,
        _file_ids: &[String],
    ) -> Result<Vec<ChatMessage>, StreamError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl PersistenceSink for NoopContext {
    async fn store_result(
        &self,
        _conversation_id: &str,
        _model: &str,
        _text: &str,
    ) -> Result<(), StreamError> {
        Ok(())
    }
}
