//! Request coordinator: credential policy, fan-out, and the final sweep.

use std::sync::Arc;

use secrecy::SecretString;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::branch::BranchState;
use crate::catalog::{guest_allowed, provider_for_model};
use crate::completion::CompletionManager;
use crate::config::StreamConfig;
use crate::context::{ChatMessage, ConversationStore, FileFormatter, PersistenceSink};
use crate::credentials::{CredentialResolver, CredentialSet};
use crate::driver::drive_branch;
use crate::error::{Classification, ErrorKind};
use crate::events::StreamEvent;
use crate::providers::{AdapterRegistry, BranchContext};
use crate::retry::RetryTracker;
use crate::sender::EventSender;

/// One inbound fan-out request.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub prompt: String,
    /// Requested model ids, de-duplicated with order preserved.
    pub models: Vec<String>,
    pub conversation_id: String,
    pub is_guest: bool,
    pub thread_id: Option<String>,
    pub use_context: bool,
    pub file_ids: Vec<String>,
}

impl StreamRequest {
    pub fn new(prompt: impl Into<String>, models: impl IntoIterator<Item = String>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let models = models
            .into_iter()
            .filter(|m| !m.is_empty() && seen.insert(m.clone()))
            .collect();
        Self {
            prompt: prompt.into(),
            models,
            conversation_id: String::new(),
            is_guest: false,
            thread_id: None,
            use_context: false,
            file_ids: Vec::new(),
        }
    }

    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = id.into();
        self
    }

    pub fn as_guest(mut self, is_guest: bool) -> Self {
        self.is_guest = is_guest;
        self
    }

    pub fn with_thread_id(mut self, thread_id: Option<String>) -> Self {
        self.thread_id = thread_id;
        self
    }

    pub fn with_context(mut self, use_context: bool) -> Self {
        self.use_context = use_context;
        self
    }

    pub fn with_file_ids(mut self, file_ids: Vec<String>) -> Self {
        self.file_ids = file_ids;
        self
    }
}

enum Credentials {
    Guest(SecretString),
    User(CredentialSet),
}

/// Fans one request out to every requested model and guarantees the stream
/// terminates exactly once.
pub struct Coordinator {
    adapters: Arc<AdapterRegistry>,
    credentials: Arc<dyn CredentialResolver>,
    store: Arc<dyn ConversationStore>,
    files: Arc<dyn FileFormatter>,
    persistence: Arc<dyn PersistenceSink>,
    config: StreamConfig,
}

impl Coordinator {
    pub fn new(
        adapters: Arc<AdapterRegistry>,
        credentials: Arc<dyn CredentialResolver>,
        store: Arc<dyn ConversationStore>,
        files: Arc<dyn FileFormatter>,
        persistence: Arc<dyn PersistenceSink>,
        config: StreamConfig,
    ) -> Self {
        Self {
            adapters,
            credentials,
            store,
            files,
            persistence,
            config,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Run one request to completion. Always leaves the stream terminated:
    /// every requested model gets exactly one terminal event and the
    /// allComplete frame is sent exactly once.
    pub async fn run(&self, request: StreamRequest, sender: EventSender, cancel: CancellationToken) {
        let request_id = Uuid::new_v4();
        tracing::debug!(
            %request_id,
            models = ?request.models,
            is_guest = request.is_guest,
            "starting fan-out request"
        );

        let completion = Arc::new(CompletionManager::new(
            request.models.len(),
            sender.clone(),
            self.config.completion_grace,
            cancel,
        ));
        completion.spawn_safety_timer(self.config.overall_timeout);
        let retries = Arc::new(RetryTracker::new());

        let credentials = if request.is_guest {
            match self.credentials.resolve_guest().await {
                Some(key) => Credentials::Guest(key),
                None => {
                    // No system key: every model fails locally, zero upstream calls.
                    let classification = Classification::new(
                        ErrorKind::ApiKeyMissing,
                        "Guest access is not configured on this server",
                    );
                    for model in &request.models {
                        self.fail_fast(&sender, &completion, model, &classification)
                            .await;
                    }
                    self.sweep(&request, &completion).await;
                    return;
                }
            }
        } else {
            match self.credentials.resolve_user(&request.conversation_id).await {
                Ok(set) => Credentials::User(set),
                Err(error) => {
                    // Whole-request failure degrades to per-model errors,
                    // still followed by the terminal frame.
                    tracing::warn!(%request_id, %error, "credential resolution failed");
                    let classification = Classification::new(
                        ErrorKind::UnknownError,
                        "Failed to resolve credentials for this request",
                    );
                    for model in &request.models {
                        self.fail_fast(&sender, &completion, model, &classification)
                            .await;
                    }
                    self.sweep(&request, &completion).await;
                    return;
                }
            }
        };

        let messages = self.build_messages(&request).await;

        let mut join = JoinSet::new();
        for model in &request.models {
            let Some(provider) = provider_for_model(model) else {
                let classification = Classification::new(
                    ErrorKind::ModelUnavailable,
                    format!("Unknown model: {model}"),
                );
                self.fail_fast(&sender, &completion, model, &classification)
                    .await;
                continue;
            };

            if request.is_guest && !guest_allowed(model, provider) {
                let classification = Classification::new(
                    ErrorKind::ModelUnavailable,
                    format!("Model {model} is not available to guests"),
                );
                self.fail_fast(&sender, &completion, model, &classification)
                    .await;
                continue;
            }

            let api_key = match &credentials {
                Credentials::Guest(key) => key.clone(),
                Credentials::User(set) => match set.get(provider) {
                    Some(key) => key.clone(),
                    None => {
                        let classification = Classification::new(
                            ErrorKind::ApiKeyMissing,
                            format!("No {provider} API key configured"),
                        );
                        self.fail_fast(&sender, &completion, model, &classification)
                            .await;
                        continue;
                    }
                },
            };

            let Some(adapter) = self.adapters.get(provider) else {
                let classification = Classification::new(
                    ErrorKind::ModelUnavailable,
                    format!("No adapter registered for provider {provider}"),
                );
                self.fail_fast(&sender, &completion, model, &classification)
                    .await;
                continue;
            };

            retries.record_attempt(model);
            let ctx = BranchContext {
                model: model.clone(),
                provider,
                messages: messages.clone(),
                api_key,
                cancel: completion.cancel_token(),
            };
            join.spawn(drive_branch(
                adapter,
                ctx,
                sender.clone(),
                Arc::clone(&completion),
                Arc::clone(&retries),
                self.config.clone(),
            ));
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = join.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                // A panicking branch must not take down its siblings.
                Err(error) => tracing::warn!(%request_id, %error, "branch task failed to join"),
            }
        }

        self.sweep(&request, &completion).await;

        // Persist final texts after the terminal frame.
        for outcome in outcomes {
            if outcome.state == BranchState::Done {
                if let Err(error) = self
                    .persistence
                    .store_result(&request.conversation_id, &outcome.model, &outcome.text)
                    .await
                {
                    tracing::warn!(%request_id, model = %outcome.model, %error, "failed to persist result");
                }
            }
        }

        tracing::debug!(%request_id, "fan-out request finished");
    }

    /// Resolve a model locally, with no network call, through the same event
    /// channel as genuine streaming failures.
    async fn fail_fast(
        &self,
        sender: &EventSender,
        completion: &Arc<CompletionManager>,
        model: &str,
        classification: &Classification,
    ) {
        tracing::debug!(model, kind = %classification.kind, "fast-path error");
        sender.send(StreamEvent::error(model, classification)).await;
        completion.mark_completed(model).await;
    }

    /// Defensive final sweep: any model still unaccounted for is marked
    /// completed, and the stream is force-ended if the latch never fired.
    async fn sweep(&self, request: &StreamRequest, completion: &Arc<CompletionManager>) {
        for model in &request.models {
            if !completion.is_completed(model) {
                tracing::warn!(model, "model never reported completion, sweeping");
                completion.mark_completed(model).await;
            }
        }
        if !completion.is_ended() {
            completion.force_end().await;
        }
    }

    /// Assemble the uniform message list: prior turns, file content, then the
    /// prompt. Collaborator failures degrade to a bare-prompt request.
    async fn build_messages(&self, request: &StreamRequest) -> Vec<ChatMessage> {
        let mut messages = Vec::new();
        if request.use_context && !request.conversation_id.is_empty() {
            match self
                .store
                .prior_turns(&request.conversation_id, request.thread_id.as_deref())
                .await
            {
                Ok(turns) => messages.extend(turns),
                Err(error) => {
                    tracing::warn!(%error, "failed to fetch conversation context, continuing without")
                }
            }
        }
        if !request.file_ids.is_empty() {
            match self.files.messages_for_files(&request.file_ids).await {
                Ok(parts) => messages.extend(parts),
                Err(error) => {
                    tracing::warn!(%error, "failed to format file content, continuing without")
                }
            }
        }
        messages.push(ChatMessage::user(request.prompt.clone()));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_deduplicates_models_preserving_order() {
        let request = StreamRequest::new(
            "hi",
            vec![
                "gemini-flash".to_string(),
                "deepseek-chat".to_string(),
                "gemini-flash".to_string(),
                String::new(),
            ],
        );
        assert_eq!(request.models, vec!["gemini-flash", "deepseek-chat"]);
    }
}
