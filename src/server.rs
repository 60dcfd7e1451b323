//! Axum wiring: `GET /stream` → one SSE response per fan-out request.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::coordinator::{Coordinator, StreamRequest};
use crate::sender::EventSender;

/// Query parameters of `GET /stream`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    #[serde(default)]
    pub prompt: String,
    /// Comma-separated model ids.
    #[serde(default)]
    pub models: String,
    #[serde(default)]
    pub conversation_id: String,
    pub is_guest: Option<String>,
    pub thread_id: Option<String>,
    pub use_context: Option<String>,
    pub file_id: Option<String>,
    pub file_ids: Option<String>,
}

impl StreamQuery {
    /// Translate the raw query into a [`StreamRequest`].
    pub fn into_request(self) -> StreamRequest {
        let models = self
            .models
            .split(',')
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        let mut file_ids: Vec<String> = self
            .file_ids
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();
        if let Some(file_id) = self.file_id.filter(|f| !f.is_empty()) {
            if !file_ids.contains(&file_id) {
                file_ids.insert(0, file_id);
            }
        }
        StreamRequest::new(self.prompt, models)
            .with_conversation_id(self.conversation_id)
            .as_guest(self.is_guest.as_deref() == Some("true"))
            .with_thread_id(self.thread_id.filter(|t| !t.is_empty()))
            .with_context(self.use_context.as_deref() == Some("true"))
            .with_file_ids(file_ids)
    }
}

#[derive(Clone)]
pub struct AppState {
    coordinator: Arc<Coordinator>,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/stream", get(stream_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

async fn stream_handler(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let request = query.into_request();
    let capacity = state.coordinator.config().channel_capacity;
    let (sender, receiver) = EventSender::channel(capacity);
    let cancel = CancellationToken::new();

    let coordinator = Arc::clone(&state.coordinator);
    let request_cancel = cancel.clone();
    tokio::spawn(async move {
        coordinator.run(request, sender, request_cancel).await;
    });

    // Dropping the response body (client disconnect) drops the guard, which
    // cancels every in-flight upstream call for this request.
    let guard = cancel.drop_guard();
    let stream = ReceiverStream::new(receiver).map(move |event| {
        let _ = &guard;
        Ok(Event::default().data(event.to_json()))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_parses_models_and_flags() {
        let query = StreamQuery {
            prompt: "hi".to_string(),
            models: "gemini-flash, deepseek-chat,,gemini-flash".to_string(),
            conversation_id: "c1".to_string(),
            is_guest: Some("true".to_string()),
            use_context: Some("true".to_string()),
            ..StreamQuery::default()
        };
        let request = query.into_request();
        assert_eq!(request.models, vec!["gemini-flash", "deepseek-chat"]);
        assert!(request.is_guest);
        assert!(request.use_context);
        assert_eq!(request.conversation_id, "c1");
    }

    #[test]
    fn single_file_id_merges_into_file_ids() {
        let query = StreamQuery {
            file_id: Some("f0".to_string()),
            file_ids: Some("f1,f2".to_string()),
            ..StreamQuery::default()
        };
        let request = query.into_request();
        assert_eq!(request.file_ids, vec!["f0", "f1", "f2"]);
    }

    #[test]
    fn absent_guest_flag_means_authenticated() {
        let query = StreamQuery {
            models: "gpt-4o".to_string(),
            ..StreamQuery::default()
        };
        assert!(!query.into_request().is_guest);
    }
}
