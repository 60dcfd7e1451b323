//! Unified stream driver: runs one branch end to end.
//!
//! The driver owns every cross-provider concern: the first-chunk deadline,
//! the chunk safety ceiling, delta accumulation, event emission, and the
//! conversion of any failure into a terminal error event. Nothing thrown by
//! an adapter escapes this module.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::branch::{BranchState, ModelBranch};
use crate::completion::CompletionManager;
use crate::config::StreamConfig;
use crate::error::{classify, StreamError};
use crate::events::StreamEvent;
use crate::providers::{BranchContext, ChunkStream, ProviderAdapter, ProviderChunk};
use crate::retry::RetryTracker;
use crate::sender::EventSender;

/// Terminal summary of one driven branch.
#[derive(Debug, Clone)]
pub struct BranchOutcome {
    pub model: String,
    pub state: BranchState,
    pub text: String,
}

/// Drive one branch: emit loading, stream deltas, emit exactly one terminal
/// event, then mark the branch completed.
pub async fn drive_branch(
    adapter: Arc<dyn ProviderAdapter>,
    ctx: BranchContext,
    sender: EventSender,
    completion: Arc<CompletionManager>,
    retries: Arc<RetryTracker>,
    config: StreamConfig,
) -> BranchOutcome {
    let mut branch = ModelBranch::new(&ctx.model, ctx.provider);
    branch.retries = retries.attempts(&ctx.model).saturating_sub(1);
    branch.advance(BranchState::Loading);
    sender.send(StreamEvent::loading(&ctx.model)).await;

    match run_stream(adapter.as_ref(), &ctx, &sender, &mut branch, &config).await {
        Ok(forced) => {
            branch.advance(BranchState::Done);
            if forced {
                tracing::warn!(
                    model = %branch.model,
                    chunks = branch.chunks,
                    "chunk safety ceiling reached, forcing completion"
                );
            }
            sender
                .send(StreamEvent::done(&branch.model, &branch.text))
                .await;
        }
        Err(StreamError::Cancelled) => {
            // The request is shutting down; the sink is closed or closing,
            // so no terminal event is emitted for this branch.
            branch.advance(BranchState::Errored);
            tracing::debug!(model = %branch.model, "branch cancelled");
        }
        Err(error) => {
            let classification = adapter
                .reclassify(&error)
                .unwrap_or_else(|| classify(&error));
            let classification = retries.apply_budget(&branch.model, &config.retry, classification);
            branch.advance(BranchState::Errored);
            tracing::warn!(
                model = %branch.model,
                kind = %classification.kind,
                error = %error,
                "branch failed"
            );
            sender
                .send(StreamEvent::error(&branch.model, &classification))
                .await;
        }
    }

    completion.mark_completed(&branch.model).await;
    BranchOutcome {
        model: branch.model.clone(),
        state: branch.state(),
        text: branch.text,
    }
}

/// Establish and exhaust the provider stream. Returns `Ok(true)` when the
/// chunk ceiling forced completion, `Ok(false)` on normal exhaustion.
async fn run_stream(
    adapter: &dyn ProviderAdapter,
    ctx: &BranchContext,
    sender: &EventSender,
    branch: &mut ModelBranch,
    config: &StreamConfig,
) -> Result<bool, StreamError> {
    // One deadline covers establishment and the wait for the first non-empty
    // delta; it stops applying the moment one arrives.
    let first_delta_deadline = tokio::time::Instant::now() + config.first_chunk_timeout;

    let mut stream = tokio::select! {
        _ = ctx.cancel.cancelled() => return Err(StreamError::Cancelled),
        opened = tokio::time::timeout_at(first_delta_deadline, adapter.open_stream(ctx)) => {
            opened.map_err(|_| StreamError::FirstChunkTimeout)??
        }
    };

    let mut saw_delta = false;
    loop {
        if branch.chunks >= config.max_chunks {
            return Ok(true);
        }

        let next = if !saw_delta {
            tokio::time::timeout_at(first_delta_deadline, pull(&mut stream, &ctx.cancel))
                .await
                .map_err(|_| StreamError::FirstChunkTimeout)?
        } else if let Some(idle) = config.idle_chunk_timeout {
            tokio::time::timeout(idle, pull(&mut stream, &ctx.cancel))
                .await
                .map_err(|_| StreamError::IdleTimeout)?
        } else {
            pull(&mut stream, &ctx.cancel).await
        };

        match next {
            None => break,
            Some(Err(error)) => return Err(error),
            Some(Ok(chunk)) => {
                branch.chunks += 1;
                if let Some(text) = chunk.delta() {
                    saw_delta = true;
                    branch.push_delta(text);
                    branch.advance(BranchState::Streaming);
                    sender.send(StreamEvent::delta(&branch.model, text)).await;
                }
            }
        }
    }

    if branch.text.is_empty() {
        return Err(StreamError::EmptyResponse);
    }
    Ok(false)
}

async fn pull(
    stream: &mut ChunkStream,
    cancel: &CancellationToken,
) -> Option<Result<ProviderChunk, StreamError>> {
    tokio::select! {
        _ = cancel.cancelled() => Some(Err(StreamError::Cancelled)),
        item = stream.next() => item,
    }
}
