//! Completion tracking and exactly-once stream termination.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::events::StreamEvent;
use crate::sender::EventSender;

#[derive(Debug)]
struct Registry {
    expected: usize,
    completed: HashSet<String>,
    ended: bool,
}

/// Tracks per-model completion and ends the outbound stream exactly once.
///
/// The one-shot ended latch lives behind a mutex together with the completed
/// set; branch tasks run on a multi-threaded runtime, so mark-once semantics
/// alone are not enough.
pub struct CompletionManager {
    inner: Mutex<Registry>,
    sender: EventSender,
    grace: Duration,
    cancel: CancellationToken,
}

impl CompletionManager {
    pub fn new(
        expected: usize,
        sender: EventSender,
        grace: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Mutex::new(Registry {
                expected,
                completed: HashSet::new(),
                ended: false,
            }),
            sender,
            grace,
            cancel,
        }
    }

    /// Record that `model` reached its terminal state. Idempotent: repeat
    /// calls for the same model have no further effect.
    ///
    /// After a short grace period (trailing writes from sibling branches may
    /// still be in flight) the terminal frame is emitted once all expected
    /// branches are accounted for.
    pub async fn mark_completed(&self, model: &str) -> bool {
        let newly = {
            let mut inner = self.inner.lock().expect("completion lock poisoned");
            inner.completed.insert(model.to_string())
        };
        if !newly {
            return false;
        }
        tracing::debug!(model, "branch completed");
        tokio::time::sleep(self.grace).await;
        self.try_finish().await;
        true
    }

    /// Emit `{done:true, allComplete:true}` and close the sink if every
    /// expected branch has completed. The latch fires at most once.
    async fn try_finish(&self) {
        let fire = {
            let mut inner = self.inner.lock().expect("completion lock poisoned");
            if !inner.ended && inner.completed.len() >= inner.expected {
                inner.ended = true;
                true
            } else {
                false
            }
        };
        if fire {
            self.finish().await;
        }
    }

    /// End the stream now regardless of outstanding branches. Used by the
    /// overall safety timeout and the coordinator's defensive sweep.
    pub async fn force_end(&self) {
        let fire = {
            let mut inner = self.inner.lock().expect("completion lock poisoned");
            if inner.ended {
                false
            } else {
                inner.ended = true;
                true
            }
        };
        if fire {
            self.finish().await;
        }
    }

    async fn finish(&self) {
        self.sender.send(StreamEvent::all_complete()).await;
        self.sender.close();
        // Cut off any upstream work still running for this request.
        self.cancel.cancel();
        tracing::debug!("stream ended");
    }

    /// The request-wide cancellation token this manager cancels on end.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_ended(&self) -> bool {
        self.inner.lock().expect("completion lock poisoned").ended
    }

    pub fn is_completed(&self, model: &str) -> bool {
        self.inner
            .lock()
            .expect("completion lock poisoned")
            .completed
            .contains(model)
    }

    pub fn completed_count(&self) -> usize {
        self.inner
            .lock()
            .expect("completion lock poisoned")
            .completed
            .len()
    }

    /// Detached overall safety timer. Ends the stream after `timeout` even if
    /// some branch never reports completion; a normal end cancels the timer
    /// through the request's cancellation token.
    pub fn spawn_safety_timer(self: &Arc<Self>, timeout: Duration) {
        let manager = Arc::clone(self);
        let cancelled = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    tracing::warn!("overall safety timeout fired, force-ending stream");
                    manager.force_end().await;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(expected: usize) -> (Arc<CompletionManager>, tokio::sync::mpsc::Receiver<StreamEvent>)
    {
        let (sender, rx) = EventSender::channel(16);
        let manager = Arc::new(CompletionManager::new(
            expected,
            sender,
            Duration::from_millis(1),
            CancellationToken::new(),
        ));
        (manager, rx)
    }

    #[tokio::test]
    async fn terminal_frame_fires_once_all_branches_complete() {
        let (manager, mut rx) = manager(2);
        assert!(manager.mark_completed("a").await);
        assert!(!manager.is_ended());
        assert!(manager.mark_completed("b").await);
        assert!(manager.is_ended());

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame, StreamEvent::all_complete());
        // The manager still holds a sender, so drop it before asserting the
        // channel is drained.
        drop(manager);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn mark_completed_is_idempotent() {
        let (manager, _rx) = manager(2);
        assert!(manager.mark_completed("a").await);
        assert!(!manager.mark_completed("a").await);
        assert_eq!(manager.completed_count(), 1);
        assert!(!manager.is_ended());
    }

    #[tokio::test]
    async fn force_end_fires_latch_at_most_once() {
        let (manager, mut rx) = manager(3);
        manager.force_end().await;
        manager.force_end().await;
        // A straggler completing after the end produces no further frames.
        manager.mark_completed("late").await;

        assert_eq!(rx.recv().await.unwrap(), StreamEvent::all_complete());
        drop(manager);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn safety_timer_force_ends() {
        let (sender, mut rx) = EventSender::channel(4);
        let manager = Arc::new(CompletionManager::new(
            2,
            sender,
            Duration::from_millis(1),
            CancellationToken::new(),
        ));
        manager.spawn_safety_timer(Duration::from_millis(20));

        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame, StreamEvent::all_complete());
        assert!(manager.is_ended());
    }

    #[tokio::test]
    async fn normal_end_cancels_request_token() {
        let cancel = CancellationToken::new();
        let (sender, _rx) = EventSender::channel(4);
        let manager = Arc::new(CompletionManager::new(
            1,
            sender,
            Duration::from_millis(1),
            cancel.clone(),
        ));
        manager.mark_completed("a").await;
        assert!(cancel.is_cancelled());
    }
}
