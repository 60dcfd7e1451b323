//! Per-connection outbound event channel.
//!
//! Each connection gets one bounded channel. The [`EventSender`] side is
//! cloned into every branch task; the receiver side feeds the SSE response.
//! After [`EventSender::close`] further writes are logged and dropped, since
//! slow branches may race the completion manager's close.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::events::StreamEvent;

/// Cloneable write handle for one connection's event stream.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<StreamEvent>,
    closed: Arc<AtomicBool>,
}

impl EventSender {
    /// Create a bounded channel pair for one connection.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                closed: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// Send one event. Returns `false` when the event was dropped because the
    /// sink is closed or the client went away.
    pub async fn send(&self, event: StreamEvent) -> bool {
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!(?event, "dropping event sent after stream end");
            return false;
        }
        match self.tx.send(event).await {
            Ok(()) => true,
            Err(mpsc::error::SendError(event)) => {
                tracing::debug!(?event, "dropping event, receiver disconnected");
                false
            }
        }
    }

    /// Close the sink. Idempotent; later sends are dropped.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("event sink closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
