//! Per-model branch record and its state machine.

use chrono::{DateTime, Utc};

use crate::providers::ProviderId;

/// Lifecycle states of one branch.
///
/// States only ever advance: Pending → Loading → Streaming* → {Done | Errored}.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchState {
    Pending,
    Loading,
    Streaming,
    Done,
    Errored,
}

impl BranchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Errored)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Loading => 1,
            Self::Streaming => 2,
            Self::Done | Self::Errored => 3,
        }
    }
}

/// The per-model unit of work within one fan-out request.
#[derive(Debug, Clone)]
pub struct ModelBranch {
    pub model: String,
    pub provider: ProviderId,
    state: BranchState,
    /// Text accumulated from non-empty deltas so far.
    pub text: String,
    /// Total chunks pulled, including empty ones.
    pub chunks: u32,
    pub started_at: DateTime<Utc>,
    pub retries: u32,
}

impl ModelBranch {
    pub fn new(model: impl Into<String>, provider: ProviderId) -> Self {
        Self {
            model: model.into(),
            provider,
            state: BranchState::Pending,
            text: String::new(),
            chunks: 0,
            started_at: Utc::now(),
            retries: 0,
        }
    }

    pub fn state(&self) -> BranchState {
        self.state
    }

    /// Advance the state machine. Regressions and transitions out of a
    /// terminal state are rejected and logged.
    pub fn advance(&mut self, next: BranchState) -> bool {
        if self.state.is_terminal() || next.rank() < self.state.rank() {
            tracing::warn!(
                model = %self.model,
                from = ?self.state,
                to = ?next,
                "rejected branch state transition"
            );
            return false;
        }
        self.state = next;
        true
    }

    /// Record one non-empty delta.
    pub fn push_delta(&mut self, delta: &str) {
        self.text.push_str(delta);
    }
}
