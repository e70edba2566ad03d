//! # Request Stages
//!
//! Per-request state machine.
//!
//! ```text
//! Planning ─▶ Dispatching ─▶ Synthesizing ─▶ Streaming ─▶ Completed
//!     │            │              │              │
//!     └────────────┴──────────────┴──────────────┴──────▶ Aborted
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStage {
    /// Choosing specialists
    Planning,
    /// Specialists running
    Dispatching,
    /// Building context and opening the model stream
    Synthesizing,
    /// Fragments flowing to the caller
    Streaming,
    Completed,
    Aborted,
}

/// The request state machine
#[derive(Debug, Clone)]
pub struct RequestPipeline {
    pub stage: RequestStage,
}

impl Default for RequestPipeline {
    fn default() -> Self {
        Self {
            stage: RequestStage::Planning,
        }
    }
}

impl RequestPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to the next working stage.
    ///
    /// `Streaming` does not advance on its own; use [`complete`](Self::complete).
    pub fn advance(&mut self) {
        let next = match self.stage {
            RequestStage::Planning => RequestStage::Dispatching,
            RequestStage::Dispatching => RequestStage::Synthesizing,
            RequestStage::Synthesizing => RequestStage::Streaming,
            other => other,
        };
        self.transition(next);
    }

    /// Finish after a `done` event. Only valid from `Streaming`.
    pub fn complete(&mut self) -> bool {
        if self.stage != RequestStage::Streaming {
            return false;
        }
        self.transition(RequestStage::Completed);
        true
    }

    /// Cancellation or unrecoverable failure
    pub fn abort(&mut self) {
        if self.stage != RequestStage::Completed {
            self.transition(RequestStage::Aborted);
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.stage, RequestStage::Completed | RequestStage::Aborted)
    }

    fn transition(&mut self, next: RequestStage) {
        if next != self.stage {
            tracing::debug!(from = ?self.stage, to = ?next, "request stage");
            self.stage = next;
        }
    }
}
