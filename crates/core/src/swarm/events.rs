//! # Stream Events
//!
//! The wire vocabulary between the engine and its caller. Each event is a
//! JSON object discriminated by `type`:
//!
//! ```json
//! {"type":"status","specialist":"patent","state":"started"}
//! {"type":"chunk","text":"According to market data"}
//! {"type":"error","kind":"SynthesisFailure","message":"..."}
//! {"type":"done"}
//! ```

use crate::error::{ErrorKind, OrchestratorError};
use crate::specialists::SpecialistKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress of one specialist task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SpecialistState {
    Started,
    Succeeded,
    Failed,
    TimedOut,
}

impl SpecialistState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, SpecialistState::Started)
    }
}

/// An event on the caller-facing stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental answer text
    Chunk { text: String },
    /// A specialist's fate changed
    Status {
        specialist: SpecialistKind,
        state: SpecialistState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    /// Terminal failure
    Error { kind: ErrorKind, message: String },
    /// Normal termination
    Done,
}

impl StreamEvent {
    pub fn chunk(text: impl Into<String>) -> Self {
        StreamEvent::Chunk { text: text.into() }
    }

    pub fn status(specialist: SpecialistKind, state: SpecialistState) -> Self {
        StreamEvent::Status {
            specialist,
            state,
            detail: None,
        }
    }

    pub fn status_with_detail(
        specialist: SpecialistKind,
        state: SpecialistState,
        detail: impl Into<String>,
    ) -> Self {
        StreamEvent::Status {
            specialist,
            state,
            detail: Some(detail.into()),
        }
    }

    pub fn error(err: &OrchestratorError) -> Self {
        StreamEvent::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// `done` and `error` end the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error { .. })
    }
}

/// Error body shared by the `error` event and non-streaming responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
}

/// Last known state of one specialist, as reported to non-streaming callers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusEntry {
    pub specialist: SpecialistKind,
    pub state: SpecialistState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// The fully assembled outcome of one request
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnswerReport {
    pub text: String,
    pub statuses: Vec<StatusEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl AnswerReport {
    /// Fold one event into the report.
    ///
    /// Statuses keep first-seen order and hold the latest state per specialist.
    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Chunk { text } => self.text.push_str(&text),
            StreamEvent::Status {
                specialist,
                state,
                detail,
            } => {
                let now = Utc::now();
                match self.statuses.iter_mut().find(|s| s.specialist == specialist) {
                    Some(entry) => {
                        entry.state = state;
                        entry.detail = detail;
                        entry.updated_at = now;
                    }
                    None => self.statuses.push(StatusEntry {
                        specialist,
                        state,
                        detail,
                        updated_at: now,
                    }),
                }
            }
            StreamEvent::Error { kind, message } => {
                self.error = Some(ErrorPayload { kind, message });
            }
            StreamEvent::Done => {}
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
