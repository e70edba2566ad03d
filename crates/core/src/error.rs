//! # Errors
//!
//! Error taxonomy for the orchestration engine.
//!
//! Specialist-level faults (`SpecialistError`) never escape the supervisor;
//! they are folded into the synthesis context as failure notices. Only the
//! request-level variants of [`OrchestratorError`] ever reach the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire discriminant for `error` events and error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidQuery,
    SpecialistFailure,
    SpecialistTimeout,
    AllSpecialistsFailed,
    SynthesisFailure,
    StreamAborted,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidQuery => "InvalidQuery",
            ErrorKind::SpecialistFailure => "SpecialistFailure",
            ErrorKind::SpecialistTimeout => "SpecialistTimeout",
            ErrorKind::AllSpecialistsFailed => "AllSpecialistsFailed",
            ErrorKind::SynthesisFailure => "SynthesisFailure",
            ErrorKind::StreamAborted => "StreamAborted",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request-level failures surfaced by the coordinator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    /// Malformed or empty input. Raised before any dispatch.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Every dispatched specialist failed or timed out and the policy
    /// requires at least one success.
    #[error("all {attempted} specialists failed or timed out")]
    AllSpecialistsFailed { attempted: usize },

    /// The model call failed or stalled while producing the narrative.
    #[error("synthesis failed: {0}")]
    SynthesisFailure(String),

    /// The caller went away or cancelled. Not reported as an error event.
    #[error("stream aborted by caller")]
    StreamAborted,
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::InvalidQuery(_) => ErrorKind::InvalidQuery,
            OrchestratorError::AllSpecialistsFailed { .. } => ErrorKind::AllSpecialistsFailed,
            OrchestratorError::SynthesisFailure(_) => ErrorKind::SynthesisFailure,
            OrchestratorError::StreamAborted => ErrorKind::StreamAborted,
        }
    }
}

/// Failure of a single specialist adapter call.
#[derive(Debug, Error)]
pub enum SpecialistError {
    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("data source returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("capability unavailable: {0}")]
    Unavailable(String),

    #[error("model call failed: {0}")]
    Model(String),
}

/// Failure of the model call capability.
#[derive(Debug, Error)]
pub enum ModelCallError {
    #[error("missing API key: set {0}")]
    MissingApiKey(&'static str),

    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode model response: {0}")]
    Decode(String),

    #[error("model stream interrupted: {0}")]
    Stream(String),
}

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("stream_buffer must be greater than zero")]
    ZeroBuffer,

    #[error("early_synthesis threshold must be greater than zero")]
    ZeroEarlyThreshold,

    #[error("unknown LLM provider '{0}'")]
    UnknownProvider(String),

    #[error("invalid value '{value}' for {field}")]
    InvalidValue { field: &'static str, value: String },

    #[error("could not read config file {path}: {reason}")]
    File { path: String, reason: String },
}
