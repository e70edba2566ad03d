//! # Tasks and Results
//!
//! The values that flow between planner, supervisor, and synthesizer.
//! All of them are immutable once built.

use crate::error::{ErrorKind, OrchestratorError};
use crate::specialists::{Finding, SpecialistKind};
use crate::swarm::events::SpecialistState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Longest accepted query, in characters
pub const MAX_QUERY_CHARS: usize = 4_000;

/// Floor applied to every task deadline
pub const MIN_DEADLINE: Duration = Duration::from_millis(1);

/// A caller's question. Validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Query {
    text: String,
    conversation_id: Option<String>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Result<Self, OrchestratorError> {
        let text = text.into().trim().to_string();
        if text.is_empty() {
            return Err(OrchestratorError::InvalidQuery(
                "query must not be empty".to_string(),
            ));
        }
        let len = text.chars().count();
        if len > MAX_QUERY_CHARS {
            return Err(OrchestratorError::InvalidQuery(format!(
                "query is {} characters, limit is {}",
                len, MAX_QUERY_CHARS
            )));
        }
        if text.chars().all(|c| !c.is_alphanumeric()) {
            return Err(OrchestratorError::InvalidQuery(
                "query contains no words".to_string(),
            ));
        }
        Ok(Self {
            text,
            conversation_id: None,
        })
    }

    pub fn with_conversation(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id.filter(|id| !id.trim().is_empty());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }
}

/// One dispatched specialist call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialistTask {
    index: usize,
    kind: SpecialistKind,
    sub_question: String,
    deadline: Duration,
}

impl SpecialistTask {
    /// `index` is the task's slot in the result array.
    pub fn new(
        index: usize,
        kind: SpecialistKind,
        sub_question: impl Into<String>,
        deadline: Duration,
    ) -> Self {
        Self {
            index,
            kind,
            sub_question: sub_question.into(),
            deadline: deadline.max(MIN_DEADLINE),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn kind(&self) -> SpecialistKind {
        self.kind
    }

    pub fn sub_question(&self) -> &str {
        &self.sub_question
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Finding),
    Failed(String),
    TimedOut,
}

/// Settled fate of one task. Exactly one exists per dispatched task.
#[derive(Debug, Clone)]
pub struct SpecialistResult {
    pub task: SpecialistTask,
    pub outcome: Outcome,
    pub elapsed: Duration,
    pub settled_at: DateTime<Utc>,
}

impl SpecialistResult {
    pub fn new(task: SpecialistTask, outcome: Outcome, elapsed: Duration) -> Self {
        Self {
            task,
            outcome,
            elapsed,
            settled_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    pub fn state(&self) -> SpecialistState {
        match self.outcome {
            Outcome::Success(_) => SpecialistState::Succeeded,
            Outcome::Failed(_) => SpecialistState::Failed,
            Outcome::TimedOut => SpecialistState::TimedOut,
        }
    }

    /// Taxonomy kind of a gap, `None` on success.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self.outcome {
            Outcome::Success(_) => None,
            Outcome::Failed(_) => Some(ErrorKind::SpecialistFailure),
            Outcome::TimedOut => Some(ErrorKind::SpecialistTimeout),
        }
    }

    /// Human-readable reason for a gap, `None` on success.
    pub fn gap_reason(&self) -> Option<String> {
        match &self.outcome {
            Outcome::Success(_) => None,
            Outcome::Failed(reason) => Some(reason.clone()),
            Outcome::TimedOut => Some(format!(
                "it did not respond within {:.1}s",
                self.elapsed.as_secs_f64()
            )),
        }
    }
}

/// Everything the synthesizer sees: the query and every result, in plan order.
#[derive(Debug, Clone)]
pub struct SynthesisContext {
    query: Query,
    results: Vec<SpecialistResult>,
}

impl SynthesisContext {
    pub fn new(query: Query, mut results: Vec<SpecialistResult>) -> Self {
        results.sort_by_key(|result| result.task.index());
        Self { query, results }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn results(&self) -> &[SpecialistResult] {
        &self.results
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }
}
