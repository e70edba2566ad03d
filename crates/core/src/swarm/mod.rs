//! # Swarm Orchestration
//!
//! Plans, supervises, synthesizes, and streams one answer per query.
//!
//! ## Request Flow
//!
//! ```text
//! Query → Planner → Supervisor (parallel specialists) → Synthesizer → Emitter
//! ```

pub mod coordinator;
pub mod emitter;
pub mod events;
pub mod pipeline;
pub mod planner;
pub mod supervisor;
pub mod synthesizer;
pub mod task;

pub use coordinator::Coordinator;
pub use emitter::{RequestStream, StreamEmitter};
pub use events::{AnswerReport, ErrorPayload, SpecialistState, StatusEntry, StreamEvent};
pub use pipeline::{RequestPipeline, RequestStage};
pub use planner::{Classifier, IntentPlanner, KeywordClassifier, ModelClassifier, Selection};
pub use supervisor::{SpecialistSupervisor, StatusSender, SupervisorPolicy};
pub use synthesizer::{SynthesisStream, Synthesizer};
pub use task::{Outcome, Query, SpecialistResult, SpecialistTask, SynthesisContext};
