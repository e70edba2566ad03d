//! # Pharos Core
//!
//! The "Brain" of Pharos: plans which specialists a question needs, runs
//! them concurrently under deadlines, and streams one synthesized answer.
//!
//! ## Architecture
//!
//! - `swarm/` - Planner, supervisor, synthesizer, emitter, and the coordinator
//! - `specialists/` - The specialist contract and the reference adapters
//! - `llm/` - Model call capability (structured and streamed)
//! - `models/` - Centralized LLM provider configuration
//! - `config` - Orchestrator configuration and policy knobs
//!
//! ## Usage
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use pharos_core::config::OrchestratorConfig;
//! use pharos_core::swarm::Coordinator;
//!
//! let config = OrchestratorConfig::load().await?;
//! let coordinator = Coordinator::from_config(&config)?;
//! let mut events = coordinator.stream_text("Market size and patent expiry for metformin", None)?;
//! while let Some(event) = events.next().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! ```

pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod prompts;
pub mod specialists;
pub mod swarm;

pub use config::OrchestratorConfig;
pub use error::{ErrorKind, OrchestratorError};
pub use swarm::{AnswerReport, Coordinator, Query, RequestStream, StreamEvent};
