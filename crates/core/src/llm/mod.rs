//! # Model Call Capability
//!
//! The engine never talks to a provider directly. It asks a [`ModelCall`]
//! for either a whole completion or a stream of text fragments.
//!
//! ```text
//! Synthesizer ──stream(system, prompt)──▶ ModelCall ──▶ fragment, fragment, ...
//! ```
//!
//! Dropping a [`FragmentStream`] abandons the in-flight request, which is how
//! mid-stream cancellation reaches the provider.

pub mod helpers;
pub mod openai;

use crate::error::ModelCallError;
use async_trait::async_trait;
use futures::stream::BoxStream;

pub use openai::{OpenAiCompatClient, SseLineBuffer};

/// Ordered text fragments produced by a streamed model call.
pub type FragmentStream = BoxStream<'static, Result<String, ModelCallError>>;

/// "Ask model M to produce text given context C".
#[async_trait]
pub trait ModelCall: Send + Sync {
    /// Produce the full completion in one response.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ModelCallError>;

    /// Produce the completion as a sequence of fragments in generation order.
    async fn stream(&self, system: &str, prompt: &str) -> Result<FragmentStream, ModelCallError>;
}
