//! # Synthesizer
//!
//! Turns a [`SynthesisContext`] into a lazy, finite stream of answer
//! fragments by driving the model in streaming mode.
//!
//! The stream ends after the first error. Every specialist appears in the
//! prompt: successes verbatim, gaps as explicit "no data available" notices.

use crate::error::OrchestratorError;
use crate::llm::{FragmentStream, ModelCall};
use crate::prompts;
use crate::swarm::task::{Outcome, SynthesisContext};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

/// Answer fragments in generation order; at most one trailing error.
pub type SynthesisStream = BoxStream<'static, Result<String, OrchestratorError>>;

#[derive(Clone)]
pub struct Synthesizer {
    model: Arc<dyn ModelCall>,
    fragment_timeout: Duration,
}

enum Phase {
    Open(SynthesisContext),
    Flowing {
        fragments: FragmentStream,
        context: SynthesisContext,
        emitted: bool,
    },
    Finished,
}

type Step = Option<(Result<String, OrchestratorError>, Phase)>;

impl Synthesizer {
    /// `fragment_timeout` bounds the wait for the stream to open and for
    /// each subsequent fragment.
    pub fn new(model: Arc<dyn ModelCall>, fragment_timeout: Duration) -> Self {
        Self {
            model,
            fragment_timeout,
        }
    }

    /// Start synthesis. Nothing is sent to the model until the stream is polled.
    pub fn synthesize(&self, context: SynthesisContext) -> SynthesisStream {
        let model = self.model.clone();
        let timeout = self.fragment_timeout;

        futures::stream::unfold(Phase::Open(context), move |phase| {
            let model = model.clone();
            async move {
                match phase {
                    Phase::Finished => None,
                    Phase::Open(context) => {
                        let prompt = build_prompt(&context);
                        tracing::debug!(
                            specialists = context.results().len(),
                            succeeded = context.success_count(),
                            "opening synthesis stream"
                        );
                        match tokio::time::timeout(timeout, model.stream(prompts::SYNTHESIZER, &prompt)).await {
                            Ok(Ok(fragments)) => next_fragment(fragments, context, false, timeout).await,
                            Ok(Err(e)) => fail(e.to_string()),
                            Err(_) => fail(format!(
                                "model did not start streaming within {}s",
                                timeout.as_secs()
                            )),
                        }
                    }
                    Phase::Flowing {
                        fragments,
                        context,
                        emitted,
                    } => next_fragment(fragments, context, emitted, timeout).await,
                }
            }
        })
        .boxed()
    }
}

async fn next_fragment(
    mut fragments: FragmentStream,
    context: SynthesisContext,
    emitted: bool,
    timeout: Duration,
) -> Step {
    loop {
        match tokio::time::timeout(timeout, fragments.next()).await {
            Err(_) => {
                return fail(format!("no fragment received for {}s", timeout.as_secs()));
            }
            Ok(None) if emitted => return None,
            Ok(None) => {
                tracing::warn!("model produced no text, answering from findings");
                return Some((Ok(fallback_narrative(&context)), Phase::Finished));
            }
            Ok(Some(Err(e))) => return fail(e.to_string()),
            Ok(Some(Ok(text))) if text.is_empty() => continue,
            Ok(Some(Ok(text))) => {
                tracing::trace!(len = text.len(), "fragment");
                let phase = Phase::Flowing {
                    fragments,
                    context,
                    emitted: true,
                };
                return Some((Ok(text), phase));
            }
        }
    }
}

fn fail(message: String) -> Step {
    Some((
        Err(OrchestratorError::SynthesisFailure(message)),
        Phase::Finished,
    ))
}

/// The single user prompt handed to the model.
pub fn build_prompt(context: &SynthesisContext) -> String {
    let mut prompt = format!("User query:\n{}\n\nSpecialist findings:\n", context.query().text());

    if context.results().is_empty() {
        prompt.push_str("\nNo specialists were consulted.\n");
    }
    for result in context.results() {
        let kind = result.task.kind();
        let _ = write!(prompt, "\n### {} ({})\n", kind.display_name(), kind.id());
        let _ = writeln!(prompt, "Question: {}", result.task.sub_question());
        match &result.outcome {
            Outcome::Success(finding) => {
                let _ = writeln!(prompt, "{}", finding.analysis);
            }
            _ => {
                let reason = result.gap_reason().unwrap_or_default();
                let _ = writeln!(
                    prompt,
                    "No data available for {} because {}.",
                    kind.display_name(),
                    reason
                );
            }
        }
    }

    if context.success_count() < context.results().len() {
        prompt.push_str(
            "\nSome specialists returned no data. Say which parts of the question could not be answered.\n",
        );
    }
    prompt
}

/// Plain answer assembled from the findings when the model returns nothing.
fn fallback_narrative(context: &SynthesisContext) -> String {
    let mut text = format!(
        "No narrative could be generated for \"{}\". The specialists reported:\n",
        context.query().text()
    );
    if context.results().is_empty() {
        text.push_str("\n- No specialists were consulted.\n");
    }
    for result in context.results() {
        let name = result.task.kind().display_name();
        match &result.outcome {
            Outcome::Success(finding) => {
                let _ = write!(text, "\n- {}: {}\n", name, finding.analysis);
            }
            _ => {
                let _ = write!(
                    text,
                    "\n- {}: no data available because {}.\n",
                    name,
                    result.gap_reason().unwrap_or_default()
                );
            }
        }
    }
    text
}
