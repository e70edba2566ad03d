//! # Coordinator
//!
//! Drives one request through the pipeline:
//!
//! ```text
//! Query → IntentPlanner → SpecialistSupervisor → Synthesizer → StreamEmitter → caller
//!                               │ status events ────────────────▲
//! ```
//!
//! Each request runs on its own spawned task and shares nothing mutable with
//! other requests. The caller holds a [`RequestStream`]; dropping or
//! cancelling it tears the whole request down.

use crate::config::OrchestratorConfig;
use crate::error::{ModelCallError, OrchestratorError};
use crate::llm::{ModelCall, OpenAiCompatClient};
use crate::specialists::SpecialistRegistry;
use crate::swarm::emitter::{RequestStream, StreamEmitter};
use crate::swarm::events::{AnswerReport, StreamEvent};
use crate::swarm::pipeline::{RequestPipeline, RequestStage};
use crate::swarm::planner::IntentPlanner;
use crate::swarm::supervisor::{SpecialistSupervisor, SupervisorPolicy};
use crate::swarm::synthesizer::Synthesizer;
use crate::swarm::task::{Query, SynthesisContext};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Entry point for answering queries. Cheap to clone.
#[derive(Clone)]
pub struct Coordinator {
    planner: Arc<IntentPlanner>,
    supervisor: Arc<SpecialistSupervisor>,
    synthesizer: Arc<Synthesizer>,
    stream_buffer: usize,
}

impl Coordinator {
    pub fn new(
        planner: IntentPlanner,
        supervisor: SpecialistSupervisor,
        synthesizer: Synthesizer,
        stream_buffer: usize,
    ) -> Self {
        Self {
            planner: Arc::new(planner),
            supervisor: Arc::new(supervisor),
            synthesizer: Arc::new(synthesizer),
            stream_buffer,
        }
    }

    /// Wire the reference specialists and the OpenAI-compatible streaming client.
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self, ModelCallError> {
        let model: Arc<dyn ModelCall> = Arc::new(OpenAiCompatClient::from_env(config.model.clone())?);
        Ok(Self::with_parts(
            config,
            SpecialistRegistry::from_config(config),
            model,
        ))
    }

    /// Build from configuration with caller-supplied specialists and model.
    pub fn with_parts(
        config: &OrchestratorConfig,
        registry: SpecialistRegistry,
        model: Arc<dyn ModelCall>,
    ) -> Self {
        Self::new(
            IntentPlanner::from_config(config),
            SpecialistSupervisor::new(registry, SupervisorPolicy::from_config(config)),
            Synthesizer::new(model, config.fragment_timeout()),
            config.stream_buffer,
        )
    }

    /// Validate `text` and start answering it.
    ///
    /// Invalid input fails here, before anything is dispatched.
    pub fn stream_text(
        &self,
        text: &str,
        conversation_id: Option<String>,
    ) -> Result<RequestStream, OrchestratorError> {
        let query = Query::new(text)?.with_conversation(conversation_id);
        Ok(self.stream(query))
    }

    /// Start answering `query`; events arrive on the returned stream.
    pub fn stream(&self, query: Query) -> RequestStream {
        let cancel = CancellationToken::new();
        let (emitter, stream) = StreamEmitter::channel(self.stream_buffer, cancel.clone());
        let this = self.clone();
        tokio::spawn(async move {
            let stage = this.drive(query, emitter, cancel).await;
            tracing::debug!(?stage, "request task finished");
        });
        stream
    }

    /// Non-streaming variant: consume the same events and assemble them.
    pub async fn answer(&self, query: Query) -> AnswerReport {
        let mut stream = self.stream(query);
        let mut report = AnswerReport::default();
        while let Some(event) = stream.next().await {
            report.apply(event);
        }
        report
    }

    #[tracing::instrument(
        name = "request",
        skip_all,
        fields(
            query = %query.text().chars().take(50).collect::<String>(),
            conversation = ?query.conversation_id()
        )
    )]
    async fn drive(
        &self,
        query: Query,
        mut emitter: StreamEmitter,
        cancel: CancellationToken,
    ) -> RequestStage {
        let mut pipeline = RequestPipeline::new();

        let tasks = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                pipeline.abort();
                return pipeline.stage;
            }
            tasks = self.planner.plan(&query) => tasks,
        };
        tracing::info!(
            specialists = ?tasks.iter().map(|t| t.kind().id()).collect::<Vec<_>>(),
            "planned"
        );

        pipeline.advance();
        let (status_tx, mut status_rx) = mpsc::unbounded_channel::<StreamEvent>();
        let dispatch = self.supervisor.run(tasks, status_tx, cancel.clone());
        tokio::pin!(dispatch);

        let dispatched = loop {
            tokio::select! {
                biased;
                Some(event) = status_rx.recv() => {
                    emitter.emit(event).await;
                }
                outcome = &mut dispatch => break outcome,
            }
        };
        while let Ok(event) = status_rx.try_recv() {
            emitter.emit(event).await;
        }

        let results = match dispatched {
            Ok(results) => results,
            Err(e) => {
                if e != OrchestratorError::StreamAborted {
                    tracing::error!(error = %e, "dispatch failed");
                }
                emitter.fail(&e).await;
                pipeline.abort();
                return pipeline.stage;
            }
        };

        pipeline.advance();
        let mut fragments = self
            .synthesizer
            .synthesize(SynthesisContext::new(query, results));

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(stage = ?pipeline.stage, "request cancelled");
                    pipeline.abort();
                    return pipeline.stage;
                }
                Some(event) = status_rx.recv() => {
                    emitter.emit(event).await;
                }
                next = fragments.next() => match next {
                    Some(Ok(text)) => {
                        pipeline.advance();
                        if !emitter.emit(StreamEvent::chunk(text)).await {
                            pipeline.abort();
                            return pipeline.stage;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, emitted = emitter.emitted(), "synthesis failed");
                        emitter.fail(&e).await;
                        pipeline.abort();
                        return pipeline.stage;
                    }
                    None => {
                        pipeline.advance();
                        if emitter.finish().await {
                            pipeline.complete();
                        } else {
                            pipeline.abort();
                        }
                        return pipeline.stage;
                    }
                },
            }
        }
    }
}
