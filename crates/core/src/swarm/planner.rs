//! # Intent Planner
//!
//! Maps a query to the specialists it needs.
//!
//! Classification is pluggable ([`Classifier`]). Whatever the classifier
//! returns is normalised the same way: unknown or duplicate kinds are
//! dropped, selections are sorted into canonical kind order, and an empty
//! selection falls back to web research alone. Given the same classifier
//! output the plan is always identical.

use crate::config::{OrchestratorConfig, PlannerMode};
use crate::models::ModelConfig;
use crate::prompts;
use crate::run_llm_function;
use crate::specialists::SpecialistKind;
use crate::swarm::task::{Query, SpecialistTask};
use async_trait::async_trait;
use radkit::macros::LLMOutput;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Kind used when classification selects nothing
pub const FALLBACK_KIND: SpecialistKind = SpecialistKind::WebResearch;

/// Longest wait for the classifier before keyword rules take over
pub const DEFAULT_CLASSIFY_TIMEOUT: Duration = Duration::from_secs(20);

/// One classifier pick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub kind: SpecialistKind,
    pub sub_question: String,
}

/// Decides which specialists a query touches.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, query: &Query) -> anyhow::Result<Vec<Selection>>;
}

/// Word-boundary keyword rules, one per specialist kind.
pub struct KeywordClassifier {
    rules: Vec<(SpecialistKind, Regex)>,
}

const KEYWORD_RULES: [(SpecialistKind, &str); 6] = [
    (
        SpecialistKind::MarketIntelligence,
        r"(?i)\b(markets?|market size|sales|revenue|cagr|growth|competit\w*|market share|therapy areas?|iqvia|disease landscape)\b",
    ),
    (
        SpecialistKind::Patent,
        r"(?i)\b(patents?|patent\w+|fto|freedom[- ]to[- ]operate|expir\w*|exclusivity|intellectual property|ip strategy|generic entry)\b",
    ),
    (
        SpecialistKind::ClinicalTrials,
        r"(?i)\b(clinical|trials?|phase\s*(iv|i{1,3}|[1-4])|sponsors?|enrol\w*|emerging indications?|nct\d+)\b",
    ),
    (
        SpecialistKind::Trade,
        r"(?i)\b(exports?|imports?|export\w+|import\w+|exim|trade|sourcing|suppliers?|shipments?)\b",
    ),
    (
        SpecialistKind::InternalKnowledge,
        r"(?i)\b(internal|our (strategy|company|plants?|capabilit\w*)|field reports?|manufacturing|knowledge base|[a-z]{3,6}-\d{4}-\d{3})\b",
    ),
    (
        SpecialistKind::WebResearch,
        r"(?i)\b(news|guidelines?|literature|pubmed|papers?|articles?|publications?|patient (perspectives?|views?)|web)\b",
    ),
];

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordClassifier {
    pub fn new() -> Self {
        let rules = KEYWORD_RULES
            .iter()
            .filter_map(|(kind, pattern)| Regex::new(pattern).ok().map(|re| (*kind, re)))
            .collect();
        Self { rules }
    }

    /// Synchronous classification; never fails.
    pub fn select(&self, query: &Query) -> Vec<Selection> {
        self.rules
            .iter()
            .filter(|(_, re)| re.is_match(query.text()))
            .map(|(kind, _)| Selection {
                kind: *kind,
                sub_question: query.text().to_string(),
            })
            .collect()
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, query: &Query) -> anyhow::Result<Vec<Selection>> {
        Ok(self.select(query))
    }
}

/// A specialist picked by the model
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct PlannedSpecialist {
    /// One of: market_intelligence, patent, clinical_trials, trade, internal_knowledge, web_research
    pub specialist: String,
    /// The question phrased for that specialist alone
    pub sub_question: String,
}

/// Output of the planning call
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct PlannerOutput {
    pub specialists: Vec<PlannedSpecialist>,
}

/// Single structured-output model call.
pub struct ModelClassifier {
    config: ModelConfig,
}

impl ModelClassifier {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Classifier for ModelClassifier {
    async fn classify(&self, query: &Query) -> anyhow::Result<Vec<Selection>> {
        let output = run_llm_function!(
            &self.config,
            PlannerOutput,
            prompts::PLANNER,
            format!("User query:\n{}", query.text())
        )?;

        Ok(output
            .specialists
            .into_iter()
            .filter_map(|pick| {
                let kind = SpecialistKind::from_id(pick.specialist.trim());
                if kind.is_none() {
                    tracing::debug!(specialist = %pick.specialist, "planner named unknown specialist");
                }
                kind.map(|kind| Selection {
                    kind,
                    sub_question: pick.sub_question,
                })
            })
            .collect())
    }
}

/// Produces the task set for a query.
#[derive(Clone)]
pub struct IntentPlanner {
    classifier: Arc<dyn Classifier>,
    keywords: Arc<KeywordClassifier>,
    classify_timeout: Duration,
    default_deadline: Duration,
    deadlines: HashMap<SpecialistKind, Duration>,
}

impl IntentPlanner {
    pub fn new(classifier: Arc<dyn Classifier>, default_deadline: Duration) -> Self {
        Self {
            classifier,
            keywords: Arc::new(KeywordClassifier::new()),
            classify_timeout: DEFAULT_CLASSIFY_TIMEOUT,
            default_deadline,
            deadlines: HashMap::new(),
        }
    }

    /// Classifier and deadlines as configured.
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        let classifier: Arc<dyn Classifier> = match config.planner {
            PlannerMode::Keywords => Arc::new(KeywordClassifier::new()),
            PlannerMode::Model => Arc::new(ModelClassifier::new(config.model.clone())),
        };
        let mut planner = Self::new(classifier, Duration::from_secs(config.specialist_timeout_secs))
            .with_classify_timeout(config.planner_timeout());
        for kind in SpecialistKind::all() {
            planner.deadlines.insert(kind, config.timeout_for(kind));
        }
        planner
    }

    pub fn with_classify_timeout(mut self, timeout: Duration) -> Self {
        self.classify_timeout = timeout;
        self
    }

    pub fn with_deadline(mut self, kind: SpecialistKind, deadline: Duration) -> Self {
        self.deadlines.insert(kind, deadline);
        self
    }

    /// Plan the tasks for an accepted query. Never empty.
    pub async fn plan(&self, query: &Query) -> Vec<SpecialistTask> {
        let classified = tokio::time::timeout(self.classify_timeout, self.classifier.classify(query));
        let selections = match classified.await {
            Ok(Ok(selections)) => selections,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "classifier failed, using keyword rules");
                self.keywords.select(query)
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.classify_timeout.as_secs(),
                    "classifier timed out, using keyword rules"
                );
                self.keywords.select(query)
            }
        };
        self.build_tasks(query, selections)
    }

    /// Normalise classifier output into tasks.
    pub fn build_tasks(&self, query: &Query, selections: Vec<Selection>) -> Vec<SpecialistTask> {
        let mut picked: Vec<Selection> = Vec::new();
        for selection in selections {
            if !picked.iter().any(|p| p.kind == selection.kind) {
                picked.push(selection);
            }
        }
        if picked.is_empty() {
            tracing::info!(fallback = %FALLBACK_KIND, "no specialist matched query");
            picked.push(Selection {
                kind: FALLBACK_KIND,
                sub_question: query.text().to_string(),
            });
        }
        picked.sort_by_key(|selection| selection.kind);

        picked
            .into_iter()
            .enumerate()
            .map(|(index, selection)| {
                let sub_question = if selection.sub_question.trim().is_empty() {
                    query.text().to_string()
                } else {
                    selection.sub_question
                };
                let deadline = self
                    .deadlines
                    .get(&selection.kind)
                    .copied()
                    .unwrap_or(self.default_deadline);
                SpecialistTask::new(index, selection.kind, sub_question, deadline)
            })
            .collect()
    }
}
