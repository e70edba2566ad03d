//! # Specialists
//!
//! Narrow, per-domain collaborators the supervisor fans out to.
//!
//! The orchestration core only sees the [`Specialist`] trait. The adapters
//! in this module are reference implementations against the internal data
//! API, a SearXNG search backend, and PubMed:
//!
//! | Kind                 | Adapter                   | Source                           |
//! |----------------------|---------------------------|----------------------------------|
//! | `market_intelligence`| [`DataApiSpecialist`]     | `/api/iqvia?area=`               |
//! | `patent`             | [`DataApiSpecialist`]     | `/api/patents?molecule=`         |
//! | `clinical_trials`    | [`DataApiSpecialist`]     | `/api/clinical-trials?molecule=` |
//! | `trade`              | [`DataApiSpecialist`]     | `/api/exim-trade?molecule=`      |
//! | `internal_knowledge` | [`DataApiSpecialist`]     | `/api/knowledge-base?doc_id=`    |
//! | `web_research`       | [`WebResearchSpecialist`] | SearXNG + PubMed E-utilities     |

pub mod data_api;
pub mod web;

use crate::config::OrchestratorConfig;
use crate::error::SpecialistError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub use data_api::DataApiSpecialist;
pub use web::WebResearchSpecialist;

/// Upper bound on the analysis text a specialist may hand to synthesis.
pub const MAX_FINDING_CHARS: usize = 8_000;

/// The fixed, closed set of specialist domains.
///
/// Declaration order is the canonical planning order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialistKind {
    MarketIntelligence,
    Patent,
    ClinicalTrials,
    Trade,
    InternalKnowledge,
    WebResearch,
}

impl SpecialistKind {
    pub fn all() -> [SpecialistKind; 6] {
        [
            SpecialistKind::MarketIntelligence,
            SpecialistKind::Patent,
            SpecialistKind::ClinicalTrials,
            SpecialistKind::Trade,
            SpecialistKind::InternalKnowledge,
            SpecialistKind::WebResearch,
        ]
    }

    /// Stable identifier used on the wire and in configuration
    pub fn id(&self) -> &'static str {
        match self {
            SpecialistKind::MarketIntelligence => "market_intelligence",
            SpecialistKind::Patent => "patent",
            SpecialistKind::ClinicalTrials => "clinical_trials",
            SpecialistKind::Trade => "trade",
            SpecialistKind::InternalKnowledge => "internal_knowledge",
            SpecialistKind::WebResearch => "web_research",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SpecialistKind::MarketIntelligence => "Market Intelligence",
            SpecialistKind::Patent => "Patent Landscape",
            SpecialistKind::ClinicalTrials => "Clinical Trials",
            SpecialistKind::Trade => "EXIM Trade",
            SpecialistKind::InternalKnowledge => "Internal Knowledge",
            SpecialistKind::WebResearch => "Web Intelligence",
        }
    }

    /// Look up a kind by its wire identifier
    pub fn from_id(id: &str) -> Option<SpecialistKind> {
        Self::all().into_iter().find(|kind| kind.id() == id)
    }
}

impl std::fmt::Display for SpecialistKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// What a specialist hands back on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Narrative analysis, bounded to [`MAX_FINDING_CHARS`]
    pub analysis: String,
    /// Raw payload the analysis was derived from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<serde_json::Value>,
}

impl Finding {
    pub fn new(analysis: impl Into<String>) -> Self {
        Self {
            analysis: bound_text(analysis.into()),
            raw_data: None,
        }
    }

    pub fn with_raw_data(mut self, raw: serde_json::Value) -> Self {
        self.raw_data = Some(raw);
        self
    }
}

fn bound_text(text: String) -> String {
    if text.chars().count() <= MAX_FINDING_CHARS {
        return text;
    }
    let mut bounded: String = text.chars().take(MAX_FINDING_CHARS).collect();
    bounded.push_str(" [truncated]");
    bounded
}

/// A bounded-capability collaborator answering one narrow sub-question.
///
/// Implementations are stateless and reentrant; the supervisor calls them
/// concurrently and wraps every call in the task deadline.
#[async_trait]
pub trait Specialist: Send + Sync {
    fn kind(&self) -> SpecialistKind;

    async fn invoke(&self, sub_question: &str, deadline: Duration)
        -> Result<Finding, SpecialistError>;
}

/// Kind → adapter lookup shared by every request.
#[derive(Clone, Default)]
pub struct SpecialistRegistry {
    adapters: HashMap<SpecialistKind, Arc<dyn Specialist>>,
}

impl SpecialistRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the reference adapters for all six kinds.
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        let mut registry = Self::new();
        for kind in SpecialistKind::all() {
            let model = config.model_config_for(kind);
            let adapter: Arc<dyn Specialist> = match kind {
                SpecialistKind::WebResearch => Arc::new(
                    WebResearchSpecialist::new(model, config.searxng_url.clone())
                        .with_pubmed_url(&config.pubmed_url),
                ),
                data_kind => Arc::new(DataApiSpecialist::new(
                    data_kind,
                    &config.data_api_url,
                    model,
                )),
            };
            registry.register(adapter);
        }
        registry
    }

    /// Add or replace the adapter for its kind.
    pub fn register(&mut self, adapter: Arc<dyn Specialist>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn Specialist>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, kind: SpecialistKind) -> Option<Arc<dyn Specialist>> {
        self.adapters.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<SpecialistKind> {
        let mut kinds: Vec<_> = self.adapters.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo(SpecialistKind);

    #[async_trait]
    impl Specialist for Echo {
        fn kind(&self) -> SpecialistKind {
            self.0
        }

        async fn invoke(&self, q: &str, _deadline: Duration) -> Result<Finding, SpecialistError> {
            Ok(Finding::new(q))
        }
    }

    #[test]
    fn test_kind_ids_round_trip() {
        for kind in SpecialistKind::all() {
            assert_eq!(SpecialistKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(SpecialistKind::from_id("astrology"), None);
        assert_eq!(
            serde_json::to_string(&SpecialistKind::ClinicalTrials).unwrap(),
            "\"clinical_trials\""
        );
    }

    #[test]
    fn test_finding_is_bounded() {
        let finding = Finding::new("x".repeat(MAX_FINDING_CHARS + 10));
        assert!(finding.analysis.ends_with("[truncated]"));
        assert_eq!(
            finding.analysis.chars().count(),
            MAX_FINDING_CHARS + " [truncated]".len()
        );
    }

    #[test]
    fn test_registry_replaces_by_kind() {
        let registry = SpecialistRegistry::new()
            .with(Arc::new(Echo(SpecialistKind::Patent)))
            .with(Arc::new(Echo(SpecialistKind::Trade)))
            .with(Arc::new(Echo(SpecialistKind::Patent)));
        assert_eq!(
            registry.kinds(),
            vec![SpecialistKind::Patent, SpecialistKind::Trade]
        );
        assert!(registry.get(SpecialistKind::WebResearch).is_none());
    }

    #[test]
    fn test_registry_from_config_covers_all_kinds() {
        let registry = SpecialistRegistry::from_config(&OrchestratorConfig::default());
        assert_eq!(registry.kinds(), SpecialistKind::all().to_vec());
    }
}
