//! # Data API Specialist
//!
//! Adapter for the five specialists backed by the internal data API.
//!
//! ```text
//! sub-question ──▶ model: which lookup key? ──▶ GET /api/<endpoint>?<param>=<key>
//!                                                        │
//!                      Finding ◀── model: analyse JSON ◀─┘
//! ```

use super::{Finding, Specialist, SpecialistKind};
use crate::error::SpecialistError;
use crate::models::ModelConfig;
use crate::prompts;
use crate::run_llm_function;
use async_trait::async_trait;
use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Lookup key extracted from the sub-question
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct LookupKey {
    /// Therapy area, molecule name, or document id to query
    pub key: String,
}

/// Analysis produced from the fetched data
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct SpecialistAnalysis {
    /// Data-grounded answer to the sub-question, citing the source
    pub analysis: String,
}

/// Where a data-backed kind reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub path: &'static str,
    pub param: &'static str,
}

impl Endpoint {
    pub fn for_kind(kind: SpecialistKind) -> Option<Endpoint> {
        let (path, param) = match kind {
            SpecialistKind::MarketIntelligence => ("/api/iqvia", "area"),
            SpecialistKind::Patent => ("/api/patents", "molecule"),
            SpecialistKind::ClinicalTrials => ("/api/clinical-trials", "molecule"),
            SpecialistKind::Trade => ("/api/exim-trade", "molecule"),
            SpecialistKind::InternalKnowledge => ("/api/knowledge-base", "doc_id"),
            SpecialistKind::WebResearch => return None,
        };
        Some(Endpoint { path, param })
    }
}

/// Specialist that resolves a lookup key, fetches JSON, and analyses it.
pub struct DataApiSpecialist {
    kind: SpecialistKind,
    base_url: String,
    model: ModelConfig,
    http: reqwest::Client,
}

impl DataApiSpecialist {
    pub fn new(kind: SpecialistKind, base_url: &str, model: ModelConfig) -> Self {
        Self {
            kind,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            http: reqwest::Client::new(),
        }
    }

    /// Full request URL for a lookup key
    pub fn request_url(&self, key: &str) -> Result<String, SpecialistError> {
        let endpoint = Endpoint::for_kind(self.kind).ok_or_else(|| {
            SpecialistError::Unavailable(format!("{} has no data endpoint", self.kind))
        })?;
        Ok(format!(
            "{}{}/?{}={}",
            self.base_url,
            endpoint.path,
            endpoint.param,
            urlencoding::encode(key.trim())
        ))
    }

    async fn lookup_key(&self, sub_question: &str) -> Result<String, SpecialistError> {
        let prompt = format!(
            "Specialist: {}\nQuestion: {}",
            self.kind.display_name(),
            sub_question
        );
        let key = run_llm_function!(&self.model, LookupKey, prompts::LOOKUP_KEY, prompt)
            .map_err(|e| SpecialistError::Model(e.to_string()))?;
        let key = key.key.trim().to_string();
        if key.is_empty() {
            return Err(SpecialistError::Malformed(
                "model returned an empty lookup key".to_string(),
            ));
        }
        Ok(key)
    }

    async fn fetch(&self, key: &str, timeout: Duration) -> Result<serde_json::Value, SpecialistError> {
        let url = self.request_url(key)?;
        tracing::debug!(specialist = %self.kind, %url, "fetching specialist data");

        let response = self
            .http
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|source| SpecialistError::Http {
                endpoint: url.clone(),
                source,
            })?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SpecialistError::Malformed(format!("non-JSON response: {}", e)))?;

        if !status.is_success() {
            let message = body
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("no error message")
                .to_string();
            return Err(SpecialistError::Upstream {
                status: status.as_u16(),
                message,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl Specialist for DataApiSpecialist {
    fn kind(&self) -> SpecialistKind {
        self.kind
    }

    async fn invoke(
        &self,
        sub_question: &str,
        deadline: Duration,
    ) -> Result<Finding, SpecialistError> {
        let started = Instant::now();
        let key = self.lookup_key(sub_question).await?;

        let remaining = deadline.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Err(SpecialistError::Unavailable(
                "deadline spent resolving lookup key".to_string(),
            ));
        }
        let data = self.fetch(&key, remaining).await?;

        let prompt = format!(
            "Question: {}\nLookup key: {}\nData:\n{}",
            sub_question,
            key,
            serde_json::to_string_pretty(&data).unwrap_or_default()
        );
        let analysis = run_llm_function!(
            &self.model,
            SpecialistAnalysis,
            prompts::specialist(self.kind),
            prompt
        )
        .map_err(|e| SpecialistError::Model(e.to_string()))?;

        Ok(Finding::new(analysis.analysis).with_raw_data(data))
    }
}
