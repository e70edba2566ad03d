//! # Web Research Specialist
//!
//! Searches a SearXNG instance and PubMed side by side and summarises the
//! merged hits. Either source alone is enough to produce a finding.

use super::data_api::SpecialistAnalysis;
use super::{Finding, Specialist, SpecialistKind};
use crate::error::SpecialistError;
use crate::models::ModelConfig;
use crate::prompts;
use crate::run_llm_function;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const MAX_RESULTS: usize = 5;

/// NCBI E-utilities root
pub const DEFAULT_PUBMED_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitSource {
    Web,
    PubMed,
}

/// One search hit, flattened from the backend response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub source: HitSource,
    pub title: String,
    pub url: String,
    pub snippet: String,
}

pub struct WebResearchSpecialist {
    model: ModelConfig,
    endpoints: Vec<String>,
    pubmed_url: String,
    http: reqwest::Client,
}

impl WebResearchSpecialist {
    /// `searxng_url` is tried first, then the local default ports.
    pub fn new(model: ModelConfig, searxng_url: Option<String>) -> Self {
        let mut endpoints = Vec::new();
        if let Some(url) = searxng_url {
            endpoints.push(format!("{}/search", url.trim_end_matches('/')));
        }
        endpoints.push("http://localhost:8888/search".to_string());
        endpoints.push("http://127.0.0.1:8888/search".to_string());
        endpoints.dedup();

        Self {
            model,
            endpoints,
            pubmed_url: DEFAULT_PUBMED_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_pubmed_url(mut self, url: &str) -> Self {
        self.pubmed_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    async fn search_web(&self, query: &str, timeout: Duration) -> Result<Vec<SearchHit>, SpecialistError> {
        let mut last_error = None;
        for endpoint in &self.endpoints {
            let url = format!("{}?q={}&format=json", endpoint, urlencoding::encode(query));
            match self.http.get(&url).timeout(timeout).send().await {
                Ok(response) => match response.json::<serde_json::Value>().await {
                    Ok(json) => return Ok(parse_hits(&json)),
                    Err(e) => last_error = Some(format!("{}: {}", endpoint, e)),
                },
                Err(e) => {
                    tracing::debug!(%endpoint, error = %e, "search endpoint unreachable");
                    last_error = Some(format!("{}: {}", endpoint, e));
                }
            }
        }
        Err(SpecialistError::Unavailable(format!(
            "no search backend reachable ({})",
            last_error.unwrap_or_else(|| "no endpoints configured".to_string())
        )))
    }

    async fn get_json(&self, url: &str, timeout: Duration) -> Result<serde_json::Value, SpecialistError> {
        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|source| SpecialistError::Http {
                endpoint: url.to_string(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(SpecialistError::Upstream {
                status: response.status().as_u16(),
                message: format!("PubMed returned {}", response.status()),
            });
        }
        response
            .json()
            .await
            .map_err(|e| SpecialistError::Malformed(format!("non-JSON PubMed response: {}", e)))
    }

    /// `esearch` for ids, then `esummary` for titles and citations.
    async fn search_pubmed(&self, query: &str, timeout: Duration) -> Result<Vec<SearchHit>, SpecialistError> {
        let started = Instant::now();
        let search_url = format!(
            "{}/esearch.fcgi?db=pubmed&retmode=json&retmax={}&term={}",
            self.pubmed_url,
            MAX_RESULTS,
            urlencoding::encode(query)
        );
        let ids = parse_pubmed_ids(&self.get_json(&search_url, timeout).await?);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Err(SpecialistError::Unavailable(
                "deadline spent searching PubMed".to_string(),
            ));
        }
        let summary_url = format!(
            "{}/esummary.fcgi?db=pubmed&retmode=json&id={}",
            self.pubmed_url,
            ids.join(",")
        );
        Ok(parse_pubmed_summaries(&self.get_json(&summary_url, remaining).await?))
    }
}

fn parse_hits(json: &serde_json::Value) -> Vec<SearchHit> {
    json.get("results")
        .and_then(|r| r.as_array())
        .map(|results| {
            results
                .iter()
                .take(MAX_RESULTS)
                .map(|hit| SearchHit {
                    source: HitSource::Web,
                    title: text_field(hit, "title"),
                    url: text_field(hit, "url"),
                    snippet: text_field(hit, "content"),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_pubmed_ids(json: &serde_json::Value) -> Vec<String> {
    json.pointer("/esearchresult/idlist")
        .and_then(|ids| ids.as_array())
        .map(|ids| {
            ids.iter()
                .filter_map(|id| id.as_str())
                .take(MAX_RESULTS)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_pubmed_summaries(json: &serde_json::Value) -> Vec<SearchHit> {
    let Some(result) = json.get("result") else {
        return Vec::new();
    };
    let uids = result
        .get("uids")
        .and_then(|u| u.as_array())
        .cloned()
        .unwrap_or_default();

    uids.iter()
        .filter_map(|uid| uid.as_str())
        .filter_map(|uid| result.get(uid).map(|doc| (uid, doc)))
        .take(MAX_RESULTS)
        .map(|(uid, doc)| {
            let journal = text_field(doc, "fulljournalname");
            let journal = if journal.is_empty() { text_field(doc, "source") } else { journal };
            SearchHit {
                source: HitSource::PubMed,
                title: text_field(doc, "title"),
                url: format!("https://pubmed.ncbi.nlm.nih.gov/{}/", uid),
                snippet: format!("{}, {} (PMID {})", journal, text_field(doc, "pubdate"), uid),
            }
        })
        .collect()
}

fn text_field(value: &serde_json::Value, name: &str) -> String {
    value
        .get(name)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

/// Interleave both sources so neither crowds the other out of the bound.
fn merge_hits(web: Vec<SearchHit>, pubmed: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut merged = Vec::with_capacity(MAX_RESULTS);
    let mut web = web.into_iter();
    let mut pubmed = pubmed.into_iter();
    while merged.len() < MAX_RESULTS {
        let (a, b) = (web.next(), pubmed.next());
        if a.is_none() && b.is_none() {
            break;
        }
        merged.extend(a);
        if merged.len() < MAX_RESULTS {
            merged.extend(b);
        }
    }
    merged
}

/// Merge whichever sources answered; no hits at all is a gap.
fn combine_results(
    web: Result<Vec<SearchHit>, SpecialistError>,
    pubmed: Result<Vec<SearchHit>, SpecialistError>,
) -> Result<Vec<SearchHit>, SpecialistError> {
    let hits = match (web, pubmed) {
        (Err(web), Err(pubmed)) => {
            return Err(SpecialistError::Unavailable(format!(
                "web search failed ({}); PubMed failed ({})",
                web, pubmed
            )));
        }
        (web, pubmed) => {
            if let Err(e) = &web {
                tracing::warn!(error = %e, "web search failed, using PubMed only");
            }
            if let Err(e) = &pubmed {
                tracing::warn!(error = %e, "PubMed search failed, using web only");
            }
            merge_hits(web.unwrap_or_default(), pubmed.unwrap_or_default())
        }
    };
    if hits.is_empty() {
        return Err(SpecialistError::Unavailable(
            "search returned no results".to_string(),
        ));
    }
    Ok(hits)
}

#[async_trait]
impl Specialist for WebResearchSpecialist {
    fn kind(&self) -> SpecialistKind {
        SpecialistKind::WebResearch
    }

    async fn invoke(
        &self,
        sub_question: &str,
        deadline: Duration,
    ) -> Result<Finding, SpecialistError> {
        let started = Instant::now();
        let (web, pubmed) = tokio::join!(
            self.search_web(sub_question, deadline),
            self.search_pubmed(sub_question, deadline)
        );
        let hits = combine_results(web, pubmed)?;
        if started.elapsed() >= deadline {
            return Err(SpecialistError::Unavailable(
                "deadline spent searching".to_string(),
            ));
        }

        let raw = serde_json::to_value(&hits)
            .map_err(|e| SpecialistError::Malformed(e.to_string()))?;
        let prompt = format!(
            "Question: {}\nSearch results:\n{}",
            sub_question,
            serde_json::to_string_pretty(&raw).unwrap_or_default()
        );
        let analysis = run_llm_function!(
            &self.model,
            SpecialistAnalysis,
            prompts::specialist(SpecialistKind::WebResearch),
            prompt
        )
        .map_err(|e| SpecialistError::Model(e.to_string()))?;

        Ok(Finding::new(analysis.analysis).with_raw_data(raw))
    }
}
