//! # Orchestrator Configuration
//!
//! Everything a request needs (model selection, specialist endpoints,
//! deadlines, and dispatch policy) is read once at startup and handed to the
//! coordinator. Sources, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. `.pharos/config.json`
//! 3. Environment variables (`MODEL_NAME`, `PHAROS_*`, ...)

use crate::error::ConfigError;
use crate::models::{LlmProvider, ModelConfig};
use crate::specialists::web::DEFAULT_PUBMED_URL;
use crate::specialists::SpecialistKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Default location of the persisted config, relative to the working directory
pub const CONFIG_PATH: &str = ".pharos/config.json";

/// How the intent planner classifies queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerMode {
    /// Deterministic keyword rules
    #[default]
    Keywords,
    /// Structured-output model call, falling back to keywords on error
    Model,
}

/// When synthesis may start before every specialist has settled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EarlySynthesis {
    #[default]
    WaitAll,
    /// More than half of the dispatched tasks have settled
    Majority,
    /// At least `n` tasks have settled, whatever their outcome
    AtLeast(usize),
    /// At least `n` tasks have settled successfully
    AtLeastSucceeded(usize),
}

impl EarlySynthesis {
    /// Whether the supervisor may release the context now.
    pub fn is_met(&self, total: usize, settled: usize, succeeded: usize) -> bool {
        match self {
            EarlySynthesis::WaitAll => settled >= total,
            EarlySynthesis::Majority => settled >= total / 2 + 1 || settled >= total,
            EarlySynthesis::AtLeast(n) => settled >= (*n).min(total),
            EarlySynthesis::AtLeastSucceeded(n) => {
                succeeded >= (*n).min(total) || settled >= total
            }
        }
    }
}

/// What happens to specialists still running when synthesis starts early.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LateResults {
    /// Cancel them
    #[default]
    Abandon,
    /// Let them finish and emit their status, without affecting the answer
    Report,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Model used for planning, specialists, and synthesis unless overridden
    pub model: ModelConfig,
    /// Per-specialist model overrides
    pub per_specialist_models: HashMap<SpecialistKind, String>,
    /// Per-specialist provider overrides
    pub per_specialist_providers: HashMap<SpecialistKind, LlmProvider>,
    /// Root of the internal data API
    pub data_api_url: String,
    /// SearXNG instance for web research
    pub searxng_url: Option<String>,
    /// NCBI E-utilities root for literature lookups
    pub pubmed_url: String,
    pub specialist_timeout_secs: u64,
    pub per_specialist_timeouts: HashMap<SpecialistKind, u64>,
    /// Ceiling on the whole dispatch phase
    pub global_timeout_secs: u64,
    /// Longest tolerated gap between two synthesis fragments
    pub synthesis_fragment_timeout_secs: u64,
    /// Events buffered between the engine and a slow consumer
    pub stream_buffer: usize,
    pub planner: PlannerMode,
    /// Longest wait for the model planner before keyword rules take over
    pub planner_timeout_secs: u64,
    /// Abort with `AllSpecialistsFailed` when nothing succeeded
    pub require_success: bool,
    pub early_synthesis: EarlySynthesis,
    pub late_results: LateResults,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            per_specialist_models: HashMap::new(),
            per_specialist_providers: HashMap::new(),
            data_api_url: "http://127.0.0.1:8000".to_string(),
            searxng_url: None,
            pubmed_url: DEFAULT_PUBMED_URL.to_string(),
            specialist_timeout_secs: 45,
            per_specialist_timeouts: HashMap::new(),
            global_timeout_secs: 120,
            synthesis_fragment_timeout_secs: 60,
            stream_buffer: 64,
            planner: PlannerMode::default(),
            planner_timeout_secs: 20,
            require_success: false,
            early_synthesis: EarlySynthesis::default(),
            late_results: LateResults::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Load from [`CONFIG_PATH`], apply environment overrides, and validate.
    pub async fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(CONFIG_PATH)).await
    }

    /// Load from `path` if it exists, apply environment overrides, and validate.
    pub async fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| ConfigError::File {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            serde_json::from_str(&content).map_err(|e| ConfigError::File {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    ///
    /// Takes the lookup as a closure so tests do not have to mutate the
    /// process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("PHAROS_PROVIDER") {
            let provider: LlmProvider = provider.parse()?;
            if provider != self.model.provider {
                self.model.provider = provider;
                self.model.model = provider.default_model().to_string();
            }
        }
        if let Some(model) = lookup("MODEL_NAME") {
            self.model.model = model;
        }
        if let Some(value) = lookup("TEMPERATURE") {
            self.model.temperature = parse_value("TEMPERATURE", &value)?;
        }
        if let Some(value) = lookup("MAX_TOKENS") {
            self.model.max_tokens = parse_value("MAX_TOKENS", &value)?;
        }
        if let Some(url) = lookup("PHAROS_BASE_URL") {
            self.model.base_url = Some(url);
        }
        if let Some(url) = lookup("PHAROS_DATA_API_URL") {
            self.data_api_url = url;
        }
        if let Some(url) = lookup("SEARXNG_URL") {
            self.searxng_url = Some(url);
        }
        if let Some(url) = lookup("PUBMED_URL") {
            self.pubmed_url = url;
        }
        if let Some(value) = lookup("PHAROS_SPECIALIST_TIMEOUT_SECS") {
            self.specialist_timeout_secs = parse_value("PHAROS_SPECIALIST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("PHAROS_GLOBAL_TIMEOUT_SECS") {
            self.global_timeout_secs = parse_value("PHAROS_GLOBAL_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("PHAROS_PLANNER_TIMEOUT_SECS") {
            self.planner_timeout_secs = parse_value("PHAROS_PLANNER_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("PHAROS_REQUIRE_SUCCESS") {
            self.require_success = parse_value("PHAROS_REQUIRE_SUCCESS", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.specialist_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "specialist_timeout_secs",
            });
        }
        if self.per_specialist_timeouts.values().any(|secs| *secs == 0) {
            return Err(ConfigError::ZeroDuration {
                field: "per_specialist_timeouts",
            });
        }
        if self.global_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "global_timeout_secs",
            });
        }
        if self.planner_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "planner_timeout_secs",
            });
        }
        if self.synthesis_fragment_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "synthesis_fragment_timeout_secs",
            });
        }
        if self.stream_buffer == 0 {
            return Err(ConfigError::ZeroBuffer);
        }
        if matches!(
            self.early_synthesis,
            EarlySynthesis::AtLeast(0) | EarlySynthesis::AtLeastSucceeded(0)
        ) {
            return Err(ConfigError::ZeroEarlyThreshold);
        }
        Ok(())
    }

    /// Deadline for one specialist: per-kind override, then the default.
    pub fn timeout_for(&self, kind: SpecialistKind) -> Duration {
        let secs = self
            .per_specialist_timeouts
            .get(&kind)
            .copied()
            .unwrap_or(self.specialist_timeout_secs);
        Duration::from_secs(secs)
    }

    pub fn global_timeout(&self) -> Duration {
        Duration::from_secs(self.global_timeout_secs)
    }

    pub fn planner_timeout(&self) -> Duration {
        Duration::from_secs(self.planner_timeout_secs)
    }

    pub fn fragment_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_fragment_timeout_secs)
    }

    /// Model settings for one specialist.
    ///
    /// Provider: per-specialist override, then global. Model: per-specialist
    /// override, then global when the provider matches, then the provider's
    /// default. The base URL only carries over for providers that accept one.
    pub fn model_config_for(&self, kind: SpecialistKind) -> ModelConfig {
        let provider = self
            .per_specialist_providers
            .get(&kind)
            .copied()
            .unwrap_or(self.model.provider);

        let model = match self.per_specialist_models.get(&kind) {
            Some(model) => model.clone(),
            None if provider == self.model.provider => self.model.model.clone(),
            None => provider.default_model().to_string(),
        };

        let base_url = if provider.supports_base_url() && provider == self.model.provider {
            self.model.base_url.clone()
        } else {
            None
        };

        ModelConfig {
            provider,
            model,
            base_url,
            temperature: self.model.temperature,
            max_tokens: self.model.max_tokens,
        }
    }
}

fn parse_value<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field,
        value: value.to_string(),
    })
}
