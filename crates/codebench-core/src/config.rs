use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::EvalError;
use crate::types::{metrics, MetricId};

/// Tolerance used whenever weights are checked to sum to one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Immutable settings injected into an [`Orchestrator`](crate::Orchestrator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
    #[serde(default = "default_weights")]
    pub default_weights: BTreeMap<MetricId, f64>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_analyzer_timeout_secs")]
    pub analyzer_timeout_secs: u64,
    #[serde(default = "default_max_models")]
    pub max_models: usize,
    #[serde(default = "default_min_prompt_len")]
    pub min_prompt_len: usize,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_decay_rate() -> f64 {
    0.7
}

fn default_weights() -> BTreeMap<MetricId, f64> {
    metrics::ALL
        .iter()
        .map(|m| (MetricId::from(*m), 0.2))
        .collect()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_attempt_timeout_secs() -> u64 {
    30
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_analyzer_timeout_secs() -> u64 {
    10
}

fn default_max_models() -> usize {
    10
}

fn default_min_prompt_len() -> usize {
    5
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            decay_rate: default_decay_rate(),
            default_weights: default_weights(),
            max_attempts: default_max_attempts(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            retry_backoff_ms: default_retry_backoff_ms(),
            analyzer_timeout_secs: default_analyzer_timeout_secs(),
            max_models: default_max_models(),
            min_prompt_len: default_min_prompt_len(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl OrchestratorConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn analyzer_timeout(&self) -> Duration {
        Duration::from_secs(self.analyzer_timeout_secs)
    }

    /// Backoff before attempt `attempt + 1`, honouring a provider hint.
    pub fn retry_delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let delay = hint.unwrap_or_else(|| Duration::from_millis(self.retry_backoff_ms * u64::from(attempt)));
        delay.min(self.attempt_timeout())
    }

    pub fn validate(&self) -> Result<(), EvalError> {
        if !(self.decay_rate > 0.0 && self.decay_rate < 1.0) {
            return Err(EvalError::config(format!(
                "decay_rate must be in (0, 1), got {}",
                self.decay_rate
            )));
        }
        if self.max_attempts == 0 {
            return Err(EvalError::config("max_attempts must be at least 1"));
        }
        if self.attempt_timeout_secs == 0 || self.analyzer_timeout_secs == 0 {
            return Err(EvalError::config("timeouts must be non-zero"));
        }
        if self.channel_capacity == 0 {
            return Err(EvalError::config("channel_capacity must be non-zero"));
        }
        if self.max_models == 0 {
            return Err(EvalError::config("max_models must be at least 1"));
        }
        validate_weights(&self.default_weights)
    }
}

/// Checks that a weight table is non-empty, each weight lies in (0, 1],
/// and the weights sum to one.
pub fn validate_weights(weights: &BTreeMap<MetricId, f64>) -> Result<(), EvalError> {
    if weights.is_empty() {
        return Err(EvalError::config("default_weights must not be empty"));
    }
    for (metric, weight) in weights {
        if !(*weight > 0.0 && *weight <= 1.0) {
            return Err(EvalError::config(format!(
                "weight for '{metric}' must be in (0, 1], got {weight}"
            )));
        }
    }
    let sum: f64 = weights.values().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(EvalError::config(format!(
            "default_weights must sum to 1.0, got {sum}"
        )));
    }
    Ok(())
}

/// YAML document read by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum ProviderConfig {
    Http {
        model: String,
        url: String,
        /// Name of the environment variable holding a bearer token.
        #[serde(default)]
        api_key_env: Option<String>,
    },
}

impl ProviderConfig {
    pub fn model(&self) -> &str {
        match self {
            ProviderConfig::Http { model, .. } => model,
        }
    }
}

impl FileConfig {
    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        let config: FileConfig = serde_yaml::from_str(content).context("Invalid config YAML")?;
        config.orchestrator.validate()?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        Self::from_yaml_str(&content)
    }
}
