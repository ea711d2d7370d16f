use std::future::Future;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use regex::Regex;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::types::MetricId;
use crate::weights::MetricWeightMap;

static CODE_FENCE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?s)```[\w+#.-]*[ \t]*\r?\n(.*?)```").expect("valid fence regex"));

/// What a provider is asked to do for one model.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
	pub model: String,
	/// User prompt with any priority instruction already appended.
	pub prompt: String,
	pub priority: Vec<MetricId>,
}

/// Output of a successful provider call.
pub enum Generation {
	/// The whole code at once.
	Complete(String),
	/// Ordered fragments. An `Err` item ends the attempt with that error.
	Stream(BoxStream<'static, Result<String, ProviderError>>),
}

impl std::fmt::Debug for Generation {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Generation::Complete(code) => f.debug_tuple("Complete").field(code).finish(),
			Generation::Stream(_) => f.write_str("Stream(..)"),
		}
	}
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
	async fn generate(&self, request: &GenerationRequest) -> Result<Generation, ProviderError>;
}

/// Wrap an async closure as a `GenerationProvider`.
pub fn from_async_fn<F, Fut>(f: F) -> Arc<dyn GenerationProvider>
where
	F: Send + Sync + 'static + Fn(GenerationRequest) -> Fut,
	Fut: Future<Output = Result<Generation, ProviderError>> + Send + 'static,
{
	struct ClosureProvider<F> {
		f: F,
	}

	#[async_trait]
	impl<F, Fut> GenerationProvider for ClosureProvider<F>
	where
		F: Send + Sync + 'static + Fn(GenerationRequest) -> Fut,
		Fut: Future<Output = Result<Generation, ProviderError>> + Send + 'static,
	{
		async fn generate(&self, request: &GenerationRequest) -> Result<Generation, ProviderError> {
			(self.f)(request.clone()).await
		}
	}

	Arc::new(ClosureProvider { f })
}

/// Appends the metric priority instruction to `prompt`.
///
/// Returns the prompt unchanged when no priority ordering was given.
pub fn build_prompt(prompt: &str, priority: &[MetricId], weights: &MetricWeightMap) -> String {
	if priority.is_empty() {
		return prompt.to_string();
	}

	let mut out = String::from(prompt.trim_end());
	out.push_str("\n\nWhen writing the code, optimize for these quality metrics in order of importance:\n");
	for (position, metric) in priority.iter().enumerate() {
		let weight = weights.get(metric.as_str()).unwrap_or_default();
		out.push_str(&format!("{}. {} ({:.0}%)\n", position + 1, metric.label(), weight * 100.0));
	}
	out.push_str("Return only the code in a single fenced code block.");
	out
}

/// Contents of the first fenced code block, or the trimmed text when there is none.
pub fn extract_code(text: &str) -> String {
	match CODE_FENCE.captures(text) {
		Some(caps) => caps[1].trim().to_string(),
		None => text.trim().to_string(),
	}
}

/// Provider backed by a JSON-over-HTTP endpoint.
///
/// Sends `{"model", "prompt"}` and expects a JSON body with a `code` or
/// `text` string field.
#[derive(Debug, Clone)]
pub struct HttpProvider {
	url: String,
	bearer_token: Option<String>,
	client: reqwest::Client,
}

impl HttpProvider {
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			bearer_token: None,
			client: reqwest::Client::new(),
		}
	}

	/// Use a preconfigured client (proxies, TLS, connection pool).
	pub fn with_client(mut self, client: reqwest::Client) -> Self {
		self.client = client;
		self
	}

	pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
		self.bearer_token = Some(token.into());
		self
	}

	/// Builds a provider from a config entry, reading the token from the named env var.
	pub fn from_config(config: &ProviderConfig) -> anyhow::Result<Self> {
		match config {
			ProviderConfig::Http { url, api_key_env, .. } => {
				let mut provider = Self::new(url.clone());
				if let Some(var) = api_key_env {
					let token = std::env::var(var)
						.map_err(|_| anyhow::anyhow!("environment variable {var} is not set"))?;
					provider = provider.with_bearer_token(token);
				}
				Ok(provider)
			}
		}
	}
}

#[async_trait]
impl GenerationProvider for HttpProvider {
	async fn generate(&self, request: &GenerationRequest) -> Result<Generation, ProviderError> {
		let mut req = self
			.client
			.post(&self.url)
			.json(&json!({ "model": request.model, "prompt": request.prompt }));
		if let Some(ref token) = self.bearer_token {
			req = req.bearer_auth(token);
		}

		let resp = req.send().await?;
		let status = resp.status();
		let retry_after = resp
			.headers()
			.get(RETRY_AFTER)
			.and_then(|v| v.to_str().ok())
			.and_then(|v| v.trim().parse::<u64>().ok())
			.map(Duration::from_secs);
		let body = resp.text().await?;

		if !status.is_success() {
			return Err(classify_status(status, retry_after, &body));
		}
		parse_body(&body).map(Generation::Complete)
	}
}

fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> ProviderError {
	if status == StatusCode::TOO_MANY_REQUESTS {
		ProviderError::RateLimited { retry_after }
	} else if status.is_server_error() {
		ProviderError::Transport(format!("HTTP {status}"))
	} else {
		let message = serde_json::from_str::<Value>(body)
			.ok()
			.and_then(|v| v.get("error").cloned())
			.map(|e| match e {
				Value::String(s) => s,
				Value::Object(ref o) => o
					.get("message")
					.and_then(Value::as_str)
					.map(str::to_string)
					.unwrap_or_else(|| e.to_string()),
				other => other.to_string(),
			})
			.unwrap_or_else(|| body.trim().to_string());
		ProviderError::Rejected {
			status: Some(status.as_u16()),
			message,
		}
	}
}

fn parse_body(body: &str) -> Result<String, ProviderError> {
	let value: Value =
		serde_json::from_str(body).map_err(|e| ProviderError::Malformed(format!("invalid JSON body: {e}")))?;
	let text = ["code", "text"]
		.iter()
		.find_map(|field| value.get(field).and_then(Value::as_str))
		.ok_or_else(|| ProviderError::Malformed("response has no `code` or `text` field".to_string()))?;
	Ok(extract_code(text))
}
