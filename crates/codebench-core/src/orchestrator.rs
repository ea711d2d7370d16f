use std::collections::{BTreeMap, HashSet};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::join_all;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info};

use crate::analyzer::{AnalyzerRegistry, MetricAnalyzer};
use crate::config::OrchestratorConfig;
use crate::error::EvalError;
use crate::provider::{build_prompt, GenerationProvider, GenerationRequest};
use crate::report::ReportCollector;
use crate::summary;
use crate::task::{ProviderTask, TaskContext};
use crate::types::{EvaluationReport, EvaluationRequest, EvaluationResult, Signal};
use crate::weights::compute_weights;

pub struct OrchestratorBuilder {
	providers: BTreeMap<String, Arc<dyn GenerationProvider>>,
	analyzers: Option<AnalyzerRegistry>,
	config: OrchestratorConfig,
}

impl Default for OrchestratorBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl OrchestratorBuilder {
	pub fn new() -> Self {
		Self {
			providers: BTreeMap::new(),
			analyzers: None,
			config: OrchestratorConfig::default(),
		}
	}

	/// Registers the provider serving `model`, replacing any previous one.
	pub fn provider(mut self, model: impl Into<String>, provider: Arc<dyn GenerationProvider>) -> Self {
		self.providers.insert(model.into(), provider);
		self
	}

	pub fn providers<I, S>(mut self, providers: I) -> Self
	where
		I: IntoIterator<Item = (S, Arc<dyn GenerationProvider>)>,
		S: Into<String>,
	{
		self.providers
			.extend(providers.into_iter().map(|(model, provider)| (model.into(), provider)));
		self
	}

	/// Replaces the analyzer set. Defaults to [`AnalyzerRegistry::standard`].
	pub fn analyzers(mut self, analyzers: AnalyzerRegistry) -> Self {
		self.analyzers = Some(analyzers);
		self
	}

	pub fn add_analyzer(mut self, analyzer: Arc<dyn MetricAnalyzer>) -> Self {
		let registry = self.analyzers.take().unwrap_or_else(AnalyzerRegistry::standard);
		self.analyzers = Some(registry.with(analyzer));
		self
	}

	pub fn config(mut self, config: OrchestratorConfig) -> Self {
		self.config = config;
		self
	}

	pub fn build(self) -> Result<Orchestrator, EvalError> {
		self.config.validate()?;
		if self.providers.is_empty() {
			return Err(EvalError::config("at least one provider must be registered"));
		}
		let analyzers = self.analyzers.unwrap_or_else(AnalyzerRegistry::standard);
		if let Some(metric) = self.config.default_weights.keys().find(|m| !analyzers.contains(m.as_str())) {
			return Err(EvalError::config(format!("no analyzer registered for metric '{metric}'")));
		}

		Ok(Orchestrator {
			providers: self.providers,
			analyzers,
			config: Arc::new(self.config),
		})
	}
}

/// Runs one prompt against several providers and streams what happens.
pub struct Orchestrator {
	providers: BTreeMap<String, Arc<dyn GenerationProvider>>,
	analyzers: AnalyzerRegistry,
	config: Arc<OrchestratorConfig>,
}

impl Orchestrator {
	pub fn builder() -> OrchestratorBuilder {
		OrchestratorBuilder::new()
	}

	pub fn config(&self) -> &OrchestratorConfig {
		&self.config
	}

	/// Models that have a registered provider.
	pub fn models(&self) -> impl Iterator<Item = &str> + '_ {
		self.providers.keys().map(String::as_str)
	}

	/// Checks the prompt and model list. Metric ids are checked when weights
	/// are computed.
	pub fn validate(&self, request: &EvaluationRequest) -> Result<(), EvalError> {
		let prompt = request.prompt.trim();
		if prompt.is_empty() {
			return Err(EvalError::validation("prompt cannot be empty"));
		}
		if prompt.chars().count() < self.config.min_prompt_len {
			return Err(EvalError::validation(format!(
				"prompt must be at least {} characters",
				self.config.min_prompt_len
			)));
		}
		if request.models.is_empty() {
			return Err(EvalError::validation("at least one model is required"));
		}
		if request.models.len() > self.config.max_models {
			return Err(EvalError::validation(format!(
				"at most {} models can be compared at once",
				self.config.max_models
			)));
		}
		let mut seen = HashSet::with_capacity(request.models.len());
		for model in &request.models {
			if !seen.insert(model.as_str()) {
				return Err(EvalError::validation(format!("duplicate model '{model}'")));
			}
			if !self.providers.contains_key(model) {
				return Err(EvalError::validation(format!("unknown model '{model}'")));
			}
		}
		Ok(())
	}

	/// Starts a batch and returns its signal stream.
	///
	/// Validation and weight errors are returned before anything is spawned.
	/// Dropping the stream cancels the batch. Must be called within a Tokio
	/// runtime.
	pub fn run(&self, request: EvaluationRequest) -> Result<SignalStream, EvalError> {
		self.validate(&request)?;
		let weights = compute_weights(request.priority(), self.config.decay_rate, &self.config.default_weights)?;
		let prompt = build_prompt(&request.prompt, request.priority(), &weights);

		let (tx, rx) = mpsc::channel(self.config.channel_capacity);
		let cancel = CancellationToken::new();
		let ctx = TaskContext {
			weights: Arc::new(weights),
			analyzers: self.analyzers.clone(),
			config: self.config.clone(),
			cancel: cancel.clone(),
		};

		let mut jobs = Vec::with_capacity(request.models.len());
		for model in &request.models {
			let provider = self
				.providers
				.get(model)
				.cloned()
				.ok_or_else(|| EvalError::validation(format!("unknown model '{model}'")))?;
			let generation = GenerationRequest {
				model: model.clone(),
				prompt: prompt.clone(),
				priority: request.priority().to_vec(),
			};
			jobs.push((ProviderTask::new(model.clone(), provider, tx.clone()), generation));
		}

		info!(models = jobs.len(), prioritized = !request.priority().is_empty(), "batch started");
		tokio::spawn(drive(jobs, ctx, tx));

		Ok(SignalStream {
			inner: ReceiverStream::new(rx),
			_cancel: cancel.drop_guard(),
		})
	}

	/// Runs a batch to completion and folds its signals into a report.
	pub async fn evaluate(&self, request: EvaluationRequest) -> Result<EvaluationReport, EvalError> {
		let mut collector = ReportCollector::new(request.prompt.clone(), request.models.iter().cloned());
		let mut signals = self.run(request)?;
		while let Some(signal) = signals.next().await {
			collector.observe(&signal);
		}
		collector.finish()
	}
}

async fn drive(jobs: Vec<(ProviderTask, GenerationRequest)>, ctx: TaskContext, tx: mpsc::Sender<Signal>) {
	let spawned = jobs.len();
	let started = Instant::now();
	let models: Vec<String> = jobs.iter().map(|(_, req)| req.model.clone()).collect();
	let handles = jobs
		.into_iter()
		.map(|(task, request)| tokio::spawn(task.run(request, ctx.clone())));
	let outcomes = join_all(handles).await;

	let mut results: Vec<EvaluationResult> = Vec::with_capacity(spawned);
	for (model, outcome) in models.into_iter().zip(outcomes) {
		match outcome {
			Ok(Some(result)) => results.push(result),
			Ok(None) => {
				debug!(model = %model, "batch cancelled, no summary");
				return;
			}
			Err(join_err) => {
				let message = format!("provider task aborted: {join_err}");
				error!(model = %model, error = %join_err, "provider task aborted");
				let execution_time_ms = started.elapsed().as_millis() as u64;
				let signals = [
					Signal::GenerationComplete { model: model.clone(), success: false, execution_time_ms },
					Signal::Error { message: message.clone(), model: Some(model.clone()) },
				];
				for signal in signals {
					if tx.send(signal).await.is_err() {
						return;
					}
				}
				results.push(EvaluationResult::failed(model, execution_time_ms, message));
			}
		}
	}
	if ctx.cancel.is_cancelled() {
		return;
	}

	let (ranking, data) = summary::build(&results);
	if let Err(e) = summary::verify(&data, &ranking, spawned) {
		error!(error = %e, "batch aborted");
		let _ = tx.send(Signal::Error { message: e.to_string(), model: None }).await;
		return;
	}

	info!(
		successful = data.successful_evaluations,
		failed = data.failed_evaluations,
		best = data.best_model.as_deref().unwrap_or("none"),
		"batch finished"
	);
	if tx.send(Signal::Summary { data, ranking }).await.is_ok() {
		let _ = tx.send(Signal::Complete).await;
	}
}

/// Signals of one batch, in per-model order. Dropping it cancels the batch.
pub struct SignalStream {
	inner: ReceiverStream<Signal>,
	_cancel: DropGuard,
}

impl Stream for SignalStream {
	type Item = Signal;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Signal>> {
		Pin::new(&mut self.inner).poll_next(cx)
	}
}

impl std::fmt::Debug for SignalStream {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SignalStream").finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::ScriptedProvider;
	use crate::types::metrics;

	fn orchestrator() -> Orchestrator {
		Orchestrator::builder()
			.provider("model-a", Arc::new(ScriptedProvider::new().complete("x = 1")))
			.provider("model-b", Arc::new(ScriptedProvider::new().complete("y = 2")))
			.build()
			.unwrap()
	}

	fn rejected(request: EvaluationRequest) -> String {
		match orchestrator().run(request) {
			Err(EvalError::Validation(message)) => message,
			other => panic!("expected validation error, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn rejects_bad_requests_before_dispatch() {
		assert_eq!(rejected(EvaluationRequest::new("   ", ["model-a"])), "prompt cannot be empty");
		assert_eq!(
			rejected(EvaluationRequest::new("sort", ["model-a"])),
			"prompt must be at least 5 characters"
		);
		assert_eq!(
			rejected(EvaluationRequest::new("Write a sort", Vec::<String>::new())),
			"at least one model is required"
		);
		assert_eq!(
			rejected(EvaluationRequest::new("Write a sort", ["model-a", "model-a"])),
			"duplicate model 'model-a'"
		);
		assert_eq!(
			rejected(EvaluationRequest::new("Write a sort", ["model-z"])),
			"unknown model 'model-z'"
		);
		assert_eq!(
			rejected(EvaluationRequest::new("Write a sort", ["model-a"]).with_priority(["speed"])),
			"unknown metric 'speed'"
		);
		assert_eq!(
			rejected(
				EvaluationRequest::new("Write a sort", ["model-a"])
					.with_priority([metrics::READABILITY, metrics::READABILITY])
			),
			"duplicate metric 'readability'"
		);
	}

	#[test]
	fn build_requires_analyzers_for_weighted_metrics() {
		let err = Orchestrator::builder()
			.provider("model-a", Arc::new(ScriptedProvider::new()))
			.analyzers(AnalyzerRegistry::new())
			.build()
			.err()
			.unwrap();
		assert!(matches!(err, EvalError::Config(ref m) if m.contains("no analyzer registered")));

		let err = Orchestrator::builder().build().err().unwrap();
		assert_eq!(err, EvalError::config("at least one provider must be registered"));
	}

	#[tokio::test]
	async fn stream_ends_with_summary_then_complete() {
		let signals: Vec<Signal> = orchestrator()
			.run(EvaluationRequest::new("Write a function", ["model-a", "model-b"]))
			.unwrap()
			.collect()
			.await;

		let tail: Vec<&str> = signals.iter().rev().take(2).map(Signal::kind).collect();
		assert_eq!(tail, ["complete", "summary"]);
		assert_eq!(signals.iter().filter(|s| s.kind() == "generation_start").count(), 2);
	}
}
