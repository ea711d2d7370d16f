use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregate;
use crate::analyzer::AnalyzerRegistry;
use crate::config::OrchestratorConfig;
use crate::error::ProviderError;
use crate::provider::{Generation, GenerationProvider, GenerationRequest};
use crate::types::{EvaluationResult, Signal};
use crate::weights::MetricWeightMap;

/// Lifecycle of one model's run.
///
/// `Pending → Generating → GeneratedOk → Evaluating → Scored`, or
/// `Generating → GeneratedFail → Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
	Pending,
	Generating,
	GeneratedOk,
	GeneratedFail,
	Evaluating,
	Scored,
	Failed,
}

impl TaskState {
	pub fn can_advance_to(self, next: TaskState) -> bool {
		use TaskState::*;
		matches!(
			(self, next),
			(Pending, Generating)
				| (Generating, GeneratedOk)
				| (Generating, GeneratedFail)
				| (GeneratedOk, Evaluating)
				| (Evaluating, Scored)
				| (GeneratedFail, Failed)
		)
	}

	pub fn is_terminal(self) -> bool {
		matches!(self, TaskState::Scored | TaskState::Failed)
	}
}

/// Read-only state shared by every task of one batch.
#[derive(Clone)]
pub struct TaskContext {
	pub weights: Arc<MetricWeightMap>,
	pub analyzers: AnalyzerRegistry,
	pub config: Arc<OrchestratorConfig>,
	pub cancel: CancellationToken,
}

/// Drives one model from dispatch to a terminal state, emitting its signals
/// in order on `tx`.
pub struct ProviderTask {
	model: String,
	state: TaskState,
	provider: Arc<dyn GenerationProvider>,
	tx: mpsc::Sender<Signal>,
	code: String,
	attempts: u32,
}

impl ProviderTask {
	pub fn new(model: impl Into<String>, provider: Arc<dyn GenerationProvider>, tx: mpsc::Sender<Signal>) -> Self {
		Self {
			model: model.into(),
			state: TaskState::Pending,
			provider,
			tx,
			code: String::new(),
			attempts: 0,
		}
	}

	pub fn state(&self) -> TaskState {
		self.state
	}

	/// Runs the task to completion. Returns `None` when the batch was
	/// cancelled; whatever was accumulated is dropped.
	pub async fn run(mut self, request: GenerationRequest, ctx: TaskContext) -> Option<EvaluationResult> {
		match self.drive(&request, &ctx).await {
			Ok(result) => Some(result),
			Err(_) => {
				debug!(model = %self.model, state = ?self.state, "task cancelled");
				None
			}
		}
	}

	async fn drive(&mut self, request: &GenerationRequest, ctx: &TaskContext) -> Result<EvaluationResult, ProviderError> {
		self.advance(TaskState::Generating);
		self.emit(Signal::GenerationStart { model: self.model.clone() }).await?;

		let started = Instant::now();
		let outcome = self.generate_with_retry(request, ctx).await;
		let execution_time_ms = started.elapsed().as_millis() as u64;

		match outcome {
			Ok(()) => {
				self.advance(TaskState::GeneratedOk);
				self.emit(Signal::GenerationComplete {
					model: self.model.clone(),
					success: true,
					execution_time_ms,
				})
				.await?;

				self.advance(TaskState::Evaluating);
				let evaluation = aggregate::evaluate(
					&self.code,
					&ctx.weights,
					&ctx.analyzers,
					ctx.config.analyzer_timeout(),
				)
				.await;
				self.advance(TaskState::Scored);
				info!(model = %self.model, score = evaluation.overall_score, execution_time_ms, "model scored");

				self.emit(Signal::EvaluationResult {
					model: self.model.clone(),
					overall_score: evaluation.overall_score,
					metrics: evaluation.metrics.clone(),
					notes: evaluation.notes.clone(),
				})
				.await?;

				Ok(EvaluationResult {
					model: self.model.clone(),
					overall_score: evaluation.overall_score,
					metrics: evaluation.metrics,
					notes: evaluation.notes,
					generated_code: std::mem::take(&mut self.code),
					execution_time_ms,
					success: true,
					error: None,
				})
			}
			Err(ProviderError::Cancelled) if ctx.cancel.is_cancelled() || self.tx.is_closed() => Err(ProviderError::Cancelled),
			Err(e) => {
				self.advance(TaskState::GeneratedFail);
				self.emit(Signal::GenerationComplete {
					model: self.model.clone(),
					success: false,
					execution_time_ms,
				})
				.await?;

				self.advance(TaskState::Failed);
				let message = if self.attempts > 1 {
					format!("{e} (after {} attempts)", self.attempts)
				} else {
					e.to_string()
				};
				warn!(model = %self.model, code = e.code(), attempts = self.attempts, error = %e, "generation failed");
				self.emit(Signal::Error {
					message: message.clone(),
					model: Some(self.model.clone()),
				})
				.await?;

				Ok(EvaluationResult::failed(self.model.clone(), execution_time_ms, message))
			}
		}
	}

	async fn generate_with_retry(&mut self, request: &GenerationRequest, ctx: &TaskContext) -> Result<(), ProviderError> {
		let config = &ctx.config;

		loop {
			if ctx.cancel.is_cancelled() {
				return Err(ProviderError::Cancelled);
			}
			self.attempts += 1;
			let attempt = self.attempts;

			let err = match self.attempt(request, ctx).await {
				Ok(()) => {
					debug!(model = %self.model, attempt, bytes = self.code.len(), "generation finished");
					return Ok(());
				}
				Err(e) => e,
			};

			// chunks already sent cannot be retracted
			let can_retry = err.is_retryable() && attempt < config.max_attempts && self.code.is_empty();
			if !can_retry {
				return Err(err);
			}

			let hint = match &err {
				ProviderError::RateLimited { retry_after } => *retry_after,
				_ => None,
			};
			let delay = config.retry_delay(attempt, hint);
			warn!(model = %self.model, attempt, code = err.code(), error = %err, ?delay, "retrying provider call");

			tokio::select! {
				biased;
				_ = ctx.cancel.cancelled() => return Err(ProviderError::Cancelled),
				_ = tokio::time::sleep(delay) => {}
			}
		}
	}

	/// One provider call. Only time spent awaiting the provider counts
	/// against the attempt timeout; waiting on the consumer does not.
	async fn attempt(&mut self, request: &GenerationRequest, ctx: &TaskContext) -> Result<(), ProviderError> {
		let mut budget = AttemptBudget::new(ctx.config.attempt_timeout());

		match budget.call(self.provider.generate(request), &ctx.cancel).await? {
			Generation::Complete(code) => {
				if code.trim().is_empty() {
					return Err(ProviderError::Malformed("provider returned no code".to_string()));
				}
				self.push_chunk(code).await
			}
			Generation::Stream(mut fragments) => {
				while let Some(fragment) = budget.call(fragments.next().map(Option::transpose), &ctx.cancel).await? {
					if !fragment.is_empty() {
						self.push_chunk(fragment).await?;
					}
				}
				if self.code.trim().is_empty() {
					return Err(ProviderError::Malformed("provider streamed no code".to_string()));
				}
				Ok(())
			}
		}
	}

	async fn push_chunk(&mut self, chunk: String) -> Result<(), ProviderError> {
		self.code.push_str(&chunk);
		self.emit(Signal::CodeChunk { model: self.model.clone(), chunk }).await
	}

	/// A closed channel means the consumer went away.
	async fn emit(&self, signal: Signal) -> Result<(), ProviderError> {
		self.tx.send(signal).await.map_err(|_| ProviderError::Cancelled)
	}

	fn advance(&mut self, next: TaskState) {
		debug_assert!(self.state.can_advance_to(next), "{:?} -> {:?}", self.state, next);
		debug!(model = %self.model, from = ?self.state, to = ?next, "task state");
		self.state = next;
	}
}

/// Provider time left in one attempt.
struct AttemptBudget {
	limit: Duration,
	left: Duration,
}

impl AttemptBudget {
	fn new(limit: Duration) -> Self {
		Self { limit, left: limit }
	}

	/// Awaits one provider future with whatever time is left. A `Cancelled`
	/// coming from the provider itself is a failed call, not a cancelled batch.
	async fn call<T, F>(&mut self, fut: F, cancel: &CancellationToken) -> Result<T, ProviderError>
	where
		F: Future<Output = Result<T, ProviderError>>,
	{
		let started = Instant::now();
		let outcome = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(ProviderError::Cancelled),
			res = tokio::time::timeout(self.left, fut) => match res {
				Err(_) => Err(ProviderError::Timeout(self.limit)),
				Ok(Err(ProviderError::Cancelled)) => Err(ProviderError::rejected("provider cancelled the request")),
				Ok(other) => other,
			},
		};
		self.left = self.left.saturating_sub(started.elapsed());
		outcome
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{FixedAnalyzer, ScriptedProvider};
	use crate::types::metrics;
	use crate::weights::compute_weights;

	fn context(config: OrchestratorConfig) -> TaskContext {
		let weights = compute_weights(&[], config.decay_rate, &config.default_weights).unwrap();
		let analyzers = metrics::ALL
			.into_iter()
			.fold(AnalyzerRegistry::new(), |r, m| r.with(Arc::new(FixedAnalyzer::new(m, 8.0))));
		TaskContext {
			weights: Arc::new(weights),
			analyzers,
			config: Arc::new(config),
			cancel: CancellationToken::new(),
		}
	}

	fn request() -> GenerationRequest {
		GenerationRequest {
			model: "model-a".into(),
			prompt: "Write a function".into(),
			priority: Vec::new(),
		}
	}

	async fn run(provider: ScriptedProvider, ctx: TaskContext) -> (Option<EvaluationResult>, Vec<Signal>) {
		let (tx, mut rx) = mpsc::channel(64);
		let task = ProviderTask::new("model-a", Arc::new(provider), tx);
		let result = task.run(request(), ctx).await;
		let mut signals = Vec::new();
		while let Ok(signal) = rx.try_recv() {
			signals.push(signal);
		}
		(result, signals)
	}

	fn kinds(signals: &[Signal]) -> Vec<&'static str> {
		signals.iter().map(Signal::kind).collect()
	}

	#[test]
	fn state_machine_edges() {
		use TaskState::*;
		assert!(Pending.can_advance_to(Generating));
		assert!(Generating.can_advance_to(GeneratedFail));
		assert!(!Pending.can_advance_to(Scored));
		assert!(!Failed.can_advance_to(Generating));
		assert!(!GeneratedFail.can_advance_to(Evaluating));
		assert!(Scored.is_terminal() && Failed.is_terminal());
		assert!(!Evaluating.is_terminal());
	}

	#[tokio::test]
	async fn streamed_fragments_are_emitted_in_order() {
		let provider = ScriptedProvider::new().stream(["def f():\n", "    return 1\n"]);
		let (result, signals) = run(provider, context(OrchestratorConfig::default())).await;

		assert_eq!(
			kinds(&signals),
			["generation_start", "code_chunk", "code_chunk", "generation_complete", "evaluation_result"]
		);
		let result = result.unwrap();
		assert!(result.success);
		assert_eq!(result.generated_code, "def f():\n    return 1\n");
		assert_eq!(result.overall_score, 8.0);
	}

	#[tokio::test(start_paused = true)]
	async fn transient_errors_are_retried() {
		let provider = ScriptedProvider::new()
			.fail(ProviderError::Transport("connection reset".into()))
			.fail(ProviderError::RateLimited { retry_after: Some(Duration::from_secs(2)) })
			.complete("x = 1");
		let handle = provider.clone();
		let (result, signals) = run(provider, context(OrchestratorConfig::default())).await;

		assert!(result.unwrap().success);
		assert_eq!(handle.calls(), 3);
		assert_eq!(kinds(&signals), ["generation_start", "code_chunk", "generation_complete", "evaluation_result"]);
		// 500ms backoff, then the provider's 2s hint
		match &signals[2] {
			Signal::GenerationComplete { execution_time_ms, .. } => assert_eq!(*execution_time_ms, 2500),
			other => panic!("unexpected {other:?}"),
		}
	}

	#[tokio::test(start_paused = true)]
	async fn exhausted_retries_fail_the_task() {
		let provider = ScriptedProvider::new()
			.hang()
			.hang()
			.hang();
		let handle = provider.clone();
		let (result, signals) = run(provider, context(OrchestratorConfig::default())).await;

		let result = result.unwrap();
		assert!(!result.success);
		assert_eq!(handle.calls(), 3);
		assert_eq!(result.error.as_deref(), Some("timeout after 30s (after 3 attempts)"));
		assert_eq!(kinds(&signals), ["generation_start", "generation_complete", "error"]);
		assert_eq!(signals[2].model(), Some("model-a"));
	}

	#[tokio::test]
	async fn rejections_are_not_retried() {
		let provider = ScriptedProvider::new()
			.fail(ProviderError::rejected("unknown model"))
			.complete("x = 1");
		let handle = provider.clone();
		let (result, _) = run(provider, context(OrchestratorConfig::default())).await;

		assert_eq!(handle.calls(), 1);
		assert_eq!(result.unwrap().error.as_deref(), Some("provider rejected request: unknown model"));
	}

	#[tokio::test]
	async fn provider_cancelled_is_a_plain_failure() {
		let provider = ScriptedProvider::new().fail(ProviderError::Cancelled).complete("x = 1");
		let handle = provider.clone();
		let (result, signals) = run(provider, context(OrchestratorConfig::default())).await;

		let result = result.expect("a provider-side cancel still yields a result");
		assert!(!result.success);
		assert_eq!(handle.calls(), 1);
		assert_eq!(result.error.as_deref(), Some("provider rejected request: provider cancelled the request"));
		assert_eq!(kinds(&signals), ["generation_start", "generation_complete", "error"]);
	}

	#[tokio::test]
	async fn empty_code_is_malformed() {
		let (result, _) = run(ScriptedProvider::new().complete("   "), context(OrchestratorConfig::default())).await;
		assert_eq!(result.unwrap().error.as_deref(), Some("malformed response: provider returned no code"));
	}

	#[tokio::test]
	async fn stream_failure_after_chunks_is_not_retried() {
		let provider = ScriptedProvider::new()
			.stream_then_fail(["def f():\n"], ProviderError::Transport("stream reset".into()))
			.complete("x = 1");
		let handle = provider.clone();
		let (result, signals) = run(provider, context(OrchestratorConfig::default())).await;

		assert_eq!(handle.calls(), 1);
		assert!(!result.unwrap().success);
		assert_eq!(kinds(&signals), ["generation_start", "code_chunk", "generation_complete", "error"]);
	}

	#[tokio::test(start_paused = true)]
	async fn cancellation_stops_further_attempts() {
		let provider = ScriptedProvider::new().hang().complete("x = 1");
		let handle = provider.clone();
		let ctx = context(OrchestratorConfig::default());
		let cancel = ctx.cancel.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_secs(5)).await;
			cancel.cancel();
		});

		let (result, signals) = run(provider, ctx).await;
		assert!(result.is_none());
		assert_eq!(handle.calls(), 1);
		assert_eq!(kinds(&signals), ["generation_start"]);
	}
}
