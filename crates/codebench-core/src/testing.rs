//! Fakes and assertion helpers for exercising an orchestrator without
//! network access.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::analyzer::{Analysis, MetricAnalyzer};
use crate::error::ProviderError;
use crate::provider::{Generation, GenerationProvider, GenerationRequest};
use crate::types::EvaluationReport;

#[derive(Debug, Clone)]
enum Step {
    Complete(String),
    Stream(Vec<String>, Option<ProviderError>),
    Fail(ProviderError),
    Hang,
    Delayed(Duration, Box<Step>),
}

#[derive(Debug, Default)]
struct Script {
    steps: VecDeque<Step>,
    calls: usize,
}

/// Provider that replays one scripted step per call.
///
/// Clones share the script, so a clone kept by the test can read
/// [`calls`](Self::calls) after the provider was handed to an orchestrator.
/// Calls past the end of the script are rejected.
///
/// ```ignore
/// let provider = ScriptedProvider::new()
///     .fail(ProviderError::Transport("reset".into()))
///     .stream(["def f():\n", "    return 1\n"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    script: Arc<Mutex<Script>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, step: Step) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.steps.push_back(step);
        }
        self
    }

    pub fn complete(self, code: impl Into<String>) -> Self {
        self.push(Step::Complete(code.into()))
    }

    pub fn stream<I, S>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Step::Stream(chunks.into_iter().map(Into::into).collect(), None))
    }

    /// Streams `chunks`, then fails the stream with `error`.
    pub fn stream_then_fail<I, S>(self, chunks: I, error: ProviderError) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Step::Stream(chunks.into_iter().map(Into::into).collect(), Some(error)))
    }

    pub fn fail(self, error: ProviderError) -> Self {
        self.push(Step::Fail(error))
    }

    /// A call that never returns.
    pub fn hang(self) -> Self {
        self.push(Step::Hang)
    }

    /// Returns `code` after `delay`.
    pub fn delayed(self, delay: Duration, code: impl Into<String>) -> Self {
        self.push(Step::Delayed(delay, Box::new(Step::Complete(code.into()))))
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.script.lock().map(|s| s.calls).unwrap_or_default()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn generate(&self, _request: &GenerationRequest) -> Result<Generation, ProviderError> {
        let step = {
            let mut script = self
                .script
                .lock()
                .map_err(|_| ProviderError::Transport("script lock poisoned".to_string()))?;
            script.calls += 1;
            script.steps.pop_front()
        };

        let mut step = step.ok_or_else(|| ProviderError::rejected("no scripted response left"))?;
        if let Step::Delayed(delay, inner) = step {
            tokio::time::sleep(delay).await;
            step = *inner;
        }

        match step {
            Step::Complete(code) => Ok(Generation::Complete(code)),
            Step::Stream(chunks, error) => {
                let items = chunks.into_iter().map(Ok).chain(error.map(Err));
                Ok(Generation::Stream(stream::iter(items).boxed()))
            }
            Step::Fail(error) => Err(error),
            Step::Hang => futures::future::pending().await,
            Step::Delayed(..) => Err(ProviderError::rejected("nested delay in script")),
        }
    }
}

/// Analyzer that always reports the same score.
#[derive(Debug, Clone)]
pub struct FixedAnalyzer {
    metric: &'static str,
    score: f64,
}

impl FixedAnalyzer {
    pub fn new(metric: &'static str, score: f64) -> Self {
        Self { metric, score }
    }
}

#[async_trait]
impl MetricAnalyzer for FixedAnalyzer {
    fn metric(&self) -> &'static str {
        self.metric
    }

    async fn analyze(&self, _code: &str) -> Result<Analysis> {
        Ok(Analysis::new(self.score, format!("fixed score {}", self.score)))
    }
}

/// Helper to assert every model generated and scored.
///
/// # Example
/// ```ignore
/// #[tokio::test]
/// async fn test_my_providers() -> Result<()> {
///     let report = orchestrator.evaluate(request).await?;
///     assert_all_succeeded(&report)?;
///     Ok(())
/// }
/// ```
pub fn assert_all_succeeded(report: &EvaluationReport) -> Result<()> {
    if report.summary.failed_evaluations > 0 {
        let failures: Vec<String> = report
            .results
            .iter()
            .filter(|r| !r.success)
            .map(|r| format!("{}: {}", r.model, r.error.as_deref().unwrap_or("unknown error")))
            .collect();
        anyhow::bail!(
            "Evaluation failed: {}/{} models failed ({})\n{}",
            report.summary.failed_evaluations,
            report.summary.total_models_tested,
            failures.join("; "),
            report.ranking_table()
        );
    }
    Ok(())
}

/// Helper to assert which model ranked first.
pub fn assert_best_model(report: &EvaluationReport, model: &str) -> Result<()> {
    if report.summary.best_model.as_deref() != Some(model) {
        anyhow::bail!(
            "Evaluation failed: expected best model {model}, got {}\n{}",
            report.summary.best_model.as_deref().unwrap_or("none"),
            report.ranking_table()
        );
    }
    Ok(())
}

/// Helper to assert the winning score meets a threshold.
pub fn assert_min_best_score(report: &EvaluationReport, min_score: f64) -> Result<()> {
    match report.summary.best_score {
        Some(score) if score >= min_score => Ok(()),
        best => anyhow::bail!(
            "Evaluation failed: best score {} is below threshold {min_score:.2}\n{}",
            best.map_or("none".to_string(), |s| format!("{s:.2}")),
            report.ranking_table()
        ),
    }
}
