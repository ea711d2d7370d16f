use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

use crate::error::EvalError;
use crate::types::{EvaluationReport, EvaluationResult, RankingEntry, Signal, SummaryData};

/// Folds a signal stream back into per-model results.
///
/// Signals may interleave across models; each is routed by its model id.
#[derive(Debug)]
pub struct ReportCollector {
    prompt: String,
    results: Vec<EvaluationResult>,
    ranking: Vec<RankingEntry>,
    summary: Option<SummaryData>,
    fatal: Option<String>,
    complete: bool,
}

impl ReportCollector {
    /// `models` fixes the order of `results` in the report.
    pub fn new<I, S>(prompt: impl Into<String>, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prompt: prompt.into(),
            results: models
                .into_iter()
                .map(|m| EvaluationResult::failed(m, 0, "no result received"))
                .collect(),
            ranking: Vec::new(),
            summary: None,
            fatal: None,
            complete: false,
        }
    }

    fn entry(&mut self, model: &str) -> &mut EvaluationResult {
        match self.results.iter().position(|r| r.model == model) {
            Some(idx) => &mut self.results[idx],
            None => {
                self.results.push(EvaluationResult::failed(model, 0, "no result received"));
                let last = self.results.len() - 1;
                &mut self.results[last]
            }
        }
    }

    pub fn observe(&mut self, signal: &Signal) {
        match signal {
            Signal::GenerationStart { model } => {
                let entry = self.entry(model);
                entry.error = None;
            }
            Signal::CodeChunk { model, chunk } => {
                self.entry(model).generated_code.push_str(chunk);
            }
            Signal::GenerationComplete {
                model,
                success,
                execution_time_ms,
            } => {
                let entry = self.entry(model);
                entry.execution_time_ms = *execution_time_ms;
                if *success {
                    entry.error = Some("evaluation did not finish".to_string());
                }
            }
            Signal::EvaluationResult {
                model,
                overall_score,
                metrics,
                notes,
            } => {
                let entry = self.entry(model);
                entry.overall_score = *overall_score;
                entry.metrics = metrics.clone();
                entry.notes = notes.clone();
                entry.success = true;
                entry.error = None;
            }
            Signal::Error {
                message,
                model: Some(model),
            } => {
                let entry = self.entry(model);
                entry.success = false;
                entry.generated_code.clear();
                entry.error = Some(message.clone());
            }
            Signal::Error {
                message,
                model: None,
            } => {
                self.fatal = Some(message.clone());
            }
            Signal::Summary { data, ranking } => {
                self.summary = Some(data.clone());
                self.ranking = ranking.clone();
            }
            Signal::Complete => self.complete = true,
        }
    }

    pub fn finish(self) -> Result<EvaluationReport, EvalError> {
        if let Some(message) = self.fatal {
            return Err(EvalError::BatchFatal(message));
        }
        let summary = match (self.summary, self.complete) {
            (Some(summary), true) => summary,
            _ => return Err(EvalError::batch_fatal("signal stream ended before completion")),
        };

        Ok(EvaluationReport {
            evaluation_id: new_evaluation_id(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            prompt: self.prompt,
            results: self.results,
            ranking: self.ranking,
            summary,
        })
    }
}

/// `eval_` followed by eight hex digits.
pub fn new_evaluation_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("eval_{}", &id[..8])
}
