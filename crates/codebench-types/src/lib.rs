use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use tabled::Tabled;

/// Identifiers of the metrics shipped with codebench.
pub mod metrics {
    pub const READABILITY: &str = "readability";
    pub const CONSISTENCY: &str = "consistency";
    pub const TIME_COMPLEXITY: &str = "time_complexity";
    pub const CODE_DOCUMENTATION: &str = "code_documentation";
    pub const EXTERNAL_DEPENDENCIES: &str = "external_dependencies";

    pub const ALL: [&str; 5] = [
        READABILITY,
        CONSISTENCY,
        TIME_COMPLEXITY,
        CODE_DOCUMENTATION,
        EXTERNAL_DEPENDENCIES,
    ];
}

/// Name of one independently scored quality dimension (e.g. `readability`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricId(String);

impl MetricId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-facing form: `time_complexity` becomes `time complexity`.
    pub fn label(&self) -> String {
        self.0.replace('_', " ")
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MetricId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MetricId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for MetricId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// One caller request: a prompt, the models to compare and an optional
/// metric priority (highest first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
	pub prompt: String,
	pub models: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub metrics: Option<Vec<MetricId>>,
}

impl EvaluationRequest {
	pub fn new<I, S>(prompt: impl Into<String>, models: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			prompt: prompt.into(),
			models: models.into_iter().map(Into::into).collect(),
			metrics: None,
		}
	}

	pub fn with_priority<I, M>(mut self, metrics: I) -> Self
	where
		I: IntoIterator<Item = M>,
		M: Into<MetricId>,
	{
		self.metrics = Some(metrics.into_iter().map(Into::into).collect());
		self
	}

	/// The priority ordering, empty when none was supplied.
	pub fn priority(&self) -> &[MetricId] {
		self.metrics.as_deref().unwrap_or(&[])
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricScore {
	pub score: f64,
	pub notes: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub details: Option<Value>,
}

impl MetricScore {
	pub fn new(score: f64, notes: impl Into<String>) -> Self {
		Self { score, notes: notes.into(), details: None }
	}
}

/// Pros and cons derived from per-metric scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreNotes {
	pub pros: Vec<String>,
	pub cons: Vec<String>,
}

/// Final snapshot of one model's run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
	pub model: String,
	pub overall_score: f64,
	pub metrics: BTreeMap<MetricId, MetricScore>,
	#[serde(default)]
	pub notes: ScoreNotes,
	pub generated_code: String,
	pub execution_time_ms: u64,
	pub success: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl EvaluationResult {
	pub fn failed(model: impl Into<String>, execution_time_ms: u64, error: impl Into<String>) -> Self {
		Self {
			model: model.into(),
			overall_score: 0.0,
			metrics: BTreeMap::new(),
			notes: ScoreNotes::default(),
			generated_code: String::new(),
			execution_time_ms,
			success: false,
			error: Some(error.into()),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
	pub rank: usize,
	pub model: String,
	pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryData {
	pub total_models_tested: usize,
	pub successful_evaluations: usize,
	pub failed_evaluations: usize,
	pub best_model: Option<String>,
	pub best_score: Option<f64>,
	pub best_generated_code: Option<String>,
	pub potential_issues: Option<String>,
}

/// One event of the orchestrator's output stream.
///
/// Every variant except `Summary`, `Complete` and a model-less `Error`
/// belongs to exactly one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
	GenerationStart {
		model: String,
	},
	CodeChunk {
		model: String,
		chunk: String,
	},
	GenerationComplete {
		model: String,
		success: bool,
		execution_time_ms: u64,
	},
	EvaluationResult {
		model: String,
		overall_score: f64,
		metrics: BTreeMap<MetricId, MetricScore>,
		notes: ScoreNotes,
	},
	Summary {
		data: SummaryData,
		ranking: Vec<RankingEntry>,
	},
	Error {
		message: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		model: Option<String>,
	},
	Complete,
}

impl Signal {
	/// The model this signal belongs to; `None` for batch-level signals.
	pub fn model(&self) -> Option<&str> {
		match self {
			Signal::GenerationStart { model }
			| Signal::CodeChunk { model, .. }
			| Signal::GenerationComplete { model, .. }
			| Signal::EvaluationResult { model, .. } => Some(model),
			Signal::Error { model, .. } => model.as_deref(),
			Signal::Summary { .. } | Signal::Complete => None,
		}
	}

	pub fn kind(&self) -> &'static str {
		match self {
			Signal::GenerationStart { .. } => "generation_start",
			Signal::CodeChunk { .. } => "code_chunk",
			Signal::GenerationComplete { .. } => "generation_complete",
			Signal::EvaluationResult { .. } => "evaluation_result",
			Signal::Summary { .. } => "summary",
			Signal::Error { .. } => "error",
			Signal::Complete => "complete",
		}
	}

	/// A model-less error: the batch aborted.
	pub fn is_batch_error(&self) -> bool {
		matches!(self, Signal::Error { model: None, .. })
	}
}

/// Everything one batch produced, in the shape returned to API callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
	pub evaluation_id: String,
	pub timestamp: String,
	pub prompt: String,
	pub results: Vec<EvaluationResult>,
	pub ranking: Vec<RankingEntry>,
	pub summary: SummaryData,
}

#[derive(Debug, Clone, Tabled)]
struct RankingRow {
	rank: String,
	model: String,
	score: String,
	time_ms: u64,
	status: String,
}

impl EvaluationReport {
	pub fn ranking_table(&self) -> String {
		use tabled::Table;

		let mut rows: Vec<RankingRow> = self
			.ranking
			.iter()
			.map(|entry| {
				let time_ms = self
					.results
					.iter()
					.find(|r| r.model == entry.model)
					.map(|r| r.execution_time_ms)
					.unwrap_or_default();
				RankingRow {
					rank: entry.rank.to_string(),
					model: entry.model.clone(),
					score: format!("{:.2}", entry.score),
					time_ms,
					status: "✓".to_string(),
				}
			})
			.collect();

		for failed in self.results.iter().filter(|r| !r.success) {
			rows.push(RankingRow {
				rank: "-".to_string(),
				model: failed.model.clone(),
				score: "-".to_string(),
				time_ms: failed.execution_time_ms,
				status: truncate(failed.error.clone().unwrap_or_else(|| "failed".to_string()), 48),
			});
		}

		let table = Table::new(rows).to_string();
		let best = match (&self.summary.best_model, self.summary.best_score) {
			(Some(model), Some(score)) => format!("{model} ({score:.2})"),
			_ => "none".to_string(),
		};
		let summary_text = format!(
			"Models: {}  Succeeded: {}  Failed: {}  Best: {}",
			self.summary.total_models_tested,
			self.summary.successful_evaluations,
			self.summary.failed_evaluations,
			best
		);

		format!("{}\n\n{}\n", table, summary_text)
	}
}

fn truncate(s: String, max_len: usize) -> String {
	if s.chars().count() <= max_len {
		return s;
	}
	let mut truncated = s.chars().take(max_len.saturating_sub(1)).collect::<String>();
	truncated.push('…');
	truncated
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn signals_are_tagged_by_type() {
		let start = Signal::GenerationStart { model: "m1".into() };
		assert_eq!(serde_json::to_value(&start).unwrap(), json!({"type": "generation_start", "model": "m1"}));

		let complete = serde_json::to_value(&Signal::Complete).unwrap();
		assert_eq!(complete, json!({"type": "complete"}));
	}

	#[test]
	fn batch_error_omits_model() {
		let err = Signal::Error { message: "boom".into(), model: None };
		assert_eq!(serde_json::to_value(&err).unwrap(), json!({"type": "error", "message": "boom"}));
		assert!(err.is_batch_error());
		assert_eq!(err.model(), None);

		let per_model = Signal::Error { message: "boom".into(), model: Some("m1".into()) };
		assert!(!per_model.is_batch_error());
		assert_eq!(per_model.model(), Some("m1"));
	}

	#[test]
	fn request_parses_with_optional_metrics() {
		let req: EvaluationRequest = serde_json::from_value(json!({
			"prompt": "Write a palindrome checker",
			"models": ["a", "b"]
		}))
		.unwrap();
		assert!(req.priority().is_empty());

		let req: EvaluationRequest = serde_json::from_value(json!({
			"prompt": "Write a palindrome checker",
			"models": ["a"],
			"metrics": ["readability", "time_complexity"]
		}))
		.unwrap();
		assert_eq!(req.priority(), &[MetricId::from("readability"), MetricId::from("time_complexity")]);
	}

	#[test]
	fn metric_label_replaces_underscores() {
		assert_eq!(MetricId::from(metrics::CODE_DOCUMENTATION).label(), "code documentation");
	}

	#[test]
	fn ranking_table_lists_failures_after_ranked_models() {
		let report = EvaluationReport {
			evaluation_id: "eval_00000000".into(),
			timestamp: "2024-01-01T00:00:00Z".into(),
			prompt: "p".into(),
			results: vec![EvaluationResult::failed("bad", 12, "timeout after 30s")],
			ranking: vec![],
			summary: SummaryData {
				total_models_tested: 1,
				successful_evaluations: 0,
				failed_evaluations: 1,
				best_model: None,
				best_score: None,
				best_generated_code: None,
				potential_issues: None,
			},
		};
		let table = report.ranking_table();
		assert!(table.contains("bad"));
		assert!(table.contains("Best: none"));
	}
}
