//! Runs the analyzers over one code sample and folds their scores.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::warn;

use crate::analyzer::{AnalyzerRegistry, MetricAnalyzer};
use crate::error::AnalyzerError;
use crate::types::{MetricId, MetricScore, ScoreNotes};
use crate::weights::MetricWeightMap;

/// Scores for one finished code sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Weighted sum of the per-metric scores, in [0, 10].
    pub overall_score: f64,
    pub metrics: BTreeMap<MetricId, MetricScore>,
    pub notes: ScoreNotes,
}

/// Runs every registered analyzer concurrently, each bounded by `timeout`.
///
/// A failing, hanging or out-of-range analyzer scores 0 for its metric and
/// the rest of the evaluation proceeds. Weighted metrics with no registered
/// analyzer are treated the same way.
pub async fn evaluate(
    code: &str,
    weights: &MetricWeightMap,
    analyzers: &AnalyzerRegistry,
    timeout: Duration,
) -> Evaluation {
    let runs = analyzers
        .iter()
        .map(|(metric, analyzer)| run_one(metric.clone(), analyzer.clone(), code, timeout));
    let mut metrics: BTreeMap<MetricId, MetricScore> = join_all(runs).await.into_iter().collect();

    for metric in weights.metrics() {
        if !metrics.contains_key(metric) {
            let err = AnalyzerError::Failed(format!("no analyzer registered for '{metric}'"));
            warn!(metric = %metric, error = %err, "metric not scored");
            metrics.insert(metric.clone(), MetricScore::new(0.0, err.to_string()));
        }
    }

    let overall_score = overall_score(&metrics, weights);
    let notes = score_notes(&metrics, weights);
    Evaluation {
        overall_score,
        metrics,
        notes,
    }
}

async fn run_one(
    metric: MetricId,
    analyzer: Arc<dyn MetricAnalyzer>,
    code: &str,
    timeout: Duration,
) -> (MetricId, MetricScore) {
    let outcome = match tokio::time::timeout(timeout, analyzer.analyze(code)).await {
        Err(_) => Err(AnalyzerError::Timeout(timeout)),
        Ok(Err(e)) => Err(AnalyzerError::Failed(format!("{e:#}"))),
        Ok(Ok(analysis)) if !(0.0..=10.0).contains(&analysis.score) => {
            Err(AnalyzerError::OutOfRange(analysis.score))
        }
        Ok(Ok(analysis)) => Ok(analysis),
    };

    let score = match outcome {
        Ok(analysis) => MetricScore {
            score: analysis.score,
            notes: analysis.notes,
            details: analysis.details,
        },
        Err(err) => {
            warn!(metric = %metric, error = %err, "analyzer failed, scoring 0");
            MetricScore::new(0.0, err.to_string())
        }
    };
    (metric, score)
}

/// Σ weight × score over the weighted metrics, rounded to two decimals.
pub fn overall_score(metrics: &BTreeMap<MetricId, MetricScore>, weights: &MetricWeightMap) -> f64 {
    let total: f64 = weights
        .iter()
        .map(|(metric, weight)| weight * metrics.get(metric).map_or(0.0, |m| m.score))
        .sum();
    ((total * 100.0).round() / 100.0).clamp(0.0, 10.0)
}

/// Pros and cons per metric, weighted metrics first in weight order.
pub fn score_notes(metrics: &BTreeMap<MetricId, MetricScore>, weights: &MetricWeightMap) -> ScoreNotes {
    let ordered = weights
        .metrics()
        .chain(metrics.keys().filter(|m| weights.get(m.as_str()).is_none()));

    let mut notes = ScoreNotes::default();
    for metric in ordered {
        let Some(score) = metrics.get(metric) else {
            continue;
        };
        let (band, is_pro) = band(score.score);
        let line = format!("{band} {} ({:.1}/10)", metric.label(), score.score);
        if is_pro {
            notes.pros.push(line);
        } else {
            notes.cons.push(line);
        }
    }
    notes
}

/// Lower bounds are inclusive.
fn band(score: f64) -> (&'static str, bool) {
    if score >= 8.0 {
        ("Excellent", true)
    } else if score >= 6.5 {
        ("Good", true)
    } else if score >= 5.0 {
        ("Moderate", false)
    } else {
        ("Poor", false)
    }
}
