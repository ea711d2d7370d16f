//! Priority ordering → normalized metric weights.
//!
//! With a priority list, the metric at position `i` gets `decay_rate^i` before
//! normalization, so earlier metrics always weigh strictly more. Without one,
//! the configured defaults are used as-is.

use std::collections::{BTreeMap, HashSet};

use crate::config::validate_weights;
use crate::error::EvalError;
use crate::types::MetricId;

/// Metric → weight, each in (0, 1], summing to 1.0.
///
/// Iteration follows priority order when built from a priority list and
/// identifier order when built from defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricWeightMap {
    entries: Vec<(MetricId, f64)>,
}

impl MetricWeightMap {
    pub fn get(&self, metric: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(id, _)| id.as_str() == metric)
            .map(|(_, w)| *w)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetricId, f64)> + '_ {
        self.entries.iter().map(|(id, w)| (id, *w))
    }

    pub fn metrics(&self) -> impl Iterator<Item = &MetricId> + '_ {
        self.entries.iter().map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, w)| w).sum()
    }
}

/// Computes the weight map for one batch.
///
/// `priority` must hold distinct identifiers drawn from the keys of
/// `default_weights`. Metrics left out of a non-empty priority list carry no
/// weight.
pub fn compute_weights(
    priority: &[MetricId],
    decay_rate: f64,
    default_weights: &BTreeMap<MetricId, f64>,
) -> Result<MetricWeightMap, EvalError> {
    if priority.is_empty() {
        validate_weights(default_weights)?;
        return Ok(MetricWeightMap {
            entries: default_weights
                .iter()
                .map(|(id, w)| (id.clone(), *w))
                .collect(),
        });
    }

    if !(decay_rate > 0.0 && decay_rate < 1.0) {
        return Err(EvalError::config(format!(
            "decay_rate must be in (0, 1), got {decay_rate}"
        )));
    }

    let mut seen = HashSet::with_capacity(priority.len());
    for metric in priority {
        if !default_weights.contains_key(metric) {
            return Err(EvalError::validation(format!("unknown metric '{metric}'")));
        }
        if !seen.insert(metric.as_str()) {
            return Err(EvalError::validation(format!("duplicate metric '{metric}'")));
        }
    }

    let mut raw = 1.0_f64;
    let mut entries = Vec::with_capacity(priority.len());
    for metric in priority {
        entries.push((metric.clone(), raw));
        raw *= decay_rate;
    }

    let total: f64 = entries.iter().map(|(_, w)| w).sum();
    for (_, weight) in entries.iter_mut() {
        *weight /= total;
    }

    Ok(MetricWeightMap { entries })
}
