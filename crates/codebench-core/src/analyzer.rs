use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::analyzers::{
    ComplexityAnalyzer, ConsistencyAnalyzer, DependencyAnalyzer, DocumentationAnalyzer,
    ReadabilityAnalyzer,
};
use crate::types::MetricId;

/// What an analyzer reports for one code sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// 0 to 10, higher is better.
    pub score: f64,
    pub notes: String,
    pub details: Option<Value>,
}

impl Analysis {
    pub fn new(score: f64, notes: impl Into<String>) -> Self {
        Self {
            score,
            notes: notes.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Scores code along one metric. Implementations hold no per-call state.
#[async_trait]
pub trait MetricAnalyzer: Send + Sync {
    fn metric(&self) -> &'static str;
    async fn analyze(&self, code: &str) -> Result<Analysis>;
}

/// Analyzers keyed by the metric they score.
#[derive(Clone, Default)]
pub struct AnalyzerRegistry {
    analyzers: BTreeMap<MetricId, Arc<dyn MetricAnalyzer>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The five built-in heuristic analyzers.
    pub fn standard() -> Self {
        Self::new()
            .with(Arc::new(ReadabilityAnalyzer))
            .with(Arc::new(ConsistencyAnalyzer))
            .with(Arc::new(ComplexityAnalyzer))
            .with(Arc::new(DocumentationAnalyzer))
            .with(Arc::new(DependencyAnalyzer))
    }

    pub fn with(mut self, analyzer: Arc<dyn MetricAnalyzer>) -> Self {
        self.register(analyzer);
        self
    }

    /// Adds an analyzer, replacing any previous one for the same metric.
    pub fn register(&mut self, analyzer: Arc<dyn MetricAnalyzer>) {
        self.analyzers
            .insert(MetricId::from(analyzer.metric()), analyzer);
    }

    pub fn get(&self, metric: &str) -> Option<&Arc<dyn MetricAnalyzer>> {
        self.analyzers.get(metric)
    }

    pub fn contains(&self, metric: &str) -> bool {
        self.analyzers.contains_key(metric)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetricId, &Arc<dyn MetricAnalyzer>)> + '_ {
        self.analyzers.iter()
    }

    pub fn metrics(&self) -> impl Iterator<Item = &MetricId> + '_ {
        self.analyzers.keys()
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }
}

impl std::fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.analyzers.keys()).finish()
    }
}
