//! codebench-core: compare code-generation providers on one prompt.
//! Dispatch to every provider concurrently, stream typed signals, score each
//! result with weighted metric analyzers, then rank.
//! See `examples/simple.rs` for a quickstart.

pub mod aggregate;
pub mod analyzer;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod provider;
pub mod report;
pub mod summary;
pub mod task;
pub mod testing;
pub mod types;
pub mod weights;

pub mod analyzers {
    mod source;

    pub mod complexity;
    pub mod consistency;
    pub mod dependencies;
    pub mod documentation;
    pub mod issues;
    pub mod readability;

    pub use complexity::ComplexityAnalyzer;
    pub use consistency::ConsistencyAnalyzer;
    pub use dependencies::DependencyAnalyzer;
    pub use documentation::DocumentationAnalyzer;
    pub use issues::{IssueReport, IssuesAnalyzer};
    pub use readability::ReadabilityAnalyzer;
}

pub use aggregate::Evaluation;
pub use analyzer::{Analysis, AnalyzerRegistry, MetricAnalyzer};
pub use analyzers::{
    ComplexityAnalyzer, ConsistencyAnalyzer, DependencyAnalyzer, DocumentationAnalyzer,
    IssueReport, IssuesAnalyzer, ReadabilityAnalyzer,
};
pub use config::{FileConfig, OrchestratorConfig, ProviderConfig};
pub use error::{AnalyzerError, EvalError, ProviderError};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, SignalStream};
pub use provider::{
    build_prompt, extract_code, from_async_fn, Generation, GenerationProvider, GenerationRequest,
    HttpProvider,
};
pub use report::ReportCollector;
pub use task::{ProviderTask, TaskState};
pub use types::{
    metrics, EvaluationReport, EvaluationRequest, EvaluationResult, MetricId, MetricScore,
    RankingEntry, ScoreNotes, Signal, SummaryData,
};
pub use weights::{compute_weights, MetricWeightMap};
