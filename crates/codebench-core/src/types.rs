pub use codebench_types::{
    metrics, EvaluationReport, EvaluationRequest, EvaluationResult, MetricId, MetricScore,
    RankingEntry, ScoreNotes, Signal, SummaryData,
};
