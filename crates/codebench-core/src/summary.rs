//! Ranking and batch summary.

use crate::analyzers::IssuesAnalyzer;
use crate::error::EvalError;
use crate::types::{EvaluationResult, RankingEntry, SummaryData};

/// Ranks the successful results and summarizes the batch.
///
/// `results` must be in request order: equal scores keep that order.
pub fn build(results: &[EvaluationResult]) -> (Vec<RankingEntry>, SummaryData) {
    let mut successful: Vec<&EvaluationResult> = results.iter().filter(|r| r.success).collect();
    // sort_by is stable
    successful.sort_by(|a, b| b.overall_score.total_cmp(&a.overall_score));

    let ranking: Vec<RankingEntry> = successful
        .iter()
        .enumerate()
        .map(|(idx, r)| RankingEntry {
            rank: idx + 1,
            model: r.model.clone(),
            score: r.overall_score,
        })
        .collect();

    let best = successful.first();
    let data = SummaryData {
        total_models_tested: results.len(),
        successful_evaluations: successful.len(),
        failed_evaluations: results.len() - successful.len(),
        best_model: best.map(|r| r.model.clone()),
        best_score: best.map(|r| r.overall_score),
        best_generated_code: best.map(|r| r.generated_code.clone()),
        potential_issues: best.map(|r| IssuesAnalyzer.analyze(&r.generated_code).text()),
    };
    (ranking, data)
}

/// Checks the summary against the number of tasks that were spawned.
pub fn verify(data: &SummaryData, ranking: &[RankingEntry], spawned: usize) -> Result<(), EvalError> {
    if data.total_models_tested != spawned {
        return Err(EvalError::batch_fatal(format!(
            "summary covers {} models but {spawned} were dispatched",
            data.total_models_tested
        )));
    }
    if data.successful_evaluations + data.failed_evaluations != data.total_models_tested {
        return Err(EvalError::batch_fatal(format!(
            "{} succeeded + {} failed != {} tested",
            data.successful_evaluations, data.failed_evaluations, data.total_models_tested
        )));
    }
    if ranking.len() != data.successful_evaluations {
        return Err(EvalError::batch_fatal("ranking does not match successful evaluations"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(model: &str, score: f64) -> EvaluationResult {
        EvaluationResult {
            overall_score: score,
            success: true,
            error: None,
            generated_code: format!("def {}():\n    return 1\n", model.replace('-', "_")),
            ..EvaluationResult::failed(model, 10, "")
        }
    }

    fn models(ranking: &[RankingEntry]) -> Vec<&str> {
        ranking.iter().map(|e| e.model.as_str()).collect()
    }

    #[test]
    fn ranks_successes_by_score() {
        let results = vec![
            scored("a", 6.0),
            EvaluationResult::failed("b", 30_000, "timeout"),
            scored("c", 8.4),
            scored("d", 7.1),
        ];
        let (ranking, data) = build(&results);

        assert_eq!(models(&ranking), ["c", "d", "a"]);
        assert_eq!(ranking.iter().map(|e| e.rank).collect::<Vec<_>>(), [1, 2, 3]);
        assert_eq!(data.total_models_tested, 4);
        assert_eq!(data.successful_evaluations, 3);
        assert_eq!(data.failed_evaluations, 1);
        assert_eq!(data.best_model.as_deref(), Some("c"));
        assert_eq!(data.best_score, Some(8.4));
        assert_eq!(data.best_generated_code.as_deref(), Some("def c():\n    return 1\n"));
        assert_eq!(data.potential_issues.as_deref(), Some("No significant issues detected."));
        verify(&data, &ranking, 4).unwrap();
    }

    #[test]
    fn ties_keep_request_order() {
        let results = vec![scored("b", 7.0), scored("a", 7.0), scored("c", 9.0)];
        let (ranking, _) = build(&results);
        assert_eq!(models(&ranking), ["c", "b", "a"]);
    }

    #[test]
    fn all_failed_has_no_best_model() {
        let results = vec![
            EvaluationResult::failed("a", 5, "rejected"),
            EvaluationResult::failed("b", 5, "timeout"),
        ];
        let (ranking, data) = build(&results);
        assert!(ranking.is_empty());
        assert_eq!(data.successful_evaluations, 0);
        assert_eq!(data.failed_evaluations, 2);
        assert_eq!(data.best_model, None);
        assert_eq!(data.best_score, None);
        assert_eq!(data.potential_issues, None);
        verify(&data, &ranking, 2).unwrap();
    }

    #[test]
    fn verify_rejects_missing_results() {
        let (ranking, data) = build(&[scored("a", 5.0)]);
        let err = verify(&data, &ranking, 2).unwrap_err();
        assert!(matches!(err, EvalError::BatchFatal(_)));
    }
}
