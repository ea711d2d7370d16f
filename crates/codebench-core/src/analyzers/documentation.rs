use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use super::source::{round1, syntax_error, Source};
use crate::analyzer::{Analysis, MetricAnalyzer};
use crate::types::metrics;

/// Scores doc coverage of functions and types plus inline comment density.
pub struct DocumentationAnalyzer;

#[async_trait]
impl MetricAnalyzer for DocumentationAnalyzer {
    fn metric(&self) -> &'static str {
        metrics::CODE_DOCUMENTATION
    }

    async fn analyze(&self, code: &str) -> Result<Analysis> {
        let source = Source::parse(code);
        if !source.has_balanced_delimiters() {
            return Ok(syntax_error());
        }

        let (docstrings, coverage) = docstring_score(&source);
        let comments = inline_comment_score(&source);
        let score = round1(docstrings * 0.7 + comments * 0.3);

        Ok(Analysis::new(score, notes(docstrings, comments))
            .with_details(json!({ "documented_ratio": coverage })))
    }
}

/// Returns the tiered score and the weighted fraction of documented definitions.
fn docstring_score(source: &Source<'_>) -> (f64, Option<f64>) {
    let definitions: Vec<_> = source
        .functions()
        .into_iter()
        .chain(source.types())
        .collect();
    if definitions.is_empty() {
        return (7.0, None);
    }

    let documented: f64 = definitions
        .iter()
        .filter_map(|block| source.doc_for(block))
        .map(|doc| match doc.chars().count() {
            len if len > 50 => 1.0,
            len if len > 20 => 0.7,
            _ => 0.5,
        })
        .sum();
    let ratio = documented / definitions.len() as f64;

    let score = if ratio >= 0.9 {
        10.0
    } else if ratio >= 0.7 {
        8.5
    } else if ratio >= 0.5 {
        7.0
    } else if ratio >= 0.3 {
        5.0
    } else {
        3.0
    };
    (score, Some(ratio))
}

fn inline_comment_score(source: &Source<'_>) -> f64 {
    let code_lines = source.code_line_count();
    if code_lines == 0 {
        return 5.0;
    }
    let ratio = source.inline_comment_count() as f64 / code_lines as f64;
    if (0.05..=0.2).contains(&ratio) {
        10.0
    } else if (0.02..0.05).contains(&ratio) {
        7.0
    } else if ratio > 0.2 {
        8.0
    } else {
        5.0
    }
}

fn notes(docstrings: f64, comments: f64) -> String {
    let docstrings = match docstrings {
        s if s >= 8.0 => "Excellent docstrings",
        s if s >= 6.0 => "Good docstrings",
        s if s >= 4.0 => "Missing some docstrings",
        _ => "Lacks proper docstrings",
    };
    let comments = if comments >= 7.0 {
        "appropriate inline comments"
    } else {
        "could use more inline comments"
    };
    format!("{docstrings}, {comments}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_well_documented_code() {
        let code = r#"
def calculate_average(numbers):
    """Calculate the arithmetic mean of a list of numbers, returning zero for empty input."""
    if not numbers:
        return 0  # avoid division by zero
    return sum(numbers) / len(numbers)
"#;
        let analysis = DocumentationAnalyzer.analyze(code).await.unwrap();
        assert_eq!(analysis.score, 10.0);
        assert_eq!(analysis.notes, "Excellent docstrings, appropriate inline comments");
    }

    #[tokio::test]
    async fn test_undocumented_function() {
        let analysis = DocumentationAnalyzer
            .analyze("def add(a, b):\n    return a + b\n")
            .await
            .unwrap();
        assert_eq!(analysis.score, 3.6);
        assert_eq!(analysis.notes, "Lacks proper docstrings, could use more inline comments");
    }

    #[tokio::test]
    async fn test_script_without_definitions() {
        let analysis = DocumentationAnalyzer.analyze("total = 1 + 2\n").await.unwrap();
        assert_eq!(analysis.score, 6.4);
        assert_eq!(analysis.details.unwrap()["documented_ratio"], serde_json::Value::Null);
    }

    #[test]
    fn rust_doc_comments_count_as_docstrings() {
        let code = "/// Returns the larger of two values.\npub fn max(a: i32, b: i32) -> i32 {\n    if a > b { a } else { b }\n}\n";
        let (score, ratio) = docstring_score(&Source::parse(code));
        assert_eq!(score, 8.5);
        assert_eq!(ratio, Some(0.7));
    }

    #[tokio::test]
    async fn test_syntax_error_code() {
        let analysis = DocumentationAnalyzer.analyze("class Broken(:\n    pass").await.unwrap();
        assert_eq!(analysis.score, 0.0);
    }
}
