use anyhow::Result;
use async_trait::async_trait;

use super::source::{round1, syntax_error, Source};
use crate::analyzer::{Analysis, MetricAnalyzer};
use crate::types::metrics;

const ALLOWED_SHORT_NAMES: [&str; 6] = ["i", "j", "k", "x", "y", "n"];
const PLACEHOLDER_NAMES: [&str; 6] = ["temp", "tmp", "var", "data", "foo", "bar"];

/// Scores naming, structure and comment density.
pub struct ReadabilityAnalyzer;

#[async_trait]
impl MetricAnalyzer for ReadabilityAnalyzer {
    fn metric(&self) -> &'static str {
        metrics::READABILITY
    }

    async fn analyze(&self, code: &str) -> Result<Analysis> {
        let source = Source::parse(code);
        if !source.has_balanced_delimiters() {
            return Ok(syntax_error());
        }

        let naming = naming_score(&source);
        let structure = structure_score(&source);
        let comments = comment_score(&source);
        let score = round1(naming * 0.4 + structure * 0.4 + comments * 0.2);

        Ok(Analysis::new(score, notes(naming, structure, comments)))
    }
}

fn naming_score(source: &Source<'_>) -> f64 {
    let mut score = 10.0;
    for name in source.declared_names() {
        if name.chars().count() == 1 && !ALLOWED_SHORT_NAMES.contains(&name.as_str()) {
            score -= 0.5;
        }
        if PLACEHOLDER_NAMES.contains(&name.as_str()) {
            score -= 0.3;
        }
    }
    f64::max(0.0, score)
}

fn structure_score(source: &Source<'_>) -> f64 {
    let mut score = 10.0;
    for function in source.functions() {
        match source.body_len(&function) {
            len if len > 50 => score -= 2.0,
            len if len > 30 => score -= 1.0,
            _ => {}
        }
    }
    match source.nesting().max_depth {
        depth if depth > 4 => score -= 2.0,
        depth if depth > 3 => score -= 1.0,
        _ => {}
    }
    f64::max(0.0, score)
}

fn comment_score(source: &Source<'_>) -> f64 {
    let code_lines = source.code_line_count();
    if code_lines == 0 {
        return 5.0;
    }
    let ratio = source.comment_line_count() as f64 / code_lines as f64;
    if (0.1..=0.3).contains(&ratio) {
        10.0
    } else if (0.05..0.1).contains(&ratio) {
        7.0
    } else if ratio > 0.3 {
        // heavy commenting clutters
        8.0
    } else {
        5.0
    }
}

fn notes(naming: f64, structure: f64, comments: f64) -> String {
    let naming = match naming {
        s if s >= 8.0 => "Clear variable names",
        s if s >= 6.0 => "Variable names could be more descriptive",
        _ => "Poor variable naming",
    };
    let structure = match structure {
        s if s >= 8.0 => "well-structured",
        s if s >= 6.0 => "structure needs improvement",
        _ => "poorly structured",
    };
    let comments = match comments {
        s if s >= 8.0 => "appropriate comments",
        s if s >= 6.0 => "could use more comments",
        _ => "lacks sufficient comments",
    };
    format!("{naming}, {structure}, {comments}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_well_written_code() {
        let code = r#"
def calculate_average(numbers):
    """Calculate the average of a list of numbers."""
    # Check for empty list
    if not numbers:
        return 0
    # Calculate sum and divide by count
    return sum(numbers) / len(numbers)
"#;
        let analysis = ReadabilityAnalyzer.analyze(code).await.unwrap();
        assert!(analysis.score > 7.0, "score {}", analysis.score);
        assert!(analysis.notes.starts_with("Clear variable names"));
    }

    #[tokio::test]
    async fn test_poorly_named_code_scores_lower() {
        let good = ReadabilityAnalyzer
            .analyze("def add_numbers(first, second):\n    total = first + second\n    return total\n")
            .await
            .unwrap();
        let poor = ReadabilityAnalyzer
            .analyze("def f(x):\n a=1\n b=2\n tmp=a+b\n return tmp\n")
            .await
            .unwrap();
        assert!(poor.score < good.score, "{} !< {}", poor.score, good.score);
    }

    #[tokio::test]
    async fn test_deep_nesting_penalized() {
        let code = "def walk(grid):\n    for row in grid:\n        for cell in row:\n            if cell:\n                while cell > 0:\n                    if cell % 2:\n                        cell -= 1\n";
        let analysis = ReadabilityAnalyzer.analyze(code).await.unwrap();
        assert_eq!(structure_score(&Source::parse(code)), 8.0);
        assert_eq!(analysis.score, 8.2);
    }

    #[tokio::test]
    async fn test_syntax_error_code() {
        let analysis = ReadabilityAnalyzer.analyze("def broken(\n    pass").await.unwrap();
        assert_eq!(analysis.score, 0.0);
        assert!(analysis.notes.to_lowercase().contains("syntax error"));
    }
}
