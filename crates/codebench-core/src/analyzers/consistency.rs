use std::sync::LazyLock;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;

use super::source::{round1, syntax_error, Source};
use crate::analyzer::{Analysis, MetricAnalyzer};
use crate::types::metrics;

static SNAKE_CASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("valid snake_case regex"));
static CAMEL_CASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-zA-Z0-9]*$").expect("valid camelCase regex"));

/// Scores how uniformly names and formatting follow one convention.
pub struct ConsistencyAnalyzer;

#[async_trait]
impl MetricAnalyzer for ConsistencyAnalyzer {
    fn metric(&self) -> &'static str {
        metrics::CONSISTENCY
    }

    async fn analyze(&self, code: &str) -> Result<Analysis> {
        let source = Source::parse(code);
        if !source.has_balanced_delimiters() {
            return Ok(syntax_error());
        }

        let naming = naming_consistency(&source);
        let style = style_consistency(&source);
        let score = round1(naming * 0.6 + style * 0.4);

        Ok(Analysis::new(score, notes(naming, style)))
    }
}

fn naming_consistency(source: &Source<'_>) -> f64 {
    let mut snake = 0usize;
    let mut camel = 0usize;
    let mut other = 0usize;

    let names = source
        .declared_names()
        .into_iter()
        .chain(source.function_names());
    for name in names {
        if SNAKE_CASE.is_match(&name) {
            snake += 1;
        } else if CAMEL_CASE.is_match(&name) {
            camel += 1;
        } else {
            other += 1;
        }
    }

    let total = snake + camel + other;
    if total == 0 {
        return 5.0;
    }
    let ratio = snake.max(camel) as f64 / total as f64;
    if ratio >= 0.9 {
        10.0
    } else if ratio >= 0.8 {
        8.0
    } else if ratio >= 0.7 {
        6.0
    } else {
        4.0
    }
}

fn style_consistency(source: &Source<'_>) -> f64 {
    let mut score = 10.0;
    if source.mixed_indentation() {
        score -= 3.0;
    }

    let text = source.text();
    let single = text.matches('\'').count();
    let double = text.matches('"').count();
    let total = single + double;
    if total > 0 && (single.max(double) as f64 / total as f64) < 0.8 {
        score -= 1.0;
    }
    f64::max(0.0, score)
}

fn notes(naming: f64, style: f64) -> String {
    let naming = match naming {
        s if s >= 8.0 => "Consistent naming conventions",
        s if s >= 6.0 => "Mostly consistent naming",
        _ => "Inconsistent naming conventions",
    };
    let style = if style >= 8.0 {
        "uniform code style"
    } else {
        "style inconsistencies found"
    };
    format!("{naming}, {style}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_consistent_snake_case() {
        let code = "def my_function():\n    my_variable = 10\n    another_variable = 20\n    return my_variable + another_variable\n";
        let analysis = ConsistencyAnalyzer.analyze(code).await.unwrap();
        assert_eq!(analysis.score, 10.0);
        assert_eq!(analysis.notes, "Consistent naming conventions, uniform code style");
    }

    #[tokio::test]
    async fn test_mixed_naming_styles() {
        let code = "def myFunction():\n    my_variable = 1\n    otherValue = 2\n    ThirdThing = 3\n    return my_variable\n";
        let analysis = ConsistencyAnalyzer.analyze(code).await.unwrap();
        assert!(analysis.score < 8.0, "score {}", analysis.score);
        assert!(analysis.notes.starts_with("Inconsistent naming"));
    }

    #[tokio::test]
    async fn test_mixed_indentation_and_quotes() {
        let code = "def run():\n\tfirst = 'a'\n    second = \"b\"\n";
        let analysis = ConsistencyAnalyzer.analyze(code).await.unwrap();
        assert!(analysis.notes.ends_with("style inconsistencies found"));
        assert_eq!(style_consistency(&Source::parse(code)), 6.0);
    }

    #[tokio::test]
    async fn test_syntax_error_code() {
        let analysis = ConsistencyAnalyzer.analyze("x = (1, 2").await.unwrap();
        assert_eq!(analysis.score, 0.0);
    }
}
