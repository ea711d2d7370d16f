use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use super::source::{LineKind, Source};
use crate::analyzer::{Analysis, MetricAnalyzer};
use crate::types::metrics;

/// Estimates time complexity from loop nesting, recursion and a few
/// well-known algorithm markers.
pub struct ComplexityAnalyzer;

#[async_trait]
impl MetricAnalyzer for ComplexityAnalyzer {
    fn metric(&self) -> &'static str {
        metrics::TIME_COMPLEXITY
    }

    async fn analyze(&self, code: &str) -> Result<Analysis> {
        let source = Source::parse(code);
        if !source.has_balanced_delimiters() {
            return Ok(Analysis::new(0.0, "Code has syntax errors")
                .with_details(json!({ "detected_complexity": "Unknown" })));
        }

        let complexity = detect(&source)?;
        Ok(Analysis::new(score(complexity), notes(complexity))
            .with_details(json!({ "detected_complexity": complexity })))
    }
}

fn detect(source: &Source<'_>) -> Result<&'static str> {
    let lowered = source.text().to_lowercase();
    let has_sorting = lowered.contains("sort");
    let has_binary_search = lowered.contains("binary") && lowered.contains("search");

    if has_recursion(source)? {
        return Ok(if lowered.contains("fibonacci") {
            "O(2^n)"
        } else if has_binary_search || lowered.contains("divide") {
            "O(log n)"
        } else {
            "O(n)"
        });
    }

    Ok(match source.nesting().max_loop_depth {
        0 => "O(1)",
        1 if has_sorting => "O(n log n)",
        1 => "O(n)",
        2 => "O(n²)",
        _ => "O(n³)",
    })
}

fn has_recursion(source: &Source<'_>) -> Result<bool> {
    for function in source.functions() {
        let call = Regex::new(&format!(r"\b{}\s*\(", regex::escape(&function.name)))?;
        let recursive = source
            .body(&function)
            .filter(|line| line.kind == LineKind::Code)
            .any(|line| call.is_match(&line.code));
        if recursive {
            return Ok(true);
        }
    }
    Ok(false)
}

fn score(complexity: &str) -> f64 {
    match complexity {
        "O(1)" => 10.0,
        "O(log n)" => 9.5,
        "O(n)" => 9.0,
        "O(n log n)" => 8.0,
        "O(n²)" => 6.5,
        "O(n³)" => 4.0,
        "O(2^n)" => 2.0,
        _ => 5.0,
    }
}

fn notes(complexity: &str) -> &'static str {
    match complexity {
        "O(1)" => "Constant time - excellent efficiency",
        "O(log n)" => "Logarithmic time - very efficient",
        "O(n)" => "Linear time - good efficiency",
        "O(n log n)" => "Linearithmic time - efficient for sorting",
        "O(n²)" => "Quadratic time - acceptable for small inputs",
        "O(n³)" => "Cubic time - inefficient for large inputs",
        "O(2^n)" => "Exponential time - very inefficient",
        _ => "Could not determine complexity",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn detected(code: &str) -> (f64, String) {
        let analysis = ComplexityAnalyzer.analyze(code).await.unwrap();
        let class = analysis.details.unwrap()["detected_complexity"]
            .as_str()
            .unwrap()
            .to_string();
        (analysis.score, class)
    }

    #[tokio::test]
    async fn test_constant_time() {
        assert_eq!(detected("def first(items):\n    return items[0]\n").await, (10.0, "O(1)".into()));
    }

    #[tokio::test]
    async fn test_linear_and_sorting() {
        let linear = "def total(items):\n    acc = 0\n    for item in items:\n        acc += item\n    return acc\n";
        assert_eq!(detected(linear).await, (9.0, "O(n)".into()));

        let sorting = "def ranked(items):\n    out = []\n    for item in sorted(items):\n        out.append(item)\n    return out\n";
        assert_eq!(detected(sorting).await, (8.0, "O(n log n)".into()));
    }

    #[tokio::test]
    async fn test_nested_loops() {
        let code = "fn pairs(v: &[i32]) -> usize {\n    let mut count = 0;\n    for a in v {\n        for b in v {\n            if a < b {\n                count += 1;\n            }\n        }\n    }\n    count\n}\n";
        assert_eq!(detected(code).await, (6.5, "O(n²)".into()));
    }

    #[tokio::test]
    async fn test_recursive_fibonacci() {
        let code = "def fibonacci(n):\n    if n < 2:\n        return n\n    return fibonacci(n - 1) + fibonacci(n - 2)\n";
        assert_eq!(detected(code).await, (2.0, "O(2^n)".into()));
    }

    #[tokio::test]
    async fn test_syntax_error_code() {
        assert_eq!(detected("for x in [1, 2:\n    pass").await, (0.0, "Unknown".into()));
    }
}
