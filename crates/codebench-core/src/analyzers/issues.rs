use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::source::{LineKind, Source};

static DIVISION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w)\]]\s*/\s*[\w(]").expect("valid division regex"));
static INDEXING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w)\]]\[").expect("valid indexing regex"));
static LIST_COMPREHENSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[[^\]]*\bfor\b[^\]]*\bin\b[^\]]*\]").expect("valid comprehension regex")
});
static MUTABLE_DEFAULT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[(,]\s*\w+\s*(?::\s*[^=,)]+)?=\s*[\[{]").expect("valid default-argument regex")
});
static PRINT_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bprint\s*\(|\bprintln!\s*\(|\bconsole\.log\s*\(").expect("valid print regex")
});
static BARE_EXCEPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^except\s*:").expect("valid except regex"));

static DANGEROUS_CALLS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\beval\s*\(", "Use of eval() is a security risk"),
        (r"\bexec\s*\(", "Use of exec() is a security risk"),
        (r"__import__\s*\(", "Dynamic imports may pose security risks"),
    ]
    .into_iter()
    .map(|(pattern, message)| (Regex::new(pattern).expect("valid security regex"), message))
    .collect()
});

const VALIDATION_KEYWORDS: [&str; 6] = ["if", "match", "assert", "guard", "unless", "raise"];

/// Potential problems found in one code sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueReport {
    pub issues: Vec<String>,
}

impl IssueReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// One paragraph suitable for a summary.
    pub fn text(&self) -> String {
        if self.issues.is_empty() {
            "No significant issues detected.".to_string()
        } else {
            self.issues.join(" • ")
        }
    }
}

/// Flags risky constructs in generated code. Unlike the metric analyzers it
/// produces no score; the summary shows its findings for the winning model.
#[derive(Debug, Clone, Copy, Default)]
pub struct IssuesAnalyzer;

impl IssuesAnalyzer {
    pub fn analyze(&self, code: &str) -> IssueReport {
        let source = Source::parse(code);
        if !source.has_balanced_delimiters() {
            return IssueReport {
                issues: vec!["Code contains syntax errors".to_string()],
            };
        }

        let mut issues = Vec::new();
        check_error_handling(&source, &mut issues);
        check_input_validation(&source, &mut issues);
        check_security(&source, &mut issues);
        check_performance(&source, &mut issues);
        check_practices(&source, &mut issues);
        IssueReport { issues }
    }
}

fn code_lines<'s>(source: &'s Source<'_>) -> impl Iterator<Item = &'s str> + 's {
    source
        .lines
        .iter()
        .filter(|l| l.kind == LineKind::Code)
        .map(|l| l.code.trim())
}

fn check_error_handling(source: &Source<'_>, issues: &mut Vec<String>) {
    let handles_errors = code_lines(source).any(|code| {
        code.starts_with("try")
            || code.contains("catch")
            || code.starts_with("except")
            || code.contains("Result<")
            || code.contains("?;")
    });
    if handles_errors {
        return;
    }

    let mut risky = Vec::new();
    if code_lines(source).any(|code| DIVISION.is_match(code)) {
        risky.push("division");
    }
    if code_lines(source).any(|code| INDEXING.is_match(code)) {
        risky.push("indexing");
    }
    if !risky.is_empty() {
        issues.push(format!("Missing error handling for {} operations", risky.join(", ")));
    }
}

fn check_input_validation(source: &Source<'_>, issues: &mut Vec<String>) {
    for function in source.functions() {
        if function.params.is_empty() {
            continue;
        }
        let validated = source
            .body(&function)
            .filter(|l| l.kind == LineKind::Code)
            .any(|l| {
                let code = l.code.trim().trim_start_matches('}').trim_start();
                VALIDATION_KEYWORDS.iter().any(|&kw| {
                    code.strip_prefix(kw)
                        .is_some_and(|rest| !rest.starts_with(|c: char| c.is_alphanumeric() || c == '_'))
                })
            });
        if !validated {
            issues.push(format!(
                "Function '{}' may not validate input parameters (None, empty values)",
                function.name
            ));
        }
    }
}

fn check_security(source: &Source<'_>, issues: &mut Vec<String>) {
    for (regex, message) in DANGEROUS_CALLS.iter() {
        if code_lines(source).any(|code| regex.is_match(code)) {
            issues.push(message.to_string());
        }
    }
}

fn check_performance(source: &Source<'_>, issues: &mut Vec<String>) {
    let nesting = source.nesting();
    if nesting.max_loop_depth >= 2 {
        issues.push(
            "Nested loops detected - consider algorithm optimization for large inputs".to_string(),
        );
    }

    let comprehension_in_loop = source.lines.iter().enumerate().any(|(idx, line)| {
        line.kind == LineKind::Code
            && nesting.loop_depth_at[idx] > 0
            && LIST_COMPREHENSION.is_match(&line.code)
    });
    if comprehension_in_loop {
        issues.push("List comprehension inside loop may impact performance".to_string());
    }
}

fn check_practices(source: &Source<'_>, issues: &mut Vec<String>) {
    if code_lines(source).any(|code| BARE_EXCEPT.is_match(code)) {
        issues.push("Bare except clause found - should catch specific exceptions".to_string());
    }

    let functions = source.functions();
    for function in &functions {
        if MUTABLE_DEFAULT.is_match(&source.lines[function.line].code) {
            issues.push(format!(
                "Function '{}' uses mutable default argument - may cause unexpected behavior",
                function.name
            ));
        }
    }

    for function in &functions {
        let prints = source
            .body(function)
            .filter(|l| l.kind == LineKind::Code)
            .any(|l| PRINT_CALL.is_match(&l.code));
        if prints {
            issues.push(format!(
                "Function '{}' contains print statements - consider using return values or logging",
                function.name
            ));
        }
    }
}
