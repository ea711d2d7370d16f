use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use super::source::Source;
use crate::analyzer::{Analysis, MetricAnalyzer};
use crate::types::metrics;

/// Modules treated as part of a language's standard library.
const STANDARD_LIBRARY: &[&str] = &[
    // python
    "os", "sys", "math", "random", "datetime", "time", "json", "csv", "re", "collections",
    "itertools", "functools", "typing", "pathlib", "unittest", "logging", "argparse",
    "subprocess", "threading", "multiprocessing", "io", "shutil", "tempfile", "glob", "pickle",
    "copy", "string", "textwrap", "abc", "contextlib", "warnings", "weakref", "ast", "dis",
    "inspect", "heapq", "bisect", "dataclasses", "enum", "statistics", "operator",
    // rust
    "std", "core", "alloc",
    // node
    "fs", "path", "http", "https", "crypto", "util", "events", "stream", "child_process", "url",
    "assert", "buffer", "net", "readline", "zlib",
];

/// Counts imports that reach outside the standard library.
pub struct DependencyAnalyzer;

#[async_trait]
impl MetricAnalyzer for DependencyAnalyzer {
    fn metric(&self) -> &'static str {
        metrics::EXTERNAL_DEPENDENCIES
    }

    async fn analyze(&self, code: &str) -> Result<Analysis> {
        let source = Source::parse(code);
        if !source.has_balanced_delimiters() {
            return Ok(Analysis::new(0.0, "Code has syntax errors")
                .with_details(json!({ "dependencies_count": 0 })));
        }

        let imports = source.imports();
        let external: Vec<&String> = imports.iter().filter(|m| !is_standard(m)).collect();
        let count = external.len();

        Ok(Analysis::new(score(count), notes(count, imports.len()))
            .with_details(json!({
                "dependencies_count": count,
                "dependencies": external,
            })))
    }
}

fn is_standard(module: &str) -> bool {
    // C/C++ system headers arrive as `<name>`
    module.starts_with('<') || STANDARD_LIBRARY.contains(&module)
}

fn score(external: usize) -> f64 {
    match external {
        0 => 10.0,
        1 => 9.0,
        2 => 8.0,
        3 => 7.0,
        4 | 5 => 6.0,
        n => f64::max(3.0, 10.0 - n as f64),
    }
}

fn notes(external: usize, total: usize) -> String {
    match external {
        0 if total == 0 => "No external dependencies".to_string(),
        0 => "Uses only standard library".to_string(),
        1 => "Minimal external dependencies".to_string(),
        2 | 3 => "Few external dependencies".to_string(),
        n => format!("Many external dependencies ({n})"),
    }
}
