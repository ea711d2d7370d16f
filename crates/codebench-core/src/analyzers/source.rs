//! Line-oriented scanning shared by the built-in analyzers.
//!
//! Nothing here parses a real grammar. Blocks are recovered from indentation,
//! which holds for Python and for conventionally formatted brace languages.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

const TAB_WIDTH: usize = 4;

static FUNCTION_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:pub(?:\([^)]*\))?\s+)?(?:(?:async|static|export|public|private|protected|const|unsafe)\s+)*(?:def|fn|function|func)\s+([A-Za-z_]\w*)\s*(?:<[^>]*>)?\s*\(([^)]*)",
    )
    .expect("valid function regex")
});

static TYPE_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:pub(?:\([^)]*\))?\s+)?(?:export\s+)?(?:class|struct|enum|trait|interface)\s+([A-Za-z_]\w*)")
        .expect("valid type regex")
});

static BINDING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:let|var|const)\s+(?:mut\s+)?([A-Za-z_]\w*)").expect("valid binding regex")
});

static ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_]\w*)\s*(?::[^=]+)?=[^=]").expect("valid assignment regex")
});

static LOOP_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bfor\s*\(?\s*(?:(?:let|var|const|int|auto)\s+)?([A-Za-z_]\w*)\s+(?:in|of)\b")
        .expect("valid loop regex")
});

static PY_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^import\s+([\w.]+(?:\s+as\s+\w+)?(?:\s*,\s*[\w.]+(?:\s+as\s+\w+)?)*)\s*;?$")
        .expect("valid import regex")
});

static PY_FROM_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^from\s+([\w.]+)\s+import\b").expect("valid from-import regex"));

static RUST_USE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:pub\s+)?(?:use\s+(?:::)?|extern\s+crate\s+)(\w+)").expect("valid use regex")
});

static JS_MODULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:\bfrom\s+|\brequire\(\s*|^import\s+)["']([^"']+)["']"#).expect("valid module regex")
});

static C_INCLUDE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\s*include\s*<([^>]+)>").expect("valid include regex"));

const CONTROL_KEYWORDS: [&str; 13] = [
    "if", "elif", "else", "for", "while", "with", "try", "except", "catch", "match", "loop",
    "switch", "finally",
];

const LOOP_KEYWORDS: [&str; 3] = ["for", "while", "loop"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineKind {
    Blank,
    Comment,
    /// Inside a triple-quoted string; counted as code, skipped by structure scans.
    Docstring,
    Code,
}

#[derive(Debug, Clone)]
pub(crate) struct Line<'a> {
    pub raw: &'a str,
    /// Code with string literals blanked and any trailing comment removed.
    pub code: String,
    pub indent: usize,
    pub kind: LineKind,
    pub has_inline_comment: bool,
}

impl Line<'_> {
    pub fn is_code(&self) -> bool {
        matches!(self.kind, LineKind::Code | LineKind::Docstring)
    }

    fn is_structural(&self) -> bool {
        self.kind == LineKind::Code && !self.code.trim().is_empty()
    }

    /// Trimmed code with leading closing braces removed (`} else {` → `else {`).
    fn statement(&self) -> &str {
        self.code.trim().trim_start_matches(['}', ')']).trim_start()
    }
}

/// A function or type definition and the lines of its body.
#[derive(Debug, Clone)]
pub(crate) struct Block {
    pub name: String,
    pub params: Vec<String>,
    pub line: usize,
    /// Index one past the last body line.
    pub end: usize,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Nesting {
    pub max_depth: usize,
    pub max_loop_depth: usize,
    /// Per line: number of enclosing loops (not counting a loop header itself).
    pub loop_depth_at: Vec<usize>,
}

#[derive(Debug)]
pub(crate) struct Source<'a> {
    text: &'a str,
    pub lines: Vec<Line<'a>>,
}

impl<'a> Source<'a> {
    pub fn parse(text: &'a str) -> Self {
        let mut lines = Vec::new();
        let mut in_triple = false;

        for raw in text.lines() {
            let trimmed = raw.trim();
            let triple_count = trimmed.matches("\"\"\"").count() + trimmed.matches("'''").count();
            let indent = indent_width(raw);

            let kind = if in_triple {
                LineKind::Docstring
            } else if trimmed.is_empty() {
                LineKind::Blank
            } else if trimmed.starts_with("\"\"\"") || trimmed.starts_with("'''") {
                LineKind::Docstring
            } else if is_comment(trimmed) {
                LineKind::Comment
            } else {
                LineKind::Code
            };

            if triple_count % 2 == 1 {
                in_triple = !in_triple;
            }

            let (code, has_inline_comment) = if kind == LineKind::Code {
                strip_literals(trimmed)
            } else {
                (String::new(), false)
            };

            lines.push(Line {
                raw,
                code,
                indent,
                kind,
                has_inline_comment,
            });
        }

        Self { text, lines }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn code_line_count(&self) -> usize {
        self.lines.iter().filter(|l| l.is_code()).count()
    }

    pub fn comment_line_count(&self) -> usize {
        self.lines.iter().filter(|l| l.kind == LineKind::Comment).count()
    }

    pub fn inline_comment_count(&self) -> usize {
        self.lines.iter().filter(|l| l.has_inline_comment).count()
    }

    /// False when brackets do not pair up outside strings and comments.
    pub fn has_balanced_delimiters(&self) -> bool {
        let mut stack = Vec::new();
        for line in self.lines.iter().filter(|l| l.kind == LineKind::Code) {
            for c in line.code.chars() {
                match c {
                    '(' | '[' | '{' => stack.push(c),
                    ')' | ']' | '}' => {
                        let open = match c {
                            ')' => '(',
                            ']' => '[',
                            _ => '{',
                        };
                        if stack.pop() != Some(open) {
                            return false;
                        }
                    }
                    _ => {}
                }
            }
        }
        stack.is_empty()
    }

    pub fn functions(&self) -> Vec<Block> {
        self.blocks(&FUNCTION_DEF)
    }

    pub fn types(&self) -> Vec<Block> {
        self.blocks(&TYPE_DEF)
    }

    fn blocks(&self, pattern: &Regex) -> Vec<Block> {
        let mut blocks = Vec::new();
        for (idx, line) in self.lines.iter().enumerate() {
            if !line.is_structural() {
                continue;
            }
            let Some(caps) = pattern.captures(line.code.trim()) else {
                continue;
            };
            let name = caps[1].to_string();
            let params = caps
                .get(2)
                .map(|m| parse_params(m.as_str()))
                .unwrap_or_default();
            let end = self.block_end(idx);
            blocks.push(Block {
                name,
                params,
                line: idx,
                end,
            });
        }
        blocks
    }

    fn block_end(&self, start: usize) -> usize {
        let indent = self.lines[start].indent;
        let mut end = start + 1;
        for (idx, line) in self.lines.iter().enumerate().skip(start + 1) {
            if line.kind == LineKind::Blank {
                continue;
            }
            if line.indent <= indent && line.kind != LineKind::Docstring {
                break;
            }
            end = idx + 1;
        }
        end
    }

    /// Non-blank lines of a block body, excluding the definition line.
    pub fn body<'s>(&'s self, block: &Block) -> impl Iterator<Item = &'s Line<'a>> + 's {
        self.lines[block.line + 1..block.end]
            .iter()
            .filter(|l| l.kind != LineKind::Blank)
    }

    pub fn body_len(&self, block: &Block) -> usize {
        self.body(block).filter(|l| l.is_code()).count()
    }

    /// The docstring or doc comment attached to a definition, markers removed.
    pub fn doc_for(&self, block: &Block) -> Option<String> {
        // Python style: first body line opens a triple-quoted string.
        if let Some(first) = self.lines[block.line + 1..block.end]
            .iter()
            .find(|l| l.kind != LineKind::Blank)
        {
            if first.kind == LineKind::Docstring {
                let text: Vec<&str> = self.lines[block.line + 1..block.end]
                    .iter()
                    .skip_while(|l| l.kind == LineKind::Blank)
                    .take_while(|l| l.kind == LineKind::Docstring)
                    .map(|l| l.raw.trim().trim_matches(['"', '\'']).trim())
                    .filter(|s| !s.is_empty())
                    .collect();
                return (!text.is_empty()).then(|| text.join(" "));
            }
        }

        // Comment style: contiguous comment lines right above the definition.
        let mut text = Vec::new();
        for line in self.lines[..block.line].iter().rev() {
            let trimmed = line.raw.trim();
            if line.kind == LineKind::Comment {
                text.push(
                    trimmed
                        .trim_start_matches(['/', '*', '!', '#'])
                        .trim_end_matches(['*', '/'])
                        .trim(),
                );
            } else if trimmed.starts_with("#[") || trimmed.starts_with('@') {
                // attributes and decorators sit between docs and the definition
                continue;
            } else {
                break;
            }
        }
        text.retain(|s| !s.is_empty());
        if text.is_empty() {
            return None;
        }
        text.reverse();
        Some(text.join(" "))
    }

    pub fn nesting(&self) -> Nesting {
        let mut stack: Vec<(usize, bool)> = Vec::new();
        let mut nesting = Nesting {
            loop_depth_at: vec![0; self.lines.len()],
            ..Nesting::default()
        };

        for (idx, line) in self.lines.iter().enumerate() {
            if !line.is_structural() {
                nesting.loop_depth_at[idx] = stack.iter().filter(|(_, is_loop)| *is_loop).count();
                continue;
            }
            while stack.last().is_some_and(|(indent, _)| *indent >= line.indent) {
                stack.pop();
            }
            nesting.loop_depth_at[idx] = stack.iter().filter(|(_, is_loop)| *is_loop).count();

            let keyword = leading_word(line.statement());
            if CONTROL_KEYWORDS.contains(&keyword) {
                stack.push((line.indent, LOOP_KEYWORDS.contains(&keyword)));
                let loops = stack.iter().filter(|(_, is_loop)| *is_loop).count();
                nesting.max_depth = nesting.max_depth.max(stack.len());
                nesting.max_loop_depth = nesting.max_loop_depth.max(loops);
            }
        }
        nesting
    }

    /// Names introduced by bindings, assignments, loops and parameters.
    pub fn declared_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for line in self.lines.iter().filter(|l| l.is_structural()) {
            let code = line.code.trim();
            names.extend(BINDING.captures_iter(code).map(|c| c[1].to_string()));
            names.extend(LOOP_VAR.captures_iter(code).map(|c| c[1].to_string()));
            if let Some(caps) = ASSIGNMENT.captures(code) {
                if !is_keyword(&caps[1]) {
                    names.push(caps[1].to_string());
                }
            }
        }
        for block in self.functions() {
            names.extend(block.params);
        }
        names
    }

    pub fn function_names(&self) -> Vec<String> {
        self.functions().into_iter().map(|b| b.name).collect()
    }

    /// Base names of imported modules, relative imports excluded.
    pub fn imports(&self) -> BTreeSet<String> {
        let mut modules = BTreeSet::new();
        for line in self.lines.iter().filter(|l| l.kind == LineKind::Code) {
            let raw = line.raw.trim();
            if let Some(caps) = C_INCLUDE.captures(raw) {
                modules.insert(format!("<{}>", &caps[1]));
                continue;
            }
            if let Some(caps) = JS_MODULE.captures(raw) {
                let specifier = &caps[1];
                if !specifier.starts_with('.') && !specifier.starts_with('/') {
                    modules.insert(js_package(specifier));
                }
                continue;
            }
            let code = line.code.trim();
            if let Some(caps) = PY_IMPORT.captures(code) {
                for part in caps[1].split(',') {
                    let module = part.split_whitespace().next().unwrap_or_default();
                    if let Some(base) = module.split('.').next().filter(|b| !b.is_empty()) {
                        modules.insert(base.to_string());
                    }
                }
            } else if let Some(caps) = PY_FROM_IMPORT.captures(code) {
                if let Some(base) = caps[1].split('.').next().filter(|b| !b.is_empty()) {
                    modules.insert(base.to_string());
                }
            } else if let Some(caps) = RUST_USE.captures(code) {
                let base = &caps[1];
                if !matches!(base, "crate" | "self" | "super") {
                    modules.insert(base.to_string());
                }
            }
        }
        modules
    }

    /// Whether any line is indented with tabs and any other with spaces.
    pub fn mixed_indentation(&self) -> bool {
        let mut tabs = false;
        let mut spaces = false;
        for line in self.lines.iter().filter(|l| l.kind != LineKind::Blank) {
            match line.raw.chars().next() {
                Some('\t') => tabs = true,
                Some(' ') => spaces = true,
                _ => {}
            }
        }
        tabs && spaces
    }
}

/// Result reported by every analyzer when the code does not even scan.
pub(crate) fn syntax_error() -> crate::analyzer::Analysis {
    crate::analyzer::Analysis::new(0.0, "Code has syntax errors")
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub(crate) fn is_keyword(word: &str) -> bool {
    matches!(
        word,
        "if" | "else" | "elif" | "for" | "while" | "return" | "def" | "fn" | "let" | "var"
            | "const" | "in" | "not" | "and" | "or" | "self" | "this" | "true" | "false"
            | "None" | "True" | "False" | "match" | "loop" | "pass" | "import" | "from"
    )
}

fn is_comment(trimmed: &str) -> bool {
    if trimmed.starts_with("//")
        || trimmed.starts_with("/*")
        || trimmed.starts_with("* ")
        || trimmed.starts_with("*/")
        || trimmed == "*"
    {
        return true;
    }
    trimmed.starts_with('#')
        && !trimmed.starts_with("#[")
        && !trimmed.starts_with("#!")
        && !trimmed.starts_with("#include")
        && !trimmed.starts_with("#define")
}

fn indent_width(raw: &str) -> usize {
    raw.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum()
}

fn leading_word(s: &str) -> &str {
    let end = s
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(s.len());
    &s[..end]
}

fn parse_params(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|p| {
            let p = p.split([':', '=']).next().unwrap_or_default().trim();
            let name = p
                .split_whitespace()
                .last()
                .unwrap_or_default()
                .trim_start_matches(['*', '&']);
            (!name.is_empty()
                && !matches!(name, "self" | "cls" | "this" | "mut" | "...")
                && name.chars().all(|c| c.is_alphanumeric() || c == '_'))
            .then(|| name.to_string())
        })
        .collect()
}

fn js_package(specifier: &str) -> String {
    let specifier = specifier.strip_prefix("node:").unwrap_or(specifier);
    let mut parts = specifier.split('/');
    match parts.next() {
        Some(scope) if scope.starts_with('@') => match parts.next() {
            Some(name) => format!("{scope}/{name}"),
            None => scope.to_string(),
        },
        Some(name) => name.to_string(),
        None => String::new(),
    }
}

/// Blanks string and char literals and cuts a trailing comment.
///
/// A `'` followed by an identifier and no closing quote is read as a Rust
/// lifetime, not a string.
fn strip_literals(line: &str) -> (String, bool) {
    let chars: Vec<char> = line.chars().collect();
    let mut out = String::with_capacity(line.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                match find_closing(&chars, i + 1, '"') {
                    Some(close) => {
                        out.push_str("\"\"");
                        i = close + 1;
                    }
                    // string continues on the next line
                    None => return (out, false),
                }
            }
            '\'' => {
                let ident_end = chars[i + 1..]
                    .iter()
                    .position(|ch| !(ch.is_alphanumeric() || *ch == '_'))
                    .map_or(chars.len(), |p| i + 1 + p);
                if ident_end > i + 1 && chars.get(ident_end) != Some(&'\'') {
                    out.extend(&chars[i..ident_end]);
                    i = ident_end;
                } else if let Some(close) = find_closing(&chars, i + 1, '\'') {
                    out.push_str("''");
                    i = close + 1;
                } else {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                return (out.trim_end().to_string(), true);
            }
            '#' if i > 0
                && chars[i - 1].is_whitespace()
                && !matches!(chars.get(i + 1), Some('[') | Some('!') | Some('{')) =>
            {
                return (out.trim_end().to_string(), true);
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    (out, false)
}

fn find_closing(chars: &[char], from: usize, quote: char) -> Option<usize> {
    let mut i = from;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            ch if ch == quote => return Some(i),
            _ => i += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_strings_and_trailing_comments() {
        assert_eq!(strip_literals(r#"x = "a (b" + y  # note"#), (r#"x = "" + y"#.to_string(), true));
        assert_eq!(strip_literals("let c = '(';"), ("let c = '';".to_string(), false));
        assert_eq!(
            strip_literals("fn f<'a>(x: &'a str) -> &'a str {"),
            ("fn f<'a>(x: &'a str) -> &'a str {".to_string(), false)
        );
    }

    #[test]
    fn detects_unbalanced_delimiters() {
        assert!(Source::parse("def ok(a):\n    return [a, (a + 1)]\n").has_balanced_delimiters());
        assert!(!Source::parse("def broken(\n    pass").has_balanced_delimiters());
        assert!(Source::parse("fn f<'a>(x: &'a str) -> &'a str {\n    x\n}\n").has_balanced_delimiters());
    }

    #[test]
    fn finds_python_functions_and_docstrings() {
        let code = "def add(a, b):\n    \"\"\"Add two numbers together.\"\"\"\n    return a + b\n\ndef bare():\n    pass\n";
        let source = Source::parse(code);
        let functions = source.functions();
        assert_eq!(functions.len(), 2);
        assert_eq!(functions[0].name, "add");
        assert_eq!(functions[0].params, vec!["a", "b"]);
        assert_eq!(source.doc_for(&functions[0]).as_deref(), Some("Add two numbers together."));
        assert_eq!(source.doc_for(&functions[1]), None);
    }

    #[test]
    fn finds_rust_doc_comments_above_functions() {
        let code = "/// Returns the larger value.\n#[inline]\npub fn max(a: i32, mut b: i32) -> i32 {\n    if a > b { a } else { b }\n}\n";
        let source = Source::parse(code);
        let functions = source.functions();
        assert_eq!(functions[0].params, vec!["a", "b"]);
        assert_eq!(source.doc_for(&functions[0]).as_deref(), Some("Returns the larger value."));
    }

    #[test]
    fn measures_loop_nesting_by_indentation() {
        let code = "def f(items):\n    for a in items:\n        for b in items:\n            if a == b:\n                print(a)\n";
        let nesting = Source::parse(code).nesting();
        assert_eq!(nesting.max_loop_depth, 2);
        assert_eq!(nesting.max_depth, 3);
    }

    #[test]
    fn else_branch_does_not_deepen_nesting() {
        let code = "fn f(x: i32) {\n    if x > 0 {\n        a();\n    } else {\n        b();\n    }\n}\n";
        assert_eq!(Source::parse(code).nesting().max_depth, 1);
    }

    #[test]
    fn collects_imports_across_languages() {
        let code = "import os, numpy as np\nfrom requests.adapters import HTTPAdapter\nfrom . import sibling\n";
        let imports = Source::parse(code).imports();
        assert_eq!(imports.into_iter().collect::<Vec<_>>(), vec!["numpy", "os", "requests"]);

        let code = "use std::collections::HashMap;\nuse serde::Deserialize;\nuse crate::types;\n";
        let imports = Source::parse(code).imports();
        assert_eq!(imports.into_iter().collect::<Vec<_>>(), vec!["serde", "std"]);

        let code = "import React from 'react';\nconst fs = require('node:fs');\nimport x from './local';\nimport { a } from '@scope/pkg/sub';\n";
        let imports = Source::parse(code).imports();
        assert_eq!(
            imports.into_iter().collect::<Vec<_>>(),
            vec!["@scope/pkg", "fs", "react"]
        );
    }

    #[test]
    fn declared_names_cover_bindings_loops_and_params() {
        let code = "def total(values, factor=2):\n    result = 0\n    for item in values:\n        result += item * factor\n    return result\n";
        let names = Source::parse(code).declared_names();
        for expected in ["values", "factor", "result", "item"] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}: {names:?}");
        }
    }
}
