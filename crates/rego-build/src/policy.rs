// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Structural scanning of policy modules.
//!
//! The scanner does not evaluate policies. It recovers the shape the build
//! pipeline needs: the package path, imports, rule heads, function calls,
//! `data.` references and `# METADATA` entrypoint annotations. Rule heads
//! are recognised at bracket depth zero only.

use std::fmt;

use thiserror::Error;

use crate::params::RegoVersion;

const KEYWORDS: &[&str] = &[
    "as", "contains", "default", "else", "every", "false", "if", "import", "in", "not", "null",
    "package", "some", "true", "with",
];

/// A syntax error located in a source file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{file}:{line}: rego_parse_error: {message}")]
pub struct ParseError {
    /// Source file path.
    pub file: String,
    /// One-based line number.
    pub line: usize,
    /// Error description.
    pub message: String,
}

impl ParseError {
    fn new(file: &str, line: usize, message: impl Into<String>) -> Self {
        Self {
            file: file.to_string(),
            line,
            message: message.into(),
        }
    }
}

/// An `import` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Imported path, e.g. `data.lib.util` or `future.keywords.if`.
    pub path: String,
    /// Name the import binds in the module, if any.
    pub alias: Option<String>,
    /// One-based line number.
    pub line: usize,
}

/// A rule head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleHead {
    /// Rule name relative to the package (may be a dotted ref).
    pub name: String,
    /// Whether the rule is a function.
    pub is_function: bool,
    /// Whether a metadata block marks the rule as an entrypoint.
    pub entrypoint: bool,
    /// One-based line number.
    pub line: usize,
}

/// A call expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Called name, e.g. `count` or `strings.count`.
    pub name: String,
    /// One-based line number.
    pub line: usize,
}

/// A scanned policy module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyModule {
    /// Path of the module within its bundle or source tree.
    pub path: String,
    /// Package path without the `data.` prefix.
    pub package: String,
    /// Import statements in source order.
    pub imports: Vec<Import>,
    /// Rule heads in source order.
    pub rules: Vec<RuleHead>,
    /// Call expressions in source order.
    pub calls: Vec<Call>,
    /// Referenced `data` paths without the `data.` prefix.
    pub data_refs: Vec<String>,
    /// Whether a metadata block marks the whole package as an entrypoint.
    pub package_entrypoint: bool,
    /// Dialect the module was scanned under.
    pub rego_version: RegoVersion,
    /// Module source text.
    pub source: String,
}

impl PolicyModule {
    /// Scan `source` as a module at `path` under the given dialect.
    pub fn parse(
        path: impl Into<String>,
        source: impl Into<String>,
        rego_version: RegoVersion,
    ) -> Result<Self, ParseError> {
        let path = path.into();
        let source = source.into();
        let scanned = Scanner::new(&path, rego_version).scan(&source)?;

        Ok(Self {
            path,
            package: scanned.package,
            imports: scanned.imports,
            rules: scanned.rules,
            calls: scanned.calls,
            data_refs: scanned.data_refs,
            package_entrypoint: scanned.package_entrypoint,
            rego_version,
            source,
        })
    }

    /// Fully qualified rule paths (`package.rule`), in source order.
    pub fn rule_paths(&self) -> impl Iterator<Item = String> + '_ {
        self.rules
            .iter()
            .map(move |rule| format!("{}.{}", self.package, rule.name))
    }

    /// Names of functions defined in this module.
    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .filter(|rule| rule.is_function)
            .map(|rule| rule.name.as_str())
    }

    /// Whether the module imports `rego.v1`.
    pub fn imports_rego_v1(&self) -> bool {
        self.imports.iter().any(|i| i.path == "rego.v1")
    }

    /// Future keywords imported by the module.
    pub fn future_keywords(&self) -> Vec<String> {
        let mut keywords = Vec::new();
        for import in &self.imports {
            if import.path == "future.keywords" {
                keywords.extend(["contains", "every", "if", "in"].map(String::from));
            } else if let Some(kw) = import.path.strip_prefix("future.keywords.") {
                keywords.push(kw.to_string());
            }
        }
        keywords
    }

    /// A copy with every single-line `print(...)` statement replaced by `true`.
    pub fn without_print_statements(&self) -> Self {
        let mut erased = Vec::new();
        let mut source = String::with_capacity(self.source.len());

        for (idx, line) in self.source.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.starts_with("print(") && trimmed.ends_with(')') {
                let indent = &line[..line.len() - line.trim_start().len()];
                source.push_str(indent);
                source.push_str("true");
                erased.push(idx + 1);
            } else {
                source.push_str(line);
            }
            source.push('\n');
        }

        let mut module = self.clone();
        module.source = source;
        module
            .calls
            .retain(|call| !(call.name == "print" && erased.contains(&call.line)));
        module
    }
}

impl fmt::Display for PolicyModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (package {})", self.path, self.package)
    }
}

// ============================================================================
// Scanner
// ============================================================================

#[derive(Default)]
struct Scanned {
    package: String,
    imports: Vec<Import>,
    rules: Vec<RuleHead>,
    calls: Vec<Call>,
    data_refs: Vec<String>,
    package_entrypoint: bool,
}

struct Scanner<'a> {
    file: &'a str,
    rego_version: RegoVersion,
    in_raw_string: bool,
}

impl<'a> Scanner<'a> {
    fn new(file: &'a str, rego_version: RegoVersion) -> Self {
        Self {
            file,
            rego_version,
            in_raw_string: false,
        }
    }

    fn scan(mut self, source: &str) -> Result<Scanned, ParseError> {
        let mut out = Scanned::default();
        let mut depth: i32 = 0;
        let mut seen_package = false;
        let mut in_metadata = false;
        let mut pending_entrypoint = false;
        let mut continued = false;

        for (idx, raw_line) in source.lines().enumerate() {
            let line_no = idx + 1;
            let starts_in_string = self.in_raw_string;
            let code = self.strip(raw_line);
            let trimmed = code.trim();

            if trimmed.is_empty() {
                let comment = raw_line.trim();
                if !starts_in_string && comment.starts_with('#') {
                    let body = comment.trim_start_matches('#').trim();
                    if body == "METADATA" {
                        in_metadata = true;
                    } else if in_metadata && is_entrypoint_annotation(body) {
                        pending_entrypoint = true;
                    }
                } else {
                    in_metadata = false;
                }
                continue;
            }
            in_metadata = false;

            if !seen_package {
                out.package = self.parse_package(trimmed, line_no)?;
                out.package_entrypoint = pending_entrypoint;
                pending_entrypoint = false;
                seen_package = true;
                continue;
            }

            let at_statement_start = depth == 0 && !continued && !starts_in_string;
            let mut head_start = None;

            if at_statement_start && trimmed.starts_with("import ") {
                out.imports.push(self.parse_import(trimmed, line_no)?);
                pending_entrypoint = false;
                continued = false;
                continue;
            }

            if at_statement_start {
                if let Some((name, is_function, offset)) = parse_head(&code) {
                    self.check_rule_body(&code, &out.imports, line_no)?;
                    out.rules.push(RuleHead {
                        name,
                        is_function,
                        entrypoint: pending_entrypoint,
                        line: line_no,
                    });
                    head_start = Some(offset);
                }
                pending_entrypoint = false;
            }

            for reference in scan_refs(&code) {
                if Some(reference.start) == head_start {
                    continue;
                }
                if let Some(rest) = reference.path.strip_prefix("data.") {
                    out.data_refs.push(rest.to_string());
                    continue;
                }
                if reference.call && is_callable(&reference.path) {
                    out.calls.push(Call {
                        name: reference.path,
                        line: line_no,
                    });
                }
            }

            depth += bracket_delta(&code);
            continued = ends_with_operator(trimmed);
        }

        if !seen_package {
            return Err(ParseError::new(self.file, 1, "empty module"));
        }

        Ok(out)
    }

    /// Remove comments and string contents, keeping the quotes.
    fn strip(&mut self, line: &str) -> String {
        let mut out = String::with_capacity(line.len());
        let mut chars = line.chars();

        while let Some(c) = chars.next() {
            if self.in_raw_string {
                if c == '`' {
                    self.in_raw_string = false;
                    out.push('`');
                }
                continue;
            }
            match c {
                '#' => break,
                '"' => {
                    out.push('"');
                    let mut escaped = false;
                    for s in chars.by_ref() {
                        if escaped {
                            escaped = false;
                        } else if s == '\\' {
                            escaped = true;
                        } else if s == '"' {
                            break;
                        }
                    }
                    out.push('"');
                }
                '`' => {
                    out.push('`');
                    self.in_raw_string = true;
                }
                other => out.push(other),
            }
        }

        out
    }

    fn parse_package(&self, trimmed: &str, line: usize) -> Result<String, ParseError> {
        let Some(rest) = trimmed.strip_prefix("package") else {
            return Err(ParseError::new(self.file, line, "package expected"));
        };
        if !rest.starts_with(char::is_whitespace) {
            return Err(ParseError::new(self.file, line, "package expected"));
        }
        let rest = rest.trim();
        let chars: Vec<char> = rest.chars().collect();
        let (path, end) = read_path(&chars, 0);
        if path.is_empty() || end != chars.len() {
            return Err(ParseError::new(self.file, line, "invalid package path"));
        }
        Ok(path.strip_prefix("data.").unwrap_or(&path).to_string())
    }

    fn parse_import(&self, trimmed: &str, line: usize) -> Result<Import, ParseError> {
        let rest = trimmed["import".len()..].trim();
        let chars: Vec<char> = rest.chars().collect();
        let (path, end) = read_path(&chars, 0);

        let root = path.split('.').next().unwrap_or_default();
        let known = matches!(root, "data" | "input")
            || path == "rego.v1"
            || path == "future.keywords"
            || path.starts_with("future.keywords.");
        if path.is_empty() || !known {
            return Err(ParseError::new(
                self.file,
                line,
                format!("unexpected import path: {rest}"),
            ));
        }

        let tail: String = chars[end..].iter().collect();
        let tail = tail.trim();
        let alias = if let Some(alias) = tail.strip_prefix("as ") {
            Some(alias.trim().to_string())
        } else if tail.is_empty() {
            match root {
                "data" | "input" => path.rsplit('.').next().map(str::to_string),
                _ => None,
            }
        } else {
            return Err(ParseError::new(
                self.file,
                line,
                format!("unexpected token after import path: {tail}"),
            ));
        };

        Ok(Import { path, alias, line })
    }

    fn check_rule_body(&self, code: &str, imports: &[Import], line: usize) -> Result<(), ParseError> {
        let words = head_words(code);
        let v1_syntax = self.rego_version.requires_if_keyword()
            || imports.iter().any(|i| i.path == "rego.v1");

        if v1_syntax {
            if let Some(pos) = code.find('{') {
                let prefix = &code[..pos];
                let has_if = head_words(prefix).iter().any(|w| w == "if");
                if !has_if && !prefix.contains('=') {
                    return Err(ParseError::new(
                        self.file,
                        line,
                        "`if` keyword is required before rule body",
                    ));
                }
            }
            return Ok(());
        }

        for keyword in ["if", "contains"] {
            if words.iter().any(|w| w == keyword) && !keyword_imported(imports, keyword) {
                return Err(ParseError::new(
                    self.file,
                    line,
                    format!(
                        "unexpected `{keyword}` keyword: import future.keywords.{keyword} or rego.v1"
                    ),
                ));
            }
        }
        Ok(())
    }
}

fn keyword_imported(imports: &[Import], keyword: &str) -> bool {
    imports.iter().any(|i| {
        i.path == "rego.v1"
            || i.path == "future.keywords"
            || i.path.strip_prefix("future.keywords.") == Some(keyword)
    })
}

fn is_entrypoint_annotation(body: &str) -> bool {
    let mut parts = body.splitn(2, ':');
    matches!(
        (parts.next().map(str::trim), parts.next().map(str::trim)),
        (Some("entrypoint"), Some("true"))
    )
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Read a dotted identifier path starting at `start`.
fn read_path(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start;
    while end < chars.len() && is_ident_start(chars[end]) {
        while end < chars.len() && is_ident_char(chars[end]) {
            end += 1;
        }
        if end + 1 < chars.len() && chars[end] == '.' && is_ident_start(chars[end + 1]) {
            end += 1;
        } else {
            break;
        }
    }
    (chars[start..end].iter().collect(), end)
}

struct Reference {
    path: String,
    call: bool,
    start: usize,
}

fn scan_refs(code: &str) -> Vec<Reference> {
    let chars: Vec<char> = code.chars().collect();
    let mut refs = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let boundary = i == 0 || !(is_ident_char(chars[i - 1]) || chars[i - 1] == '.');
        if boundary && is_ident_start(chars[i]) {
            let (path, end) = read_path(&chars, i);
            refs.push(Reference {
                call: chars.get(end) == Some(&'('),
                path,
                start: i,
            });
            i = end.max(i + 1);
        } else {
            i += 1;
        }
    }

    refs
}

fn is_callable(path: &str) -> bool {
    !KEYWORDS.contains(&path) && path != "input" && !path.starts_with("input.") && path != "data"
}

/// Parse a rule head at the start of `code`.
///
/// Returns the rule name, whether it is a function, and the char offset of
/// the name within `code`.
fn parse_head(code: &str) -> Option<(String, bool, usize)> {
    let chars: Vec<char> = code.chars().collect();
    let mut start = chars.iter().take_while(|c| c.is_whitespace()).count();

    let (first, first_end) = read_path(&chars, start);
    if first == "default" {
        start = first_end + chars[first_end..].iter().take_while(|c| c.is_whitespace()).count();
    }

    let (name, end) = read_path(&chars, start);
    if name.is_empty() {
        return None;
    }
    let root = name.split('.').next().unwrap_or_default();
    if KEYWORDS.contains(&root) {
        return None;
    }

    let is_function = chars.get(end) == Some(&'(');
    let rest: String = chars[end..].iter().collect();
    let rest = rest.trim_start();
    let head_like = rest.is_empty()
        || rest.starts_with(['(', '[', '{', '=', ':'])
        || rest.starts_with("if ")
        || rest == "if"
        || rest.starts_with("contains ");
    if !head_like || rest.starts_with("==") {
        return None;
    }

    Some((name, is_function, start))
}

fn head_words(code: &str) -> Vec<String> {
    code.split(|c: char| !is_ident_char(c))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn bracket_delta(code: &str) -> i32 {
    let mut delta = 0;
    let mut in_string = false;
    for c in code.chars() {
        match c {
            '"' | '`' => in_string = !in_string,
            '{' | '[' | '(' if !in_string => delta += 1,
            '}' | ']' | ')' if !in_string => delta -= 1,
            _ => {}
        }
    }
    delta
}

fn ends_with_operator(trimmed: &str) -> bool {
    trimmed.ends_with([',', '+', '-', '*', '/', '|', '&', '='])
}
