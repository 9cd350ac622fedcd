//! Pareto-lang shell parser.
//!
//! Tolerant by construction: a header regex finds `/name{`, a bracket-aware
//! scanner splits the body into `key := value` sections, and each
//! `process` item is matched against the operation-call pattern. Items that
//! do not match are skipped and reported as diagnostics. Only a missing
//! header, a missing `intent`/`process` section, or a process list with no
//! usable operation fails the parse.

use crate::shell::{ParamMap, ProtocolOperation, ProtocolShell};
use contextfield_core::text::unquote;
use contextfield_core::{Error, ParamValue, Result};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

/// A recoverable problem found while parsing.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParseDiagnostic {
    pub line: usize,
    pub message: String,
    pub raw: String,
}

#[derive(Clone, Debug)]
pub struct ParseResult {
    pub shell: ProtocolShell,
    pub diagnostics: Vec<ParseDiagnostic>,
}

/// Parse shell text, discarding diagnostics.
pub fn parse_shell(text: &str) -> Result<ProtocolShell> {
    parse_with_diagnostics(text).map(|r| r.shell)
}

pub fn parse_with_diagnostics(text: &str) -> Result<ParseResult> {
    let patterns = Patterns::compile()?;
    let src = strip_comments(text);
    let mut diagnostics = Vec::new();

    let (open, name) = patterns
        .header
        .captures(&src)
        .and_then(|c| Some((c.get(0)?.end() - 1, c.get(1)?.as_str().to_string())))
        .ok_or_else(|| Error::parse("no shell header of the form /name{ ... }"))?;
    let scanner = Scanner::new(&src);
    let close = match scanner.matching(open, src.len()) {
        Some(close) => close,
        None => {
            diagnostics.push(ParseDiagnostic {
                line: scanner.line_at(open),
                message: "unterminated shell body".into(),
                raw: String::new(),
            });
            src.len()
        }
    };

    let mut intent = None;
    let mut process = None;
    let mut input_spec = ParamMap::new();
    let mut output_spec = ParamMap::new();
    let mut meta = ParamMap::new();

    for section in scanner.assignments(open + 1, close, &mut diagnostics) {
        let raw = &src[section.value_start..section.value_end];
        match section.key.as_str() {
            "intent" => intent = Some(unquote(raw.trim())),
            "input" | "output" | "meta" => {
                let Some(pairs) = scanner.block_pairs(&section, b'{', &mut diagnostics) else {
                    continue;
                };
                match section.key.as_str() {
                    "input" => input_spec = pairs,
                    "output" => output_spec = pairs,
                    _ => meta = pairs,
                }
            }
            "process" => {
                let bytes = src.as_bytes();
                if bytes.get(section.value_start) != Some(&b'[') {
                    diagnostics.push(ParseDiagnostic {
                        line: scanner.line_at(section.offset),
                        message: "process section must be a [ ... ] list".into(),
                        raw: raw.trim().to_string(),
                    });
                    continue;
                }
                let inner_end = scanner.body_end(&section, &mut diagnostics);
                let mut ops = Vec::new();
                for (item_start, item_end) in scanner.items(section.value_start + 1, inner_end) {
                    let item = src[item_start..item_end].trim();
                    match parse_operation(&patterns, item) {
                        Ok(op) => ops.push(op),
                        Err(message) => {
                            warn!(item, %message, "skipping malformed operation");
                            diagnostics.push(ParseDiagnostic {
                                line: scanner.line_at(item_start),
                                message,
                                raw: item.to_string(),
                            });
                        }
                    }
                }
                process = Some(ops);
            }
            other => diagnostics.push(ParseDiagnostic {
                line: scanner.line_at(section.offset),
                message: format!("unknown section '{}'", other),
                raw: raw.trim().to_string(),
            }),
        }
    }

    let intent = intent.ok_or_else(|| Error::MissingSection("intent".into()))?;
    let process = process.ok_or_else(|| Error::MissingSection("process".into()))?;
    if process.is_empty() {
        return Err(Error::parse(format!(
            "shell '{}' has no parsable operations in its process section",
            name
        )));
    }

    debug!(
        shell = %name,
        operations = process.len(),
        diagnostics = diagnostics.len(),
        "shell parsed"
    );
    Ok(ParseResult {
        shell: ProtocolShell {
            name,
            intent,
            input_spec,
            process,
            output_spec,
            meta,
        },
        diagnostics,
    })
}

struct Patterns {
    header: Regex,
    operation: Regex,
}

impl Patterns {
    fn compile() -> Result<Self> {
        let compile =
            |p: &str| Regex::new(p).map_err(|e| Error::parse(format!("pattern {}: {}", p, e)));
        Ok(Self {
            header: compile(r"/([A-Za-z0-9_][A-Za-z0-9_.\-]*)\s*\{")?,
            operation: compile(concat!(
                r"(?s)^/([A-Za-z_][A-Za-z0-9_\-]*)",
                r"\.([A-Za-z_][A-Za-z0-9_.\-]*)",
                r"\s*(?:\{(.*)\})?$"
            ))?,
        })
    }
}

fn parse_operation(
    patterns: &Patterns,
    item: &str,
) -> std::result::Result<ProtocolOperation, String> {
    let text = unquote(item);
    let text = text.trim();
    let caps = patterns
        .operation
        .captures(text)
        .ok_or_else(|| "not an operation call of the form /namespace.operation{...}".to_string())?;
    let namespace = caps[1].to_string();
    let operation = caps[2].trim_end_matches('.').to_string();
    let mut parameters = ParamMap::new();
    if let Some(body) = caps.get(3) {
        let body = body.as_str();
        let scanner = Scanner::new(body);
        let mut problems = Vec::new();
        for pair in scanner.assignments(0, body.len(), &mut problems) {
            let raw = body[pair.value_start..pair.value_end].trim();
            parameters.insert(pair.key, ParamValue::parse(raw));
        }
        if let Some(problem) = problems.first() {
            return Err(format!("bad parameter list: {} ({})", problem.message, problem.raw));
        }
    }
    Ok(ProtocolOperation {
        namespace,
        operation,
        parameters,
        raw: item.to_string(),
    })
}

/// Blank out `//` comments that are not inside a quoted string.
/// Byte offsets are preserved so diagnostics keep their line numbers.
fn strip_comments(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                out.push(b);
                if b == b'\\' && i + 1 < bytes.len() {
                    out.push(bytes[i + 1]);
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None if b == b'"' || b == b'\'' => {
                quote = Some(b);
                out.push(b);
            }
            None if b == b'/' && bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    out.push(b' ');
                    i += 1;
                }
                continue;
            }
            None => out.push(b),
        }
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| text.to_string())
}

fn is_key_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.')
}

struct Assignment {
    key: String,
    offset: usize,
    value_start: usize,
    value_end: usize,
}

/// Bracket- and quote-aware cursor over ASCII delimiters.
struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
        }
    }

    fn line_at(&self, offset: usize) -> usize {
        let offset = offset.min(self.bytes.len());
        self.bytes[..offset].iter().filter(|b| **b == b'\n').count() + 1
    }

    /// Index just past the quoted string opening at `pos`.
    fn skip_quoted(&self, pos: usize, end: usize) -> usize {
        let q = self.bytes[pos];
        let mut i = pos + 1;
        while i < end {
            match self.bytes[i] {
                b'\\' => i += 2,
                b if b == q => return i + 1,
                _ => i += 1,
            }
        }
        end
    }

    /// Index of the bracket closing the one at `pos`.
    fn matching(&self, pos: usize, end: usize) -> Option<usize> {
        let mut depth = 0usize;
        let mut i = pos;
        while i < end {
            match self.bytes[i] {
                b'"' | b'\'' => {
                    i = self.skip_quoted(i, end);
                    continue;
                }
                b'{' | b'[' => depth += 1,
                b'}' | b']' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
            i += 1;
        }
        None
    }

    /// End of the item starting at `pos`: the next top-level `,`, `;` or
    /// newline, or an unbalanced closing bracket.
    fn item_end(&self, pos: usize, end: usize) -> usize {
        let mut i = pos;
        while i < end {
            match self.bytes[i] {
                b'"' | b'\'' => {
                    i = self.skip_quoted(i, end);
                    continue;
                }
                b'{' | b'[' => match self.matching(i, end) {
                    Some(close) => i = close,
                    None => return end,
                },
                b',' | b';' | b'\n' | b'}' | b']' => return i,
                _ => {}
            }
            i += 1;
        }
        end
    }

    fn skip_separators(&self, mut pos: usize, end: usize) -> usize {
        while pos < end
            && (self.bytes[pos].is_ascii_whitespace() || matches!(self.bytes[pos], b',' | b';'))
        {
            pos += 1;
        }
        pos
    }

    fn skip_whitespace(&self, mut pos: usize, end: usize) -> usize {
        while pos < end && self.bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        pos
    }

    /// Top-level `key (:= | = | :) value` pairs in `[start, end)`.
    fn assignments(
        &self,
        start: usize,
        end: usize,
        diagnostics: &mut Vec<ParseDiagnostic>,
    ) -> Vec<Assignment> {
        let mut out = Vec::new();
        let mut pos = start;
        loop {
            pos = self.skip_separators(pos, end);
            if pos >= end {
                break;
            }
            let key_start = pos;
            while pos < end && is_key_byte(self.bytes[pos]) {
                pos += 1;
            }
            if pos == key_start {
                let junk_end = self.item_end(pos, end).max(pos + 1).min(end);
                diagnostics.push(ParseDiagnostic {
                    line: self.line_at(key_start),
                    message: "unexpected text".into(),
                    raw: self.src[key_start..junk_end].trim().to_string(),
                });
                pos = junk_end;
                continue;
            }
            let key = self.src[key_start..pos].to_string();
            while pos < end && matches!(self.bytes[pos], b' ' | b'\t') {
                pos += 1;
            }
            if self.src[pos..end].starts_with(":=") {
                pos += 2;
            } else if pos < end && matches!(self.bytes[pos], b'=' | b':') {
                pos += 1;
            } else {
                let junk_end = self.item_end(pos, end);
                diagnostics.push(ParseDiagnostic {
                    line: self.line_at(key_start),
                    message: format!("expected ':=' after '{}'", key),
                    raw: self.src[key_start..junk_end].trim().to_string(),
                });
                pos = junk_end.max(pos);
                continue;
            }
            pos = self.skip_whitespace(pos, end);
            let value_start = pos;
            let value_end = match self.bytes.get(pos) {
                Some(b'"' | b'\'') if pos < end => self.skip_quoted(pos, end),
                Some(b'{' | b'[') if pos < end => self.matching(pos, end).map_or(end, |c| c + 1),
                _ => self.item_end(pos, end),
            };
            out.push(Assignment {
                key,
                offset: key_start,
                value_start,
                value_end,
            });
            pos = value_end;
        }
        out
    }

    /// End of a bracketed section value, excluding its closing bracket.
    /// An unterminated value runs to the end of the text and is reported.
    fn body_end(&self, section: &Assignment, diagnostics: &mut Vec<ParseDiagnostic>) -> usize {
        match self.matching(section.value_start, section.value_end) {
            Some(close) => close,
            None => {
                diagnostics.push(ParseDiagnostic {
                    line: self.line_at(section.offset),
                    message: format!("unterminated '{}' section", section.key),
                    raw: self.src[section.value_start..section.value_end].trim().to_string(),
                });
                section.value_end
            }
        }
    }

    /// The pairs of a `{ ... }` section value.
    fn block_pairs(
        &self,
        section: &Assignment,
        open: u8,
        diagnostics: &mut Vec<ParseDiagnostic>,
    ) -> Option<ParamMap> {
        if self.bytes.get(section.value_start) != Some(&open) {
            diagnostics.push(ParseDiagnostic {
                line: self.line_at(section.offset),
                message: format!("section '{}' must be a {{ ... }} block", section.key),
                raw: self.src[section.value_start..section.value_end].trim().to_string(),
            });
            return None;
        }
        let inner_end = self.body_end(section, diagnostics);
        let pairs = self
            .assignments(section.value_start + 1, inner_end, diagnostics)
            .into_iter()
            .map(|a| {
                let raw = self.src[a.value_start..a.value_end].trim();
                (a.key, ParamValue::parse(raw))
            })
            .collect();
        Some(pairs)
    }

    /// Top-level items of a list body, as byte ranges.
    fn items(&self, start: usize, end: usize) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        let mut pos = start;
        loop {
            pos = self.skip_separators(pos, end);
            if pos >= end {
                break;
            }
            let item_end = self.item_end(pos, end);
            if item_end == pos {
                // Stray closing bracket.
                pos += 1;
                continue;
            }
            out.push((pos, item_end));
            pos = item_end;
        }
        out
    }
}
