//! Header numbering
//!
//! Legal headers are lines starting with a depth marker: a run of `l`s (`l.`, `ll.`, `lll.` …)
//! or an explicit `lN.`. Each header increments the counter of its depth and, unless `no-reset`
//! says otherwise, zeroes every deeper counter. The line is rewritten with the number rendered
//! from the level's [`HeaderFormat`].
//!
//! A header line may end with an anchor declaration (`|key|` or `{#key}`). The marker is removed
//! here and recorded on the [`HeaderNode`] for the cross-reference pass.
//!
//! Per-document settings come from metadata:
//!
//! - `level-one` … `level-nine` (or `level-1` … `level-9`): format pattern per depth
//! - `no-reset`: `true`, or a list of levels that keep counting across parent increments
//! - `level-indent` / `no-indent`: indent header lines by depth

pub mod format;

use crate::legal::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::legal::value::{Mapping, Value};
use format::HeaderFormat;
use once_cell::sync::Lazy;
use regex::Regex;

pub const MAX_DEPTH: usize = 9;

/// Widest accepted `level-indent`, in spaces per level.
pub const MAX_INDENT: usize = 16;

const STEP: &str = "headers";

const LEVEL_NAMES: [&str; MAX_DEPTH] = [
    "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
];

const DEFAULT_PATTERNS: [&str; MAX_DEPTH] = [
    "Article %n.",
    "Section %n.",
    "(%n)",
    "(%a)",
    "(%r)",
    "(%A)",
    "(%R)",
    "%n.",
    "%n.",
];

static HEADER_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[ \t]*(l+)(\d*)\.(?:[ \t]+(.*))?$").unwrap());

static ANCHOR_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]*$").unwrap());

/// Whether `key` is a valid anchor or reference key.
pub fn is_anchor_key(key: &str) -> bool {
    ANCHOR_KEY.is_match(key)
}

/// A numbered header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderNode {
    pub level: usize,
    /// Marker as written, e.g. `ll.` or `l2.`.
    pub marker: String,
    pub text: String,
    pub number: String,
    pub anchor: Option<String>,
    /// The output line, including indentation.
    pub rendered: String,
}

/// Numbering settings resolved from metadata.
#[derive(Debug, Clone)]
pub struct NumberingConfig {
    formats: Vec<HeaderFormat>,
    keep_counting: [bool; MAX_DEPTH],
    indent: usize,
}

impl NumberingConfig {
    pub fn from_metadata(metadata: &Mapping, diagnostics: &mut Diagnostics) -> Self {
        let formats = (1..=MAX_DEPTH)
            .map(|depth| level_format(metadata, depth, diagnostics))
            .collect();

        let no_indent = metadata.get("no-indent").map(flag).unwrap_or(false);
        let indent = if no_indent {
            0
        } else {
            level_indent(metadata, diagnostics)
        };

        Self {
            formats,
            keep_counting: no_reset_levels(metadata.get("no-reset")),
            indent,
        }
    }

    fn format(&self, depth: usize) -> &HeaderFormat {
        &self.formats[depth - 1]
    }
}

impl Default for NumberingConfig {
    fn default() -> Self {
        let formats = DEFAULT_PATTERNS
            .iter()
            .enumerate()
            .map(|(i, pattern)| {
                HeaderFormat::parse(pattern, i + 1).unwrap_or_else(|_| HeaderFormat::fallback())
            })
            .collect();
        Self {
            formats,
            keep_counting: [false; MAX_DEPTH],
            indent: 0,
        }
    }
}

fn level_indent(metadata: &Mapping, diagnostics: &mut Diagnostics) -> usize {
    let configured = match metadata.get("level-indent") {
        None | Some(Value::Null) => return 0,
        Some(value) => value,
    };
    match configured.as_f64() {
        Some(width) if (0.0..=MAX_INDENT as f64).contains(&width) => width as usize,
        _ => {
            diagnostics.push(Diagnostic::warning(
                DiagnosticCode::MalformedHeaderFormat,
                STEP,
                format!(
                    "level-indent must be a number between 0 and {}, got '{}'; not indenting",
                    MAX_INDENT,
                    configured.render()
                ),
            ));
            0
        }
    }
}

fn flag(value: &Value) -> bool {
    match value {
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes"),
        other => other.is_truthy(),
    }
}

fn level_format(metadata: &Mapping, depth: usize, diagnostics: &mut Diagnostics) -> HeaderFormat {
    let named = format!("level-{}", LEVEL_NAMES[depth - 1]);
    let numbered = format!("level-{}", depth);
    let configured = metadata.get(&named).or_else(|| metadata.get(&numbered));

    let pattern = match configured {
        None | Some(Value::Null) => DEFAULT_PATTERNS[depth - 1].to_string(),
        Some(Value::String(pattern)) => pattern.clone(),
        Some(other) => {
            diagnostics.push(Diagnostic::warning(
                DiagnosticCode::MalformedHeaderFormat,
                STEP,
                format!(
                    "level {} format must be a string, got '{}'; using '{}'",
                    depth,
                    other.render(),
                    format::FALLBACK_PATTERN
                ),
            ));
            return HeaderFormat::fallback();
        }
    };

    match HeaderFormat::parse(&pattern, depth) {
        Ok(format) => format,
        Err(err) => {
            diagnostics.push(Diagnostic::warning(
                DiagnosticCode::MalformedHeaderFormat,
                STEP,
                format!(
                    "level {} format '{}': {}; using '{}'",
                    depth,
                    pattern,
                    err,
                    format::FALLBACK_PATTERN
                ),
            ));
            HeaderFormat::fallback()
        }
    }
}

/// Parse a level designator: `3`, `lll`, `lll.`, `l3` or `l3.`.
fn parse_level(token: &str) -> Option<usize> {
    let token = token.trim().trim_end_matches('.');
    let level = if let Ok(n) = token.parse::<usize>() {
        n
    } else if let Some(digits) = token.strip_prefix('l').filter(|d| !d.is_empty()) {
        match digits.parse::<usize>() {
            Ok(n) => n,
            Err(_) if digits.chars().all(|c| c == 'l') => digits.len() + 1,
            Err(_) => return None,
        }
    } else if token == "l" {
        1
    } else {
        return None;
    };
    (1..=MAX_DEPTH).contains(&level).then_some(level)
}

fn no_reset_levels(value: Option<&Value>) -> [bool; MAX_DEPTH] {
    let mut levels = [false; MAX_DEPTH];
    let mut mark = |token: &str| {
        if let Some(level) = parse_level(token) {
            levels[level - 1] = true;
        }
    };
    match value {
        Some(Value::Bool(true)) => return [true; MAX_DEPTH],
        Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("true") => {
            return [true; MAX_DEPTH]
        }
        Some(Value::String(s)) => s.split(',').for_each(&mut mark),
        Some(Value::Number(n)) => mark(&n.to_string()),
        Some(Value::Sequence(items)) => {
            for item in items {
                mark(&item.render());
            }
        }
        _ => {}
    }
    levels
}

/// Split a trailing `|key|` or `{#key}` anchor off a header's text.
fn split_anchor(text: &str) -> (String, Option<String>) {
    let trimmed = text.trim_end();
    let candidate = if let Some(body) = trimmed.strip_suffix('|') {
        body.rfind('|').map(|start| (start, &body[start + 1..]))
    } else if let Some(body) = trimmed.strip_suffix('}') {
        body.rfind("{#").map(|start| (start, &body[start + 2..]))
    } else {
        None
    };

    match candidate {
        Some((start, key)) if is_anchor_key(key) => {
            (trimmed[..start].trim_end().to_string(), Some(key.to_string()))
        }
        _ => (trimmed.to_string(), None),
    }
}

/// Body with numbered headers plus the header nodes in document order.
#[derive(Debug, Clone, Default)]
pub struct Numbered {
    pub content: String,
    pub headers: Vec<HeaderNode>,
}

/// Number every header line in `body`.
pub fn number_headers(
    body: &str,
    config: &NumberingConfig,
    diagnostics: &mut Diagnostics,
) -> Numbered {
    let mut counters = [0u32; MAX_DEPTH];
    let mut headers = Vec::new();
    let mut lines = Vec::new();
    let mut in_fence = false;

    for line in body.split('\n') {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            lines.push(line.to_string());
            continue;
        }
        let captures = match HEADER_MARKER.captures(line) {
            Some(captures) if !in_fence => captures,
            _ => {
                lines.push(line.to_string());
                continue;
            }
        };

        let run = captures.get(1).map_or("", |m| m.as_str());
        let digits = captures.get(2).map_or("", |m| m.as_str());
        let raw_text = captures.get(3).map_or("", |m| m.as_str());
        let marker = format!("{}{}.", run, digits);

        let level = match (run.len(), digits) {
            (n, "") => Some(n),
            (1, digits) => digits.parse::<usize>().ok(),
            _ => None,
        };
        let level = match level.filter(|l| (1..=MAX_DEPTH).contains(l)) {
            Some(level) => level,
            None => {
                diagnostics.push(Diagnostic::warning(
                    DiagnosticCode::InvalidHeaderLevel,
                    STEP,
                    format!(
                        "header marker '{}' is outside levels 1-{}; left unnumbered",
                        marker, MAX_DEPTH
                    ),
                ));
                lines.push(line.to_string());
                continue;
            }
        };

        counters[level - 1] += 1;
        for deeper in level..MAX_DEPTH {
            if !config.keep_counting[deeper] {
                counters[deeper] = 0;
            }
        }

        let (text, anchor) = split_anchor(raw_text);
        let format = config.format(level);
        let number = format.number(&counters, level);
        let rendered = format!(
            "{}{}",
            " ".repeat(config.indent.saturating_mul(level - 1)),
            format.line(&counters, level, &text)
        );
        tracing::trace!(level, %number, "numbered header");

        lines.push(rendered.clone());
        headers.push(HeaderNode {
            level,
            marker,
            text,
            number,
            anchor,
            rendered,
        });
    }

    Numbered {
        content: lines.join("\n"),
        headers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(yaml: &str) -> Mapping {
        match Value::from_yaml(serde_yaml::from_str(yaml).unwrap()) {
            Value::Mapping(map) => map,
            _ => Mapping::new(),
        }
    }

    fn number(body: &str, yaml: &str) -> (Numbered, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let config = NumberingConfig::from_metadata(&meta(yaml), &mut diagnostics);
        let numbered = number_headers(body, &config, &mut diagnostics);
        (numbered, diagnostics)
    }

    #[test]
    fn numbers_nested_headers() {
        let (numbered, diagnostics) = number(
            "l. Intro\nll. Scope\nl. Terms",
            "level-one: '%n.'\nlevel-two: '%n.%n'\n",
        );
        assert_eq!(numbered.content, "1. Intro\n1.1 Scope\n2. Terms");
        assert!(diagnostics.is_empty());
        let numbers: Vec<&str> = numbered.headers.iter().map(|h| h.number.as_str()).collect();
        assert_eq!(numbers, vec!["1.", "1.1", "2."]);
    }

    #[test]
    fn default_patterns() {
        let (numbered, _) = number("l. Parties\nll. Buyer\nlll. Address\nllll. Street", "{}");
        assert_eq!(
            numbered.content,
            "Article 1. Parties\nSection 1. Buyer\n(1) Address\n(a) Street"
        );
    }

    #[test]
    fn explicit_level_markers() {
        let (numbered, _) = number("l1. A\nl2. B\nl2. C", "level-2: '%n.%n'\n");
        assert_eq!(numbered.headers[2].number, "1.2");
        assert_eq!(numbered.headers[2].marker, "l2.");
    }

    #[test]
    fn deeper_counters_reset_unless_configured() {
        let body = "l. A\nll. a\nll. b\nl. B\nll. c";
        let (numbered, _) = number(body, "level-one: '%n.'\nlevel-two: '%n'\n");
        assert_eq!(numbered.headers[4].number, "1");

        let (numbered, _) = number(body, "level-one: '%n.'\nlevel-two: '%n'\nno-reset: 'll.'\n");
        assert_eq!(numbered.headers[4].number, "3");

        let (numbered, _) = number(body, "level-one: '%n.'\nlevel-two: '%n'\nno-reset: true\n");
        assert_eq!(numbered.headers[4].number, "3");
    }

    #[test]
    fn out_of_range_markers_are_left_alone() {
        let (numbered, diagnostics) = number("llllllllll. Too deep\nl12. Also", "{}");
        assert_eq!(numbered.content, "llllllllll. Too deep\nl12. Also");
        assert_eq!(diagnostics.with_code(DiagnosticCode::InvalidHeaderLevel).len(), 2);
        assert!(numbered.headers.is_empty());
    }

    #[test]
    fn malformed_pattern_falls_back_for_that_level_only() {
        let (numbered, diagnostics) = number(
            "l. A\nll. B",
            "level-one: 'Art %q'\nlevel-two: '%n.%n'\n",
        );
        assert_eq!(numbered.content, "1. A\n1.1 B");
        assert_eq!(
            diagnostics.with_code(DiagnosticCode::MalformedHeaderFormat).len(),
            1
        );
    }

    #[test]
    fn text_placeholder_and_indentation() {
        let (numbered, _) = number(
            "l. Intro\nll. Scope",
            "level-one: 'Chapter %R: %s'\nlevel-two: '%n.%n'\nlevel-indent: 2\n",
        );
        assert_eq!(numbered.content, "Chapter I: Intro\n  1.1 Scope");
        assert_eq!(numbered.headers[0].number, "Chapter I:");

        let (numbered, _) = number(
            "ll. Scope",
            "level-two: '%n'\nlevel-indent: 2\nno-indent: true\n",
        );
        assert_eq!(numbered.content, "1 Scope");
    }

    #[test]
    fn out_of_range_indentation_is_ignored() {
        for width in ["1e13", "-3", "wide"] {
            let (numbered, diagnostics) = number(
                "l. A\nll. B",
                &format!("level-one: '%n.'\nlevel-two: '%n.%n'\nlevel-indent: {}\n", width),
            );
            assert_eq!(numbered.content, "1. A\n1.1 B", "level-indent: {}", width);
            assert!(diagnostics.has_code(DiagnosticCode::MalformedHeaderFormat));
        }

        let (numbered, diagnostics) = number(
            "l. A\nll. B",
            &format!("level-two: '%n.%n'\nlevel-indent: {}\n", MAX_INDENT),
        );
        assert!(numbered.content.ends_with(&format!("\n{}1.1 B", " ".repeat(MAX_INDENT))));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn header_anchors_are_stripped() {
        let (numbered, _) = number("l. Definitions |defs|\nl. Term {#term}", "level-one: '%n.'\n");
        assert_eq!(numbered.content, "1. Definitions\n2. Term");
        assert_eq!(numbered.headers[0].anchor.as_deref(), Some("defs"));
        assert_eq!(numbered.headers[1].anchor.as_deref(), Some("term"));
    }

    #[test]
    fn fenced_code_is_skipped() {
        let (numbered, _) = number("```\nl. not a header\n```\nl. Real", "level-one: '%n.'\n");
        assert_eq!(numbered.content, "```\nl. not a header\n```\n1. Real");
    }

    #[test]
    fn level_designators() {
        assert_eq!(parse_level("lll."), Some(3));
        assert_eq!(parse_level("l4"), Some(4));
        assert_eq!(parse_level(" 2 "), Some(2));
        assert_eq!(parse_level("l"), Some(1));
        assert_eq!(parse_level("x"), None);
        assert_eq!(parse_level("10"), None);
    }
}
