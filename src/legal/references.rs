//! Cross-references
//!
//! Runs after header numbering in two passes:
//!
//! 1. Collect anchors in document order. Header anchors were split off by the numbering pass
//!    and arrive on the [`HeaderNode`]s; a `{#key}` marker on a plain line binds `key` to the
//!    number of the closest header above it (or to the empty string before the first header)
//!    and is removed from the text.
//! 2. Replace every `|key|` on a non-header line with the anchor's rendered number.
//!
//! The first declaration of a key wins. Unknown keys stay in the text verbatim.

use crate::legal::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::legal::headers::{is_anchor_key, HeaderNode};
use indexmap::IndexMap;

const STEP: &str = "references";

/// Anchor key to rendered header number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnchorTable {
    anchors: IndexMap<String, String>,
}

impl AnchorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.anchors.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.anchors.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Declare `key`; a repeated key keeps its first number and is reported.
    pub fn declare(&mut self, key: &str, number: &str, diagnostics: &mut Diagnostics) {
        match self.anchors.get(key) {
            Some(existing) => diagnostics.push(Diagnostic::warning(
                DiagnosticCode::DuplicateAnchor,
                STEP,
                format!(
                    "anchor '{}' is already declared (as '{}'); later declaration ignored",
                    key, existing
                ),
            )),
            None => {
                self.anchors.insert(key.to_string(), number.to_string());
            }
        }
    }
}

struct Line {
    text: String,
    is_header: bool,
}

/// Remove `{#key}` markers from a plain line, returning the keys in order.
fn take_inline_anchors(line: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(line.len());
    let mut keys = Vec::new();
    let mut rest = line;

    while let Some(start) = rest.find("{#") {
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if is_anchor_key(&after[..end]) => {
                out.push_str(&rest[..start]);
                keys.push(after[..end].to_string());
                rest = &after[end + 1..];
            }
            _ => {
                out.push_str(&rest[..start + 2]);
                rest = after;
            }
        }
    }
    out.push_str(rest);

    if keys.is_empty() {
        (out, keys)
    } else {
        (out.trim_end().to_string(), keys)
    }
}

/// Pass 1: tag header lines, strip plain-line anchors and build the anchor table.
fn collect(
    content: &str,
    headers: &[HeaderNode],
    diagnostics: &mut Diagnostics,
) -> (Vec<Line>, AnchorTable) {
    let mut table = AnchorTable::new();
    let mut lines = Vec::new();
    let mut next_header = 0;
    let mut current_number = String::new();

    for line in content.split('\n') {
        // clauses may have removed a header; search forward rather than insisting on the next
        let matched = headers[next_header..]
            .iter()
            .position(|header| header.rendered == line);
        if let Some(offset) = matched {
            let header = &headers[next_header + offset];
            next_header += offset + 1;
            current_number = header.number.clone();
            if let Some(key) = &header.anchor {
                table.declare(key, &header.number, diagnostics);
            }
            lines.push(Line {
                text: line.to_string(),
                is_header: true,
            });
            continue;
        }

        let (text, keys) = take_inline_anchors(line);
        for key in keys {
            table.declare(&key, &current_number, diagnostics);
        }
        lines.push(Line {
            text,
            is_header: false,
        });
    }

    (lines, table)
}

/// Pass 2: substitute `|key|` tokens on one line.
fn substitute(line: &str, table: &AnchorTable, diagnostics: &mut Diagnostics) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;

    while let Some(open) = rest.find('|') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('|') else {
            out.push('|');
            rest = after;
            break;
        };
        let key = &after[..close];
        if !is_anchor_key(key) {
            out.push('|');
            rest = after;
            continue;
        }
        match table.get(key) {
            Some(number) => out.push_str(number),
            None => {
                diagnostics.push(Diagnostic::warning(
                    DiagnosticCode::UnresolvedReference,
                    STEP,
                    format!("no anchor named '{}'", key),
                ));
                out.push('|');
                out.push_str(key);
                out.push('|');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Resolve anchors and references in already-numbered content.
pub fn resolve_references(
    content: &str,
    headers: &[HeaderNode],
    diagnostics: &mut Diagnostics,
) -> (String, AnchorTable) {
    let (lines, table) = collect(content, headers, diagnostics);
    let resolved: Vec<String> = lines
        .into_iter()
        .map(|line| {
            if line.is_header {
                line.text
            } else {
                substitute(&line.text, &table, diagnostics)
            }
        })
        .collect();
    tracing::debug!(anchors = table.len(), "references resolved");
    (resolved.join("\n"), table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legal::headers::{number_headers, NumberingConfig};
    use crate::legal::value::{Mapping, Value};

    fn numbered(body: &str) -> (String, Vec<HeaderNode>, Diagnostics) {
        let mut meta = Mapping::new();
        meta.insert("level-one".into(), Value::from("%n."));
        meta.insert("level-two".into(), Value::from("%n.%n"));
        let mut diagnostics = Diagnostics::new();
        let config = NumberingConfig::from_metadata(&meta, &mut diagnostics);
        let numbered = number_headers(body, &config, &mut diagnostics);
        (numbered.content, numbered.headers, diagnostics)
    }

    fn resolve(body: &str) -> (String, AnchorTable, Diagnostics) {
        let (content, headers, mut diagnostics) = numbered(body);
        let (out, table) = resolve_references(&content, &headers, &mut diagnostics);
        (out, table, diagnostics)
    }

    #[test]
    fn references_render_header_numbers() {
        let (out, table, diagnostics) =
            resolve("l. Terms\nll. Payment |payment|\nSee section |payment|.");
        assert_eq!(out, "1. Terms\n1.1 Payment\nSee section 1.1.");
        assert_eq!(table.get("payment"), Some("1.1"));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn references_may_precede_their_anchor() {
        let (out, _, _) = resolve("As set out in |fees|:\nl. Intro\nl. Fees {#fees}");
        assert_eq!(out, "As set out in 2.:\n1. Intro\n2. Fees");
    }

    #[test]
    fn inline_anchors_bind_to_the_closest_header() {
        let (out, table, _) =
            resolve("Preamble {#pre}\nl. A\nll. B\nBody text {#b-body}\nRef |b-body| |pre|");
        assert_eq!(table.get("b-body"), Some("1.1"));
        assert_eq!(table.get("pre"), Some(""));
        assert!(out.ends_with("Body text\nRef 1.1 "));
    }

    #[test]
    fn first_declaration_wins() {
        let (out, _, diagnostics) = resolve("l. A |dup|\nl. B |dup|\n|dup|");
        assert!(out.ends_with("\n1."));
        assert_eq!(diagnostics.with_code(DiagnosticCode::DuplicateAnchor).len(), 1);
    }

    #[test]
    fn unknown_references_stay_verbatim() {
        let (out, _, diagnostics) = resolve("l. A\nSee |nowhere| and | table | cells");
        assert_eq!(out, "1. A\nSee |nowhere| and | table | cells");
        assert_eq!(diagnostics.with_code(DiagnosticCode::UnresolvedReference).len(), 1);
    }

    #[test]
    fn inline_anchor_scanner() {
        assert_eq!(
            take_inline_anchors("text {#a} more {#b}"),
            ("text  more".to_string(), vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            take_inline_anchors("{# not an anchor}"),
            ("{# not an anchor}".to_string(), vec![])
        );
    }
}
