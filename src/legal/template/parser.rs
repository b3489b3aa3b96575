//! Template parser
//!
//! Splits source text into literal runs and `{{ }}` tags, then folds the tags into a tree of
//! [`Node`]s with a block stack. The parser never fails: malformed expressions and stray or
//! unclosed block tags are kept as literal text and reported as diagnostics.

use crate::legal::diagnostics::{Diagnostic, DiagnosticCode};
use crate::legal::expression::{parse_expression, Expr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    If,
    Unless,
    Each,
    /// `{{#name}}`: iterate a sequence, or render once with a truthy value in scope.
    Section,
    /// `{{^name}}`: render only when the value is falsy.
    Inverted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    /// Name expected in the closing tag.
    pub name: String,
    /// Condition or path source text, trimmed.
    pub source: String,
    pub expr: Expr,
    pub body: Vec<Node>,
    /// Content after `{{else}}`.
    pub otherwise: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Substitution {
        raw: String,
        source: String,
        expr: Expr,
    },
    Block(Block),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTemplate {
    pub nodes: Vec<Node>,
    pub diagnostics: Vec<Diagnostic>,
}

enum Segment<'s> {
    Text(&'s str),
    Tag { raw: &'s str, inner: &'s str },
}

fn segments(source: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut pos = 0;
    let mut text_start = 0;

    while let Some(found) = source[pos..].find("{{") {
        let open = pos + found;
        let after = open + 2;
        let Some(close_offset) = source[after..].find("}}") else {
            break;
        };
        let close = after + close_offset;
        // `{{ a {{b}}`: the first opener is literal text
        if let Some(nested) = source[after..close].find("{{") {
            pos = after + nested;
            continue;
        }
        if open > text_start {
            out.push(Segment::Text(&source[text_start..open]));
        }
        out.push(Segment::Tag {
            raw: &source[open..close + 2],
            inner: &source[after..close],
        });
        pos = close + 2;
        text_start = pos;
    }

    if text_start < source.len() {
        out.push(Segment::Text(&source[text_start..]));
    }
    out
}

struct OpenBlock<'s> {
    kind: BlockKind,
    name: String,
    source: String,
    expr: Option<Expr>,
    raw_open: &'s str,
    body: Vec<Node>,
    otherwise: Option<Vec<Node>>,
}

impl OpenBlock<'_> {
    fn target(&mut self) -> &mut Vec<Node> {
        match &mut self.otherwise {
            Some(otherwise) => otherwise,
            None => &mut self.body,
        }
    }

    /// Give up on the block: its tags become literal text around its content.
    fn into_literal(self) -> Vec<Node> {
        let mut nodes = vec![Node::Text(self.raw_open.to_string())];
        nodes.extend(self.body);
        if let Some(otherwise) = self.otherwise {
            nodes.push(Node::Text("{{else}}".to_string()));
            nodes.extend(otherwise);
        }
        nodes
    }
}

fn target<'a>(root: &'a mut Vec<Node>, stack: &'a mut [OpenBlock<'_>]) -> &'a mut Vec<Node> {
    match stack.last_mut() {
        Some(open) => open.target(),
        None => root,
    }
}

fn push_text(nodes: &mut Vec<Node>, text: &str) {
    if let Some(Node::Text(last)) = nodes.last_mut() {
        last.push_str(text);
    } else {
        nodes.push(Node::Text(text.to_string()));
    }
}

fn push_nodes(nodes: &mut Vec<Node>, extra: Vec<Node>) {
    for node in extra {
        match node {
            Node::Text(text) => push_text(nodes, &text),
            other => nodes.push(other),
        }
    }
}

/// Parse template source into nodes, collecting diagnostics under `step`.
pub fn parse(source: &str, step: &str) -> ParsedTemplate {
    let mut root = Vec::new();
    let mut stack: Vec<OpenBlock> = Vec::new();
    let mut diagnostics = Vec::new();

    for segment in segments(source) {
        let (raw, inner) = match segment {
            Segment::Text(text) => {
                push_text(target(&mut root, &mut stack), text);
                continue;
            }
            Segment::Tag { raw, inner } => (raw, inner.trim()),
        };

        if let Some(rest) = inner.strip_prefix('#') {
            let rest = rest.trim();
            let (word, arg) = match rest.split_once(char::is_whitespace) {
                Some((word, arg)) => (word, arg.trim()),
                None => (rest, ""),
            };
            let (kind, name, arg) = match word {
                "if" => (BlockKind::If, word, arg),
                "unless" => (BlockKind::Unless, word, arg),
                "each" => (BlockKind::Each, word, arg),
                _ => (BlockKind::Section, rest, rest),
            };
            stack.push(open_block(kind, name, arg, raw, step, &mut diagnostics));
        } else if let Some(rest) = inner.strip_prefix('^') {
            let rest = rest.trim();
            stack.push(open_block(
                BlockKind::Inverted,
                rest,
                rest,
                raw,
                step,
                &mut diagnostics,
            ));
        } else if let Some(rest) = inner.strip_prefix('/') {
            let name = rest.trim();
            if stack.last().map(|open| open.name == name).unwrap_or(false) {
                if let Some(open) = stack.pop() {
                    let nodes = close_block(open, raw);
                    push_nodes(target(&mut root, &mut stack), nodes);
                }
            } else {
                diagnostics.push(Diagnostic::warning(
                    DiagnosticCode::UnbalancedBlock,
                    step,
                    format!("unexpected closing tag '{}'", raw),
                ));
                push_text(target(&mut root, &mut stack), raw);
            }
        } else if inner == "else" {
            let accepts_else = stack
                .last()
                .map(|open| open.otherwise.is_none())
                .unwrap_or(false);
            if let Some(open) = stack.last_mut().filter(|_| accepts_else) {
                open.otherwise = Some(Vec::new());
            } else {
                diagnostics.push(Diagnostic::warning(
                    DiagnosticCode::UnbalancedBlock,
                    step,
                    "'{{else}}' outside of a block",
                ));
                push_text(target(&mut root, &mut stack), raw);
            }
        } else {
            match parse_expression(inner) {
                Ok(expr) => target(&mut root, &mut stack).push(Node::Substitution {
                    raw: raw.to_string(),
                    source: inner.to_string(),
                    expr,
                }),
                Err(err) => {
                    diagnostics.push(Diagnostic::warning(
                        DiagnosticCode::MalformedExpression,
                        step,
                        format!("'{}': {}", raw, err),
                    ));
                    push_text(target(&mut root, &mut stack), raw);
                }
            }
        }
    }

    while let Some(open) = stack.pop() {
        diagnostics.push(Diagnostic::warning(
            DiagnosticCode::UnbalancedBlock,
            step,
            format!("'{}' is never closed", open.raw_open),
        ));
        let nodes = open.into_literal();
        push_nodes(target(&mut root, &mut stack), nodes);
    }

    ParsedTemplate {
        nodes: root,
        diagnostics,
    }
}

fn open_block<'s>(
    kind: BlockKind,
    name: &str,
    arg: &str,
    raw: &'s str,
    step: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> OpenBlock<'s> {
    let expr = match parse_expression(arg) {
        Ok(expr) => Some(expr),
        Err(err) => {
            diagnostics.push(Diagnostic::warning(
                DiagnosticCode::MalformedExpression,
                step,
                format!("'{}': {}", raw, err),
            ));
            None
        }
    };
    OpenBlock {
        kind,
        name: name.to_string(),
        source: arg.to_string(),
        expr,
        raw_open: raw,
        body: Vec::new(),
        otherwise: None,
    }
}

fn close_block(mut open: OpenBlock<'_>, raw_close: &str) -> Vec<Node> {
    match open.expr.take() {
        Some(expr) => vec![Node::Block(Block {
            kind: open.kind,
            name: open.name,
            source: open.source,
            expr,
            body: open.body,
            otherwise: open.otherwise.unwrap_or_default(),
        })],
        None => {
            let mut nodes = open.into_literal();
            nodes.push(Node::Text(raw_close.to_string()));
            nodes
        }
    }
}
