//! Template renderer
//!
//! Walks the parsed [`Node`] tree against a [`Context`], writing output text, recording every
//! leaf substitution in the field ledger and reporting evaluation problems as diagnostics.

use super::parser::{Block, BlockKind, Node};
use super::TemplateOptions;
use crate::legal::config::MissingValues;
use crate::legal::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::legal::expression::{evaluate, Context, EvalError, Expr};
use crate::legal::fields::{FieldLedger, FieldStatus};
use crate::legal::value::Value;

pub(super) struct Renderer<'r> {
    pub options: &'r TemplateOptions,
    pub ledger: &'r mut FieldLedger,
    pub diagnostics: &'r mut Diagnostics,
    pub step: &'r str,
}

impl Renderer<'_> {
    pub fn nodes(&mut self, nodes: &[Node], ctx: &mut Context, out: &mut String) {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Substitution { raw, source, expr } => {
                    self.substitution(raw, source, expr, ctx, out)
                }
                Node::Block(block) => self.block(block, ctx, out),
            }
        }
    }

    fn report(&mut self, err: EvalError, source: &str) {
        let code = match err {
            EvalError::UnknownHelper(_) => DiagnosticCode::UnknownHelper,
            EvalError::HelperFailed { .. } => DiagnosticCode::HelperFailed,
            EvalError::InvalidOperand { .. } => DiagnosticCode::UnresolvedExpression,
        };
        self.diagnostics.push(Diagnostic::warning(
            code,
            self.step,
            format!("'{}': {}", source, err),
        ));
    }

    fn substitution(
        &mut self,
        raw: &str,
        source: &str,
        expr: &Expr,
        ctx: &Context,
        out: &mut String,
    ) {
        let evaluation = match evaluate(expr, ctx) {
            Ok(evaluation) => evaluation,
            Err(err) => {
                self.report(err, source);
                out.push_str(raw);
                return;
            }
        };

        let has_logic = expr.has_logic() || ctx.in_iteration();
        let helper = expr.helper_name();

        if evaluation.value == Value::Null && !evaluation.is_resolved() {
            self.diagnostics.push(Diagnostic::warning(
                DiagnosticCode::UnresolvedExpression,
                self.step,
                format!(
                    "'{}' did not resolve (missing: {})",
                    source,
                    evaluation.missing.join(", ")
                ),
            ));
            self.ledger.record(source, &Value::Null, has_logic, helper);
            if self.options.highlight {
                out.push_str(&missing_span(source));
            } else {
                match self.options.missing_values {
                    MissingValues::Preserve => out.push_str(raw),
                    MissingValues::Empty => {}
                }
            }
            return;
        }

        let status = self
            .ledger
            .record(source, &evaluation.value, has_logic, helper);
        let text = evaluation.value.render();
        if !self.options.highlight {
            out.push_str(&text);
            return;
        }
        let wrapped = match status {
            FieldStatus::Filled => span("imported-value", source, &text),
            FieldStatus::Empty => missing_span(source),
            FieldStatus::Logic => span("highlight", source, &text),
        };
        out.push_str(&wrapped);
    }

    fn condition(&mut self, block: &Block, ctx: &Context) -> Value {
        let value = match evaluate(&block.expr, ctx) {
            Ok(evaluation) => evaluation.value,
            Err(err) => {
                self.report(err, &block.source);
                Value::Null
            }
        };
        if !block.expr.paths().is_empty() {
            self.ledger
                .record(&block.source, &value, true, block.expr.helper_name());
        }
        value
    }

    fn block(&mut self, block: &Block, ctx: &mut Context, out: &mut String) {
        let value = self.condition(block, ctx);
        match block.kind {
            BlockKind::If => {
                let branch = if value.is_truthy() {
                    &block.body
                } else {
                    &block.otherwise
                };
                self.nodes(branch, ctx, out);
            }
            BlockKind::Unless => {
                let branch = if value.is_truthy() {
                    &block.otherwise
                } else {
                    &block.body
                };
                self.nodes(branch, ctx, out);
            }
            BlockKind::Each => match value {
                Value::Sequence(items) if !items.is_empty() => {
                    self.iterate(&items, &block.body, ctx, out)
                }
                Value::Mapping(map) if !map.is_empty() => {
                    let items: Vec<Value> = map.into_values().collect();
                    self.iterate(&items, &block.body, ctx, out)
                }
                _ => self.nodes(&block.otherwise, ctx, out),
            },
            BlockKind::Section => match value {
                Value::Sequence(items) => self.iterate(&items, &block.body, ctx, out),
                other if other.is_truthy() => {
                    ctx.push(other, 0, 1);
                    self.nodes(&block.body, ctx, out);
                    ctx.pop();
                }
                _ => self.nodes(&block.otherwise, ctx, out),
            },
            BlockKind::Inverted => {
                if value.is_truthy() {
                    self.nodes(&block.otherwise, ctx, out);
                } else {
                    self.nodes(&block.body, ctx, out);
                }
            }
        }
    }

    fn iterate(&mut self, items: &[Value], body: &[Node], ctx: &mut Context, out: &mut String) {
        let len = items.len();
        for (index, item) in items.iter().enumerate() {
            ctx.push(item.clone(), index, len);
            self.nodes(body, ctx, out);
            ctx.pop();
        }
    }
}

fn escape_attr(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn span(class: &str, field: &str, text: &str) -> String {
    format!(
        "<span class=\"{}\" data-field=\"{}\">{}</span>",
        class,
        escape_attr(field),
        text
    )
}

fn missing_span(field: &str) -> String {
    span("missing-value", field, &format!("[[{}]]", field))
}
