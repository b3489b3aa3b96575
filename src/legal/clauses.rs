//! Optional clauses
//!
//! `[content]{condition}` keeps `content` (without the brackets) when the condition is truthy
//! and removes the whole span otherwise. Spans nest; an inner clause is decided before the
//! clause that contains it, so the outer content is already resolved when it is kept.
//!
//! A bracket that is not followed by a condition (markdown links, `[x]{{…}}`, `[x]{#anchor}`)
//! is ordinary text, and `\[` never opens a clause.
//!
//! A condition that references a path absent from the metadata is unresolvable: the clause is
//! removed and an `UnresolvedCondition` warning is emitted.

use crate::legal::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::legal::expression::{evaluate, parse_expression, Context};
use crate::legal::value::Mapping;

const STEP: &str = "clauses";

/// Where a `]` ends: the condition text and the byte just past its closing `}`.
fn condition_after(source: &str, close: usize) -> Option<(&str, usize)> {
    let rest = source.get(close + 1..)?;
    let inner = rest.strip_prefix('{')?;
    if inner.starts_with('{') || inner.starts_with('#') {
        return None;
    }
    let end = inner.find(|c: char| c == '}' || c == '\n')?;
    if inner[end..].starts_with('\n') {
        return None;
    }
    Some((&inner[..end], close + 2 + end + 1))
}

enum Decision {
    Keep,
    Remove,
    Verbatim,
}

fn decide(condition: &str, metadata: &Mapping, diagnostics: &mut Diagnostics) -> Decision {
    let expr = match parse_expression(condition) {
        Ok(expr) => expr,
        Err(err) => {
            diagnostics.push(Diagnostic::warning(
                DiagnosticCode::MalformedExpression,
                STEP,
                format!("clause condition '{}': {}", condition.trim(), err),
            ));
            return Decision::Verbatim;
        }
    };

    match evaluate(&expr, &Context::new(metadata)) {
        Ok(evaluation) if !evaluation.is_resolved() => {
            diagnostics.push(Diagnostic::warning(
                DiagnosticCode::UnresolvedCondition,
                STEP,
                format!(
                    "clause condition '{}' references missing {}; clause removed",
                    condition.trim(),
                    evaluation.missing.join(", ")
                ),
            ));
            Decision::Remove
        }
        Ok(evaluation) if evaluation.value.is_truthy() => Decision::Keep,
        Ok(_) => Decision::Remove,
        Err(err) => {
            diagnostics.push(Diagnostic::warning(
                DiagnosticCode::UnresolvedCondition,
                STEP,
                format!("clause condition '{}': {}; clause removed", condition.trim(), err),
            ));
            Decision::Remove
        }
    }
}

/// Resolve every optional clause in `body`.
pub fn process_clauses(body: &str, metadata: &Mapping, diagnostics: &mut Diagnostics) -> String {
    // one buffer per open bracket, the root buffer at the bottom
    let mut stack: Vec<String> = vec![String::new()];
    let mut kept = 0usize;
    let mut removed = 0usize;
    let mut i = 0;

    while i < body.len() {
        let rest = &body[i..];
        let Some(ch) = rest.chars().next() else {
            break;
        };

        if rest.starts_with("\\[") {
            push_str(&mut stack, "\\[");
            i += 2;
            continue;
        }

        match ch {
            '[' => {
                stack.push(String::new());
                i += 1;
            }
            ']' if stack.len() > 1 => {
                let content = stack.pop().unwrap_or_default();
                match condition_after(body, i) {
                    Some((condition, next)) => {
                        match decide(condition, metadata, diagnostics) {
                            Decision::Keep => {
                                kept += 1;
                                push_str(&mut stack, &content);
                            }
                            Decision::Remove => removed += 1,
                            Decision::Verbatim => {
                                push_str(&mut stack, &format!("[{}]", content));
                                push_str(&mut stack, &body[i + 1..next]);
                            }
                        }
                        i = next;
                    }
                    None => {
                        push_str(&mut stack, &format!("[{}]", content));
                        i += 1;
                    }
                }
            }
            _ => {
                push_str(&mut stack, &rest[..ch.len_utf8()]);
                i += ch.len_utf8();
            }
        }
    }

    // unclosed brackets are plain text
    while stack.len() > 1 {
        let content = stack.pop().unwrap_or_default();
        push_str(&mut stack, &format!("[{}", content));
    }

    tracing::debug!(kept, removed, "clauses resolved");
    stack.pop().unwrap_or_default()
}

fn push_str(stack: &mut [String], text: &str) {
    if let Some(top) = stack.last_mut() {
        top.push_str(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legal::value::Value;
    use rstest::rstest;

    fn meta(yaml: &str) -> Mapping {
        match Value::from_yaml(serde_yaml::from_str(yaml).unwrap()) {
            Value::Mapping(map) => map,
            _ => Mapping::new(),
        }
    }

    fn run(body: &str, yaml: &str) -> (String, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let out = process_clauses(body, &meta(yaml), &mut diagnostics);
        (out, diagnostics)
    }

    #[rstest]
    #[case("A [Confidential]{is_nda} B", "is_nda: false", "A  B")]
    #[case("A [Confidential]{is_nda} B", "is_nda: true", "A Confidential B")]
    #[case("[x]{!flag}", "flag: false", "x")]
    #[case("[x]{a AND b}", "a: true\nb: false", "")]
    #[case("[x]{a OR b}", "a: true\nb: false", "x")]
    #[case("[x]{state == 'CA'}", "state: CA", "x")]
    #[case("[x]{items}", "items: []", "")]
    #[case("[x]{true}", "{}", "x")]
    fn evaluates_conditions(#[case] body: &str, #[case] yaml: &str, #[case] expected: &str) {
        assert_eq!(run(body, yaml).0, expected);
    }

    #[test]
    fn nested_clauses_resolve_inside_out() {
        let yaml = "outer: true\ninner: false\n";
        let (out, _) = run("[Start [hidden]{inner} end]{outer}", yaml);
        assert_eq!(out, "Start  end");

        let (out, _) = run("[Start [shown]{outer} end]{inner}", yaml);
        assert_eq!(out, "");
    }

    #[test]
    fn missing_paths_remove_with_warning() {
        let (out, diagnostics) = run("a[b]{unknown}c", "{}");
        assert_eq!(out, "ac");
        assert!(diagnostics.has_code(DiagnosticCode::UnresolvedCondition));
    }

    #[test]
    fn non_clause_brackets_are_text() {
        let yaml = "{}";
        assert_eq!(run("[link](http://x)", yaml).0, "[link](http://x)");
        assert_eq!(run("[a]{{name}}", yaml).0, "[a]{{name}}");
        assert_eq!(run("[a]{#anchor}", yaml).0, "[a]{#anchor}");
        assert_eq!(run("\\[x]{true}", yaml).0, "\\[x]{true}");
        assert_eq!(run("open [ bracket", yaml).0, "open [ bracket");
        assert_eq!(run("stray ] bracket", yaml).0, "stray ] bracket");
    }

    #[test]
    fn malformed_condition_is_kept_verbatim() {
        let (out, diagnostics) = run("[x]{a +}", "a: 1\n");
        assert_eq!(out, "[x]{a +}");
        assert!(diagnostics.has_code(DiagnosticCode::MalformedExpression));
    }

    #[test]
    fn multibyte_text_survives() {
        assert_eq!(run("§ [Ünïcødé]{ok} ✓", "ok: true\n").0, "§ Ünïcødé ✓");
    }
}
