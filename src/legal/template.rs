//! Template engine
//!
//! Expands `{{expression}}` substitutions and the block forms `#if`, `#unless`, `#each`,
//! `#name` sections and `^name` inverted sections against document metadata.
//!
//! ```text
//! Dear {{client.name}},
//! {{#each parties}}- {{name}} ({{@index}}){{/each}}
//! {{#if premium}}Gold tier{{else}}Standard tier{{/if}}
//! ```
//!
//! Rendering never fails. Unresolved paths follow [`MissingValues`], malformed tags stay in the
//! output verbatim, and every problem is reported through [`Diagnostics`].

pub mod parser;
mod render;

use crate::legal::config::MissingValues;
use crate::legal::diagnostics::Diagnostics;
use crate::legal::expression::Context;
use crate::legal::fields::FieldLedger;
use crate::legal::value::Mapping;
use render::Renderer;

pub use parser::{parse, Block, BlockKind, Node, ParsedTemplate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TemplateOptions {
    pub missing_values: MissingValues,
    /// Wrap leaf substitutions in field-highlighting spans.
    pub highlight: bool,
}

#[derive(Debug, Clone)]
pub struct TemplateEngine {
    options: TemplateOptions,
    step: &'static str,
}

impl TemplateEngine {
    pub fn new(options: TemplateOptions) -> Self {
        Self {
            options,
            step: "template",
        }
    }

    /// Name of the pipeline step reported on diagnostics.
    pub fn with_step(mut self, step: &'static str) -> Self {
        self.step = step;
        self
    }

    pub fn render(
        &self,
        source: &str,
        metadata: &Mapping,
        ledger: &mut FieldLedger,
        diagnostics: &mut Diagnostics,
    ) -> String {
        let parsed = parse(source, self.step);
        for diagnostic in parsed.diagnostics {
            diagnostics.push(diagnostic);
        }

        let mut ctx = Context::new(metadata);
        let mut out = String::with_capacity(source.len());
        let mut renderer = Renderer {
            options: &self.options,
            ledger,
            diagnostics,
            step: self.step,
        };
        renderer.nodes(&parsed.nodes, &mut ctx, &mut out);
        out
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new(TemplateOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legal::diagnostics::DiagnosticCode;
    use crate::legal::fields::FieldStatus;
    use crate::legal::value::Value;

    fn meta(yaml: &str) -> Mapping {
        match Value::from_yaml(serde_yaml::from_str(yaml).unwrap()) {
            Value::Mapping(map) => map,
            _ => Mapping::new(),
        }
    }

    fn render_with(
        options: TemplateOptions,
        source: &str,
        yaml: &str,
    ) -> (String, FieldLedger, Diagnostics) {
        let mut ledger = FieldLedger::new();
        let mut diagnostics = Diagnostics::new();
        let out = TemplateEngine::new(options).render(
            source,
            &meta(yaml),
            &mut ledger,
            &mut diagnostics,
        );
        (out, ledger, diagnostics)
    }

    fn render(source: &str, yaml: &str) -> String {
        render_with(TemplateOptions::default(), source, yaml).0
    }

    #[test]
    fn substitutes_and_preserves_missing() {
        let (out, ledger, diagnostics) = render_with(
            TemplateOptions::default(),
            "Hello {{name}}, {{missing}}",
            "name: Acme\n",
        );
        assert_eq!(out, "Hello Acme, {{missing}}");
        assert_eq!(ledger.get("name").unwrap().status, FieldStatus::Filled);
        assert_eq!(ledger.get("missing").unwrap().status, FieldStatus::Empty);
        assert!(diagnostics.has_code(DiagnosticCode::UnresolvedExpression));
    }

    #[test]
    fn empty_policy_drops_missing() {
        let options = TemplateOptions {
            missing_values: MissingValues::Empty,
            highlight: false,
        };
        let (out, _, _) = render_with(options, "[{{missing}}]", "a: 1\n");
        assert_eq!(out, "[]");
    }

    #[test]
    fn conditionals() {
        assert_eq!(render("{{#if false}}A{{else}}B{{/if}}", "{}"), "B");
        assert_eq!(render("{{#if nda}}NDA{{/if}}", "nda: true\n"), "NDA");
        assert_eq!(
            render("{{#unless paid}}due{{else}}settled{{/unless}}", "paid: false\n"),
            "due"
        );
        assert_eq!(
            render("{{#if state == 'CA' && term > 12}}long{{/if}}", "state: CA\nterm: 24\n"),
            "long"
        );
    }

    #[test]
    fn loops_bind_item_and_locals() {
        let yaml = "company: Acme\nparties:\n  - name: Alice\n  - name: Bob\n";
        assert_eq!(
            render(
                "{{#each parties}}{{@index}}:{{name}}@{{company}}{{#unless @last}}, {{/unless}}{{/each}}",
                yaml
            ),
            "0:Alice@Acme, 1:Bob@Acme"
        );
        assert_eq!(render("{{#each tags}}[{{.}}]{{/each}}", "tags: [a, b]\n"), "[a][b]");
        assert_eq!(render("{{#each missing}}X{{/each}}", "{}"), "");
        assert_eq!(render("{{#each items}}X{{/each}}", "items: []\n"), "");
    }

    #[test]
    fn loops_over_inline_arrays() {
        let (out, ledger, diagnostics) =
            render_with(TemplateOptions::default(), "{{#each []}}X{{/each}}", "{}");
        assert_eq!(out, "");
        assert!(diagnostics.is_empty());
        assert!(ledger.is_empty());

        assert_eq!(
            render("{{#each ['a', name]}}<{{.}}>{{/each}}", "name: b\n"),
            "<a><b>"
        );
        assert_eq!(render("{{#each []}}X{{else}}none{{/each}}", "{}"), "none");
    }

    #[test]
    fn sections_and_inverted_sections() {
        let yaml = "items: [1, 2]\nclient:\n  name: Acme\nempty: []\n";
        assert_eq!(render("{{#items}}<{{this}}>{{/items}}", yaml), "<1><2>");
        assert_eq!(render("{{#client}}{{name}}{{/client}}", yaml), "Acme");
        assert_eq!(render("{{^empty}}none{{/empty}}", yaml), "none");
        assert_eq!(render("{{^items}}none{{/items}}", yaml), "");
    }

    #[test]
    fn block_conditions_record_logic_only() {
        let (_, ledger, _) = render_with(
            TemplateOptions::default(),
            "{{#if false}}A{{else}}B{{/if}}{{#each list}}X{{/each}}",
            "list: []\n",
        );
        assert!(ledger.by_status(FieldStatus::Empty).is_empty());
        assert_eq!(ledger.get("list").unwrap().status, FieldStatus::Logic);
        assert!(ledger.get("false").is_none());
    }

    #[test]
    fn leaves_inside_loops_are_logic() {
        let (_, ledger, _) = render_with(
            TemplateOptions::default(),
            "{{#each parties}}{{name}}{{/each}}",
            "parties:\n  - name: Alice\n",
        );
        assert_eq!(ledger.get("name").unwrap().status, FieldStatus::Logic);
    }

    #[test]
    fn helpers_and_failures() {
        let (out, ledger, diagnostics) = render_with(
            TemplateOptions::default(),
            "{{upper(name)}} {{shout(name)}} {{divide(1, 0)}}",
            "name: acme\n",
        );
        assert_eq!(out, "ACME {{shout(name)}} {{divide(1, 0)}}");
        assert!(diagnostics.has_code(DiagnosticCode::UnknownHelper));
        assert!(diagnostics.has_code(DiagnosticCode::HelperFailed));
        let record = ledger.get("upper(name)").unwrap();
        assert_eq!(record.status, FieldStatus::Logic);
        assert_eq!(record.helper.as_deref(), Some("upper"));
    }

    #[test]
    fn highlight_wraps_by_status() {
        let options = TemplateOptions {
            missing_values: MissingValues::Preserve,
            highlight: true,
        };
        let (out, _, _) = render_with(
            options,
            "{{name}}|{{vat}}|{{upper(name)}}",
            "name: acme\n",
        );
        assert_eq!(
            out,
            "<span class=\"imported-value\" data-field=\"name\">acme</span>|\
             <span class=\"missing-value\" data-field=\"vat\">[[vat]]</span>|\
             <span class=\"highlight\" data-field=\"upper(name)\">ACME</span>"
        );
    }

    #[test]
    fn malformed_expressions_are_kept() {
        let (out, _, diagnostics) =
            render_with(TemplateOptions::default(), "x {{ a + }} y", "a: 1\n");
        assert_eq!(out, "x {{ a + }} y");
        assert!(diagnostics.has_code(DiagnosticCode::MalformedExpression));
    }
}
