//! Force commands
//!
//! A document can adjust its own rendering through a command string kept in metadata:
//!
//! ```yaml
//! force_commands: --css "styles/nda.css" --output-name "{{client}}-nda" --highlight
//! ```
//!
//! The string is tokenized with quote handling, parsed into a [`CommandDelta`] holding only the
//! recognized options, and applied over a base [`RenderConfig`]. Options that would redirect I/O
//! or switch off core processing are refused, and so are path values that escape the document
//! directory. Nothing here fails; rejected tokens become diagnostics.

use crate::legal::config::{Orientation, RenderConfig};
use crate::legal::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::legal::value::{Mapping, Value};
use serde::Serialize;

const STEP: &str = "commands";

/// Metadata keys checked for a command string, in order.
pub const COMMAND_KEYS: [&str; 4] = [
    "force_commands",
    "force-commands",
    "forceCommands",
    "commands",
];

/// Options that are never accepted from a document. The bool marks options taking a value.
const PROTECTED: [(&str, bool); 11] = [
    ("--stdin", false),
    ("--stdout", false),
    ("--input", true),
    ("--output-dir", true),
    ("--config", true),
    ("--no-headers", false),
    ("--no-clauses", false),
    ("--no-references", false),
    ("--no-mixins", false),
    ("--no-imports", false),
    ("--throw-on-yaml-error", false),
];

const PAGE_FORMATS: [&str; 4] = ["A4", "Letter", "Legal", "A3"];

/// Recognized overrides; `None` leaves the base value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_yaml: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_json: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<bool>,
}

impl CommandDelta {
    pub fn is_empty(&self) -> bool {
        self == &CommandDelta::default()
    }

    /// Overwrite the fields of `base` that this delta sets.
    pub fn apply(&self, base: &RenderConfig) -> RenderConfig {
        let mut config = base.clone();
        if let Some(css) = &self.css {
            config.css = Some(css.clone());
        }
        if let Some(name) = &self.output_name {
            config.output_name = Some(name.clone());
        }
        if let Some(format) = &self.page_format {
            config.page_format = format.clone();
        }
        if let Some(orientation) = self.orientation {
            config.orientation = orientation;
        }
        if let Some(path) = &self.export_path {
            config.export_path = Some(path.clone());
        }
        if let Some(title) = &self.title {
            config.title = Some(title.clone());
        }
        config.highlight = self.highlight.unwrap_or(config.highlight);
        config.export_yaml = self.export_yaml.unwrap_or(config.export_yaml);
        config.export_json = self.export_json.unwrap_or(config.export_json);
        config.debug = self.debug.unwrap_or(config.debug);
        config.pdf = self.pdf.unwrap_or(config.pdf);
        config.html = self.html.unwrap_or(config.html);
        config
    }
}

/// The first command string present in `metadata`, with the key it was found under.
///
/// A sequence of strings is joined with spaces. Any other value type is reported and ignored.
pub fn command_source(
    metadata: &Mapping,
    diagnostics: &mut Diagnostics,
) -> Option<(&'static str, String)> {
    let (key, value) = COMMAND_KEYS
        .iter()
        .find_map(|key| metadata.get(*key).map(|value| (*key, value)))?;

    match value {
        Value::String(text) => Some((key, text.clone())),
        Value::Sequence(items) if items.iter().all(|item| item.as_str().is_some()) => {
            let joined: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            Some((key, joined.join(" ")))
        }
        Value::Null => None,
        other => {
            diagnostics.push(Diagnostic::warning(
                DiagnosticCode::MalformedCommand,
                STEP,
                format!("'{}' must be a string, found {}", key, other.kind()),
            ));
            None
        }
    }
}

/// Split a command string on whitespace. Quoted runs keep their spaces and lose their quotes.
///
/// Returns the tokens and whether a quote was left open.
pub fn tokenize(source: &str) -> (Vec<String>, bool) {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for ch in source.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                in_token = true;
            }
            None if ch.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(ch);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    (tokens, quote.is_some())
}

/// True when `path` stays inside the directory it is resolved against.
pub fn is_safe_path(path: &str) -> bool {
    if path.starts_with('/') || path.starts_with('\\') {
        return false;
    }
    let mut chars = path.chars();
    if let (Some(drive), Some(':')) = (chars.next(), chars.next()) {
        if drive.is_ascii_alphabetic() {
            return false;
        }
    }
    !path.split(['/', '\\']).any(|segment| segment == "..")
}

enum Kind {
    Flag(fn(&mut CommandDelta)),
    Value(fn(&mut CommandDelta, String)),
    Path(fn(&mut CommandDelta, String)),
}

fn option(name: &str) -> Option<Kind> {
    let kind = match name {
        "--css" => Kind::Path(|d, v| d.css = Some(v)),
        "--output-name" | "-o" => Kind::Path(|d, v| d.output_name = Some(v)),
        "--export-path" => Kind::Path(|d, v| d.export_path = Some(v)),
        "--format" => Kind::Value(|d, v| d.page_format = Some(v)),
        "--title" => Kind::Value(|d, v| d.title = Some(v)),
        "--highlight" => Kind::Flag(|d| d.highlight = Some(true)),
        "--export-yaml" => Kind::Flag(|d| d.export_yaml = Some(true)),
        "--export-json" => Kind::Flag(|d| d.export_json = Some(true)),
        "--debug" => Kind::Flag(|d| d.debug = Some(true)),
        "--landscape" => Kind::Flag(|d| d.orientation = Some(Orientation::Landscape)),
        "--portrait" => Kind::Flag(|d| d.orientation = Some(Orientation::Portrait)),
        "--pdf" => Kind::Flag(|d| d.pdf = Some(true)),
        "--html" => Kind::Flag(|d| d.html = Some(true)),
        _ => return None,
    };
    Some(kind)
}

fn takes_value(token: &str) -> bool {
    !token.starts_with('-')
}

/// Parse and validate a command string.
pub fn parse_commands(source: &str, diagnostics: &mut Diagnostics) -> CommandDelta {
    let (tokens, unterminated) = tokenize(source);
    if unterminated {
        diagnostics.push(Diagnostic::warning(
            DiagnosticCode::MalformedCommand,
            STEP,
            "unterminated quote in command string",
        ));
    }

    let mut delta = CommandDelta::default();
    let mut tokens = tokens.into_iter().peekable();

    while let Some(token) = tokens.next() {
        // `--name=value` is the same as `--name value`
        let (name, inline_value) = match token.split_once('=') {
            Some((name, value)) if name.starts_with('-') => {
                (name.to_string(), Some(value.to_string()))
            }
            _ => (token.clone(), None),
        };

        if let Some((_, has_value)) = PROTECTED.iter().find(|(protected, _)| *protected == name) {
            if *has_value && inline_value.is_none() {
                tokens.next_if(|next| takes_value(next));
            }
            diagnostics.push(Diagnostic::warning(
                DiagnosticCode::ProtectedCommandRejected,
                STEP,
                format!("'{}' cannot be set from a document", name),
            ));
            continue;
        }

        let Some(kind) = option(&name) else {
            diagnostics.push(Diagnostic::warning(
                DiagnosticCode::UnknownCommand,
                STEP,
                format!("unknown command '{}'", name),
            ));
            continue;
        };

        let setter = match kind {
            Kind::Flag(set) => {
                if inline_value.is_some() {
                    diagnostics.push(Diagnostic::warning(
                        DiagnosticCode::MalformedCommand,
                        STEP,
                        format!("'{}' does not take a value", name),
                    ));
                } else {
                    set(&mut delta);
                }
                continue;
            }
            Kind::Value(set) => (set, false),
            Kind::Path(set) => (set, true),
        };

        let value = inline_value.or_else(|| tokens.next_if(|next| takes_value(next)));
        let Some(value) = value.filter(|value| !value.is_empty()) else {
            diagnostics.push(Diagnostic::warning(
                DiagnosticCode::MalformedCommand,
                STEP,
                format!("'{}' requires a value", name),
            ));
            continue;
        };

        let (set, is_path) = setter;
        if is_path && !is_safe_path(&value) {
            diagnostics.push(Diagnostic::warning(
                DiagnosticCode::UnsafePathRejected,
                STEP,
                format!("'{} {}' points outside the document directory", name, value),
            ));
            continue;
        }
        if name == "--format" {
            match PAGE_FORMATS.iter().find(|f| f.eq_ignore_ascii_case(&value)) {
                Some(format) => set(&mut delta, format.to_string()),
                None => diagnostics.push(Diagnostic::warning(
                    DiagnosticCode::MalformedCommand,
                    STEP,
                    format!("unknown page format '{}'", value),
                )),
            }
            continue;
        }
        set(&mut delta, value);
    }

    delta
}
