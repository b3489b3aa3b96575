//! Resolution pipeline
//!
//! A run threads one [`DocumentState`] through an ordered list of [`Stage`]s:
//!
//! ```text
//! frontmatter → imports → commands → headers → clauses → references → template
//! ```
//!
//! and finishes by taking the field report from the ledger. Stages mutate the state in place and
//! report problems as diagnostics. The only errors that stop a run are an unreadable root
//! document, malformed root frontmatter in strict mode, and (again in strict mode) the first
//! error diagnostic raised by a stage, which is checked at every stage boundary.
//!
//! The standard pipeline is built once and shared:
//!
//! ```rust,ignore
//! let resolution = STANDARD.run(DocumentState::new(raw, path, &FsReader, &options))?;
//! ```
//!
//! Most callers go through [`resolve`] / [`resolve_file`] or a configured [`Resolver`].

use crate::legal::clauses::process_clauses;
use crate::legal::commands::{command_source, parse_commands, CommandDelta};
use crate::legal::config::{RenderConfig, ResolveOptions};
use crate::legal::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::legal::error::ResolveError;
use crate::legal::fields::{FieldLedger, FieldReport};
use crate::legal::frontmatter;
use crate::legal::headers::{number_headers, HeaderNode, NumberingConfig};
use crate::legal::imports::ImportResolver;
use crate::legal::loader::{FsReader, SourceReader};
use crate::legal::references::{resolve_references, AnchorTable};
use crate::legal::template::{TemplateEngine, TemplateOptions};
use crate::legal::value::Mapping;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Everything a run knows about the document being resolved.
pub struct DocumentState<'a> {
    /// Raw text before the frontmatter stage, the working body afterwards.
    pub content: String,
    pub metadata: Mapping,
    /// Caller-supplied metadata; overrides root frontmatter keys.
    pub overrides: Mapping,
    pub path: PathBuf,
    pub reader: &'a dyn SourceReader,
    pub options: &'a ResolveOptions,
    pub render_config: RenderConfig,
    pub config_delta: CommandDelta,
    pub imported_files: Vec<PathBuf>,
    pub headers: Vec<HeaderNode>,
    pub anchors: AnchorTable,
    pub ledger: FieldLedger,
    pub diagnostics: Diagnostics,
}

impl<'a> DocumentState<'a> {
    pub fn new(
        raw: impl Into<String>,
        path: impl AsRef<Path>,
        reader: &'a dyn SourceReader,
        options: &'a ResolveOptions,
    ) -> Self {
        Self {
            content: raw.into(),
            metadata: Mapping::new(),
            overrides: Mapping::new(),
            path: path.as_ref().to_path_buf(),
            reader,
            options,
            render_config: RenderConfig::default(),
            config_delta: CommandDelta::default(),
            imported_files: Vec::new(),
            headers: Vec::new(),
            anchors: AnchorTable::new(),
            ledger: FieldLedger::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn with_overrides(mut self, overrides: Mapping) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_render_config(mut self, render_config: RenderConfig) -> Self {
        self.render_config = render_config;
        self
    }

    fn template_options(&self) -> TemplateOptions {
        TemplateOptions {
            missing_values: self.options.missing_values,
            highlight: self.options.highlight || self.render_config.highlight,
        }
    }
}

/// One step of the pipeline.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, state: &mut DocumentState) -> Result<(), ResolveError>;
}

/// Splits the raw text into metadata and body, then layers the caller's overrides on top.
pub struct FrontmatterStage;

impl Stage for FrontmatterStage {
    fn name(&self) -> &'static str {
        "frontmatter"
    }

    fn run(&self, state: &mut DocumentState) -> Result<(), ResolveError> {
        let document = frontmatter::extract(&state.content, state.options.strict)?;
        if let Some(err) = &document.error {
            state.diagnostics.push(Diagnostic::warning(
                DiagnosticCode::ParseError,
                self.name(),
                format!("{}: {}", state.path.display(), err),
            ));
        }
        state.content = document.body;
        state.metadata = document.metadata;
        for (key, value) in &state.overrides {
            state.metadata.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

pub struct ImportStage;

impl Stage for ImportStage {
    fn name(&self) -> &'static str {
        "imports"
    }

    fn run(&self, state: &mut DocumentState) -> Result<(), ResolveError> {
        let resolver = ImportResolver::new(state.reader, state.options);
        let metadata = std::mem::take(&mut state.metadata);
        let imported =
            resolver.resolve(&state.content, metadata, &state.path, &mut state.diagnostics);
        state.content = imported.content;
        state.metadata = imported.metadata;
        state.imported_files = imported.files;
        Ok(())
    }
}

/// Expands, parses and applies the embedded command string.
pub struct CommandStage;

impl Stage for CommandStage {
    fn name(&self) -> &'static str {
        "commands"
    }

    fn run(&self, state: &mut DocumentState) -> Result<(), ResolveError> {
        let Some((key, source)) = command_source(&state.metadata, &mut state.diagnostics) else {
            return Ok(());
        };
        // substitutions inside the command string are not document fields
        let mut scratch = FieldLedger::new();
        let expanded = TemplateEngine::new(state.template_options())
            .with_step("commands")
            .render(&source, &state.metadata, &mut scratch, &mut state.diagnostics);
        tracing::debug!(key, commands = %expanded, "applying force commands");

        let delta = parse_commands(&expanded, &mut state.diagnostics);
        state.render_config = delta.apply(&state.render_config);
        state.config_delta = delta;
        Ok(())
    }
}

pub struct HeaderStage;

impl Stage for HeaderStage {
    fn name(&self) -> &'static str {
        "headers"
    }

    fn run(&self, state: &mut DocumentState) -> Result<(), ResolveError> {
        let config = NumberingConfig::from_metadata(&state.metadata, &mut state.diagnostics);
        let numbered = number_headers(&state.content, &config, &mut state.diagnostics);
        state.content = numbered.content;
        state.headers = numbered.headers;
        Ok(())
    }
}

pub struct ClauseStage;

impl Stage for ClauseStage {
    fn name(&self) -> &'static str {
        "clauses"
    }

    fn run(&self, state: &mut DocumentState) -> Result<(), ResolveError> {
        state.content =
            process_clauses(&state.content, &state.metadata, &mut state.diagnostics);
        Ok(())
    }
}

pub struct ReferenceStage;

impl Stage for ReferenceStage {
    fn name(&self) -> &'static str {
        "references"
    }

    fn run(&self, state: &mut DocumentState) -> Result<(), ResolveError> {
        let (content, anchors) =
            resolve_references(&state.content, &state.headers, &mut state.diagnostics);
        state.content = content;
        state.anchors = anchors;
        Ok(())
    }
}

pub struct TemplateStage;

impl Stage for TemplateStage {
    fn name(&self) -> &'static str {
        "template"
    }

    fn run(&self, state: &mut DocumentState) -> Result<(), ResolveError> {
        state.ledger.reset();
        state.content = TemplateEngine::new(state.template_options()).render(
            &state.content,
            &state.metadata,
            &mut state.ledger,
            &mut state.diagnostics,
        );
        Ok(())
    }
}

/// Ordered list of stages.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// The full resolution pipeline.
    pub fn standard() -> Self {
        Pipeline::new()
            .then(FrontmatterStage)
            .then(ImportStage)
            .then(CommandStage)
            .then(HeaderStage)
            .then(ClauseStage)
            .then(ReferenceStage)
            .then(TemplateStage)
    }

    pub fn then(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn run(&self, mut state: DocumentState) -> Result<Resolution, ResolveError> {
        let span = tracing::info_span!("resolve", path = %state.path.display());
        let _guard = span.enter();

        for stage in &self.stages {
            let mark = state.diagnostics.len();
            stage.run(&mut state)?;
            tracing::debug!(
                stage = stage.name(),
                diagnostics = state.diagnostics.len() - mark,
                "stage finished"
            );
            if state.options.strict {
                if let Some(diagnostic) = state.diagnostics.first_error_since(mark) {
                    return Err(ResolveError::Strict(diagnostic.clone().fatal()));
                }
            }
        }

        Ok(Resolution::from_state(state))
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}

pub static STANDARD: Lazy<Pipeline> = Lazy::new(Pipeline::standard);

/// Output of a resolution run.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub content: String,
    pub metadata: Mapping,
    pub field_report: FieldReport,
    pub diagnostics: Vec<Diagnostic>,
    pub config_delta: CommandDelta,
    /// The base render configuration with the delta applied.
    pub render_config: RenderConfig,
    pub imported_files: Vec<PathBuf>,
    pub anchors: Mapping,
}

impl Resolution {
    fn from_state(state: DocumentState) -> Self {
        let anchors = state
            .anchors
            .iter()
            .map(|(key, number)| (key.to_string(), number.into()))
            .collect();
        Self {
            content: state.content,
            metadata: state.metadata,
            field_report: state.ledger.summary(),
            diagnostics: state.diagnostics.into_vec(),
            config_delta: state.config_delta,
            render_config: state.render_config,
            imported_files: state.imported_files,
            anchors,
        }
    }

    pub fn has_code(&self, code: DiagnosticCode) -> bool {
        self.diagnostics.iter().any(|d| d.code == code)
    }
}

/// A reader, options and base render configuration bundled for repeated runs.
pub struct Resolver<'a> {
    reader: &'a dyn SourceReader,
    options: ResolveOptions,
    render_config: RenderConfig,
}

impl<'a> Resolver<'a> {
    pub fn new(reader: &'a dyn SourceReader, options: ResolveOptions) -> Self {
        Self {
            reader,
            options,
            render_config: RenderConfig::default(),
        }
    }

    pub fn with_render_config(mut self, render_config: RenderConfig) -> Self {
        self.render_config = render_config;
        self
    }

    /// Resolve `raw`, treating it as the document stored at `path`.
    pub fn resolve(
        &self,
        raw: &str,
        path: impl AsRef<Path>,
        overrides: &Mapping,
    ) -> Result<Resolution, ResolveError> {
        let state = DocumentState::new(raw, path, self.reader, &self.options)
            .with_overrides(overrides.clone())
            .with_render_config(self.render_config.clone());
        STANDARD.run(state)
    }

    /// Read the root document through the reader and resolve it.
    pub fn resolve_file(
        &self,
        path: impl AsRef<Path>,
        overrides: &Mapping,
    ) -> Result<Resolution, ResolveError> {
        let raw = self.reader.read(path.as_ref())?;
        self.resolve(&raw, path, overrides)
    }
}

/// Resolve `raw` as the document at `base_path`, reading imports from the filesystem.
pub fn resolve(
    raw: &str,
    base_path: impl AsRef<Path>,
    root_metadata: &Mapping,
    options: &ResolveOptions,
) -> Result<Resolution, ResolveError> {
    Resolver::new(&FsReader, options.clone()).resolve(raw, base_path, root_metadata)
}

/// Read and resolve the document at `path` from the filesystem.
pub fn resolve_file(
    path: impl AsRef<Path>,
    root_metadata: &Mapping,
    options: &ResolveOptions,
) -> Result<Resolution, ResolveError> {
    Resolver::new(&FsReader, options.clone()).resolve_file(path, root_metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legal::config::{MissingValues, Orientation};
    use crate::legal::fields::FieldStatus;
    use crate::legal::loader::MemoryReader;
    use crate::legal::value::Value;

    fn run(reader: &MemoryReader, options: ResolveOptions, path: &str) -> Resolution {
        Resolver::new(reader, options)
            .resolve_file(path, &Mapping::new())
            .unwrap()
    }

    #[test]
    fn standard_stage_order() {
        assert_eq!(
            Pipeline::standard().stage_names(),
            vec![
                "frontmatter",
                "imports",
                "commands",
                "headers",
                "clauses",
                "references",
                "template"
            ]
        );
    }

    #[test]
    fn resolves_a_whole_document() {
        let reader = MemoryReader::new().with_file(
            "nda.md",
            "---\nclient: Acme\nlevel-one: '%n.'\nlevel-two: '%n.%n'\nmutual: false\n---\n\
             l. Parties |parties|\nThis agreement is with {{client}}.\n\
             ll. Obligations\n[Both parties agree.]{mutual}See |parties|.",
        );
        let resolution = run(&reader, ResolveOptions::default(), "nda.md");

        assert_eq!(
            resolution.content,
            "1. Parties\nThis agreement is with Acme.\n1.1 Obligations\nSee 1.."
        );
        assert_eq!(resolution.field_report.filled, 1);
        assert_eq!(resolution.anchors.get("parties"), Some(&Value::from("1.")));
        assert!(resolution.diagnostics.is_empty());
    }

    #[test]
    fn caller_metadata_overrides_frontmatter() {
        let reader = MemoryReader::new().with_file("a.md", "---\nclient: Acme\n---\n{{client}}");
        let mut overrides = Mapping::new();
        overrides.insert("client".into(), Value::from("Globex"));
        let resolution = Resolver::new(&reader, ResolveOptions::default())
            .resolve_file("a.md", &overrides)
            .unwrap();
        assert_eq!(resolution.content, "Globex");
    }

    #[test]
    fn missing_values_follow_policy() {
        let reader = MemoryReader::new().with_file("a.md", "Hello {{name}}!");
        let preserved = run(&reader, ResolveOptions::default(), "a.md");
        assert_eq!(preserved.content, "Hello {{name}}!");
        assert_eq!(preserved.field_report.empty, 1);

        let options = ResolveOptions {
            missing_values: MissingValues::Empty,
            ..ResolveOptions::default()
        };
        assert_eq!(run(&reader, options, "a.md").content, "Hello !");
    }

    #[test]
    fn force_commands_are_expanded_and_applied() {
        let reader = MemoryReader::new().with_file(
            "a.md",
            "---\nclient: acme\n\
             force_commands: --output-name \"{{client}}-nda\" --landscape --stdout\n---\nBody",
        );
        let resolution = run(&reader, ResolveOptions::default(), "a.md");
        assert_eq!(resolution.config_delta.output_name.as_deref(), Some("acme-nda"));
        assert_eq!(resolution.render_config.orientation, Orientation::Landscape);
        assert!(resolution.has_code(DiagnosticCode::ProtectedCommandRejected));
        // the command string does not count as a document field
        assert_eq!(resolution.field_report.total, 0);
    }

    #[test]
    fn highlight_command_switches_on_spans() {
        let reader = MemoryReader::new()
            .with_file("a.md", "---\nname: Ann\nforceCommands: --highlight\n---\n{{name}}");
        let resolution = run(&reader, ResolveOptions::default(), "a.md");
        assert_eq!(
            resolution.content,
            "<span class=\"imported-value\" data-field=\"name\">Ann</span>"
        );
        assert_eq!(resolution.field_report.fields[0].status, FieldStatus::Filled);
    }

    #[test]
    fn strict_mode_fails_on_root_frontmatter() {
        let reader = MemoryReader::new().with_file("a.md", "---\nkey: [unclosed\n---\nBody");
        let lenient = run(&reader, ResolveOptions::default(), "a.md");
        assert!(lenient.has_code(DiagnosticCode::ParseError));
        assert_eq!(lenient.content, "Body");

        let strict = ResolveOptions {
            strict: true,
            ..ResolveOptions::default()
        };
        let result = Resolver::new(&reader, strict).resolve_file("a.md", &Mapping::new());
        assert!(matches!(result, Err(ResolveError::Frontmatter(_))));
    }

    #[test]
    fn strict_mode_escalates_error_diagnostics() {
        let reader = MemoryReader::new().with_file("a.md", "@import missing.md");
        let strict = ResolveOptions {
            strict: true,
            ..ResolveOptions::default()
        };
        let result = Resolver::new(&reader, strict).resolve_file("a.md", &Mapping::new());
        match result {
            Err(ResolveError::Strict(diagnostic)) => {
                assert_eq!(diagnostic.code, DiagnosticCode::ImportNotFound);
                assert!(!diagnostic.recoverable);
            }
            other => panic!("expected strict failure, got {:?}", other.map(|r| r.content)),
        }
    }

    #[test]
    fn unreadable_root_is_fatal() {
        let reader = MemoryReader::new();
        let result = Resolver::new(&reader, ResolveOptions::default())
            .resolve_file("nowhere.md", &Mapping::new());
        assert!(matches!(result, Err(ResolveError::RootUnreadable(_))));
    }

    #[test]
    fn imported_headers_are_numbered_with_the_root() {
        let reader = MemoryReader::new()
            .with_file("main.md", "---\nlevel-one: 'Art. %n'\n---\nl. One\n@import part.md")
            .with_file("part.md", "---\nlevel-one: 'ignored %n'\n---\nl. Two");
        let resolution = run(&reader, ResolveOptions::default(), "main.md");
        assert_eq!(resolution.content, "Art. 1 One\nArt. 2 Two");
        assert!(resolution.has_code(DiagnosticCode::ReservedKeyDropped));
        assert_eq!(resolution.imported_files, vec![PathBuf::from("part.md")]);
    }
}
