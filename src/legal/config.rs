//! Configuration for resolution runs.
//!
//! The built-in settings ship as `defaults/legalmark.default.toml`, compiled into the crate and
//! checked against the `Default` impls below by a unit test. [`Loader`] stacks project files and
//! command-line overrides on top before producing a [`LegalmarkConfig`].
//!
//! Two groups live here: [`ResolveOptions`] steers the pipeline itself, [`RenderConfig`] is the
//! base configuration handed to renderers outside the core, which documents may adjust through
//! embedded force commands.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, ValueKind};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_TOML: &str = include_str!("../../defaults/legalmark.default.toml");

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegalmarkConfig {
    pub resolve: ResolveOptions,
    pub render: RenderConfig,
}

/// What to emit for a template path that resolves to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingValues {
    /// Leave the original `{{path}}` token in the output.
    #[default]
    Preserve,
    /// Render the empty string.
    Empty,
}

/// Knobs for one resolution run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResolveOptions {
    /// Frontmatter errors on the root document and error diagnostics become fatal.
    pub strict: bool,
    pub missing_values: MissingValues,
    /// Wrap template substitutions in field-highlighting spans.
    pub highlight: bool,
    /// Surround imported content with `<!-- start import -->` markers.
    pub import_tracing: bool,
    /// Drop imported values whose shape conflicts with the current value.
    pub validate_import_types: bool,
    pub max_import_depth: usize,
    /// Metadata keys an import may never introduce.
    pub reserved_keys: Vec<String>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            strict: false,
            missing_values: MissingValues::Preserve,
            highlight: false,
            import_tracing: false,
            validate_import_types: true,
            max_import_depth: 32,
            reserved_keys: default_reserved_keys(),
        }
    }
}

impl ResolveOptions {
    pub fn is_reserved(&self, key: &str) -> bool {
        self.reserved_keys.iter().any(|reserved| reserved == key)
    }
}

/// Keys that control numbering, embedded commands and output paths.
pub fn default_reserved_keys() -> Vec<String> {
    const LEVELS: [&str; 9] = [
        "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
    ];
    let mut keys: Vec<String> = LEVELS.iter().map(|l| format!("level-{}", l)).collect();
    keys.extend((1..=9).map(|n| format!("level-{}", n)));
    keys.extend(
        [
            "level-indent",
            "no-reset",
            "no-indent",
            "force_commands",
            "force-commands",
            "forceCommands",
            "commands",
            "output",
            "output-name",
            "output-path",
            "export-path",
            "css",
        ]
        .iter()
        .map(|k| k.to_string()),
    );
    keys
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Output configuration consumed by renderers; force commands overwrite its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub css: Option<String>,
    #[serde(default)]
    pub output_name: Option<String>,
    pub page_format: String,
    pub orientation: Orientation,
    pub highlight: bool,
    pub export_yaml: bool,
    pub export_json: bool,
    #[serde(default)]
    pub export_path: Option<String>,
    pub debug: bool,
    #[serde(default)]
    pub title: Option<String>,
    pub pdf: bool,
    pub html: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            css: None,
            output_name: None,
            page_format: "A4".to_string(),
            orientation: Orientation::Portrait,
            highlight: false,
            export_yaml: false,
            export_json: false,
            export_path: None,
            debug: false,
            title: None,
            pdf: false,
            html: false,
        }
    }
}

/// Layered settings for a resolution run: embedded defaults, then project or user TOML
/// files in the order added, then single-key overrides from the command line.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    pub fn new() -> Self {
        let builder = Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Self { builder }
    }

    /// Layer a settings file that must exist, such as one named by `--config`.
    pub fn with_file(self, path: impl AsRef<Path>) -> Self {
        self.layer(path.as_ref(), true)
    }

    /// Layer a settings file if present, such as `legalmark.toml` in the working directory.
    pub fn with_optional_file(self, path: impl AsRef<Path>) -> Self {
        self.layer(path.as_ref(), false)
    }

    fn layer(mut self, path: &Path, required: bool) -> Self {
        let source = File::from(path).format(FileFormat::Toml).required(required);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Override one dotted key, e.g. `resolve.strict`. Wins over every file layer.
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Merge all layers into a [`LegalmarkConfig`]. Unknown sections are ignored; a value of
    /// the wrong type fails here.
    pub fn build(self) -> Result<LegalmarkConfig, ConfigError> {
        self.builder.build()?.try_deserialize()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// The built-in settings with no file or override applied.
pub fn load_defaults() -> Result<LegalmarkConfig, ConfigError> {
    Loader::new().build()
}
