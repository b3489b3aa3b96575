//! Processing diagnostics
//!
//! Every recoverable problem found while resolving a document is reported as a [`Diagnostic`]
//! rather than an error: the caller always receives best-effort output plus the complete list.
//! Diagnostics are tagged with the stage that produced them so that a front end can group them.
//!
//! Warnings and errors are mirrored to `tracing` as they are recorded.

use serde::Serialize;
use std::fmt;

/// Diagnostic severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticSeverity::Error => write!(f, "error"),
            DiagnosticSeverity::Warning => write!(f, "warning"),
            DiagnosticSeverity::Info => write!(f, "info"),
        }
    }
}

/// Machine-readable diagnostic kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticCode {
    ParseError,
    ImportNotFound,
    CircularImport,
    ImportDepthExceeded,
    ReservedKeyDropped,
    TypeConflict,
    InvalidHeaderLevel,
    MalformedHeaderFormat,
    UnresolvedCondition,
    UnresolvedReference,
    DuplicateAnchor,
    MalformedExpression,
    UnresolvedExpression,
    UnknownHelper,
    HelperFailed,
    UnbalancedBlock,
    ProtectedCommandRejected,
    UnsafePathRejected,
    UnknownCommand,
    MalformedCommand,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::ParseError => "parse-error",
            DiagnosticCode::ImportNotFound => "import-not-found",
            DiagnosticCode::CircularImport => "circular-import",
            DiagnosticCode::ImportDepthExceeded => "import-depth-exceeded",
            DiagnosticCode::ReservedKeyDropped => "reserved-key-dropped",
            DiagnosticCode::TypeConflict => "type-conflict",
            DiagnosticCode::InvalidHeaderLevel => "invalid-header-level",
            DiagnosticCode::MalformedHeaderFormat => "malformed-header-format",
            DiagnosticCode::UnresolvedCondition => "unresolved-condition",
            DiagnosticCode::UnresolvedReference => "unresolved-reference",
            DiagnosticCode::DuplicateAnchor => "duplicate-anchor",
            DiagnosticCode::MalformedExpression => "malformed-expression",
            DiagnosticCode::UnresolvedExpression => "unresolved-expression",
            DiagnosticCode::UnknownHelper => "unknown-helper",
            DiagnosticCode::HelperFailed => "helper-failed",
            DiagnosticCode::UnbalancedBlock => "unbalanced-block",
            DiagnosticCode::ProtectedCommandRejected => "protected-command-rejected",
            DiagnosticCode::UnsafePathRejected => "unsafe-path-rejected",
            DiagnosticCode::UnknownCommand => "unknown-command",
            DiagnosticCode::MalformedCommand => "malformed-command",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured diagnostic produced by a pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub message: String,
    pub step: String,
    pub severity: DiagnosticSeverity,
    pub recoverable: bool,
}

impl Diagnostic {
    pub fn new(
        code: DiagnosticCode,
        severity: DiagnosticSeverity,
        step: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            step: step.into(),
            severity,
            recoverable: true,
        }
    }

    pub fn error(code: DiagnosticCode, step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, DiagnosticSeverity::Error, step, message)
    }

    pub fn warning(
        code: DiagnosticCode,
        step: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(code, DiagnosticSeverity::Warning, step, message)
    }

    pub fn info(code: DiagnosticCode, step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, DiagnosticSeverity::Info, step, message)
    }

    pub fn fatal(mut self) -> Self {
        self.recoverable = false;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.severity, self.step, self.code, self.message
        )
    }
}

/// Ordered collection of diagnostics for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            DiagnosticSeverity::Error => {
                tracing::error!(code = %diagnostic.code, step = %diagnostic.step, "{}", diagnostic.message)
            }
            DiagnosticSeverity::Warning => {
                tracing::warn!(code = %diagnostic.code, step = %diagnostic.step, "{}", diagnostic.message)
            }
            DiagnosticSeverity::Info => {
                tracing::debug!(code = %diagnostic.code, step = %diagnostic.step, "{}", diagnostic.message)
            }
        }
        self.items.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        for diagnostic in other.items {
            self.push(diagnostic);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn with_code(&self, code: DiagnosticCode) -> Vec<&Diagnostic> {
        self.items.iter().filter(|d| d.code == code).collect()
    }

    pub fn has_code(&self, code: DiagnosticCode) -> bool {
        self.items.iter().any(|d| d.code == code)
    }

    pub fn has_errors(&self) -> bool {
        self.items
            .iter()
            .any(|d| d.severity == DiagnosticSeverity::Error)
    }

    /// First error-severity diagnostic at or after `from`.
    pub fn first_error_since(&self, from: usize) -> Option<&Diagnostic> {
        self.items
            .iter()
            .skip(from)
            .find(|d| d.severity == DiagnosticSeverity::Error)
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
