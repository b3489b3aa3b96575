//! Fatal error types
//!
//! Almost nothing in the resolution pipeline is fatal: problems are recorded as
//! [`Diagnostic`](crate::legal::diagnostics::Diagnostic)s. The types here cover the few cases
//! that abort a run, plus the typed errors raised by the collaborators (file reader and
//! frontmatter extractor) before the pipeline decides whether to recover from them.

use crate::legal::diagnostics::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Error raised by a [`SourceReader`](crate::legal::loader::SourceReader).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
}

impl ReadError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ReadError::NotFound(path) => path,
            ReadError::Io { path, .. } => path,
        }
    }
}

/// Error raised by the frontmatter extractor in strict mode.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrontmatterError {
    #[error("unterminated frontmatter block (missing closing `---`)")]
    Unterminated,
    #[error("malformed frontmatter at line {line}: {message}")]
    Malformed { line: usize, message: String },
    #[error("frontmatter must be a mapping, found {0}")]
    NotAMapping(String),
}

/// Errors that abort a whole resolution run
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("cannot read root document: {0}")]
    RootUnreadable(#[from] ReadError),
    #[error("root document frontmatter: {0}")]
    Frontmatter(#[from] FrontmatterError),
    #[error("strict mode: {0}")]
    Strict(Diagnostic),
}

/// Format the lines around a 1-based line number, marking the offending one.
///
/// Used to give frontmatter parse errors some context in CLI output.
pub fn format_source_context(source: &str, line: usize) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let error_line = line.saturating_sub(1);

    let start_line = error_line.saturating_sub(2);
    let end_line = (error_line + 3).min(lines.len());

    let mut context = String::new();
    for (line_num, text) in lines.iter().enumerate().take(end_line).skip(start_line) {
        let marker = if line_num == error_line { ">>" } else { "  " };
        context.push_str(&format!("{} {:3} | {}\n", marker, line_num + 1, text));
    }
    context
}
