//! Import resolution
//!
//! A line whose trimmed text is `@import <path>` is replaced by the body of the named document.
//! Paths are relative to the directory of the document containing the directive. The imported
//! document's own imports are expanded first, then its metadata is merged into the importer's:
//!
//! - keys the importer already holds keep the importer's value (this includes keys brought in by
//!   earlier sibling imports)
//! - reserved keys (header formats, embedded commands, output paths) are never imported
//! - with type validation on, a colliding key of a different shape is reported
//!
//! The recursion carries its ancestor chain explicitly. An import of a document already on the
//! chain is refused with a `CircularImport` error and an inline marker; a missing document gets
//! a marker too, and its siblings are still processed.

use crate::legal::config::ResolveOptions;
use crate::legal::diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use crate::legal::error::ReadError;
use crate::legal::frontmatter;
use crate::legal::loader::{normalize_path, resolve_relative, SourceReader};
use crate::legal::value::Mapping;
use std::path::{Path, PathBuf};

const STEP: &str = "imports";

/// Result of a metadata merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub metadata: Mapping,
    /// Reserved keys removed from the imported metadata.
    pub reserved: Vec<String>,
    /// Colliding keys whose imported value had an incompatible shape.
    pub conflicts: Vec<String>,
}

/// Merge `imported` under `current`: the current value wins every collision.
pub fn merge_metadata(
    current: &Mapping,
    imported: Mapping,
    options: &ResolveOptions,
) -> MergeOutcome {
    let mut outcome = MergeOutcome {
        metadata: current.clone(),
        ..MergeOutcome::default()
    };

    for (key, value) in imported {
        if options.is_reserved(&key) {
            outcome.reserved.push(key);
            continue;
        }
        match current.get(&key) {
            Some(existing) => {
                if options.validate_import_types && !existing.is_compatible_with(&value) {
                    outcome.conflicts.push(key);
                }
            }
            None => {
                outcome.metadata.insert(key, value);
            }
        }
    }
    outcome
}

/// Target of an `@import` directive line, unquoted.
pub fn import_target(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix("@import")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let target = rest.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| target.strip_prefix(*q).and_then(|t| t.strip_suffix(*q)))
        .unwrap_or(target);
    (!unquoted.is_empty()).then_some(unquoted)
}

/// Expanded body, merged metadata and every document that was pulled in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Imported {
    pub content: String,
    pub metadata: Mapping,
    pub files: Vec<PathBuf>,
}

pub struct ImportResolver<'a> {
    reader: &'a dyn SourceReader,
    options: &'a ResolveOptions,
}

impl<'a> ImportResolver<'a> {
    pub fn new(reader: &'a dyn SourceReader, options: &'a ResolveOptions) -> Self {
        Self { reader, options }
    }

    /// Expand all imports in the body of the document at `path`.
    pub fn resolve(
        &self,
        body: &str,
        metadata: Mapping,
        path: &Path,
        diagnostics: &mut Diagnostics,
    ) -> Imported {
        let mut files = Vec::new();
        let ancestors = vec![self.reader.canonicalize(&normalize_path(path))];
        let (content, metadata) =
            self.expand(body, metadata, path, &ancestors, diagnostics, &mut files);
        tracing::debug!(imports = files.len(), "imports resolved");
        Imported {
            content,
            metadata,
            files,
        }
    }

    fn expand(
        &self,
        body: &str,
        mut metadata: Mapping,
        path: &Path,
        ancestors: &[PathBuf],
        diagnostics: &mut Diagnostics,
        files: &mut Vec<PathBuf>,
    ) -> (String, Mapping) {
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let mut lines = Vec::new();
        let mut in_fence = false;

        for line in body.split('\n') {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
            }
            let target = match import_target(line) {
                Some(target) if !in_fence => target,
                _ => {
                    lines.push(line.to_string());
                    continue;
                }
            };

            let child_path = normalize_path(&resolve_relative(base_dir, target));
            let canonical = self.reader.canonicalize(&child_path);

            if ancestors.contains(&canonical) {
                diagnostics.push(Diagnostic::error(
                    DiagnosticCode::CircularImport,
                    STEP,
                    format!(
                        "'{}' imports '{}', which is already being imported",
                        path.display(),
                        target
                    ),
                ));
                lines.push(format!("<!-- import error: circular: {} -->", target));
                continue;
            }

            if ancestors.len() > self.options.max_import_depth {
                diagnostics.push(Diagnostic::error(
                    DiagnosticCode::ImportDepthExceeded,
                    STEP,
                    format!(
                        "'{}' exceeds the maximum import depth of {}",
                        target, self.options.max_import_depth
                    ),
                ));
                lines.push(format!("<!-- import error: depth exceeded: {} -->", target));
                continue;
            }

            let raw = match self.reader.read(&child_path) {
                Ok(raw) => raw,
                Err(err) => {
                    let message = match &err {
                        ReadError::NotFound(_) => {
                            format!("'{}' not found at {}", target, err.path().display())
                        }
                        ReadError::Io { .. } => err.to_string(),
                    };
                    diagnostics.push(Diagnostic::error(
                        DiagnosticCode::ImportNotFound,
                        STEP,
                        message,
                    ));
                    lines.push(format!("<!-- import error: not found: {} -->", target));
                    continue;
                }
            };

            // imported frontmatter is always parsed leniently
            let document = match frontmatter::extract(&raw, false) {
                Ok(document) => document,
                Err(err) => frontmatter::Frontmatter {
                    metadata: Mapping::new(),
                    body: raw.clone(),
                    error: Some(err),
                },
            };
            if let Some(err) = &document.error {
                diagnostics.push(Diagnostic::warning(
                    DiagnosticCode::ParseError,
                    STEP,
                    format!("frontmatter of '{}': {}", target, err),
                ));
            }

            files.push(child_path.clone());
            let mut chain = ancestors.to_vec();
            chain.push(canonical);
            let (child_body, child_metadata) = self.expand(
                &document.body,
                document.metadata,
                &child_path,
                &chain,
                diagnostics,
                files,
            );

            let outcome = merge_metadata(&metadata, child_metadata, self.options);
            for key in &outcome.reserved {
                tracing::debug!(key = %key, source = %target, "dropped reserved key from import");
                diagnostics.push(Diagnostic::info(
                    DiagnosticCode::ReservedKeyDropped,
                    STEP,
                    format!("reserved key '{}' from '{}' was not imported", key, target),
                ));
            }
            for key in &outcome.conflicts {
                diagnostics.push(Diagnostic::warning(
                    DiagnosticCode::TypeConflict,
                    STEP,
                    format!(
                        "'{}' from '{}' has a different shape than the current value; kept current",
                        key, target
                    ),
                ));
            }
            metadata = outcome.metadata;

            let child_body = child_body.strip_suffix('\n').unwrap_or(&child_body);
            if self.options.import_tracing {
                lines.push(format!("<!-- start import: {} -->", target));
                lines.push(child_body.to_string());
                lines.push(format!("<!-- end import: {} -->", target));
            } else {
                lines.push(child_body.to_string());
            }
        }

        (lines.join("\n"), metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legal::loader::MemoryReader;
    use crate::legal::value::Value;

    fn resolve_with(
        reader: &MemoryReader,
        options: &ResolveOptions,
        root: &str,
    ) -> (Imported, Diagnostics) {
        let raw = reader.read(Path::new(root)).unwrap();
        let document = frontmatter::extract(&raw, false).unwrap();
        let mut diagnostics = Diagnostics::new();
        let imported = ImportResolver::new(reader, options).resolve(
            &document.body,
            document.metadata,
            Path::new(root),
            &mut diagnostics,
        );
        (imported, diagnostics)
    }

    #[test]
    fn recognizes_directives() {
        assert_eq!(import_target("@import clauses/nda.md"), Some("clauses/nda.md"));
        assert_eq!(import_target("  @import \"a b.md\"  "), Some("a b.md"));
        assert_eq!(import_target("@import 'x.md'"), Some("x.md"));
        assert_eq!(import_target("@imports x.md"), None);
        assert_eq!(import_target("see @import x.md"), None);
        assert_eq!(import_target("@import"), None);
    }

    #[test]
    fn splices_bodies_and_merges_metadata() {
        let reader = MemoryReader::new()
            .with_file("doc/main.md", "---\nclient: Root\n---\nStart\n@import parts/a.md\nEnd")
            .with_file("doc/parts/a.md", "---\nclient: A\njurisdiction: CA\n---\nPart A\n");
        let (imported, diagnostics) = resolve_with(&reader, &ResolveOptions::default(), "doc/main.md");

        assert_eq!(imported.content, "Start\nPart A\nEnd");
        assert_eq!(imported.metadata.get("client"), Some(&Value::from("Root")));
        assert_eq!(imported.metadata.get("jurisdiction"), Some(&Value::from("CA")));
        assert_eq!(imported.files, vec![PathBuf::from("doc/parts/a.md")]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn nested_imports_resolve_relative_to_their_file() {
        let reader = MemoryReader::new()
            .with_file("main.md", "@import sub/a.md")
            .with_file("sub/a.md", "---\nfrom_a: 1\n---\nA\n@import b.md")
            .with_file("sub/b.md", "---\nfrom_b: 2\nfrom_a: 99\n---\nB");
        let (imported, _) = resolve_with(&reader, &ResolveOptions::default(), "main.md");

        assert_eq!(imported.content, "A\nB");
        assert_eq!(imported.metadata.get("from_a"), Some(&Value::Number(1.0)));
        assert_eq!(imported.metadata.get("from_b"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn first_sibling_wins_new_keys() {
        let reader = MemoryReader::new()
            .with_file("main.md", "@import a.md\n@import b.md")
            .with_file("a.md", "---\nshared: from-a\n---\na")
            .with_file("b.md", "---\nshared: from-b\n---\nb");
        let (imported, _) = resolve_with(&reader, &ResolveOptions::default(), "main.md");
        assert_eq!(imported.metadata.get("shared"), Some(&Value::from("from-a")));
    }

    #[test]
    fn cycles_are_refused_once() {
        let reader = MemoryReader::new()
            .with_file("a.md", "A\n@import b.md")
            .with_file("b.md", "B\n@import a.md");
        let (imported, diagnostics) = resolve_with(&reader, &ResolveOptions::default(), "a.md");

        assert_eq!(imported.content, "A\nB\n<!-- import error: circular: a.md -->");
        assert_eq!(diagnostics.with_code(DiagnosticCode::CircularImport).len(), 1);
    }

    #[test]
    fn missing_files_do_not_stop_siblings() {
        let reader = MemoryReader::new()
            .with_file("main.md", "@import gone.md\n@import here.md")
            .with_file("here.md", "here");
        let (imported, diagnostics) = resolve_with(&reader, &ResolveOptions::default(), "main.md");

        assert_eq!(
            imported.content,
            "<!-- import error: not found: gone.md -->\nhere"
        );
        let missing = diagnostics.with_code(DiagnosticCode::ImportNotFound);
        assert_eq!(missing.len(), 1);
        assert!(missing[0].message.starts_with("'gone.md' not found at "));
        assert!(missing[0].message.ends_with("gone.md"));
    }

    #[test]
    fn reserved_keys_and_type_conflicts_are_dropped() {
        let reader = MemoryReader::new()
            .with_file("main.md", "---\nparties: [A, B]\n---\n@import x.md")
            .with_file(
                "x.md",
                "---\nlevel-one: 'Chapter %n'\nforce_commands: --pdf\nparties:\n  buyer: X\n---\nx",
            );
        let (imported, diagnostics) = resolve_with(&reader, &ResolveOptions::default(), "main.md");

        assert!(imported.metadata.get("level-one").is_none());
        assert!(imported.metadata.get("force_commands").is_none());
        assert!(imported.metadata.get("parties").unwrap().as_sequence().is_some());
        assert_eq!(diagnostics.with_code(DiagnosticCode::ReservedKeyDropped).len(), 2);
        assert_eq!(diagnostics.with_code(DiagnosticCode::TypeConflict).len(), 1);
    }

    #[test]
    fn depth_limit_is_enforced() {
        let reader = MemoryReader::new()
            .with_file("0.md", "@import 1.md")
            .with_file("1.md", "@import 2.md")
            .with_file("2.md", "deep");
        let options = ResolveOptions {
            max_import_depth: 1,
            ..ResolveOptions::default()
        };
        let (imported, diagnostics) = resolve_with(&reader, &options, "0.md");
        assert_eq!(imported.content, "<!-- import error: depth exceeded: 2.md -->");
        assert!(diagnostics.has_code(DiagnosticCode::ImportDepthExceeded));
    }

    #[test]
    fn tracing_markers_wrap_content() {
        let reader = MemoryReader::new()
            .with_file("main.md", "@import a.md")
            .with_file("a.md", "body\n");
        let options = ResolveOptions {
            import_tracing: true,
            ..ResolveOptions::default()
        };
        let (imported, _) = resolve_with(&reader, &options, "main.md");
        assert_eq!(
            imported.content,
            "<!-- start import: a.md -->\nbody\n<!-- end import: a.md -->"
        );
    }

    #[test]
    fn merge_is_pure() {
        let mut current = Mapping::new();
        current.insert("a".into(), Value::from("keep"));
        let mut imported = Mapping::new();
        imported.insert("a".into(), Value::from("lose"));
        imported.insert("b".into(), Value::from("new"));

        let outcome = merge_metadata(&current, imported, &ResolveOptions::default());
        assert_eq!(current.len(), 1);
        assert_eq!(outcome.metadata.get("a"), Some(&Value::from("keep")));
        assert_eq!(outcome.metadata.get("b"), Some(&Value::from("new")));
    }
}
