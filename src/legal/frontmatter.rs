//! YAML frontmatter extraction
//!
//! A document may start with a metadata block delimited by `---` lines:
//!
//! ```text
//! ---
//! title: Services Agreement
//! level-one: "Article %n."
//! ---
//! l. Definitions
//! ```
//!
//! The closing delimiter may also be `...`. The extractor never fails in lenient mode: a
//! malformed block yields empty metadata and the error is carried alongside the body so the
//! pipeline can report it. In strict mode the error is returned instead.

use crate::legal::error::FrontmatterError;
use crate::legal::value::{Mapping, Value};

/// Result of splitting a document into metadata and body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frontmatter {
    pub metadata: Mapping,
    pub body: String,
    /// Set in lenient mode when the block could not be parsed.
    pub error: Option<FrontmatterError>,
}

/// Split `raw` into metadata and body.
pub fn extract(raw: &str, strict: bool) -> Result<Frontmatter, FrontmatterError> {
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    let Some(block) = split_block(text) else {
        return Ok(Frontmatter {
            metadata: Mapping::new(),
            body: text.to_string(),
            error: None,
        });
    };

    let (yaml, body) = match block {
        Ok(parts) => parts,
        Err(err) => return lenient_or_fail(err, text.to_string(), strict),
    };

    match parse_yaml(yaml) {
        Ok(metadata) => Ok(Frontmatter {
            metadata,
            body: body.to_string(),
            error: None,
        }),
        Err(err) => lenient_or_fail(err, body.to_string(), strict),
    }
}

fn lenient_or_fail(
    err: FrontmatterError,
    body: String,
    strict: bool,
) -> Result<Frontmatter, FrontmatterError> {
    if strict {
        Err(err)
    } else {
        Ok(Frontmatter {
            metadata: Mapping::new(),
            body,
            error: Some(err),
        })
    }
}

/// Locate the frontmatter block. `None` when the document has no opening delimiter.
fn split_block(text: &str) -> Option<Result<(&str, &str), FrontmatterError>> {
    let first_end = text.find('\n').unwrap_or(text.len());
    if text[..first_end].trim_end() != "---" {
        return None;
    }

    let rest_start = (first_end + 1).min(text.len());
    let rest = &text[rest_start..];
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some(Ok((yaml, body)));
        }
        offset += line.len();
    }

    Some(Err(FrontmatterError::Unterminated))
}

fn parse_yaml(yaml: &str) -> Result<Mapping, FrontmatterError> {
    if yaml.trim().is_empty() {
        return Ok(Mapping::new());
    }
    let parsed: serde_yaml::Value =
        serde_yaml::from_str(yaml).map_err(|err| FrontmatterError::Malformed {
            // +1 for the opening delimiter line
            line: err.location().map(|loc| loc.line() + 1).unwrap_or(1),
            message: err.to_string(),
        })?;

    match Value::from_yaml(parsed) {
        Value::Mapping(map) => Ok(map),
        Value::Null => Ok(Mapping::new()),
        other => Err(FrontmatterError::NotAMapping(other.kind().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_metadata_and_body() {
        let fm = extract("---\ntitle: NDA\nparties: [A, B]\n---\nBody text\n", false).unwrap();
        assert_eq!(fm.metadata.get("title"), Some(&Value::String("NDA".into())));
        assert_eq!(fm.body, "Body text\n");
        assert!(fm.error.is_none());
    }

    #[test]
    fn no_frontmatter_keeps_whole_text() {
        let fm = extract("l. Intro\n", false).unwrap();
        assert!(fm.metadata.is_empty());
        assert_eq!(fm.body, "l. Intro\n");
    }

    #[test]
    fn dotted_closing_delimiter() {
        let fm = extract("---\na: 1\n...\nrest", false).unwrap();
        assert_eq!(fm.metadata.get("a"), Some(&Value::Number(1.0)));
        assert_eq!(fm.body, "rest");
    }

    #[test]
    fn malformed_yaml_is_lenient_by_default() {
        let fm = extract("---\na: [unclosed\n---\nBody\n", false).unwrap();
        assert!(fm.metadata.is_empty());
        assert_eq!(fm.body, "Body\n");
        assert!(matches!(fm.error, Some(FrontmatterError::Malformed { .. })));
    }

    #[test]
    fn malformed_yaml_fails_in_strict_mode() {
        let err = extract("---\na: [unclosed\n---\nBody\n", true).unwrap_err();
        assert!(matches!(err, FrontmatterError::Malformed { .. }));
    }

    #[test]
    fn unterminated_block() {
        assert_eq!(
            extract("---\na: 1\n", true).unwrap_err(),
            FrontmatterError::Unterminated
        );
        let fm = extract("---\na: 1\n", false).unwrap();
        assert_eq!(fm.error, Some(FrontmatterError::Unterminated));
    }

    #[test]
    fn scalar_frontmatter_is_rejected() {
        let err = extract("---\njust a string\n---\n", true).unwrap_err();
        assert!(matches!(err, FrontmatterError::NotAMapping(_)));
    }
}
