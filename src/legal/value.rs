//! Metadata values
//!
//! Document metadata is a loosely typed tree coming out of YAML frontmatter. Every stage of the
//! pipeline reads it through the closed [`Value`] type so that path lookups, truthiness and the
//! structural checks performed while merging imports are exhaustive.
//!
//! Mappings keep insertion order ([`indexmap::IndexMap`]), which matters for loops over objects
//! and for the "first writer wins" merge policy of the import resolver.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered key/value mapping used for document metadata.
pub type Mapping = IndexMap<String, Value>;

/// A dynamically typed metadata value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Sequence(Vec<Value>),
    Mapping(Mapping),
}

/// Coarse structural kind, used to detect incompatible overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Scalar,
    Sequence,
    Mapping,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Null => write!(f, "null"),
            ValueKind::Scalar => write!(f, "scalar"),
            ValueKind::Sequence => write!(f, "sequence"),
            ValueKind::Mapping => write!(f, "mapping"),
        }
    }
}

/// One step of a metadata path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{}", key),
            PathSegment::Index(index) => write!(f, "[{}]", index),
        }
    }
}

/// Parse a dotted/indexed path such as `parties[0].name` or `client.address.city`.
///
/// Returns `None` for empty paths or unbalanced brackets.
pub fn parse_path(path: &str) -> Option<Vec<PathSegment>> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = trimmed.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '.' => {
                if !current.is_empty() {
                    segments.push(key_or_index(std::mem::take(&mut current)));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(key_or_index(std::mem::take(&mut current)));
                }
                let mut inner = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == ']' {
                        closed = true;
                        break;
                    }
                    inner.push(next);
                }
                if !closed {
                    return None;
                }
                let inner = inner.trim().trim_matches(|c| c == '"' || c == '\'');
                segments.push(key_or_index(inner.to_string()));
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() {
        segments.push(key_or_index(current));
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments)
    }
}

fn key_or_index(raw: String) -> PathSegment {
    match raw.parse::<usize>() {
        Ok(index) => PathSegment::Index(index),
        Err(_) => PathSegment::Key(raw),
    }
}

/// Render a path back into its canonical dotted form.
pub fn path_to_string(path: &[PathSegment]) -> String {
    let mut out = String::new();
    for (i, segment) in path.iter().enumerate() {
        match segment {
            PathSegment::Key(key) => {
                if i > 0 {
                    out.push('.');
                }
                out.push_str(key);
            }
            PathSegment::Index(index) => out.push_str(&format!("[{}]", index)),
        }
    }
    out
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) | Value::Number(_) | Value::String(_) => ValueKind::Scalar,
            Value::Sequence(_) => ValueKind::Sequence,
            Value::Mapping(_) => ValueKind::Mapping,
        }
    }

    /// Two values are structurally compatible when they share a kind or either is null.
    pub fn is_compatible_with(&self, other: &Value) -> bool {
        let (a, b) = (self.kind(), other.kind());
        a == ValueKind::Null || b == ValueKind::Null || a == b
    }

    /// Truthiness shared by clauses and template conditionals.
    ///
    /// Null, `false`, zero, NaN, the empty string and empty collections are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Sequence(items) => !items.is_empty(),
            Value::Mapping(map) => !map.is_empty(),
        }
    }

    /// A value counts as empty for field tracking when it renders to nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            Value::Sequence(items) => items.is_empty(),
            Value::Mapping(map) => map.is_empty(),
            Value::Bool(_) | Value::Number(_) => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Value::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a single segment.
    pub fn get_segment(&self, segment: &PathSegment) -> Option<&Value> {
        match (self, segment) {
            (Value::Mapping(map), PathSegment::Key(key)) => map.get(key),
            (Value::Mapping(map), PathSegment::Index(index)) => map.get(&index.to_string()),
            (Value::Sequence(items), PathSegment::Index(index)) => items.get(*index),
            _ => None,
        }
    }

    /// Walk a full path, returning a borrowed value when every step exists.
    pub fn lookup(&self, path: &[PathSegment]) -> Option<&Value> {
        path.iter()
            .try_fold(self, |current, segment| current.get_segment(segment))
    }

    /// Walk a path that may end in the computed `length` property of a sequence or string.
    pub fn lookup_owned(&self, path: &[PathSegment]) -> Option<Value> {
        let (last, prefix) = path.split_last()?;
        let parent = self.lookup(prefix)?;
        if let Some(found) = parent.get_segment(last) {
            return Some(found.clone());
        }
        match (parent, last) {
            (Value::Sequence(items), PathSegment::Key(key)) if key == "length" => {
                Some(Value::Number(items.len() as f64))
            }
            (Value::String(s), PathSegment::Key(key)) if key == "length" => {
                Some(Value::Number(s.chars().count() as f64))
            }
            _ => None,
        }
    }

    /// Render the value as document text.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Sequence(items) => items
                .iter()
                .map(Value::render)
                .collect::<Vec<_>>()
                .join(", "),
            Value::Mapping(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }

    /// Convert a parsed YAML document into a metadata value.
    ///
    /// Non-string mapping keys are stringified; YAML tags are dropped.
    pub fn from_yaml(yaml: serde_yaml::Value) -> Value {
        match yaml {
            serde_yaml::Value::Null => Value::Null,
            serde_yaml::Value::Bool(b) => Value::Bool(b),
            serde_yaml::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_yaml::Value::String(s) => Value::String(s),
            serde_yaml::Value::Sequence(items) => {
                Value::Sequence(items.into_iter().map(Value::from_yaml).collect())
            }
            serde_yaml::Value::Mapping(map) => {
                let mut out = Mapping::new();
                for (key, value) in map {
                    out.insert(yaml_key(key), Value::from_yaml(value));
                }
                Value::Mapping(out)
            }
            serde_yaml::Value::Tagged(tagged) => Value::from_yaml(tagged.value),
        }
    }
}

fn yaml_key(key: serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Null => "null".to_string(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Format a number without a trailing `.0` when it is integral.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Sequence(items)
    }
}

impl From<Mapping> for Value {
    fn from(map: Mapping) -> Self {
        Value::Mapping(map)
    }
}
