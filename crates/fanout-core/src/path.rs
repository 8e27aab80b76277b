//! Property path evaluation over JSON values.
//!
//! Supports dot-separated keys, numeric array indices (`items.0.id`) and
//! bracket indices (`items[0].id`, `data["key"]`). The empty path selects the
//! whole value.

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Failure to parse or follow a property path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// Two separators in a row, or a leading/trailing separator.
    #[error("empty path segment")]
    EmptySegment,

    /// A `[` without a matching `]`.
    #[error("unclosed '['")]
    UnclosedBracket,

    /// A character that cannot appear where it was found.
    #[error("unexpected '{0}'")]
    UnexpectedChar(char),

    /// An object has no such key.
    #[error("key \"{0}\" not found")]
    MissingKey(String),

    /// An array is too short.
    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds {
        /// Requested index
        index: usize,
        /// Array length
        len: usize,
    },

    /// Traversal reached a scalar with segments left.
    #[error("cannot read \"{segment}\" from {kind}")]
    NotAContainer {
        /// The segment that could not be applied
        segment: String,
        /// JSON type of the value
        kind: &'static str,
    },
}

impl PathError {
    /// Returns `true` for syntax errors, `false` for lookup failures.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::EmptySegment | Self::UnclosedBracket | Self::UnexpectedChar(_))
    }
}

/// One step of a property path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Object key
    Key(String),
    /// Array index in canonical decimal form (also matches the same object key)
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

impl PathSegment {
    /// Only canonical digit strings become indices; `"007"` and `"+1"` stay keys.
    fn from_text(text: &str) -> Self {
        let canonical = text.bytes().all(|b| b.is_ascii_digit())
            && (text == "0" || !text.starts_with('0'));
        match text.parse::<usize>() {
            Ok(index) if canonical => Self::Index(index),
            _ => Self::Key(text.to_string()),
        }
    }
}

/// A parsed property path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PropertyPath {
    segments: Vec<PathSegment>,
}

impl PropertyPath {
    /// Parses `path`.
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let mut segments = Vec::new();
        if path.is_empty() {
            return Ok(Self { segments });
        }

        let mut current = String::new();
        let mut after_bracket = false;
        let mut chars = path.chars();

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if current.is_empty() {
                        if !after_bracket {
                            return Err(PathError::EmptySegment);
                        }
                    } else {
                        segments.push(PathSegment::from_text(&std::mem::take(&mut current)));
                    }
                    after_bracket = false;
                }
                '[' => {
                    if !current.is_empty() {
                        segments.push(PathSegment::from_text(&std::mem::take(&mut current)));
                    }
                    let mut inner = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == ']' {
                            closed = true;
                            break;
                        }
                        inner.push(c);
                    }
                    if !closed {
                        return Err(PathError::UnclosedBracket);
                    }
                    let inner = inner.trim_matches(|c| c == '"' || c == '\'');
                    if inner.is_empty() {
                        return Err(PathError::EmptySegment);
                    }
                    segments.push(PathSegment::from_text(inner));
                    after_bracket = true;
                }
                ']' => return Err(PathError::UnexpectedChar(']')),
                _ => {
                    if after_bracket {
                        return Err(PathError::UnexpectedChar(c));
                    }
                    current.push(c);
                }
            }
        }

        if !current.is_empty() {
            segments.push(PathSegment::from_text(&current));
        } else if !after_bracket {
            // trailing '.'
            return Err(PathError::EmptySegment);
        }

        Ok(Self { segments })
    }

    /// Segments in traversal order.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Returns `true` for the path that selects the whole value.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Follows the path from `root`.
    pub fn lookup<'v>(&self, root: &'v Value) -> Result<&'v Value, PathError> {
        self.segments.iter().try_fold(root, step)
    }
}

fn step<'v>(current: &'v Value, segment: &PathSegment) -> Result<&'v Value, PathError> {
    match (current, segment) {
        (Value::Object(map), PathSegment::Key(key)) => {
            map.get(key).ok_or_else(|| PathError::MissingKey(key.clone()))
        }
        (Value::Object(map), PathSegment::Index(index)) => {
            let key = index.to_string();
            map.get(&key).ok_or(PathError::MissingKey(key))
        }
        (Value::Array(items), PathSegment::Index(index)) => items
            .get(*index)
            .ok_or(PathError::IndexOutOfBounds { index: *index, len: items.len() }),
        (Value::Array(_), PathSegment::Key(key)) => Err(PathError::MissingKey(key.clone())),
        (other, segment) => {
            Err(PathError::NotAContainer { segment: segment.to_string(), kind: kind_of(other) })
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_dot_path() {
        let path = PropertyPath::parse("items.0.id").unwrap();
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Key("items".to_string()),
                PathSegment::Index(0),
                PathSegment::Key("id".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_bracket_path() {
        let dotted = PropertyPath::parse("items.0.id").unwrap();
        let bracketed = PropertyPath::parse("items[0].id").unwrap();
        assert_eq!(dotted, bracketed);

        let quoted = PropertyPath::parse(r#"data["user name"]"#).unwrap();
        assert_eq!(quoted.segments()[1], PathSegment::Key("user name".to_string()));

        let chained = PropertyPath::parse("grid[1][2]").unwrap();
        assert_eq!(chained.segments().len(), 3);
    }

    #[test]
    fn test_parse_empty_is_root() {
        assert!(PropertyPath::parse("").unwrap().is_root());
    }

    #[test]
    fn test_parse_malformed() {
        assert_eq!(PropertyPath::parse("a..b"), Err(PathError::EmptySegment));
        assert_eq!(PropertyPath::parse(".a"), Err(PathError::EmptySegment));
        assert_eq!(PropertyPath::parse("a."), Err(PathError::EmptySegment));
        assert_eq!(PropertyPath::parse("a[0"), Err(PathError::UnclosedBracket));
        assert_eq!(PropertyPath::parse("a[]"), Err(PathError::EmptySegment));
        assert_eq!(PropertyPath::parse("a]"), Err(PathError::UnexpectedChar(']')));
        assert_eq!(PropertyPath::parse("a[0]b"), Err(PathError::UnexpectedChar('b')));
        assert!(PathError::UnclosedBracket.is_malformed());
        assert!(!PathError::MissingKey("x".into()).is_malformed());
    }

    #[test]
    fn test_lookup_nested() {
        let body = json!({"items": [{"id": 1}, {"id": 2}], "meta": {"0": "zero"}});

        let path = PropertyPath::parse("items.1.id").unwrap();
        assert_eq!(path.lookup(&body), Ok(&json!(2)));

        let path = PropertyPath::parse("meta.0").unwrap();
        assert_eq!(path.lookup(&body), Ok(&json!("zero")));

        let path = PropertyPath::parse("").unwrap();
        assert_eq!(path.lookup(&body), Ok(&body));
    }

    #[test]
    fn test_lookup_failures() {
        let body = json!({"items": [{"id": 1}], "name": "Ben"});

        let missing = PropertyPath::parse("user").unwrap().lookup(&body);
        assert_eq!(missing, Err(PathError::MissingKey("user".to_string())));

        let out_of_bounds = PropertyPath::parse("items.3").unwrap().lookup(&body);
        assert_eq!(out_of_bounds, Err(PathError::IndexOutOfBounds { index: 3, len: 1 }));

        let through_scalar = PropertyPath::parse("name.first").unwrap().lookup(&body);
        assert_eq!(
            through_scalar,
            Err(PathError::NotAContainer { segment: "first".to_string(), kind: "a string" })
        );

        let key_on_array = PropertyPath::parse("items.first").unwrap().lookup(&body);
        assert!(matches!(key_on_array, Err(PathError::MissingKey(_))));
    }

    #[test]
    fn test_non_canonical_numbers_are_keys() {
        let body = json!({"codes": {"007": "bond", "+1": "plus", "00": "zeros", "7": "seven"}});

        let path = PropertyPath::parse("codes.007").unwrap();
        assert_eq!(path.segments()[1], PathSegment::Key("007".to_string()));
        assert_eq!(path.lookup(&body), Ok(&json!("bond")));

        assert_eq!(PropertyPath::parse("codes.+1").unwrap().lookup(&body), Ok(&json!("plus")));
        assert_eq!(PropertyPath::parse("codes[00]").unwrap().lookup(&body), Ok(&json!("zeros")));
        assert_eq!(PropertyPath::parse("codes.7").unwrap().lookup(&body), Ok(&json!("seven")));

        let items = json!({"items": ["a", "b"]});
        assert_eq!(PropertyPath::parse("items.0").unwrap().lookup(&items), Ok(&json!("a")));
        assert!(matches!(
            PropertyPath::parse("items.01").unwrap().lookup(&items),
            Err(PathError::MissingKey(_))
        ));
    }

    #[test]
    fn test_lookup_null_is_a_value() {
        let body = json!({"deleted_at": null});
        let path = PropertyPath::parse("deleted_at").unwrap();
        assert_eq!(path.lookup(&body), Ok(&Value::Null));
    }
}
