//! Reference token parsing.
//!
//! A token refers to an earlier sub-result when it starts with `$$`, one or
//! more digits and a `.`; the property path then runs up to the next `/` or
//! `$`. Anything else is a literal. Parsing is a pure function and never fails.

use once_cell::sync::Lazy;
use regex::Regex;

static REFERENCE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    // Compile-time constant pattern
    Regex::new(r"^(?:\$\$(\d+)\.)?([^/$]*)").expect("valid reference pattern")
});

/// A reference to the body of an earlier sub-result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceToken {
    /// Position of the referenced sub-request.
    pub source_index: usize,
    /// Dot/bracket property path inside the referenced body.
    pub property_path: String,
}

/// Result of parsing one path segment or one payload string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedToken<'a> {
    /// The whole input.
    pub input: &'a str,
    /// Referenced position, `None` for a literal.
    pub source_index: Option<usize>,
    /// Property path for a reference, or the literal prefix otherwise.
    pub property: &'a str,
    /// Number of bytes of `input` covered by the match.
    pub consumed: usize,
}

impl<'a> ParsedToken<'a> {
    /// Returns `true` when the token refers to an earlier result.
    pub fn is_reference(&self) -> bool {
        self.source_index.is_some()
    }

    /// The reference, if any.
    pub fn reference(&self) -> Option<ReferenceToken> {
        self.source_index.map(|source_index| ReferenceToken {
            source_index,
            property_path: self.property.to_string(),
        })
    }

    /// Text after the matched portion (starts with `$` when non-empty).
    pub fn remainder(&self) -> &'a str {
        &self.input[self.consumed..]
    }

    fn literal(input: &'a str) -> Self {
        let end = input.find(['/', '$']).unwrap_or(input.len());
        Self { input, source_index: None, property: &input[..end], consumed: end }
    }
}

/// Parses a single token.
///
/// An index that does not fit in `usize` is treated as a literal.
pub fn parse(input: &str) -> ParsedToken<'_> {
    let Some(captures) = REFERENCE_PATTERN.captures(input) else {
        return ParsedToken::literal(input);
    };

    let consumed = captures.get(0).map_or(0, |m| m.end());
    let property = captures.get(2).map_or("", |m| m.as_str());

    match captures.get(1) {
        None => ParsedToken { input, source_index: None, property, consumed },
        Some(digits) => match digits.as_str().parse::<usize>() {
            Ok(index) => ParsedToken { input, source_index: Some(index), property, consumed },
            Err(_) => ParsedToken::literal(input),
        },
    }
}

/// Splits an address into segments, keeping empty ones so a join restores it.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').collect()
}
