//! # Path Extraction
//!
//! Resolves a JSONPath-style expression against a [`Node`] tree and returns
//! exactly one value.
//!
//! ## Grammar
//!
//! ```text
//! $                     the document root
//! $.field               mapping lookup (any characters except '.' and '[')
//! $['field.with.dots']  quoted mapping lookup (single or double quotes)
//! $.list[1]             sequence index
//! $.list[-1]            sequence index counted from the end
//! ```
//!
//! Segments chain freely: `$.nesting.list[0]`, `$['a']['b'][2]`.
//! Expressions must start with `$`. Wildcards, slices and filters are not
//! supported since every lookup has to resolve to a single value.

use crate::document::Node;
use crate::error::{ProjectorError, Result};
use std::fmt;

/// One step of a parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(i64),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) => write!(f, ".{}", name),
            Segment::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// A parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    expression: String,
    segments: Vec<Segment>,
}

impl JsonPath {
    pub fn parse(expression: &str) -> Result<Self> {
        let invalid = |reason: &str| ProjectorError::InvalidPath {
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let rest = expression
            .trim()
            .strip_prefix('$')
            .ok_or_else(|| invalid("expression must start with '$'"))?;

        let chars: Vec<char> = rest.chars().collect();
        let mut segments = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '.' => {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && chars[end] != '.' && chars[end] != '[' {
                        end += 1;
                    }
                    if end == start {
                        return Err(invalid("empty field name"));
                    }
                    segments.push(Segment::Field(chars[start..end].iter().collect()));
                    i = end;
                }
                '[' => {
                    // a quoted key may itself contain ']'
                    let mut from = i + 1;
                    while from < chars.len() && chars[from].is_whitespace() {
                        from += 1;
                    }
                    if let Some(&quote) = chars.get(from).filter(|c| matches!(c, '\'' | '"')) {
                        from = chars[from + 1..]
                            .iter()
                            .position(|&c| c == quote)
                            .map(|p| p + from + 2)
                            .ok_or_else(|| invalid("unterminated quoted field name"))?;
                    }
                    let close = chars[from..]
                        .iter()
                        .position(|&c| c == ']')
                        .map(|p| p + from)
                        .ok_or_else(|| invalid("unterminated '['"))?;
                    let inner: String = chars[i + 1..close].iter().collect();
                    segments.push(parse_bracket(inner.trim()).ok_or_else(|| {
                        invalid("brackets must hold an integer index or a quoted field name")
                    })?);
                    i = close + 1;
                }
                other => {
                    return Err(invalid(&format!("unexpected character '{}'", other)));
                }
            }
        }

        Ok(Self {
            expression: expression.to_string(),
            segments,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Walk `document` and return the referenced value.
    pub fn lookup<'a>(&self, document: &'a Node) -> Result<&'a Node> {
        let mut current = document;
        let mut walked = String::from("$");

        for segment in &self.segments {
            let not_found = |reason: String| ProjectorError::PathNotFound {
                expression: self.expression.clone(),
                reason,
            };

            current = match (segment, current) {
                (Segment::Field(name), Node::Mapping(map)) => map
                    .get(name)
                    .ok_or_else(|| not_found(format!("key '{}' not found under {}", name, walked)))?,
                (Segment::Index(index), Node::Sequence(items)) => {
                    let len = items.len() as i64;
                    let resolved = if *index < 0 { len + index } else { *index };
                    if resolved < 0 || resolved >= len {
                        return Err(not_found(format!(
                            "index {} out of range for {} (length {})",
                            index, walked, len
                        )));
                    }
                    &items[resolved as usize]
                }
                (segment, node) => {
                    return Err(not_found(format!(
                        "cannot apply {} to {} at {}",
                        segment,
                        node.kind(),
                        walked
                    )));
                }
            };
            walked.push_str(&segment.to_string());
        }

        Ok(current)
    }
}

fn parse_bracket(inner: &str) -> Option<Segment> {
    for quote in ['\'', '"'] {
        if let Some(name) = inner
            .strip_prefix(quote)
            .and_then(|s| s.strip_suffix(quote))
        {
            return Some(Segment::Field(name.to_string()));
        }
    }
    inner.parse::<i64>().ok().map(Segment::Index)
}

/// Parse `expression` and resolve it against `document` in one step.
pub fn lookup<'a>(document: &'a Node, expression: &str) -> Result<&'a Node> {
    JsonPath::parse(expression)?.lookup(document)
}
