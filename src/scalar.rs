//! # Scalar Normalization
//!
//! A [`Scalar`] is the only shape an extracted value may take before it is
//! written into a secret. Conversion from a [`Node`] is where unsupported
//! shapes (mappings, nulls, sequences holding anything but strings) are
//! rejected; once a `Scalar` exists it always has a flat byte form.
//!
//! | value             | bytes                                   |
//! |-------------------|-----------------------------------------|
//! | string            | the string, unmodified                  |
//! | integer           | base-10 text                            |
//! | float             | shortest round-trippable decimal text   |
//! | bool              | `true` / `false`                        |
//! | list of strings   | joined with `,`, no brackets or quotes  |

use crate::document::Node;
use crate::error::{ProjectorError, Result};
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Integer(i128),
    Float(f64),
    Bool(bool),
    StringList(Vec<String>),
}

impl Scalar {
    /// Canonical byte form of the value.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Scalar::String(s) => s.as_bytes().to_vec(),
            Scalar::Integer(i) => i.to_string().into_bytes(),
            // f64's Display is the shortest representation that round-trips
            // and never switches to exponent notation.
            Scalar::Float(f) => f.to_string().into_bytes(),
            Scalar::Bool(b) => b.to_string().into_bytes(),
            Scalar::StringList(items) => items.join(",").into_bytes(),
        }
    }
}

impl TryFrom<&Node> for Scalar {
    type Error = ProjectorError;

    fn try_from(node: &Node) -> Result<Self> {
        match node {
            Node::String(s) => Ok(Scalar::String(s.clone())),
            Node::Integer(i) => Ok(Scalar::Integer(*i)),
            Node::Float(f) => Ok(Scalar::Float(*f)),
            Node::Bool(b) => Ok(Scalar::Bool(*b)),
            Node::Sequence(items) => items
                .iter()
                .map(|item| match item {
                    Node::String(s) => Ok(s.clone()),
                    other => Err(ProjectorError::UnsupportedSequenceElement(format!(
                        "{} ({})",
                        other,
                        other.kind()
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(Scalar::StringList),
            other => Err(ProjectorError::UnsupportedValue(format!(
                "{} ({})",
                other,
                other.kind()
            ))),
        }
    }
}

/// Normalize an extracted node straight to bytes.
pub fn to_bytes(node: &Node) -> Result<Vec<u8>> {
    Scalar::try_from(node).map(|s| s.to_bytes())
}

// Structured re-encoding keeps the native type of each value, so a bool stays
// a bool and a list stays a list in the emitted JSON or YAML.
impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Scalar::String(s) => serializer.serialize_str(s),
            Scalar::Integer(i) => match (i64::try_from(*i), u64::try_from(*i)) {
                (Ok(signed), _) => serializer.serialize_i64(signed),
                (_, Ok(unsigned)) => serializer.serialize_u64(unsigned),
                _ => serializer.serialize_i128(*i),
            },
            Scalar::Float(f) => serializer.serialize_f64(*f),
            Scalar::Bool(b) => serializer.serialize_bool(*b),
            Scalar::StringList(items) => items.serialize(serializer),
        }
    }
}
