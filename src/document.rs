//! # Structured Documents
//!
//! JSON and YAML source files are parsed into a single generic tree, [`Node`],
//! so that path lookup and scalar normalization never need to know which
//! format a value came from.
//!
//! Numbers are split at parse time: any integer, signed or unsigned 64-bit,
//! becomes [`Node::Integer`] and keeps its exact value; everything else becomes
//! [`Node::Float`]. YAML merge keys (`<<: *anchor`) are resolved before
//! conversion. YAML mapping keys that are not strings (`1: foo`, `true: bar`)
//! are converted to their textual form.

use crate::error::{ProjectorError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// A parsed structured document (or any subtree of one).
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Integer(i128),
    Float(f64),
    String(String),
    Sequence(Vec<Node>),
    Mapping(BTreeMap<String, Node>),
}

impl Node {
    /// Parse JSON text. `path` is only used for error context.
    pub fn from_json_slice(bytes: &[u8], path: &Path) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| ProjectorError::ParseSource {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(Self::from(value))
    }

    /// Parse YAML text. `path` is only used for error context.
    pub fn from_yaml_slice(bytes: &[u8], path: &Path) -> Result<Self> {
        let parse_error = |e: serde_yaml::Error| ProjectorError::ParseSource {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        let mut value: serde_yaml::Value = serde_yaml::from_slice(bytes).map_err(parse_error)?;
        value.apply_merge().map_err(parse_error)?;
        Self::try_from_yaml(value).map_err(|message| ProjectorError::ParseSource {
            path: path.to_path_buf(),
            message,
        })
    }

    fn try_from_yaml(value: serde_yaml::Value) -> std::result::Result<Self, String> {
        use serde_yaml::Value;

        Ok(match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(b),
            Value::Number(n) => number(n.as_i64(), n.as_u64(), n.as_f64()),
            Value::String(s) => Node::String(s),
            Value::Sequence(items) => Node::Sequence(
                items
                    .into_iter()
                    .map(Self::try_from_yaml)
                    .collect::<std::result::Result<_, _>>()?,
            ),
            Value::Mapping(map) => {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    out.insert(yaml_key_to_string(k)?, Self::try_from_yaml(v)?);
                }
                Node::Mapping(out)
            }
            Value::Tagged(tagged) => Self::try_from_yaml(tagged.value)?,
        })
    }

    /// Short name of the node's shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "bool",
            Node::Integer(_) => "integer",
            Node::Float(_) => "float",
            Node::String(_) => "string",
            Node::Sequence(_) => "sequence",
            Node::Mapping(_) => "mapping",
        }
    }
}

fn number(signed: Option<i64>, unsigned: Option<u64>, float: Option<f64>) -> Node {
    match signed.map(i128::from).or_else(|| unsigned.map(i128::from)) {
        Some(i) => Node::Integer(i),
        None => Node::Float(float.unwrap_or(f64::NAN)),
    }
}

fn yaml_key_to_string(key: serde_yaml::Value) -> std::result::Result<String, String> {
    use serde_yaml::Value;

    match key {
        Value::String(s) => Ok(s),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok("null".to_string()),
        other => Err(format!("unsupported mapping key {:?}", other)),
    }
}

impl From<serde_json::Value> for Node {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(b),
            Value::Number(n) => number(n.as_i64(), n.as_u64(), n.as_f64()),
            Value::String(s) => Node::String(s),
            Value::Array(items) => Node::Sequence(items.into_iter().map(Node::from).collect()),
            Value::Object(map) => {
                Node::Mapping(map.into_iter().map(|(k, v)| (k, Node::from(v))).collect())
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Null => write!(f, "null"),
            Node::Bool(b) => write!(f, "{}", b),
            Node::Integer(i) => write!(f, "{}", i),
            Node::Float(x) => write!(f, "{}", x),
            Node::String(s) => write!(f, "{:?}", s),
            Node::Sequence(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Node::Mapping(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn here() -> &'static Path {
        Path::new("inline")
    }

    #[test]
    fn test_json_numbers_split_into_integer_and_float() {
        let node = Node::from_json_slice(br#"{"i": 12345, "f": 1.23, "neg": -7}"#, here()).unwrap();
        let Node::Mapping(map) = node else {
            panic!("expected mapping");
        };
        assert_eq!(map["i"], Node::Integer(12345));
        assert_eq!(map["f"], Node::Float(1.23));
        assert_eq!(map["neg"], Node::Integer(-7));
    }

    #[test]
    fn test_yaml_parses_nested_structures() {
        let yaml = b"secret: paSsw0rd!\nnesting:\n  integer: 420\n  float: -69.6969\n  list:\n  - abc\n  - def\n";
        let node = Node::from_yaml_slice(yaml, here()).unwrap();
        let Node::Mapping(map) = node else {
            panic!("expected mapping");
        };
        assert_eq!(map["secret"], Node::String("paSsw0rd!".into()));
        let Node::Mapping(nesting) = &map["nesting"] else {
            panic!("expected nested mapping");
        };
        assert_eq!(nesting["integer"], Node::Integer(420));
        assert_eq!(nesting["float"], Node::Float(-69.6969));
        assert_eq!(
            nesting["list"],
            Node::Sequence(vec![Node::String("abc".into()), Node::String("def".into())])
        );
    }

    #[test]
    fn test_integers_beyond_i64_stay_exact() {
        let json = br#"{"max": 18446744073709551615, "big": 9223372036854775808, "min": -9223372036854775808}"#;
        let Node::Mapping(map) = Node::from_json_slice(json, here()).unwrap() else {
            panic!("expected mapping");
        };
        assert_eq!(map["max"], Node::Integer(u64::MAX as i128));
        assert_eq!(map["big"], Node::Integer(i64::MAX as i128 + 1));
        assert_eq!(map["min"], Node::Integer(i64::MIN as i128));

        let Node::Mapping(map) = Node::from_yaml_slice(b"id: 18446744073709551615\n", here()).unwrap() else {
            panic!("expected mapping");
        };
        assert_eq!(map["id"].to_string(), "18446744073709551615");
    }

    #[test]
    fn test_yaml_merge_keys_are_applied() {
        let yaml = b"base: &base\n  password: hunter2\n  host: localhost\nprod:\n  <<: *base\n  host: db\n";
        let Node::Mapping(map) = Node::from_yaml_slice(yaml, here()).unwrap() else {
            panic!("expected mapping");
        };
        let Node::Mapping(prod) = &map["prod"] else {
            panic!("expected nested mapping");
        };
        assert_eq!(prod["password"], Node::String("hunter2".into()));
        assert_eq!(prod["host"], Node::String("db".into()));
        assert!(!prod.contains_key("<<"));
    }

    #[test]
    fn test_yaml_non_string_keys_become_text() {
        let node = Node::from_yaml_slice(b"1: one\ntrue: yes-ish\n", here()).unwrap();
        let Node::Mapping(map) = node else {
            panic!("expected mapping");
        };
        assert_eq!(map["1"], Node::String("one".into()));
        assert_eq!(map["true"], Node::String("yes-ish".into()));
    }

    #[test]
    fn test_invalid_json_names_file() {
        let err = Node::from_json_slice(b"{not json", Path::new("creds/db.json")).unwrap_err();
        assert!(matches!(err, ProjectorError::ParseSource { .. }));
        assert!(err.to_string().contains("creds/db.json"));
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        let err = Node::from_yaml_slice(b"key: [unclosed", here()).unwrap_err();
        assert!(matches!(err, ProjectorError::ParseSource { .. }));
    }

    #[test]
    fn test_display_is_compact() {
        let node = Node::Sequence(vec![Node::Integer(1), Node::String("a".into()), Node::Null]);
        assert_eq!(node.to_string(), r#"[1, "a", null]"#);
    }
}
