//! Output record for a projected mapping: a Kubernetes `v1/Secret` of type
//! `Opaque`. Data values are held as raw bytes and base64 encoded when the
//! record is rendered.

use crate::error::{ProjectorError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

pub const API_VERSION: &str = "v1";
pub const KIND: &str = "Secret";
pub const SECRET_TYPE: &str = "Opaque";

/// Labels stamped on every projected secret when labelling is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployLabels {
    pub managed_key: String,
    pub version_key: String,
    pub generation: String,
}

impl DeployLabels {
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (self.managed_key.clone(), "true".to_string()),
            (self.version_key.clone(), self.generation.clone()),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(rename = "type")]
    pub secret_type: String,
    #[serde(
        default,
        serialize_with = "encode_data",
        deserialize_with = "decode_data"
    )]
    pub data: BTreeMap<String, Vec<u8>>,
}

impl Secret {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        data: BTreeMap<String, Vec<u8>>,
    ) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ObjectMeta {
                name: name.into(),
                namespace: namespace.into(),
                labels: BTreeMap::new(),
            },
            secret_type: SECRET_TYPE.to_string(),
            data,
        }
    }

    pub fn with_labels(mut self, labels: &DeployLabels) -> Self {
        self.metadata.labels.extend(labels.to_map());
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.data.get(key).map(Vec::as_slice)
    }

    /// File name used when writing the secret into an output directory.
    pub fn file_name(&self, timestamp: u64) -> String {
        format!("{}-{}-{}.yaml", timestamp, self.namespace(), self.name())
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| ProjectorError::Render(e.to_string()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|e| ProjectorError::Render(e.to_string()))
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace(), self.name())
    }
}

fn encode_data<S: Serializer>(
    data: &BTreeMap<String, Vec<u8>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_map(data.iter().map(|(k, v)| (k, STANDARD.encode(v))))
}

fn decode_data<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, Vec<u8>>, D::Error> {
    let encoded = BTreeMap::<String, String>::deserialize(deserializer)?;
    encoded
        .into_iter()
        .map(|(k, v)| {
            STANDARD
                .decode(v.as_bytes())
                .map(|bytes| (k, bytes))
                .map_err(D::Error::custom)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Secret {
        Secret::new(
            "app-creds",
            "team-a",
            BTreeMap::from([
                ("password".to_string(), b"paSsw0rd!".to_vec()),
                ("binary".to_string(), vec![0u8, 159, 146, 150]),
            ]),
        )
    }

    fn labels() -> DeployLabels {
        DeployLabels {
            managed_key: "secret-projector/managed-secret".into(),
            version_key: "secret-projector/secret-version".into(),
            generation: "1700000000".into(),
        }
    }

    #[test]
    fn test_render_unlabelled() {
        let yaml = sample().to_yaml().unwrap();
        assert_eq!(
            yaml,
            "apiVersion: v1
kind: Secret
metadata:
  name: app-creds
  namespace: team-a
type: Opaque
data:
  binary: AJ+Slg==
  password: cGFTc3cwcmQh
"
        );
    }

    #[test]
    fn test_render_labelled() {
        let yaml = sample().with_labels(&labels()).to_yaml().unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        let labels = &value["metadata"]["labels"];
        // both label values must stay strings
        assert_eq!(
            labels["secret-projector/managed-secret"],
            serde_yaml::Value::from("true")
        );
        assert_eq!(
            labels["secret-projector/secret-version"],
            serde_yaml::Value::from("1700000000")
        );
    }

    #[test]
    fn test_parse_back() {
        let secret = sample().with_labels(&labels());
        let parsed = Secret::from_yaml(&secret.to_yaml().unwrap()).unwrap();
        assert_eq!(parsed, secret);
        assert_eq!(parsed.get("password"), Some(&b"paSsw0rd!"[..]));
    }

    #[test]
    fn test_bad_base64_rejected() {
        let raw = "apiVersion: v1
kind: Secret
metadata:
  name: a
  namespace: b
type: Opaque
data:
  key: '%%%'
";
        assert!(Secret::from_yaml(raw).is_err());
    }

    #[test]
    fn test_file_name_and_display() {
        let secret = sample();
        assert_eq!(secret.file_name(42), "42-team-a-app-creds.yaml");
        assert_eq!(secret.to_string(), "team-a/app-creds");
    }
}
