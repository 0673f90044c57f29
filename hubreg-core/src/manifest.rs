//! Entity manifests
//!
//! A manifest is an opaque JSON object. The only checks made here are that
//! it parses and that it is an object; the hub validates everything else.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{HubError, Result};
use crate::index::IndexResolver;
use crate::uid::EntityUid;

/// A manifest document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Manifest(Map<String, Value>);

impl Manifest {
    /// Accept a JSON value as a manifest; `source` names it in errors
    pub fn from_value(value: Value, source: &str) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(HubError::format(
                source,
                format!("manifest must be a JSON object, got {}", json_kind(&other)),
            )),
        }
    }

    pub fn from_json(text: &str, source: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| HubError::format(source, format!("manifest is not valid JSON: {e}")))?;
        Self::from_value(value, source)
    }

    /// String field by key
    pub fn field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// UID built from the manifest's own `type`, `id` and `version`
    pub fn uid(&self) -> Option<EntityUid> {
        Some(EntityUid::new(
            self.field("type")?,
            self.field("id")?,
            self.field("version")?,
        ))
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Where a manifest comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestRef {
    Inline(Value),
    Url(String),
}

impl ManifestRef {
    /// Produce the manifest, downloading it when only a URL is known
    pub async fn resolve(self, resolver: &IndexResolver<'_>) -> Result<Manifest> {
        match self {
            ManifestRef::Inline(value) => Manifest::from_value(value, "inline manifest"),
            ManifestRef::Url(url) => resolver.fetch_manifest(&url).await,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
