//! Entity UID parsing (`type:id@version`)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Why a UID string was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UidError {
    #[error("Invalid entity UID '{0}': expected type:id@version (missing ':')")]
    MissingType(String),

    #[error("Invalid entity UID '{0}': expected type:id@version (missing '@')")]
    MissingVersion(String),

    #[error("Invalid entity UID '{0}': type, id and version must all be non-empty")]
    EmptyPart(String),
}

/// Identifier of one specific manifest version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityUid {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub id: String,
    pub version: String,
}

impl EntityUid {
    pub fn new(
        entity_type: impl Into<String>,
        id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
            version: version.into(),
        }
    }
}

impl FromStr for EntityUid {
    type Err = UidError;

    /// Splits on the first `:` and then on the last `@`.
    ///
    /// The type prefix is required: `"hello@1@2"` is `MissingType`, while
    /// `"tool:hello@1@2"` parses to id `hello@1` and version `2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let (entity_type, rest) = raw
            .split_once(':')
            .ok_or_else(|| UidError::MissingType(raw.to_string()))?;
        let (id, version) = rest
            .rsplit_once('@')
            .ok_or_else(|| UidError::MissingVersion(raw.to_string()))?;

        if entity_type.is_empty() || id.is_empty() || version.is_empty() {
            return Err(UidError::EmptyPart(raw.to_string()));
        }

        Ok(Self::new(entity_type, id, version))
    }
}

impl fmt::Display for EntityUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.entity_type, self.id, self.version)
    }
}
