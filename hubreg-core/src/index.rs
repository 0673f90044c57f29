//! Remote index documents
//!
//! The same logical "list of manifests" is published in several shapes:
//!
//! ```text
//! {"manifests": ["https://host/matrix/a.json", ...]}                 ManifestList
//! {"items": [{"manifest_url": "https://host/matrix/a.json"}, ...]}   ItemList
//! {"entries": [{"path": "a.json", "base_url": "https://host/matrix/"}]} EntryList
//! {"entities": [{"type", "id", "version", "manifest"?, "manifest_url"?}]} EntityList
//! ```
//!
//! Classification looks for these keys in a fixed priority order and decodes
//! the first one present. A document carrying several of them is decoded by
//! priority alone; that ordering is kept for compatibility with existing
//! index files and nothing else should depend on it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{HubError, Result};
use crate::manifest::Manifest;
use crate::transport::{HubRequest, HubTransport};
use crate::uid::EntityUid;

/// Path segment that marks the root of a published index folder
const MATRIX_SEGMENT: &str = "/matrix/";

/// Sibling file name of a published index
const INDEX_FILE: &str = "index.json";

/// Recognized index shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IndexShape {
    ManifestList,
    ItemList,
    EntryList,
    EntityList,
}

impl IndexShape {
    /// Classification order; the first key present wins
    pub const PRIORITY: [IndexShape; 4] = [
        IndexShape::ManifestList,
        IndexShape::ItemList,
        IndexShape::EntryList,
        IndexShape::EntityList,
    ];

    /// JSON key announcing this shape
    pub fn key(self) -> &'static str {
        match self {
            IndexShape::ManifestList => "manifests",
            IndexShape::ItemList => "items",
            IndexShape::EntryList => "entries",
            IndexShape::EntityList => "entities",
        }
    }

    /// Shapes the hub can ingest directly
    pub fn is_primary(self) -> bool {
        !matches!(self, IndexShape::EntityList)
    }

    fn decode(self, raw: &Value, source: &str) -> Result<IndexDocument> {
        let invalid = |e: serde_json::Error| {
            HubError::format(source, format!("'{}' is malformed: {e}", self.key()))
        };

        Ok(match self {
            IndexShape::ManifestList => IndexDocument::ManifestList {
                urls: serde_json::from_value(raw.clone()).map_err(invalid)?,
            },
            IndexShape::ItemList => IndexDocument::ItemList {
                items: serde_json::from_value(raw.clone()).map_err(invalid)?,
            },
            IndexShape::EntryList => IndexDocument::EntryList {
                entries: serde_json::from_value(raw.clone()).map_err(invalid)?,
            },
            IndexShape::EntityList => IndexDocument::EntityList {
                entities: serde_json::from_value(raw.clone()).map_err(invalid)?,
            },
        })
    }
}

impl fmt::Display for IndexShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexShape::ManifestList => "ManifestList",
            IndexShape::ItemList => "ItemList",
            IndexShape::EntryList => "EntryList",
            IndexShape::EntityList => "EntityList",
        };
        f.write_str(name)
    }
}

/// `items[]` element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexItem {
    #[serde(alias = "manifestUrl")]
    pub manifest_url: String,
}

/// `entries[]` element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub path: String,

    #[serde(alias = "baseUrl")]
    pub base_url: String,
}

impl IndexEntry {
    /// `base_url` and `path` joined with exactly one slash
    pub fn manifest_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }
}

/// `entities[]` element (legacy lookup shape)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    #[serde(rename = "type")]
    pub entity_type: String,

    pub id: String,

    pub version: String,

    #[serde(default)]
    pub manifest: Option<Value>,

    #[serde(default, alias = "manifestUrl")]
    pub manifest_url: Option<String>,
}

impl EntityRecord {
    pub fn matches(&self, uid: &EntityUid) -> bool {
        self.entity_type == uid.entity_type && self.id == uid.id && self.version == uid.version
    }
}

/// A classified index document
#[derive(Debug, Clone, PartialEq)]
pub enum IndexDocument {
    ManifestList { urls: Vec<String> },
    ItemList { items: Vec<IndexItem> },
    EntryList { entries: Vec<IndexEntry> },
    EntityList { entities: Vec<EntityRecord> },
}

impl IndexDocument {
    /// Classify a parsed document; `source` names it in errors
    pub fn classify(value: &Value, source: &str) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| HubError::format(source, "index must be a JSON object"))?;

        let present: Vec<IndexShape> = IndexShape::PRIORITY
            .into_iter()
            .filter(|shape| object.contains_key(shape.key()))
            .collect();

        let shape = *present.first().ok_or_else(|| {
            HubError::format(
                source,
                "no 'manifests', 'items', 'entries' or 'entities' key found",
            )
        })?;

        if present.len() > 1 {
            debug!(
                "Index {} carries {:?}; decoding as {} by priority",
                source, present, shape
            );
        }

        shape.decode(&object[shape.key()], source)
    }

    /// Parse and classify raw JSON text
    pub fn from_json(text: &str, source: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| HubError::format(source, format!("index is not valid JSON: {e}")))?;
        Self::classify(&value, source)
    }

    pub fn shape(&self) -> IndexShape {
        match self {
            IndexDocument::ManifestList { .. } => IndexShape::ManifestList,
            IndexDocument::ItemList { .. } => IndexShape::ItemList,
            IndexDocument::EntryList { .. } => IndexShape::EntryList,
            IndexDocument::EntityList { .. } => IndexShape::EntityList,
        }
    }

    /// Number of listed entries
    pub fn len(&self) -> usize {
        match self {
            IndexDocument::ManifestList { urls } => urls.len(),
            IndexDocument::ItemList { items } => items.len(),
            IndexDocument::EntryList { entries } => entries.len(),
            IndexDocument::EntityList { entities } => entities.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concrete manifest URLs listed by the document
    pub fn manifest_urls(&self) -> Vec<String> {
        match self {
            IndexDocument::ManifestList { urls } => urls.clone(),
            IndexDocument::ItemList { items } => {
                items.iter().map(|item| item.manifest_url.clone()).collect()
            }
            IndexDocument::EntryList { entries } => {
                entries.iter().map(IndexEntry::manifest_url).collect()
            }
            IndexDocument::EntityList { entities } => entities
                .iter()
                .filter_map(|entity| entity.manifest_url.clone())
                .collect(),
        }
    }
}

/// Guess the index published next to a manifest
///
/// Truncates at the last `/matrix/` segment, or at the manifest's own
/// directory when there is none, and appends `index.json`. The result is a
/// convention only and may not exist.
pub fn derive_index_url(manifest_url: &str) -> Result<String> {
    let invalid = |e: url::ParseError| {
        HubError::Usage(format!("Invalid manifest URL '{manifest_url}': {e}"))
    };

    let mut base = url::Url::parse(manifest_url).map_err(invalid)?;
    if let Some(pos) = base.path().rfind(MATRIX_SEGMENT) {
        let truncated = base.path()[..pos + MATRIX_SEGMENT.len()].to_string();
        base.set_path(&truncated);
    }

    Ok(base.join(INDEX_FILE).map_err(invalid)?.to_string())
}

/// Downloads index and manifest documents
pub struct IndexResolver<'a> {
    transport: &'a dyn HubTransport,
    timeout: Duration,
}

impl<'a> IndexResolver<'a> {
    pub fn new(transport: &'a dyn HubTransport, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// GET a JSON document; anything but HTTP 200 with valid JSON is a format error
    async fn fetch_json(&self, url: &str) -> Result<Value> {
        let response = self
            .transport
            .send(HubRequest::get(url, self.timeout))
            .await
            .map_err(|e| HubError::format(url, e.to_string()))?;

        if response.status != 200 {
            return Err(HubError::format(
                url,
                format!("HTTP {}: {}", response.status, response.body),
            ));
        }

        serde_json::from_str(&response.body)
            .map_err(|e| HubError::format(url, format!("not valid JSON: {e}")))
    }

    /// Download an index and classify its shape
    pub async fn fetch_and_classify(&self, url: &str) -> Result<IndexDocument> {
        let value = self.fetch_json(url).await?;
        let document = IndexDocument::classify(&value, url)?;
        debug!(
            "Index {} is a {} with {} entries",
            url,
            document.shape(),
            document.len()
        );
        Ok(document)
    }

    /// Download a manifest
    pub async fn fetch_manifest(&self, url: &str) -> Result<Manifest> {
        let value = self.fetch_json(url).await?;
        Manifest::from_value(value, url)
    }

    /// Find the manifest for `uid` in a classified index
    ///
    /// EntityList documents are searched by their `type`/`id`/`version`
    /// fields. Other shapes only list URLs, so each listed manifest is
    /// downloaded and compared; unreadable manifests are skipped.
    pub async fn resolve_by_uid(&self, document: &IndexDocument, uid: &EntityUid) -> Result<Manifest> {
        if let IndexDocument::EntityList { entities } = document {
            let record = entities
                .iter()
                .find(|entity| entity.matches(uid))
                .ok_or_else(|| HubError::NotFound(format!("{uid} is not listed in the index")))?;

            if let Some(inline) = &record.manifest {
                return Manifest::from_value(inline.clone(), &format!("inline manifest for {uid}"));
            }
            if let Some(url) = &record.manifest_url {
                return self.fetch_manifest(url).await;
            }
            return Err(HubError::NotFound(format!(
                "index entry for {uid} has neither an inline manifest nor a manifest URL"
            )));
        }

        for url in document.manifest_urls() {
            match self.fetch_manifest(&url).await {
                Ok(manifest) if manifest.uid().as_ref() == Some(uid) => {
                    debug!("Resolved {} to {}", uid, url);
                    return Ok(manifest);
                }
                Ok(_) => debug!("Manifest {} does not describe {}", url, uid),
                Err(e) => warn!("Skipping manifest {}: {}", url, e),
            }
        }

        Err(HubError::NotFound(format!(
            "no manifest listed in the index describes {uid}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Method, MockTransport};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const SOURCE: &str = "https://host/matrix/index.json";

    #[test]
    fn test_classify_manifest_list() {
        let doc = IndexDocument::classify(
            &json!({"manifests": ["https://host/a.json", "https://host/b.json"]}),
            SOURCE,
        )
        .unwrap();
        assert_eq!(doc.shape(), IndexShape::ManifestList);
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_classify_item_list() {
        let doc = IndexDocument::classify(
            &json!({
                "items": [{"manifest_url": "https://host/a.json"}, {"manifestUrl": "https://host/b.json"}],
                "meta": {"format": "matrix-hub-index", "version": 1}
            }),
            SOURCE,
        )
        .unwrap();
        assert_eq!(doc.shape(), IndexShape::ItemList);
        assert_eq!(
            doc.manifest_urls(),
            vec!["https://host/a.json", "https://host/b.json"]
        );
    }

    #[test]
    fn test_classify_entry_list_joins_urls() {
        let doc = IndexDocument::classify(
            &json!({"entries": [
                {"path": "hello.manifest.json", "base_url": "https://host/matrix/"},
                {"path": "/tool.json", "baseUrl": "https://host/matrix"}
            ]}),
            SOURCE,
        )
        .unwrap();
        assert_eq!(doc.shape(), IndexShape::EntryList);
        assert_eq!(doc.len(), 2);
        assert_eq!(
            doc.manifest_urls(),
            vec![
                "https://host/matrix/hello.manifest.json",
                "https://host/matrix/tool.json"
            ]
        );
    }

    #[test]
    fn test_classify_priority_order() {
        let doc = IndexDocument::classify(
            &json!({
                "entries": [{"path": "a.json", "base_url": "https://host/"}],
                "items": [{"manifest_url": "https://host/b.json"}]
            }),
            SOURCE,
        )
        .unwrap();
        assert_eq!(doc.shape(), IndexShape::ItemList);

        let doc = IndexDocument::classify(
            &json!({"entities": [], "manifests": []}),
            SOURCE,
        )
        .unwrap();
        assert_eq!(doc.shape(), IndexShape::ManifestList);
        assert!(doc.is_empty());
    }

    #[test]
    fn test_classify_unrecognized_is_format_error() {
        let err = IndexDocument::classify(&json!({"meta": {}}), SOURCE).unwrap_err();
        assert!(matches!(err, HubError::Format { .. }));

        let err = IndexDocument::classify(&json!(["https://host/a.json"]), SOURCE).unwrap_err();
        assert!(matches!(err, HubError::Format { .. }));
    }

    #[test]
    fn test_classify_malformed_shape_is_format_error() {
        let err = IndexDocument::classify(&json!({"items": [{"url": "x"}]}), SOURCE).unwrap_err();
        match err {
            HubError::Format { reason, .. } => assert!(reason.contains("'items' is malformed")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_from_json_rejects_invalid_json() {
        assert!(matches!(
            IndexDocument::from_json("<html>", SOURCE),
            Err(HubError::Format { .. })
        ));
    }

    #[test]
    fn test_derive_index_url() {
        assert_eq!(
            derive_index_url("https://host/repo/matrix/hello.manifest.json").unwrap(),
            "https://host/repo/matrix/index.json"
        );
        assert_eq!(
            derive_index_url("https://host/matrix/servers/matrix/deep/a.json").unwrap(),
            "https://host/matrix/servers/matrix/index.json"
        );
        assert_eq!(
            derive_index_url("https://host/manifests/a.json?raw=1").unwrap(),
            "https://host/manifests/index.json"
        );
        assert!(derive_index_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_fetch_and_classify() {
        let transport = MockTransport::new().on(
            Method::Get,
            SOURCE,
            200,
            r#"{"items": [{"manifest_url": "https://host/matrix/a.json"}]}"#,
        );
        let resolver = IndexResolver::new(&transport, Duration::from_secs(1));

        let doc = resolver.fetch_and_classify(SOURCE).await.unwrap();
        assert_eq!(doc.shape(), IndexShape::ItemList);
        assert_eq!(doc.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_non_200_is_format_error() {
        let transport = MockTransport::new().on(Method::Get, SOURCE, 404, "not found");
        let resolver = IndexResolver::new(&transport, Duration::from_secs(1));

        let err = resolver.fetch_and_classify(SOURCE).await.unwrap_err();
        assert_eq!(
            err,
            HubError::Format {
                url: SOURCE.to_string(),
                reason: "HTTP 404: not found".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_resolve_entity_inline_manifest() {
        let transport = MockTransport::new();
        let resolver = IndexResolver::new(&transport, Duration::from_secs(1));
        let doc = IndexDocument::classify(
            &json!({"entities": [
                {"type": "tool", "id": "hello", "version": "0.1.0", "manifest": {"id": "hello", "name": "inline"}}
            ]}),
            SOURCE,
        )
        .unwrap();

        let manifest = resolver
            .resolve_by_uid(&doc, &EntityUid::new("tool", "hello", "0.1.0"))
            .await
            .unwrap();
        assert_eq!(manifest.field("name"), Some("inline"));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_entity_by_manifest_url() {
        let transport = MockTransport::new().on(
            Method::Get,
            "https://host/matrix/hello.json",
            200,
            r#"{"type": "tool", "id": "hello", "version": "0.1.0"}"#,
        );
        let resolver = IndexResolver::new(&transport, Duration::from_secs(1));
        let doc = IndexDocument::classify(
            &json!({"entities": [
                {"type": "tool", "id": "hello", "version": "0.0.9"},
                {"type": "tool", "id": "hello", "version": "0.1.0", "manifest_url": "https://host/matrix/hello.json"}
            ]}),
            SOURCE,
        )
        .unwrap();

        let manifest = resolver
            .resolve_by_uid(&doc, &EntityUid::new("tool", "hello", "0.1.0"))
            .await
            .unwrap();
        assert_eq!(manifest.field("version"), Some("0.1.0"));
    }

    #[tokio::test]
    async fn test_resolve_entity_not_found() {
        let transport = MockTransport::new();
        let resolver = IndexResolver::new(&transport, Duration::from_secs(1));
        let doc = IndexDocument::classify(
            &json!({"entities": [{"type": "tool", "id": "hello", "version": "0.0.9"}]}),
            SOURCE,
        )
        .unwrap();

        let missing = resolver
            .resolve_by_uid(&doc, &EntityUid::new("tool", "other", "0.0.9"))
            .await
            .unwrap_err();
        assert!(matches!(missing, HubError::NotFound(_)));

        let no_source = resolver
            .resolve_by_uid(&doc, &EntityUid::new("tool", "hello", "0.0.9"))
            .await
            .unwrap_err();
        match no_source {
            HubError::NotFound(message) => {
                assert!(message.contains("neither an inline manifest nor a manifest URL"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resolve_by_scanning_listed_manifests() {
        let transport = MockTransport::new()
            .on(Method::Get, "https://host/matrix/broken.json", 500, "")
            .on(
                Method::Get,
                "https://host/matrix/other.json",
                200,
                r#"{"type": "tool", "id": "other", "version": "1.0.0"}"#,
            )
            .on(
                Method::Get,
                "https://host/matrix/hello.json",
                200,
                r#"{"type": "mcp_server", "id": "hello", "version": "0.1.0"}"#,
            );
        let resolver = IndexResolver::new(&transport, Duration::from_secs(1));
        let doc = IndexDocument::classify(
            &json!({"entries": [
                {"path": "broken.json", "base_url": "https://host/matrix/"},
                {"path": "other.json", "base_url": "https://host/matrix/"},
                {"path": "hello.json", "base_url": "https://host/matrix/"}
            ]}),
            SOURCE,
        )
        .unwrap();

        let manifest = resolver
            .resolve_by_uid(&doc, &EntityUid::new("mcp_server", "hello", "0.1.0"))
            .await
            .unwrap();
        assert_eq!(manifest.field("id"), Some("hello"));

        let err = resolver
            .resolve_by_uid(&doc, &EntityUid::new("mcp_server", "absent", "0.1.0"))
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::NotFound(_)));
    }
}
