//! # Schema Documents
//!
//! A schema is an externally authored taxonomy of attribute names, published
//! as a JSON Graph Format document. Both the wrapped form `{"graph": {...}}`
//! and the bare form `{"id", "nodes", "edges"}` are accepted.
//!
//! Retrieval is behind [`SchemaSource`] so the engine never does I/O itself.

use crate::graph::{EdgeDocument, GraphDocument, NodeDocument};
use crate::primitives::MAX_DOCUMENT_SIZE;
use crate::CompspecError;
use serde::Deserialize;
use std::collections::BTreeMap;

/// A decoded schema: its root id plus schema-local nodes and edges.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDocument {
    pub id: String,
    pub nodes: BTreeMap<String, NodeDocument>,
    pub edges: Vec<EdgeDocument>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope {
    Wrapped { graph: GraphDocument },
    Bare(GraphDocument),
}

impl SchemaDocument {
    /// Decode a schema from JSON bytes. `url` is only used in error messages.
    pub fn from_json(url: &str, bytes: &[u8]) -> Result<Self, CompspecError> {
        if bytes.len() as u64 > MAX_DOCUMENT_SIZE {
            return Err(CompspecError::fetch(
                url,
                format!(
                    "schema of {} bytes exceeds maximum allowed {} bytes",
                    bytes.len(),
                    MAX_DOCUMENT_SIZE
                ),
            ));
        }

        let envelope: Envelope = serde_json::from_slice(bytes)
            .map_err(|e| CompspecError::fetch(url, format!("not a graph document: {}", e)))?;

        let doc = match envelope {
            Envelope::Wrapped { graph } | Envelope::Bare(graph) => graph,
        };

        Self::try_from_document(url, doc)
    }

    /// Validate a graph document as a schema.
    pub fn try_from_document(url: &str, doc: GraphDocument) -> Result<Self, CompspecError> {
        let id = doc
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| CompspecError::fetch(url, "not a graph document: missing graph id"))?;

        Ok(Self {
            id,
            nodes: doc.nodes,
            edges: doc.edges,
        })
    }
}

// =============================================================================
// SCHEMA SOURCE
// =============================================================================

/// Anything that can produce a schema document for a URL.
pub trait SchemaSource {
    /// Load the schema at `url`. Fails with a fetch error if it cannot be
    /// retrieved or decoded.
    fn load(&self, url: &str) -> Result<SchemaDocument, CompspecError>;
}

/// In-memory schema source keyed by URL.
#[derive(Debug, Clone, Default)]
pub struct MemorySchemaSource {
    documents: BTreeMap<String, SchemaDocument>,
}

impl MemorySchemaSource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema under `url`.
    pub fn insert(&mut self, url: impl Into<String>, doc: SchemaDocument) {
        self.documents.insert(url.into(), doc);
    }

    /// Builder form of [`MemorySchemaSource::insert`].
    #[must_use]
    pub fn with(mut self, url: impl Into<String>, doc: SchemaDocument) -> Self {
        self.insert(url, doc);
        self
    }
}

impl SchemaSource for MemorySchemaSource {
    fn load(&self, url: &str) -> Result<SchemaDocument, CompspecError> {
        self.documents
            .get(url)
            .cloned()
            .ok_or_else(|| CompspecError::fetch(url, "no such schema"))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn wrapped_document_decodes() {
        let json = br#"{"graph": {"id": "io.archspec", "nodes": {"cpu": {}, "cpu.target": {"label": "target"}}, "edges": [{"source": "cpu", "target": "cpu.target", "relation": "contains"}]}}"#;

        let schema = SchemaDocument::from_json("u", json).expect("decode");
        assert_eq!(schema.id, "io.archspec");
        assert_eq!(schema.nodes.len(), 2);
        assert_eq!(schema.edges.len(), 1);
    }

    #[test]
    fn bare_document_decodes() {
        let json = br#"{"id": "S", "nodes": {"hw": {}}, "edges": []}"#;
        let schema = SchemaDocument::from_json("u", json).expect("decode");
        assert_eq!(schema.id, "S");
    }

    #[test]
    fn missing_id_is_fetch_error() {
        let json = br#"{"nodes": {"hw": {}}, "edges": []}"#;
        let err = SchemaDocument::from_json("u", json).expect_err("no id");
        assert_eq!(err.kind(), ErrorKind::Fetch);
    }

    #[test]
    fn non_json_is_fetch_error() {
        let err = SchemaDocument::from_json("u", b"<html>").expect_err("garbage");
        assert_eq!(err.kind(), ErrorKind::Fetch);
    }

    #[test]
    fn memory_source_unknown_url() {
        let source = MemorySchemaSource::new();
        assert!(source.load("https://nowhere").is_err());
    }
}
