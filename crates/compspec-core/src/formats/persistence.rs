//! # Persistence Format
//!
//! JSON serialization of a compatibility graph cache.
//!
//! The cache document carries the graph at top level (`nodes`, `edges`) next
//! to the list of merged schema URLs and the image footprints:
//!
//! ```json
//! {
//!   "nodes": { "compspec-root": { "label": "compspec-root" } },
//!   "edges": [],
//!   "schemas": ["https://..."],
//!   "declared": ["io.archspec", "io.archspec.cpu"],
//!   "imageMapping": { "ghcr.io/org/app:tag": ["compspec-root", "..."] }
//! }
//! ```
//!
//! `schemas`, `declared` and `imageMapping` are optional, so a bare node/edge
//! document is also a valid cache. This module is a pure transformation; file handling
//! lives in [`crate::compat`].
//!
//! ## Limits
//!
//! The payload size is validated before any parsing.

use crate::graph::GraphDocument;
use crate::index::Footprints;
use crate::primitives::MAX_GRAPH_CACHE_SIZE;
use crate::{CompspecError, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The on-disk graph cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphCache {
    #[serde(flatten)]
    pub graph: GraphDocument,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub schemas: BTreeSet<String>,

    /// Nodes that came from schemas rather than from artifact attributes.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub declared: BTreeSet<NodeId>,

    #[serde(
        default,
        rename = "imageMapping",
        skip_serializing_if = "Footprints::is_empty"
    )]
    pub image_mapping: Footprints,
}

/// Serialize a cache to pretty-printed JSON.
pub fn cache_to_bytes(cache: &GraphCache) -> Result<Vec<u8>, CompspecError> {
    let mut bytes = serde_json::to_vec_pretty(cache)
        .map_err(|e| CompspecError::Serialization(e.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Deserialize a cache from JSON bytes.
pub fn cache_from_bytes(bytes: &[u8]) -> Result<GraphCache, CompspecError> {
    if bytes.len() as u64 > MAX_GRAPH_CACHE_SIZE {
        return Err(CompspecError::Deserialization(format!(
            "Graph cache size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_GRAPH_CACHE_SIZE
        )));
    }

    serde_json::from_slice(bytes).map_err(|e| CompspecError::Deserialization(e.to_string()))
}

// =============================================================================
// TESTS
// =============================================================================
