//! # Core Type Definitions
//!
//! This module contains the core types for the compspec compatibility graph:
//! - Graph identifiers (`NodeId`, `ImageRef`)
//! - Graph elements (`Node`, `Edge`)
//! - Error types (`CompspecError`, `ErrorKind`)
//!
//! ## Determinism Guarantees
//!
//! All identifiers implement `Ord` so they can live in `BTreeMap`/`BTreeSet`.
//! Iteration order over any collection in this crate is therefore stable
//! across runs and platforms.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::primitives::{CONTAINS_RELATION, PATH_SEPARATOR};

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of a node in the compatibility graph.
///
/// Node ids are dotted paths: the global root, a schema root such as
/// `io.archspec`, or a namespaced attribute such as `io.archspec.cpu.target`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// Create a new node id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix `label` with this id as namespace: `self.label`.
    #[must_use]
    pub fn child(&self, label: &str) -> Self {
        Self(format!("{}{}{}", self.0, PATH_SEPARATOR, label))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Reference to a container image (or application) indexed by the graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(pub String);

impl ImageRef {
    /// Create a new image reference.
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Get the reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// NODE & EDGE
// =============================================================================

/// A node in the compatibility graph.
///
/// Schema metadata is dropped on merge, so `metadata` is empty for every node
/// the engine creates. It survives a cache round trip if a cache file carries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// The node label (same as its id).
    pub label: NodeId,
    /// Free-form metadata bag.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Node {
    /// Create a node without metadata.
    #[must_use]
    pub fn new(label: NodeId) -> Self {
        Self {
            label,
            metadata: BTreeMap::new(),
        }
    }
}

/// A directed, labelled edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub relation: String,
}

impl Edge {
    /// Create a `contains` edge, the only relation the compatibility graph uses.
    #[must_use]
    pub fn contains(source: NodeId, target: NodeId) -> Self {
        Self {
            source,
            target,
            relation: CONTAINS_RELATION.to_string(),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Coarse error category, used by callers to decide between abort and skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    Config,
    Schema,
    Fetch,
    Match,
    Cache,
    Io,
    Serialization,
}

/// Errors that can occur in compspec.
///
/// - No silent failures
/// - Use `Result<T, CompspecError>` for fallible operations
/// - The engine never panics; all errors are recoverable values
#[derive(Debug, Error)]
pub enum CompspecError {
    /// Invalid or missing configuration (flags, manifest, request).
    #[error("Configuration error: {0}")]
    Config(String),

    /// An artifact names a schema root that was never merged.
    #[error("Schema root node {0} is missing from the graph, missing from schemas")]
    SchemaRootMissing(String),

    /// An attribute key or value cannot be placed in the graph.
    #[error("Invalid attribute '{key}': {reason}")]
    InvalidAttribute { key: String, reason: String },

    /// A schema or artifact could not be retrieved or decoded.
    #[error("Failed to fetch {target}: {reason}")]
    Fetch { target: String, reason: String },

    /// A fetch was abandoned because the run was cancelled.
    #[error("Fetch of {0} was cancelled")]
    Cancelled(String),

    /// A constraint is not of the form `key=value`.
    #[error("Malformed constraint '{0}': expected key=value")]
    MalformedConstraint(String),

    /// A constraint names a node absent from the graph.
    #[error("Field {0} is not known and cannot be matched")]
    UnknownField(String),

    /// Adding this constraint empties the match set.
    #[error("Adding field {0} empties match set, no match possible")]
    UnsatisfiableConstraints(String),

    /// The configured cache directory does not exist.
    #[error("Cache path {0} does not exist")]
    CacheDirMissing(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl CompspecError {
    /// Shorthand for a fetch failure.
    #[must_use]
    pub fn fetch(target: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Fetch {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// The category this error belongs to.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::SchemaRootMissing(_) | Self::InvalidAttribute { .. } => ErrorKind::Schema,
            Self::Fetch { .. } | Self::Cancelled(_) => ErrorKind::Fetch,
            Self::MalformedConstraint(_)
            | Self::UnknownField(_)
            | Self::UnsatisfiableConstraints(_) => ErrorKind::Match,
            Self::CacheDirMissing(_) => ErrorKind::Cache,
            Self::Io(_) => ErrorKind::Io,
            Self::Serialization(_) | Self::Deserialization(_) => ErrorKind::Serialization,
        }
    }
}

impl From<std::io::Error> for CompspecError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
