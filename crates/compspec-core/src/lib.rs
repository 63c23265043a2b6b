//! # compspec-core
//!
//! The deterministic compatibility graph engine for compspec.
//!
//! Given attribute taxonomies ("schemas") and per-image compatibility
//! artifacts, this crate builds one namespaced graph, records for every image
//! the set of nodes it satisfies, and answers "which images satisfy
//! `key=value, ...`" by set intersection.
//!
//! ## Pipeline
//!
//! ```text
//! SchemaSource ──▶ merge_schema ──▶ index_artifact ──▶ ImageIndex ──▶ match_constraints
//!                        ▲                                   │
//!                        └────────── load_graph / save_graph ┘
//! ```
//!
//! ## Architectural Constraints
//!
//! - No async, no network: schemas arrive through [`SchemaSource`]
//! - BTree collections only, so every result is ordered and reproducible
//! - Append-only: nothing is ever removed from a graph within a run
//! - No logging: operations return reports and the caller decides what to say

// =============================================================================
// MODULES
// =============================================================================

pub mod artifact;
pub mod compat;
pub mod extract;
pub mod formats;
pub mod graph;
pub mod index;
pub mod matcher;
pub mod primitives;
pub mod schema;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{CompspecError, Edge, ErrorKind, ImageRef, Node, NodeId};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use compat::{
    CompatibilityGraph, GraphConfig, IngestReport, LoadOutcome, SaveOutcome,
};
pub use graph::{Graph, GraphDocument};
pub use index::ImageIndex;
pub use matcher::Constraint;
pub use schema::{MemorySchemaSource, SchemaDocument, SchemaSource};

// =============================================================================
// RE-EXPORTS: Documents
// =============================================================================

pub use artifact::{CompatibilityArtifact, Compatibility, ImagePair, Manifest};
pub use extract::{
    ExtractWarning, ExtractionResult, ExtractorData, Field, PluginRequest, Populated,
    populate_request,
};
pub use formats::GraphCache;
