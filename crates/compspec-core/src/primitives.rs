//! # Primitives
//!
//! Fixed constants for the compspec engine.
//!
//! Values that callers may want to change per graph instance (the root label,
//! the artifact media type) are defaults only; the engine receives them
//! through [`crate::GraphConfig`].

/// Default label of the synthetic root every schema hangs off.
pub const DEFAULT_ROOT_LABEL: &str = "compspec-root";

/// Default media type of the compatibility artifact layer in a registry.
pub const DEFAULT_MEDIA_TYPE: &str = "application/org.supercontainers.compspec";

/// Separator between namespace and label in node ids.
pub const PATH_SEPARATOR: char = '.';

/// Separator between key and value in constraints and custom fields.
pub const ASSIGNMENT: char = '=';

/// The only edge relation used in the compatibility graph.
pub const CONTAINS_RELATION: &str = "contains";

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum size of a graph cache file (256 MB).
///
/// Checked before the file is parsed.
pub const MAX_GRAPH_CACHE_SIZE: u64 = 256 * 1024 * 1024;

/// Maximum size of a manifest, request, schema or artifact document (16 MB).
pub const MAX_DOCUMENT_SIZE: u64 = 16 * 1024 * 1024;

/// Maximum number of constraints accepted by a single match.
pub const MAX_CONSTRAINTS: usize = 1024;
