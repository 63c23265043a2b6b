//! # Compatibility Graph
//!
//! The engine: merges schemas into one namespaced graph, records which nodes
//! each image's artifact touches, answers constraint queries and persists the
//! result.
//!
//! ## Shape
//!
//! ```text
//! compspec-root
//! ├── io.archspec                     (schema root, graph id of the schema)
//! │   └── io.archspec.cpu
//! │       └── io.archspec.cpu.target
//! │           └── io.archspec.cpu.target.zen4      (value node)
//! └── org.supercontainers
//!     └── ...
//! ```
//!
//! Every schema-local id `n` becomes `R.n` under the schema root `R`, so
//! independently authored schemas never collide. All state is append-only.

use crate::artifact::CompatibilityArtifact;
use crate::formats::persistence::{GraphCache, cache_from_bytes, cache_to_bytes};
use crate::graph::{Graph, GraphDocument};
use crate::index::{Footprints, ImageIndex};
use crate::matcher;
use crate::primitives::{DEFAULT_ROOT_LABEL, MAX_GRAPH_CACHE_SIZE, PATH_SEPARATOR};
use crate::schema::{SchemaDocument, SchemaSource};
use crate::{CompspecError, Edge, ImageRef, NodeId};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Per-instance graph conventions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphConfig {
    /// Label of the synthetic root node.
    pub root_label: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            root_label: DEFAULT_ROOT_LABEL.to_string(),
        }
    }
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// Summary of indexing one artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Schema roots merged while ingesting (empty if all were known).
    pub schemas_added: Vec<NodeId>,
    /// Number of attributes recorded.
    pub attributes: usize,
    /// Attribute paths no merged schema declares.
    pub undeclared: Vec<NodeId>,
}

/// Result of [`CompatibilityGraph::save_graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Written,
    AlreadyExists,
}

/// Result of [`CompatibilityGraph::load_graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    NotFound,
}

// =============================================================================
// COMPATIBILITY GRAPH
// =============================================================================

/// Namespaced schema graph plus the image/node index.
#[derive(Debug, Clone)]
pub struct CompatibilityGraph {
    config: GraphConfig,
    graph: Graph,
    /// URLs of merged schemas. Each is merged at most once.
    schemas: BTreeSet<String>,
    /// Nodes contributed by merged schemas, as opposed to attribute paths.
    declared: BTreeSet<NodeId>,
    index: ImageIndex,
}

impl Default for CompatibilityGraph {
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}

impl CompatibilityGraph {
    /// Create a graph holding only the root node.
    #[must_use]
    pub fn new(config: GraphConfig) -> Self {
        let mut graph = Graph::new();
        graph.add_node(NodeId::new(config.root_label.as_str()));
        Self {
            config,
            graph,
            schemas: BTreeSet::new(),
            declared: BTreeSet::new(),
            index: ImageIndex::new(),
        }
    }

    /// The root node id.
    #[must_use]
    pub fn root(&self) -> NodeId {
        NodeId::new(self.config.root_label.as_str())
    }

    /// The conventions this graph was built with.
    #[must_use]
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Check if a node exists.
    #[must_use]
    pub fn has_node(&self, id: &str) -> bool {
        self.graph.contains_node(&NodeId::new(id))
    }

    /// Check if the schema at `url` was already merged.
    #[must_use]
    pub fn has_schema(&self, url: &str) -> bool {
        self.schemas.contains(url)
    }

    /// Merged schema URLs, in order.
    pub fn schemas(&self) -> impl Iterator<Item = &str> {
        self.schemas.iter().map(String::as_str)
    }

    /// Schema root ids directly under the root, in order.
    #[must_use]
    pub fn schema_roots(&self) -> Vec<NodeId> {
        let root = self.root();
        self.graph.children(&root).cloned().collect()
    }

    /// Check if `id` is a merged schema root.
    #[must_use]
    pub fn is_schema_root(&self, id: &str) -> bool {
        self.graph.contains_edge(&self.root(), &NodeId::new(id))
    }

    /// Number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    // =========================================================================
    // SCHEMA MERGE
    // =========================================================================

    /// Load and merge the schema at `url`, unless it was merged before.
    ///
    /// Returns the schema root id when a merge happened.
    pub fn add_schema<S: SchemaSource + ?Sized>(
        &mut self,
        url: &str,
        source: &S,
    ) -> Result<Option<NodeId>, CompspecError> {
        if self.has_schema(url) {
            return Ok(None);
        }
        let doc = source.load(url)?;
        Ok(self.merge_schema(url, doc))
    }

    /// Merge an already loaded schema document. A known `url` is a no-op.
    ///
    /// Schema node `n` becomes `R.n` for schema root `R`. Nodes without a dot
    /// hang directly off `R`; every schema edge is kept, re-namespaced, as a
    /// `contains` edge. Schema metadata is not carried over.
    pub fn merge_schema(&mut self, url: &str, doc: SchemaDocument) -> Option<NodeId> {
        if self.has_schema(url) {
            return None;
        }

        let root = self.root();
        let schema_root = NodeId::new(doc.id.as_str());
        self.graph.add_node(schema_root.clone());
        self.graph.add_edge(Edge::contains(root, schema_root.clone()));
        self.declared.insert(schema_root.clone());

        for local_id in doc.nodes.keys() {
            let node = schema_root.child(local_id);
            self.graph.add_node(node.clone());
            self.declared.insert(node.clone());
            if !local_id.contains(PATH_SEPARATOR) {
                self.graph
                    .add_edge(Edge::contains(schema_root.clone(), node));
            }
        }

        for edge in &doc.edges {
            let source = schema_root.child(&edge.source);
            let target = schema_root.child(&edge.target);
            self.graph.add_node(source.clone());
            self.graph.add_node(target.clone());
            self.declared.insert(source.clone());
            self.declared.insert(target.clone());
            self.graph.add_edge(Edge::contains(source, target));
        }

        self.schemas.insert(url.to_string());
        Some(schema_root)
    }

    // =========================================================================
    // ATTRIBUTE INDEXING
    // =========================================================================

    /// Record `key=value` under `schema_name` for `image`.
    ///
    /// `schema_name` must be a merged schema root or a node beneath one.
    /// The image is linked to the root, to `schema_name`, to every ancestor
    /// path of `key` and to the value node `schema_name.key.value`, which is
    /// created with an edge from `schema_name.key`. Returns the value node.
    pub fn add_attribute(
        &mut self,
        image: &ImageRef,
        schema_name: &str,
        key: &str,
        value: &str,
    ) -> Result<NodeId, CompspecError> {
        self.check_schema_name(schema_name)?;
        check_attribute(key)?;
        Ok(self.record_attribute(image, schema_name, key, value))
    }

    /// Record every attribute of `artifact` for `image`.
    ///
    /// The artifact is validated as a whole first: an unknown schema name or a
    /// malformed attribute aborts before anything is recorded.
    pub fn index_artifact(
        &mut self,
        image: &ImageRef,
        artifact: &CompatibilityArtifact,
    ) -> Result<IngestReport, CompspecError> {
        for compat in &artifact.compatibilities {
            self.check_schema_name(&compat.name)?;
            for (key, value) in &compat.attributes {
                check_attribute(key)?;
            }
        }

        let mut report = IngestReport::default();
        for compat in &artifact.compatibilities {
            for (key, value) in &compat.attributes {
                let parent = NodeId::new(compat.name.as_str()).child(key);
                if !self.declared.contains(&parent) {
                    report.undeclared.push(parent);
                }
                self.record_attribute(image, &compat.name, key, value);
                report.attributes += 1;
            }
        }
        Ok(report)
    }

    /// Merge the artifact's schemas from `source`, then index it.
    pub fn ingest_artifact<S: SchemaSource + ?Sized>(
        &mut self,
        image: &ImageRef,
        artifact: &CompatibilityArtifact,
        source: &S,
    ) -> Result<IngestReport, CompspecError> {
        let mut added = Vec::new();
        for url in artifact.schema_urls() {
            if let Some(root) = self.add_schema(url, source)? {
                added.push(root);
            }
        }

        let mut report = self.index_artifact(image, artifact)?;
        report.schemas_added = added;
        Ok(report)
    }

    fn check_schema_name(&self, schema_name: &str) -> Result<(), CompspecError> {
        let node = NodeId::new(schema_name);
        if schema_name.is_empty() || node == self.root() || !self.graph.contains_node(&node) {
            return Err(CompspecError::SchemaRootMissing(schema_name.to_string()));
        }
        Ok(())
    }

    fn record_attribute(
        &mut self,
        image: &ImageRef,
        schema_name: &str,
        key: &str,
        value: &str,
    ) -> NodeId {
        let root = self.root();
        let schema_node = NodeId::new(schema_name);

        if !self.index.contains_image(image) {
            self.index.insert(image, root);
            self.index.insert(image, schema_node.clone());
        }

        // a.b.c, then a.b, then a
        let mut path = key;
        loop {
            self.index.insert(image, schema_node.child(path));
            match path.rsplit_once(PATH_SEPARATOR) {
                Some((parent, _)) => path = parent,
                None => break,
            }
        }

        let parent = schema_node.child(key);
        let value_node = parent.child(value);
        self.graph.add_node(parent.clone());
        self.graph.add_node(value_node.clone());
        self.graph
            .add_edge(Edge::contains(parent, value_node.clone()));
        self.index.insert(image, value_node.clone());
        value_node
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Images satisfying every `key=value` constraint, sorted.
    ///
    /// Keys must be fully schema qualified. An empty list matches every image.
    pub fn match_constraints<S: AsRef<str>>(
        &self,
        constraints: &[S],
    ) -> Result<Vec<ImageRef>, CompspecError> {
        Ok(matcher::match_images(&self.index, constraints)?
            .into_iter()
            .collect())
    }

    /// Nodes satisfied by `image`.
    #[must_use]
    pub fn footprint(&self, image: &ImageRef) -> Option<&BTreeSet<NodeId>> {
        self.index.footprint(image)
    }

    /// Images satisfying `node`.
    #[must_use]
    pub fn images_for(&self, node: &NodeId) -> Option<&BTreeSet<ImageRef>> {
        self.index.images_for(node)
    }

    /// Every indexed image, in order.
    pub fn images(&self) -> impl Iterator<Item = &ImageRef> {
        self.index.images()
    }

    /// Image to footprint map.
    #[must_use]
    pub fn mapping(&self) -> &Footprints {
        self.index.footprints()
    }

    /// Snapshot of the node/edge structure.
    #[must_use]
    pub fn document(&self) -> GraphDocument {
        GraphDocument::from(&self.graph)
    }

    // =========================================================================
    // PERSISTENCE
    // =========================================================================

    /// Snapshot of everything needed to restore this graph.
    #[must_use]
    pub fn to_cache(&self) -> GraphCache {
        GraphCache {
            graph: self.document(),
            schemas: self.schemas.clone(),
            declared: self.declared.clone(),
            image_mapping: self.index.footprints().clone(),
        }
    }

    /// Replace this graph's state with a cache snapshot.
    ///
    /// The snapshot is trusted as-is; the root node is added if missing.
    pub fn restore(&mut self, cache: GraphCache) {
        let mut graph = Graph::from(cache.graph);
        graph.add_node(self.root());
        self.graph = graph;
        self.schemas = cache.schemas;
        self.declared = cache.declared;
        self.index = ImageIndex::from_footprints(cache.image_mapping);
    }

    /// Write the graph cache to `path` unless a file is already there.
    ///
    /// The file is written to a temporary sibling and linked into place only
    /// if `path` is still free, so concurrent writers never clobber each other.
    pub fn save_graph(&self, path: &Path) -> Result<SaveOutcome, CompspecError> {
        if path.exists() {
            return Ok(SaveOutcome::AlreadyExists);
        }

        let bytes = cache_to_bytes(&self.to_cache())?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;

        match tmp.persist_noclobber(path) {
            Ok(_) => Ok(SaveOutcome::Written),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                Ok(SaveOutcome::AlreadyExists)
            }
            Err(e) => Err(CompspecError::Io(format!(
                "Cannot write graph to {}: {}",
                path.display(),
                e.error
            ))),
        }
    }

    /// Replace the graph with the cache at `path`, if there is one.
    pub fn load_graph(&mut self, path: &Path) -> Result<LoadOutcome, CompspecError> {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LoadOutcome::NotFound);
            }
            Err(e) => return Err(e.into()),
        };

        if metadata.len() > MAX_GRAPH_CACHE_SIZE {
            return Err(CompspecError::Deserialization(format!(
                "Graph cache {} is {} bytes, maximum allowed is {} bytes",
                path.display(),
                metadata.len(),
                MAX_GRAPH_CACHE_SIZE
            )));
        }

        let bytes = std::fs::read(path)?;
        self.restore(cache_from_bytes(&bytes)?);
        Ok(LoadOutcome::Loaded)
    }
}

fn check_attribute(key: &str) -> Result<(), CompspecError> {
    let invalid = |reason: &str| CompspecError::InvalidAttribute {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("empty key"));
    }
    if key.split(PATH_SEPARATOR).any(str::is_empty) {
        return Err(invalid("empty path segment"));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
