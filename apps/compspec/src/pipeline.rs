//! # Graph Pipeline
//!
//! Builds a [`CompatibilityGraph`] from an image manifest:
//!
//! ```text
//! graph cache? ──yes──▶ load and trust it
//!      │no
//!      ▼
//! for each image: artifact (cache ▶ registry) ──▶ fetch unknown schemas ──▶ ingest
//!      │
//!      ▼
//! save graph cache (never overwrites)
//! ```

use crate::fetch::{ArtifactFetcher, SchemaLoader};
use compspec_core::{
    CompatibilityArtifact, CompatibilityGraph, CompspecError, GraphConfig, ImageRef,
    LoadOutcome, Manifest, MemorySchemaSource, SaveOutcome,
};
use std::path::PathBuf;

/// Per-run build options.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Skip images whose artifact cannot be fetched instead of aborting.
    pub allow_fail: bool,
    /// Load the graph from, and save it to, this file.
    pub graph_cache: Option<PathBuf>,
}

/// Result of [`Pipeline::build`].
#[derive(Debug)]
pub struct BuildOutcome {
    pub graph: CompatibilityGraph,
    /// Images skipped because their artifact could not be fetched.
    pub missing: Vec<ImageRef>,
    /// The graph came from the graph cache.
    pub from_cache: bool,
}

/// Result of [`Pipeline::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub total: usize,
    pub missing: Vec<ImageRef>,
}

/// Manifest to graph, using the configured fetchers.
pub struct Pipeline {
    schemas: SchemaLoader,
    artifacts: ArtifactFetcher,
    graph_config: GraphConfig,
}

impl Pipeline {
    #[must_use]
    pub fn new(schemas: SchemaLoader, artifacts: ArtifactFetcher, graph_config: GraphConfig) -> Self {
        Self {
            schemas,
            artifacts,
            graph_config,
        }
    }

    /// Build the graph for every image in `manifest`.
    pub async fn build(
        &self,
        manifest: &Manifest,
        options: &BuildOptions,
    ) -> Result<BuildOutcome, CompspecError> {
        let mut graph = CompatibilityGraph::new(self.graph_config.clone());

        if let Some(path) = &options.graph_cache {
            if graph.load_graph(path)? == LoadOutcome::Loaded {
                tracing::info!(
                    "Loaded graph cache {} ({} nodes, {} images)",
                    path.display(),
                    graph.node_count(),
                    graph.mapping().len()
                );
                return Ok(BuildOutcome {
                    graph,
                    missing: Vec::new(),
                    from_cache: true,
                });
            }
        }

        let mut missing = Vec::new();
        for pair in &manifest.images {
            let image = ImageRef::new(pair.name.as_str());
            let artifact = match self.artifacts.load(&pair.artifact).await {
                Ok(artifact) => artifact,
                Err(e @ CompspecError::Fetch { .. }) if options.allow_fail => {
                    tracing::warn!("Skipping {}: {}", image, e);
                    missing.push(image);
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.ingest(&mut graph, &image, &artifact).await?;
        }

        if let Some(path) = &options.graph_cache {
            match graph.save_graph(path)? {
                SaveOutcome::Written => tracing::info!("Saved graph cache {}", path.display()),
                SaveOutcome::AlreadyExists => {
                    tracing::debug!("Graph cache {} already exists", path.display());
                }
            }
        }

        Ok(BuildOutcome {
            graph,
            missing,
            from_cache: false,
        })
    }

    async fn ingest(
        &self,
        graph: &mut CompatibilityGraph,
        image: &ImageRef,
        artifact: &CompatibilityArtifact,
    ) -> Result<(), CompspecError> {
        let mut source = MemorySchemaSource::new();
        for url in artifact.schema_urls() {
            if !graph.has_schema(url) {
                source.insert(url, self.schemas.load(url).await?);
            }
        }

        let report = graph.ingest_artifact(image, artifact, &source)?;
        for schema in &report.schemas_added {
            tracing::debug!(schema = %schema, "Merged schema");
        }
        for path in &report.undeclared {
            tracing::warn!("{}: attribute {} is not declared by its schema", image, path);
        }
        tracing::debug!(image = %image, attributes = report.attributes, "Indexed artifact");
        Ok(())
    }

    /// Try to fetch every artifact in `manifest` and report the ones missing.
    ///
    /// Fetch failures are counted, never fatal. Cancellation still aborts.
    pub async fn check(&self, manifest: &Manifest) -> Result<CheckReport, CompspecError> {
        let mut missing = Vec::new();
        for pair in &manifest.images {
            match self.artifacts.load(&pair.artifact).await {
                Ok(_) => tracing::debug!(image = %pair.name, "Artifact found"),
                Err(e @ CompspecError::Cancelled(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!("{}: {}", pair.name, e);
                    missing.push(ImageRef::new(pair.name.as_str()));
                }
            }
        }
        Ok(CheckReport {
            total: manifest.images.len(),
            missing,
        })
    }
}
