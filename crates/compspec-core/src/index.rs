//! # Image Index
//!
//! The bidirectional relation between images and graph nodes.
//!
//! Two maps are kept in lockstep:
//! - footprints: image -> nodes the image satisfies
//! - node images: node -> images that satisfy it
//!
//! The only mutation is [`ImageIndex::insert`], which writes both sides, so
//! `node ∈ footprint(image)` holds exactly when `image ∈ images_for(node)`.

use crate::{ImageRef, NodeId};
use std::collections::{BTreeMap, BTreeSet};

/// Image to node footprint map.
pub type Footprints = BTreeMap<ImageRef, BTreeSet<NodeId>>;

/// Bidirectional image/node index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageIndex {
    footprints: Footprints,
    node_images: BTreeMap<NodeId, BTreeSet<ImageRef>>,
}

impl ImageIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an index from footprints alone.
    #[must_use]
    pub fn from_footprints(footprints: Footprints) -> Self {
        let mut index = Self::new();
        for (image, nodes) in footprints {
            // An image with an empty footprint still counts as indexed.
            index.footprints.entry(image.clone()).or_default();
            for node in nodes {
                index.insert(&image, node);
            }
        }
        index
    }

    /// Record that `image` satisfies `node`. Returns `false` if already recorded.
    pub fn insert(&mut self, image: &ImageRef, node: NodeId) -> bool {
        let added = self
            .footprints
            .entry(image.clone())
            .or_default()
            .insert(node.clone());
        self.node_images
            .entry(node)
            .or_default()
            .insert(image.clone());
        added
    }

    /// Nodes satisfied by `image`.
    #[must_use]
    pub fn footprint(&self, image: &ImageRef) -> Option<&BTreeSet<NodeId>> {
        self.footprints.get(image)
    }

    /// Images satisfying `node`.
    #[must_use]
    pub fn images_for(&self, node: &NodeId) -> Option<&BTreeSet<ImageRef>> {
        self.node_images.get(node)
    }

    /// Every indexed image, in order.
    pub fn images(&self) -> impl Iterator<Item = &ImageRef> {
        self.footprints.keys()
    }

    /// Check whether `image` has a footprint.
    #[must_use]
    pub fn contains_image(&self, image: &ImageRef) -> bool {
        self.footprints.contains_key(image)
    }

    /// The footprint map, for persistence and printing.
    #[must_use]
    pub fn footprints(&self) -> &Footprints {
        &self.footprints
    }

    /// Number of indexed images.
    #[must_use]
    pub fn len(&self) -> usize {
        self.footprints.len()
    }

    /// True when no image is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.footprints.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
