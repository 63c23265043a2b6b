//! # Property-Based Tests
//!
//! Invariants of the compatibility graph checked with proptest.

use compspec_core::graph::NodeDocument;
use compspec_core::{
    CompatibilityGraph, CompspecError, ImageRef, NodeId, SchemaDocument,
};
use proptest::collection::{btree_set, vec};
use proptest::prelude::*;
use std::collections::BTreeSet;

const URL: &str = "https://schemas.example.com/S.json";

fn segment() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,6}"
}

fn key() -> impl Strategy<Value = Vec<String>> {
    vec(segment(), 1..5)
}

fn schema(nodes: &BTreeSet<String>) -> SchemaDocument {
    SchemaDocument {
        id: "S".to_string(),
        nodes: nodes
            .iter()
            .map(|n| (n.clone(), NodeDocument::default()))
            .collect(),
        edges: Vec::new(),
    }
}

fn graph_with_schema() -> CompatibilityGraph {
    let mut graph = CompatibilityGraph::default();
    graph.merge_schema(URL, schema(&BTreeSet::from(["hw".to_string()])));
    graph
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// An empty constraint list returns exactly the indexed images.
    #[test]
    fn empty_match_is_universal(images in btree_set("[a-z]{1,8}", 0..20)) {
        let mut graph = graph_with_schema();
        for image in &images {
            graph
                .add_attribute(&ImageRef::new(image.as_str()), "S", "hw.arch", "x86")
                .expect("attribute");
        }

        let empty: [&str; 0] = [];
        let matches = graph.match_constraints(&empty).expect("match");
        let expected: Vec<ImageRef> = images.iter().map(|i| ImageRef::new(i.as_str())).collect();
        prop_assert_eq!(matches, expected);
    }

    /// Merging the same schema URL twice leaves the graph as after once.
    #[test]
    fn add_schema_idempotent(nodes in btree_set(segment(), 1..20)) {
        let mut once = CompatibilityGraph::default();
        once.merge_schema(URL, schema(&nodes));

        let mut twice = once.clone();
        twice.merge_schema(URL, schema(&nodes));

        prop_assert_eq!(once.document(), twice.document());
        prop_assert_eq!(once.schemas().count(), twice.schemas().count());
    }

    /// A dotted attribute puts every ancestor path into the footprint.
    #[test]
    fn ancestor_closure(segments in key(), value in segment()) {
        let mut graph = graph_with_schema();
        let image = ImageRef::new("img");
        let key = segments.join(".");

        graph.add_attribute(&image, "S", &key, &value).expect("attribute");

        let footprint = graph.footprint(&image).cloned().unwrap_or_default();
        prop_assert!(footprint.contains(&NodeId::new("compspec-root")));
        prop_assert!(footprint.contains(&NodeId::new("S")));
        for depth in 1..=segments.len() {
            let prefix = format!("S.{}", segments[..depth].join("."));
            prop_assert!(footprint.contains(&NodeId::new(prefix.as_str())));
        }
        let leaf = format!("S.{}.{}", key, value);
        prop_assert!(footprint.contains(&NodeId::new(leaf.as_str())));
        prop_assert_eq!(footprint.len(), segments.len() + 3);
    }

    /// Every footprint node maps back to the image and vice versa.
    #[test]
    fn index_is_bidirectional(
        entries in vec(("[a-c]", key(), segment()), 1..30)
    ) {
        let mut graph = graph_with_schema();
        for (image, segments, value) in &entries {
            graph
                .add_attribute(&ImageRef::new(image.as_str()), "S", &segments.join("."), value)
                .expect("attribute");
        }

        for image in graph.images() {
            for node in graph.footprint(image).into_iter().flatten() {
                prop_assert!(graph.images_for(node).is_some_and(|i| i.contains(image)));
            }
        }
        for (image, nodes) in graph.mapping() {
            for node in nodes {
                let images = graph.images_for(node).cloned().unwrap_or_default();
                prop_assert!(images.contains(image));
            }
        }
    }

    /// Constraints selecting disjoint image sets fail, never return empty.
    #[test]
    fn disjoint_constraints_error(left in "[a-m]{1,6}", right in "[n-z]{1,6}") {
        let mut graph = graph_with_schema();
        graph
            .add_attribute(&ImageRef::new(left.as_str()), "S", "hw.accel", "gpu")
            .expect("attribute");
        graph
            .add_attribute(&ImageRef::new(right.as_str()), "S", "hw.accel", "fpga")
            .expect("attribute");

        let result = graph.match_constraints(&["S.hw.accel=gpu", "S.hw.accel=fpga"]);
        let is_unsatisfiable = matches!(result, Err(CompspecError::UnsatisfiableConstraints(_)));
        prop_assert!(is_unsatisfiable);
    }

    /// Match results are sorted and free of duplicates.
    #[test]
    fn match_results_sorted(images in vec("[a-z]{1,5}", 1..20)) {
        let mut graph = graph_with_schema();
        for image in &images {
            graph
                .add_attribute(&ImageRef::new(image.as_str()), "S", "hw.arch", "x86")
                .expect("attribute");
        }

        let matches = graph.match_constraints(&["S.hw.arch=x86"]).expect("match");
        let mut sorted = matches.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(matches, sorted);
    }
}
