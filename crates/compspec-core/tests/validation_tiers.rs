//! # Validation Tier Tests (T0-T3)
//!
//! End-to-end behavior of the engine, tier by tier.
//!
//! ## Tiers
//! - T0: Schema Merge
//! - T1: Attribute Indexing
//! - T2: Matching
//! - T3: Persistence

use compspec_core::{
    Compatibility, CompatibilityArtifact, CompatibilityGraph, CompspecError, ErrorKind, ImageRef,
    LoadOutcome, MemorySchemaSource, NodeId, SaveOutcome, SchemaDocument,
};

const S_URL: &str = "https://schemas.example.com/S.json";
const ARCHSPEC_URL: &str = "https://schemas.example.com/archspec.json";

fn s_schema() -> SchemaDocument {
    SchemaDocument::from_json(
        S_URL,
        br#"{"graph": {"id": "S", "nodes": {"hw": {}, "hw.gpu": {}, "hw.arch": {}, "hw.accel": {}},
            "edges": [{"source": "hw", "target": "hw.gpu"}, {"source": "hw", "target": "hw.arch"}, {"source": "hw", "target": "hw.accel"}]}}"#,
    )
    .expect("schema")
}

fn archspec_schema() -> SchemaDocument {
    SchemaDocument::from_json(
        ARCHSPEC_URL,
        br#"{"graph": {"id": "io.archspec", "nodes": {"cpu": {}, "cpu.target": {}},
            "edges": [{"source": "cpu", "target": "cpu.target", "relation": "contains"}]}}"#,
    )
    .expect("schema")
}

fn source() -> MemorySchemaSource {
    MemorySchemaSource::new()
        .with(S_URL, s_schema())
        .with(ARCHSPEC_URL, archspec_schema())
}

fn artifact(schema: &str, url: &str, attrs: &[(&str, &str)]) -> CompatibilityArtifact {
    let mut artifact = CompatibilityArtifact {
        version: "0.0.0".into(),
        kind: "CompatibilitySpec".into(),
        ..Default::default()
    };
    artifact.metadata.name = "test".into();
    artifact.metadata.schemas.insert(schema.into(), url.into());
    artifact.compatibilities.push(Compatibility {
        name: schema.into(),
        version: "0.0.0".into(),
        attributes: attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    });
    artifact
}

fn images(names: &[&str]) -> Vec<ImageRef> {
    names.iter().map(|n| ImageRef::new(*n)).collect()
}

// =============================================================================
// TIER T0: SCHEMA MERGE
// =============================================================================

mod t0_schema_merge {
    use super::*;

    /// T0.1: Two schemas live side by side under the root.
    #[test]
    fn schemas_are_namespaced() {
        let mut graph = CompatibilityGraph::default();
        graph.add_schema(S_URL, &source()).expect("S");
        graph.add_schema(ARCHSPEC_URL, &source()).expect("archspec");

        assert_eq!(
            graph.schema_roots(),
            vec![NodeId::new("S"), NodeId::new("io.archspec")]
        );
        assert!(graph.has_node("io.archspec.cpu.target"));
        assert!(graph.has_node("S.hw.gpu"));
    }

    /// T0.2: Adding a schema twice is the same as once.
    #[test]
    fn add_schema_twice_equals_once() {
        let mut once = CompatibilityGraph::default();
        once.add_schema(S_URL, &source()).expect("once");

        let mut twice = CompatibilityGraph::default();
        twice.add_schema(S_URL, &source()).expect("first");
        twice.add_schema(S_URL, &source()).expect("second");

        assert_eq!(once.document(), twice.document());
    }
}

// =============================================================================
// TIER T1: ATTRIBUTE INDEXING
// =============================================================================

mod t1_attribute_indexing {
    use super::*;

    /// T1.1: An artifact naming an unmerged schema aborts.
    #[test]
    fn unknown_schema_root_aborts() {
        let mut graph = CompatibilityGraph::default();
        let err = graph
            .index_artifact(&ImageRef::new("img"), &artifact("S", S_URL, &[("hw.gpu", "true")]))
            .expect_err("no schema merged");
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    /// T1.2: The footprint of `a.b.c = v` is the ancestor closure.
    #[test]
    fn footprint_is_ancestor_closure() {
        let mut graph = CompatibilityGraph::default();
        let image = ImageRef::new("img");
        graph
            .ingest_artifact(&image, &artifact("S", S_URL, &[("a.b.c", "v")]), &source())
            .expect("ingest");

        let footprint: Vec<_> = graph
            .footprint(&image)
            .map(|f| f.iter().map(NodeId::as_str).collect())
            .unwrap_or_default();
        assert_eq!(
            footprint,
            vec!["S", "S.a", "S.a.b", "S.a.b.c", "S.a.b.c.v", "compspec-root"]
        );
    }
}

// =============================================================================
// TIER T2: MATCHING
// =============================================================================

mod t2_matching {
    use super::*;

    /// T2.1: A single declared attribute is matched by its qualified key.
    #[test]
    fn single_attribute_scenario() {
        let mut graph = CompatibilityGraph::default();
        graph
            .ingest_artifact(
                &ImageRef::new("imgA"),
                &artifact("S", S_URL, &[("hw.gpu", "true")]),
                &source(),
            )
            .expect("ingest");

        assert_eq!(
            graph.match_constraints(&["S.hw.gpu=true"]).expect("match"),
            images(&["imgA"])
        );

        let err = graph
            .match_constraints(&["S.hw.gpu=false"])
            .expect_err("unknown node");
        assert!(matches!(err, CompspecError::UnknownField(_)));
        assert_eq!(err.kind(), ErrorKind::Match);
    }

    /// T2.2: Additional constraints narrow the set.
    #[test]
    fn intersection_scenario() {
        let mut graph = CompatibilityGraph::default();
        graph
            .ingest_artifact(
                &ImageRef::new("imgA"),
                &artifact("S", S_URL, &[("hw.arch", "x86"), ("hw.accel", "gpu")]),
                &source(),
            )
            .expect("imgA");
        graph
            .ingest_artifact(
                &ImageRef::new("imgB"),
                &artifact("S", S_URL, &[("hw.arch", "x86")]),
                &source(),
            )
            .expect("imgB");

        assert_eq!(
            graph.match_constraints(&["S.hw.arch=x86"]).expect("match"),
            images(&["imgA", "imgB"])
        );
        assert_eq!(
            graph
                .match_constraints(&["S.hw.arch=x86", "S.hw.accel=gpu"])
                .expect("match"),
            images(&["imgA"])
        );
    }

    /// T2.3: Constraint keys are fully schema qualified.
    #[test]
    fn constraint_key_format_is_pinned() {
        let mut graph = CompatibilityGraph::default();
        graph
            .ingest_artifact(
                &ImageRef::new("ghcr.io/org/lammps:latest"),
                &artifact("io.archspec", ARCHSPEC_URL, &[("cpu.target", "x86_64")]),
                &source(),
            )
            .expect("ingest");

        assert!(graph.has_node("io.archspec.cpu.target.x86_64"));
        assert_eq!(
            graph
                .match_constraints(&["io.archspec.cpu.target=x86_64"])
                .expect("match"),
            images(&["ghcr.io/org/lammps:latest"])
        );

        // An unqualified key names a different node.
        assert!(graph.match_constraints(&["cpu.target=x86_64"]).is_err());
    }

    /// T2.4: No constraints is not the same as unsatisfiable constraints.
    #[test]
    fn empty_versus_unsatisfiable() {
        let mut graph = CompatibilityGraph::default();
        let empty: [&str; 0] = [];
        assert!(graph.match_constraints(&empty).expect("match").is_empty());

        graph
            .ingest_artifact(
                &ImageRef::new("imgA"),
                &artifact("S", S_URL, &[("hw.accel", "gpu")]),
                &source(),
            )
            .expect("imgA");
        graph
            .ingest_artifact(
                &ImageRef::new("imgB"),
                &artifact("S", S_URL, &[("hw.accel", "fpga")]),
                &source(),
            )
            .expect("imgB");

        assert_eq!(graph.match_constraints(&empty).expect("match").len(), 2);
        assert!(matches!(
            graph.match_constraints(&["S.hw.accel=gpu", "S.hw.accel=fpga"]),
            Err(CompspecError::UnsatisfiableConstraints(_))
        ));
    }
}

// =============================================================================
// TIER T3: PERSISTENCE
// =============================================================================

mod t3_persistence {
    use super::*;

    fn populated() -> CompatibilityGraph {
        let mut graph = CompatibilityGraph::default();
        graph
            .ingest_artifact(
                &ImageRef::new("imgA"),
                &artifact("S", S_URL, &[("hw.gpu", "true")]),
                &source(),
            )
            .expect("ingest");
        graph
    }

    /// T3.1: Save then load reproduces the node/edge set.
    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("graph.json");
        let graph = populated();

        assert_eq!(graph.save_graph(&path).expect("save"), SaveOutcome::Written);

        let mut loaded = CompatibilityGraph::default();
        assert_eq!(loaded.load_graph(&path).expect("load"), LoadOutcome::Loaded);
        assert_eq!(loaded.document(), graph.document());
        assert_eq!(loaded.mapping(), graph.mapping());
    }

    /// T3.2: Saving twice writes once.
    #[test]
    fn save_twice_writes_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("graph.json");
        let graph = populated();

        graph.save_graph(&path).expect("first");
        let modified = std::fs::metadata(&path).expect("meta").len();
        assert_eq!(
            graph.save_graph(&path).expect("second"),
            SaveOutcome::AlreadyExists
        );
        assert_eq!(std::fs::metadata(&path).expect("meta").len(), modified);
    }

    /// T3.3: A loaded cache is trusted; merged schemas are not fetched again.
    #[test]
    fn loaded_cache_skips_schema_fetch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("graph.json");
        populated().save_graph(&path).expect("save");

        let mut loaded = CompatibilityGraph::default();
        loaded.load_graph(&path).expect("load");

        // An empty source would fail any fetch.
        let added = loaded
            .add_schema(S_URL, &MemorySchemaSource::new())
            .expect("known schema");
        assert!(added.is_none());
    }
}
