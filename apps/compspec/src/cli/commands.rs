//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::MatchArgs;
use crate::config::Settings;
use crate::documents::{load_manifest, load_request, write_json};
use crate::fetch::{ArtifactCache, ArtifactFetcher, Cancellation, RegistryClient, SchemaLoader};
use crate::pipeline::{BuildOptions, Pipeline};
use crate::plugins::artifact::{CreateOptions, create};
use crate::plugins::{Host, Plugin, PluginRegistry};
use compspec_core::{CompspecError, ImageRef, PluginRequest};
use rand::seq::SliceRandom;
use std::path::Path;

// =============================================================================
// SETUP
// =============================================================================

/// Wire the fetchers described by `settings` into a pipeline.
pub fn build_pipeline(settings: &Settings, cancel: Cancellation) -> Result<Pipeline, CompspecError> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("compspec/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| CompspecError::Config(format!("Cannot create HTTP client: {}", e)))?;
    let policy = settings.fetch_policy();

    let schemas = SchemaLoader::new(http.clone(), policy.clone(), cancel.clone());
    let registry = RegistryClient::new(http, policy, cancel, settings.plain_http)
        .with_credentials(RegistryClient::credentials_from_env());
    let cache = settings
        .cache_dir
        .as_ref()
        .map(|dir| ArtifactCache::open(dir.clone()))
        .transpose()?;

    let artifacts = ArtifactFetcher::new(registry, cache, settings.media_type.clone());
    Ok(Pipeline::new(schemas, artifacts, settings.graph_config()))
}

fn parse_requests(names: &[String]) -> Result<Vec<PluginRequest>, CompspecError> {
    names.iter().map(|n| PluginRequest::parse(n)).collect()
}

fn print_json(value: &serde_json::Value) -> Result<(), CompspecError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CompspecError::Serialization(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

/// Closing summary of images skipped under `--allow-fail`. Empty when
/// nothing is missing.
pub fn missing_report(missing: &[ImageRef]) -> Vec<String> {
    if missing.is_empty() {
        return Vec::new();
    }
    let mut lines = vec![format!("{} artifact(s) missing:", missing.len())];
    lines.extend(missing.iter().map(|image| format!("  {}", image)));
    lines
}

// =============================================================================
// MATCH COMMAND
// =============================================================================

/// Build the graph for a manifest and print the images matching constraints.
pub async fn cmd_match(
    settings: &Settings,
    cancel: Cancellation,
    json_mode: bool,
    args: MatchArgs,
) -> Result<(), CompspecError> {
    let manifest = load_manifest(&args.input)?;
    let pipeline = build_pipeline(settings, cancel)?;
    let options = BuildOptions {
        allow_fail: args.allow_fail,
        graph_cache: args.graph.clone(),
    };
    let outcome = pipeline.build(&manifest, &options).await?;
    let graph = &outcome.graph;

    if args.print_graph {
        let document = serde_json::to_value(graph.document())
            .map_err(|e| CompspecError::Serialization(e.to_string()))?;
        return print_json(&serde_json::json!({ "graph": document }));
    }

    if args.print_mapping {
        if json_mode {
            let mapping = serde_json::to_value(graph.mapping())
                .map_err(|e| CompspecError::Serialization(e.to_string()))?;
            print_json(&mapping)?;
        } else {
            for (image, nodes) in graph.mapping() {
                println!("{}", image);
                for node in nodes {
                    println!("  {}", node);
                }
            }
        }
        return Ok(());
    }

    if args.constraints.is_empty() {
        tracing::info!("No constraints given, every image matches");
    }

    // Any matcher error aborts before anything is printed.
    let mut matches = graph.match_constraints(&args.constraints)?;
    if args.randomize {
        matches.shuffle(&mut rand::thread_rng());
    }
    if args.single {
        matches.truncate(1);
    }

    if json_mode {
        return print_json(&serde_json::json!({
            "constraints": args.constraints,
            "matches": matches.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
            "missing": outcome.missing.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
            "from_cache": outcome.from_cache,
        }));
    }

    for image in &matches {
        println!("{}", image);
    }
    for line in missing_report(&outcome.missing) {
        println!("{}", line);
    }
    Ok(())
}

// =============================================================================
// CHECK COMMAND
// =============================================================================

/// Report how many artifacts in a manifest are missing.
pub async fn cmd_check(
    settings: &Settings,
    cancel: Cancellation,
    json_mode: bool,
    input: &Path,
) -> Result<(), CompspecError> {
    let manifest = load_manifest(input)?;
    let pipeline = build_pipeline(settings, cancel)?;
    let report = pipeline.check(&manifest).await?;

    if json_mode {
        return print_json(&serde_json::json!({
            "total": report.total,
            "missing_count": report.missing.len(),
            "missing": report.missing.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
        }));
    }

    println!("Artifact Check");
    println!("==============");
    println!("Images:   {}", report.total);
    println!("Missing:  {}", report.missing.len());
    for image in &report.missing {
        println!("  {}", image);
    }
    Ok(())
}

// =============================================================================
// CREATE COMMAND
// =============================================================================

/// Create an artifact from a request and write it as JSON.
pub fn cmd_create(
    settings: &Settings,
    input: &Path,
    fields: Vec<String>,
    output: Option<&Path>,
    allow_fail: bool,
    strict: bool,
) -> Result<(), CompspecError> {
    let request = load_request(input)?;
    let registry = PluginRegistry::new(Host::new(settings.host_root.clone()));
    let options = CreateOptions {
        custom_fields: fields,
        allow_fail,
    };

    let populated = create(&registry, &request, &options)?;

    if strict && !populated.warnings.is_empty() {
        let reasons: Vec<String> = populated.warnings.iter().map(ToString::to_string).collect();
        return Err(CompspecError::Config(format!(
            "{} attribute(s) could not be resolved: {}",
            reasons.len(),
            reasons.join("; ")
        )));
    }
    for warning in &populated.warnings {
        tracing::warn!("{}", warning);
    }

    write_json(&populated.artifact, output)
}

// =============================================================================
// EXTRACT COMMAND
// =============================================================================

/// Run extractors and write what they found as JSON.
pub fn cmd_extract(
    settings: &Settings,
    names: &[String],
    output: Option<&Path>,
    allow_fail: bool,
) -> Result<(), CompspecError> {
    let requests = parse_requests(names)?;
    let registry = PluginRegistry::new(Host::new(settings.host_root.clone()));
    let result = registry.extract(&requests, allow_fail)?;
    write_json(&result, output)
}

// =============================================================================
// LIST COMMAND
// =============================================================================

/// Print plugins and their sections.
pub fn cmd_list(settings: &Settings, json_mode: bool, names: &[String]) -> Result<(), CompspecError> {
    let registry = PluginRegistry::new(Host::new(settings.host_root.clone()));
    let requests = parse_requests(names)?;

    let selected: Vec<(Plugin, Vec<&'static str>)> = if requests.is_empty() {
        registry.plugins().map(|p| (p, p.sections().to_vec())).collect()
    } else {
        registry
            .resolve(&requests)?
            .into_iter()
            .map(|(plugin, sections)| {
                let shown = plugin
                    .sections()
                    .iter()
                    .copied()
                    .filter(|s| sections.is_empty() || sections.iter().any(|r| r == s))
                    .collect();
                (plugin, shown)
            })
            .collect()
    };

    if json_mode {
        let plugins: Vec<_> = selected
            .iter()
            .map(|(plugin, sections)| {
                serde_json::json!({
                    "name": plugin.name(),
                    "type": plugin.kind().to_string(),
                    "description": plugin.description(),
                    "sections": sections,
                })
            })
            .collect();
        return print_json(&serde_json::json!({ "plugins": plugins }));
    }

    println!("Compatibility Plugins");
    println!("=====================");
    let mut total_sections = 0;
    for (plugin, sections) in &selected {
        println!();
        println!("{} ({}): {}", plugin.name(), plugin.kind(), plugin.description());
        for section in sections {
            println!("  - {}", section);
        }
        total_sections += sections.len();
    }
    println!();
    println!("Total: {} plugins, {} sections", selected.len(), total_sections);
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_report_lists_each_skipped_image() {
        assert!(missing_report(&[]).is_empty());

        let missing = [ImageRef::new("b"), ImageRef::new("c")];
        assert_eq!(
            missing_report(&missing),
            vec!["2 artifact(s) missing:", "  b", "  c"]
        );
    }

    #[test]
    fn print_json_accepts_plain_values() {
        assert!(print_json(&serde_json::json!({ "matches": ["a"] })).is_ok());
    }
}
