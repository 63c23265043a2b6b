//! Artifact creator: turns a compatibility request into an artifact by
//! running the extractors its attributes reference.

use super::{PluginKind, PluginRegistry};
use compspec_core::{
    CompatibilityArtifact, CompspecError, ExtractionResult, PluginRequest, Populated,
    populate_request,
};

pub const NAME: &str = "artifact";

/// Options for [`create`].
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// `extractor.section.field=value` overrides applied after extraction.
    pub custom_fields: Vec<String>,
    /// Keep going when an extractor fails.
    pub allow_fail: bool,
}

/// Build an artifact from `request`.
///
/// Only extractors and sections that exist are run; references to anything
/// else are left unresolved and come back as warnings.
pub fn create(
    registry: &PluginRegistry,
    request: &CompatibilityArtifact,
    options: &CreateOptions,
) -> Result<Populated, CompspecError> {
    let requests = runnable_requests(registry, request.extractor_requests());
    tracing::debug!(
        extractors = %requests.iter().map(ToString::to_string).collect::<Vec<_>>().join(" "),
        "Running extractors for request"
    );

    // An empty request list means "everything" to the registry.
    let mut result = if requests.is_empty() {
        ExtractionResult::new()
    } else {
        registry.extract(&requests, options.allow_fail)?
    };
    let mut warnings = result.add_custom_fields(&options.custom_fields);

    let mut populated = populate_request(&result, request)?;
    warnings.append(&mut populated.warnings);
    populated.warnings = warnings;
    Ok(populated)
}

fn runnable_requests(registry: &PluginRegistry, requests: Vec<PluginRequest>) -> Vec<PluginRequest> {
    requests
        .into_iter()
        .filter_map(|mut request| {
            let plugin = registry
                .get(&request.name)
                .filter(|p| p.kind() == PluginKind::Extractor)?;
            request.sections.retain(|s| plugin.sections().contains(&s.as_str()));
            (!request.sections.is_empty()).then_some(request)
        })
        .collect()
}
