//! # Artifact Documents
//!
//! Document models exchanged with the outside world:
//! - `CompatibilityArtifact`: what an image declares it needs, per schema.
//!   The same shape is used as a *request* by the `create` flow, where each
//!   attribute value is an extractor field reference instead of a value.
//! - `Manifest`: the list of images (and their artifact references) to match.
//!
//! Attribute values are strings. YAML scalars such as `true` or `8` are
//! accepted and kept in their textual form.

use crate::extract::{Field, PluginRequest};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// COMPATIBILITY ARTIFACT
// =============================================================================

/// Artifact metadata: a name and the schemas it draws attributes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    #[serde(default)]
    pub name: String,
    /// Schema name (its graph root id) -> schema URL.
    #[serde(default)]
    pub schemas: BTreeMap<String, String>,
}

/// A group of attributes under one schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compatibility {
    /// Schema name the attribute keys are relative to.
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, deserialize_with = "scalar_map")]
    pub attributes: BTreeMap<String, String>,
}

/// The compatibility artifact attached to an image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityArtifact {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ArtifactMetadata,
    #[serde(default)]
    pub compatibilities: Vec<Compatibility>,
}

impl CompatibilityArtifact {
    /// Schema URLs referenced by this artifact, deduplicated and ordered.
    pub fn schema_urls(&self) -> impl Iterator<Item = &str> {
        let mut urls: Vec<&str> = self.metadata.schemas.values().map(String::as_str).collect();
        urls.sort_unstable();
        urls.dedup();
        urls.into_iter()
    }

    /// Total number of attributes across all compatibilities.
    #[must_use]
    pub fn attribute_count(&self) -> usize {
        self.compatibilities.iter().map(|c| c.attributes.len()).sum()
    }

    /// Extractor plugin requests implied by a request document.
    ///
    /// Each attribute value is read as `<extractor>.<section>.<field>`. The
    /// result lists every extractor once, in first-seen order, with the
    /// sections it must produce. Values that are not field references are
    /// skipped; `populate_request` reports them.
    #[must_use]
    pub fn extractor_requests(&self) -> Vec<PluginRequest> {
        let mut requests: Vec<PluginRequest> = Vec::new();

        for compat in &self.compatibilities {
            for reference in compat.attributes.values() {
                let Ok(field) = Field::parse(reference) else {
                    continue;
                };
                match requests.iter_mut().find(|r| r.name == field.extractor) {
                    Some(request) => {
                        if !request.sections.contains(&field.section) {
                            request.sections.push(field.section);
                        }
                    }
                    None => requests.push(PluginRequest {
                        name: field.extractor,
                        sections: vec![field.section],
                    }),
                }
            }
        }

        requests
    }
}

// =============================================================================
// MANIFEST
// =============================================================================

/// An image and the registry reference of its compatibility artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePair {
    pub name: String,
    pub artifact: String,
}

/// The list of images a match runs over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub images: Vec<ImagePair>,
}

// =============================================================================
// SCALAR ATTRIBUTES
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Bool(bool),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Bool(b) => b.to_string(),
            Self::Unsigned(n) => n.to_string(),
            Self::Signed(n) => n.to_string(),
            Self::Float(f) => f.to_string(),
        }
    }
}

fn scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Scalar>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, v.into_text()))
        .collect())
}

// =============================================================================
// TESTS
// =============================================================================
