//! # Extraction Results
//!
//! Host facts gathered by extractor plugins, and the logic that turns a
//! compatibility request into a concrete artifact.
//!
//! An extraction result is a two-level map: extractor -> section -> flat
//! key/value pairs. A value is addressed by a field reference
//! `<extractor>.<section>.<field>`, where `<field>` may itself contain dots.

use crate::artifact::CompatibilityArtifact;
use crate::primitives::{ASSIGNMENT, PATH_SEPARATOR};
use crate::CompspecError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Flat key/value pairs produced for one section.
pub type Section = BTreeMap<String, String>;

// =============================================================================
// FIELD REFERENCES
// =============================================================================

/// A parsed `<extractor>.<section>.<field>` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub extractor: String,
    pub section: String,
    pub field: String,
}

impl Field {
    /// Parse a field reference. Needs at least three dot-separated segments.
    pub fn parse(raw: &str) -> Result<Self, CompspecError> {
        let mut parts = raw.splitn(3, PATH_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(extractor), Some(section), Some(field))
                if !extractor.is_empty() && !section.is_empty() && !field.is_empty() =>
            {
                Ok(Self {
                    extractor: extractor.to_string(),
                    section: section.to_string(),
                    field: field.to_string(),
                })
            }
            _ => Err(CompspecError::Config(format!(
                "field {} needs to have at least <extractor>.<section>.<field>",
                raw
            ))),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.extractor, self.section, self.field)
    }
}

// =============================================================================
// PLUGIN REQUESTS
// =============================================================================

/// A plugin name with an optional list of sections: `name[sec1,sec2]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRequest {
    pub name: String,
    pub sections: Vec<String>,
}

impl PluginRequest {
    /// Parse `name` or `name[sec1,sec2]`. An empty section list means all.
    pub fn parse(raw: &str) -> Result<Self, CompspecError> {
        let raw = raw.trim();
        let (name, sections) = match raw.split_once('[') {
            None => (raw, Vec::new()),
            Some((name, rest)) => {
                let inner = rest.strip_suffix(']').ok_or_else(|| {
                    CompspecError::Config(format!("plugin request {} is missing a closing ']'", raw))
                })?;
                let sections = inner
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                (name, sections)
            }
        };

        if name.is_empty() {
            return Err(CompspecError::Config(format!(
                "plugin request {} has no plugin name",
                raw
            )));
        }

        Ok(Self {
            name: name.to_string(),
            sections,
        })
    }
}

impl fmt::Display for PluginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sections.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}[{}]", self.name, self.sections.join(","))
        }
    }
}

// =============================================================================
// EXTRACTION RESULT
// =============================================================================

/// Sections produced by one extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorData {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sections: BTreeMap<String, Section>,
}

/// Results of every extractor that ran, keyed by extractor name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(rename = "extractors", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extractors: BTreeMap<String, ExtractorData>,
}

impl ExtractionResult {
    /// Create an empty result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the data of one extractor, replacing any previous run.
    pub fn insert(&mut self, extractor: impl Into<String>, data: ExtractorData) {
        self.extractors.insert(extractor.into(), data);
    }

    /// Look up a field value.
    #[must_use]
    pub fn get(&self, field: &Field) -> Option<&str> {
        self.extractors
            .get(&field.extractor)?
            .sections
            .get(&field.section)?
            .get(&field.field)
            .map(String::as_str)
    }

    /// Add or overwrite values from `extractor.section.field=value` strings.
    ///
    /// The value may contain `=`. Entries that cannot be parsed are skipped
    /// and returned as warnings.
    pub fn add_custom_fields<S: AsRef<str>>(&mut self, fields: &[S]) -> Vec<ExtractWarning> {
        let mut warnings = Vec::new();

        for raw in fields {
            let raw = raw.as_ref();
            let Some((reference, value)) = raw.split_once(ASSIGNMENT) else {
                warnings.push(ExtractWarning::MalformedCustomField {
                    field: raw.to_string(),
                    reason: "missing '='".to_string(),
                });
                continue;
            };

            let field = match Field::parse(reference) {
                Ok(field) => field,
                Err(e) => {
                    warnings.push(ExtractWarning::MalformedCustomField {
                        field: raw.to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            self.extractors
                .entry(field.extractor)
                .or_default()
                .sections
                .entry(field.section)
                .or_default()
                .insert(field.field, value.to_string());
        }

        warnings
    }
}

// =============================================================================
// WARNINGS
// =============================================================================

/// Non-fatal problems found while building an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractWarning {
    /// A custom field could not be applied.
    MalformedCustomField { field: String, reason: String },
    /// An attribute reference did not resolve; the attribute was dropped.
    UnresolvedField {
        compatibility: String,
        attribute: String,
        reference: String,
        reason: String,
    },
}

impl fmt::Display for ExtractWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedCustomField { field, reason } => {
                write!(f, "custom field {} skipped: {}", field, reason)
            }
            Self::UnresolvedField {
                compatibility,
                attribute,
                reference,
                reason,
            } => write!(
                f,
                "{}: attribute {} ({}) dropped: {}",
                compatibility, attribute, reference, reason
            ),
        }
    }
}

// =============================================================================
// REQUEST POPULATION
// =============================================================================

/// An artifact produced from a request, with the warnings collected on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Populated {
    pub artifact: CompatibilityArtifact,
    pub warnings: Vec<ExtractWarning>,
}

/// Replace each attribute reference in `request` with its extracted value.
///
/// The request must declare at least one schema, and every compatibility must
/// name a declared schema with a non-empty URL. Attributes whose reference
/// does not resolve are dropped and reported.
pub fn populate_request(
    result: &ExtractionResult,
    request: &CompatibilityArtifact,
) -> Result<Populated, CompspecError> {
    let schemas = &request.metadata.schemas;
    if schemas.is_empty() {
        return Err(CompspecError::Config(
            "the request must have one or more schemas".to_string(),
        ));
    }

    let mut artifact = request.clone();
    let mut warnings = Vec::new();

    for compat in &mut artifact.compatibilities {
        match schemas.get(&compat.name) {
            None => {
                return Err(CompspecError::Config(format!(
                    "{} is missing a schema",
                    compat.name
                )));
            }
            Some(url) if url.trim().is_empty() => {
                return Err(CompspecError::Config(format!(
                    "{} has an empty schema",
                    compat.name
                )));
            }
            Some(_) => {}
        }

        let references = std::mem::take(&mut compat.attributes);
        for (attribute, reference) in references {
            let resolved = Field::parse(&reference).and_then(|field| {
                result.get(&field).map(str::to_string).ok_or_else(|| {
                    CompspecError::Config(unresolved_reason(result, &field))
                })
            });

            match resolved {
                Ok(value) => {
                    compat.attributes.insert(attribute, value);
                }
                Err(e) => warnings.push(ExtractWarning::UnresolvedField {
                    compatibility: compat.name.clone(),
                    attribute,
                    reference,
                    reason: e.to_string(),
                }),
            }
        }
    }

    Ok(Populated { artifact, warnings })
}

fn unresolved_reason(result: &ExtractionResult, field: &Field) -> String {
    match result.extractors.get(&field.extractor) {
        None => format!("extractor {} is unknown", field.extractor),
        Some(data) if !data.sections.contains_key(&field.section) => {
            format!("section {}.{} is unknown", field.extractor, field.section)
        }
        Some(_) => format!("field {} is unknown", field),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Compatibility;

    fn result() -> ExtractionResult {
        let mut result = ExtractionResult::new();
        let warnings = result.add_custom_fields(&[
            "system.os.name=Ubuntu 22.04.3 LTS",
            "system.os.vendor=ubuntu",
            "kernel.boot.BOOT_IMAGE=/boot/vmlinuz",
        ]);
        assert!(warnings.is_empty());
        result
    }

    fn request(attributes: &[(&str, &str)]) -> CompatibilityArtifact {
        let mut request = CompatibilityArtifact::default();
        request
            .metadata
            .schemas
            .insert("org.supercontainers".into(), "https://example.com/s.json".into());
        request.compatibilities.push(Compatibility {
            name: "org.supercontainers".into(),
            version: "0.0.0".into(),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        request
    }

    #[test]
    fn field_keeps_trailing_dots_in_field() {
        let field = Field::parse("system.processor.0.normalized.vendor").expect("parse");
        assert_eq!(field.extractor, "system");
        assert_eq!(field.section, "processor");
        assert_eq!(field.field, "0.normalized.vendor");
    }

    #[test]
    fn field_needs_three_segments() {
        assert!(Field::parse("system.os").is_err());
        assert!(Field::parse("system..name").is_err());
    }

    #[test]
    fn plugin_request_with_sections() {
        let req = PluginRequest::parse("kernel[boot, config]").expect("parse");
        assert_eq!(req.name, "kernel");
        assert_eq!(req.sections, vec!["boot", "config"]);
        assert_eq!(req.to_string(), "kernel[boot,config]");

        let bare = PluginRequest::parse("system").expect("parse");
        assert!(bare.sections.is_empty());
    }

    #[test]
    fn plugin_request_unclosed_bracket() {
        assert!(PluginRequest::parse("kernel[boot").is_err());
        assert!(PluginRequest::parse("[boot]").is_err());
    }

    #[test]
    fn custom_field_value_may_contain_equals() {
        let mut result = ExtractionResult::new();
        let warnings = result.add_custom_fields(&["kernel.boot.root=UUID=abc", "nope", "a.b=c"]);
        assert_eq!(warnings.len(), 2);

        let field = Field::parse("kernel.boot.root").expect("parse");
        assert_eq!(result.get(&field), Some("UUID=abc"));
    }

    #[test]
    fn populate_substitutes_values() {
        let populated = populate_request(
            &result(),
            &request(&[("os.name", "system.os.name"), ("os.vendor", "system.os.vendor")]),
        )
        .expect("populate");

        assert!(populated.warnings.is_empty());
        let attrs = &populated.artifact.compatibilities[0].attributes;
        assert_eq!(attrs.get("os.name").map(String::as_str), Some("Ubuntu 22.04.3 LTS"));
    }

    #[test]
    fn unresolved_references_are_dropped_and_reported() {
        let populated = populate_request(
            &result(),
            &request(&[
                ("os.name", "system.os.name"),
                ("gpu", "nfd.pci.gpu"),
                ("os.release", "system.os.release"),
                ("broken", "system.os"),
            ]),
        )
        .expect("populate");

        let attrs = &populated.artifact.compatibilities[0].attributes;
        assert_eq!(attrs.len(), 1);
        assert_eq!(populated.warnings.len(), 3);
        assert!(populated.warnings.iter().any(|w| matches!(
            w,
            ExtractWarning::UnresolvedField { reason, .. } if reason.contains("extractor nfd is unknown")
        )));
    }

    #[test]
    fn request_without_schemas_is_rejected() {
        let mut req = request(&[]);
        req.metadata.schemas.clear();
        assert!(populate_request(&result(), &req).is_err());
    }

    #[test]
    fn compatibility_without_schema_is_rejected() {
        let mut req = request(&[]);
        req.compatibilities[0].name = "other".into();
        let err = populate_request(&result(), &req).expect_err("missing schema");
        assert!(err.to_string().contains("other is missing a schema"));
    }
}
