//! # Plugins
//!
//! Host fact extractors and the artifact creator.
//!
//! | Plugin    | Kind      | Sections                                   |
//! |-----------|-----------|--------------------------------------------|
//! | `kernel`  | extractor | `boot`, `config`, `modules`                |
//! | `system`  | extractor | `processor`, `os`, `arch`, `memory`, `cpu` |
//! | `library` | extractor | `mpi`                                      |
//! | `artifact`| creator   |                                            |
//!
//! Extractors read the host through [`Host`], which resolves absolute paths
//! against a configurable root so they can run against a fake tree.

pub mod artifact;
pub mod kernel;
pub mod library;
pub mod system;

use compspec_core::extract::Section;
use compspec_core::{CompspecError, ExtractionResult, ExtractorData, PluginRequest};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

// =============================================================================
// HOST
// =============================================================================

/// The filesystem extractors read from.
#[derive(Debug, Clone)]
pub struct Host {
    root: PathBuf,
}

impl Default for Host {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Host {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an absolute host path under the root.
    #[must_use]
    pub fn path(&self, abs: &str) -> PathBuf {
        self.root.join(abs.trim_start_matches('/'))
    }

    #[must_use]
    pub fn exists(&self, abs: &str) -> bool {
        self.path(abs).exists()
    }

    /// Read a host file as text.
    pub fn read(&self, abs: &str) -> Result<String, CompspecError> {
        let path = self.path(abs);
        std::fs::read_to_string(&path)
            .map_err(|e| CompspecError::Io(format!("Cannot read {}: {}", path.display(), e)))
    }

    /// Running kernel release, as in `uname -r`.
    pub fn kernel_release(&self) -> Result<String, CompspecError> {
        Ok(self.read("/proc/sys/kernel/osrelease")?.trim().to_string())
    }
}

// =============================================================================
// PLUGINS
// =============================================================================

/// What a plugin does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    /// Produces sections of host facts.
    Extractor,
    /// Builds an artifact from extracted facts.
    Creator,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extractor => f.write_str("extractor"),
            Self::Creator => f.write_str("creator"),
        }
    }
}

/// Every built-in plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Plugin {
    Kernel,
    System,
    Library,
    Artifact,
}

impl Plugin {
    pub const ALL: [Self; 4] = [Self::Kernel, Self::System, Self::Library, Self::Artifact];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Kernel => kernel::NAME,
            Self::System => system::NAME,
            Self::Library => library::NAME,
            Self::Artifact => artifact::NAME,
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Kernel => "generic kernel extractor",
            Self::System => "generic system extractor",
            Self::Library => "generic library extractor",
            Self::Artifact => "describe an application or environment",
        }
    }

    #[must_use]
    pub fn kind(self) -> PluginKind {
        match self {
            Self::Artifact => PluginKind::Creator,
            _ => PluginKind::Extractor,
        }
    }

    /// Sections an extractor can produce. Empty for creators.
    #[must_use]
    pub fn sections(self) -> &'static [&'static str] {
        match self {
            Self::Kernel => kernel::SECTIONS,
            Self::System => system::SECTIONS,
            Self::Library => library::SECTIONS,
            Self::Artifact => &[],
        }
    }

    /// Check that every requested section exists.
    pub fn validate(self, sections: &[String]) -> Result<(), CompspecError> {
        let valid = self.sections();
        let unknown: Vec<&str> = sections
            .iter()
            .map(String::as_str)
            .filter(|s| !valid.contains(s))
            .collect();

        if unknown.is_empty() {
            return Ok(());
        }
        Err(CompspecError::Config(format!(
            "sections {} are not known for plugin {} (valid: {})",
            unknown.join(", "),
            self.name(),
            valid.join(", ")
        )))
    }

    /// Run an extractor for `sections`, or all of its sections if empty.
    pub fn extract(self, host: &Host, sections: &[String]) -> Result<ExtractorData, CompspecError> {
        if self.kind() != PluginKind::Extractor {
            return Err(CompspecError::Config(format!(
                "{} is a {}, not an extractor",
                self.name(),
                self.kind()
            )));
        }
        self.validate(sections)?;

        let wanted: Vec<&str> = if sections.is_empty() {
            self.sections().to_vec()
        } else {
            sections.iter().map(String::as_str).collect()
        };

        let mut data = ExtractorData::default();
        for name in wanted {
            let section = self.section(host, name)?;
            data.sections.insert(name.to_string(), section);
        }
        Ok(data)
    }

    fn section(self, host: &Host, name: &str) -> Result<Section, CompspecError> {
        match self {
            Self::Kernel => kernel::section(host, name),
            Self::System => system::section(host, name),
            Self::Library => library::section(name),
            Self::Artifact => Ok(Section::new()),
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Plugins by name, bound to a host.
#[derive(Debug, Clone)]
pub struct PluginRegistry {
    host: Host,
    plugins: BTreeMap<&'static str, Plugin>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new(host: Host) -> Self {
        Self {
            host,
            plugins: Plugin::ALL.iter().map(|p| (p.name(), *p)).collect(),
        }
    }

    #[must_use]
    pub fn host(&self) -> &Host {
        &self.host
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Plugin> {
        self.plugins.get(name).copied()
    }

    /// Every plugin, ordered by name.
    pub fn plugins(&self) -> impl Iterator<Item = Plugin> + '_ {
        self.plugins.values().copied()
    }

    /// Every extractor, ordered by name.
    pub fn extractors(&self) -> impl Iterator<Item = Plugin> + '_ {
        self.plugins().filter(|p| p.kind() == PluginKind::Extractor)
    }

    /// Look up and validate each request, keeping request order.
    pub fn resolve(
        &self,
        requests: &[PluginRequest],
    ) -> Result<Vec<(Plugin, Vec<String>)>, CompspecError> {
        requests
            .iter()
            .map(|request| {
                let plugin = self.get(&request.name).ok_or_else(|| {
                    CompspecError::Config(format!(
                        "plugin {} is not known (valid: {})",
                        request.name,
                        self.plugins.keys().copied().collect::<Vec<_>>().join(", ")
                    ))
                })?;
                plugin.validate(&request.sections)?;
                Ok((plugin, request.sections.clone()))
            })
            .collect()
    }

    /// Run the requested extractors, or every extractor if none are named.
    ///
    /// With `allow_fail`, a failing extractor is logged and recorded with no
    /// sections instead of aborting the run.
    pub fn extract(
        &self,
        requests: &[PluginRequest],
        allow_fail: bool,
    ) -> Result<ExtractionResult, CompspecError> {
        let selected = if requests.is_empty() {
            self.extractors().map(|p| (p, Vec::new())).collect()
        } else {
            self.resolve(requests)?
        };

        let mut result = ExtractionResult::new();
        for (plugin, sections) in selected {
            match plugin.extract(&self.host, &sections) {
                Ok(data) => {
                    tracing::debug!(plugin = plugin.name(), sections = data.sections.len(), "Extracted");
                    result.insert(plugin.name(), data);
                }
                Err(e) if allow_fail => {
                    tracing::warn!("Extractor {} failed: {}", plugin.name(), e);
                    result.insert(plugin.name(), ExtractorData::default());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(result)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn request(raw: &str) -> PluginRequest {
        PluginRequest::parse(raw).expect("request")
    }

    #[test]
    fn host_paths_are_rooted() {
        let host = Host::new("/tmp/fake");
        assert_eq!(host.path("/proc/cpuinfo"), PathBuf::from("/tmp/fake/proc/cpuinfo"));
    }

    #[test]
    fn registry_is_ordered_by_name() {
        let registry = PluginRegistry::new(Host::default());
        let names: Vec<_> = registry.plugins().map(Plugin::name).collect();
        assert_eq!(names, vec!["artifact", "kernel", "library", "system"]);
        assert_eq!(registry.extractors().count(), 3);
    }

    #[test]
    fn resolve_unknown_plugin_lists_valid_names() {
        let registry = PluginRegistry::new(Host::default());
        let err = registry.resolve(&[request("nfd")]).expect_err("unknown");
        assert!(err.to_string().contains("kernel"));
    }

    #[test]
    fn resolve_unknown_section_lists_valid_sections() {
        let registry = PluginRegistry::new(Host::default());
        let err = registry
            .resolve(&[request("system[processor,gpu]")])
            .expect_err("unknown section");
        let message = err.to_string();
        assert!(message.contains("gpu"));
        assert!(message.contains("memory"));
    }

    #[test]
    fn creator_cannot_extract() {
        let registry = PluginRegistry::new(Host::default());
        assert!(registry.extract(&[request("artifact")], false).is_err());
    }

    #[test]
    fn allow_fail_records_empty_extractor() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = PluginRegistry::new(Host::new(dir.path()));

        assert!(registry.extract(&[request("kernel[boot]")], false).is_err());

        let result = registry
            .extract(&[request("kernel[boot]")], true)
            .expect("allow fail");
        assert_eq!(result.extractors.get("kernel"), Some(&ExtractorData::default()));
    }
}
