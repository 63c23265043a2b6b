//! Kernel extractor: boot parameters, build configuration and loaded modules.

use super::Host;
use compspec_core::CompspecError;
use compspec_core::extract::Section;

pub const NAME: &str = "kernel";
pub const SECTIONS: &[&str] = &["boot", "config", "modules"];

const BOOT_FILE: &str = "/proc/cmdline";
const CONFIG_PREFIX: &str = "/boot/config-";
const MODULES_DIR: &str = "/sys/module";

pub(super) fn section(host: &Host, name: &str) -> Result<Section, CompspecError> {
    match name {
        "boot" => Ok(parse_cmdline(&host.read(BOOT_FILE)?)),
        "config" => {
            let release = host.kernel_release()?;
            Ok(parse_config(&host.read(&format!("{}{}", CONFIG_PREFIX, release))?))
        }
        "modules" => modules(host),
        other => Err(CompspecError::Config(format!(
            "section {} is not known for extractor {}",
            other, NAME
        ))),
    }
}

/// `key=value` boot arguments. Bare flags map to an empty value.
pub fn parse_cmdline(raw: &str) -> Section {
    raw.split_whitespace()
        .map(|arg| match arg.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (arg.to_string(), String::new()),
        })
        .collect()
}

/// `KEY=value` lines of a kernel config; `#` lines are comments.
pub fn parse_config(raw: &str) -> Section {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// `module.<name>` = version, `module.<name>.parameter.<p>` = value.
///
/// Modules without a version file report the kernel release. Parameters
/// that cannot be read (many are root only) are skipped.
fn modules(host: &Host) -> Result<Section, CompspecError> {
    let release = host.kernel_release()?;
    let dir = host.path(MODULES_DIR);
    let entries = std::fs::read_dir(&dir)
        .map_err(|e| CompspecError::Io(format!("Cannot read {}: {}", dir.display(), e)))?;

    let mut section = Section::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let key = format!("module.{}", name);

        let version = std::fs::read_to_string(path.join("version"))
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|_| release.clone());
        section.insert(key.clone(), version);

        let Ok(params) = std::fs::read_dir(path.join("parameters")) else {
            continue;
        };
        for param in params.flatten() {
            let param_name = param.file_name().to_string_lossy().into_owned();
            match std::fs::read_to_string(param.path()) {
                Ok(value) => {
                    section.insert(
                        format!("{}.parameter.{}", key, param_name),
                        value.trim().to_string(),
                    );
                }
                Err(e) => {
                    tracing::debug!("Skipping module parameter {}/{}: {}", name, param_name, e);
                }
            }
        }
    }
    Ok(section)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmdline_pairs_and_flags() {
        let section = parse_cmdline("BOOT_IMAGE=/vmlinuz-6.5 root=UUID=abcd ro quiet\n");
        assert_eq!(section.get("BOOT_IMAGE").map(String::as_str), Some("/vmlinuz-6.5"));
        assert_eq!(section.get("root").map(String::as_str), Some("UUID=abcd"));
        assert_eq!(section.get("quiet").map(String::as_str), Some(""));
    }

    #[test]
    fn config_skips_comments() {
        let section = parse_config("#\n# CONFIG_X is not set\nCONFIG_SMP=y\nCONFIG_NR_CPUS=64\n\n");
        assert_eq!(section.len(), 2);
        assert_eq!(section.get("CONFIG_SMP").map(String::as_str), Some("y"));
    }
}
