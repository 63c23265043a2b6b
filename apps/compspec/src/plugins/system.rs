//! System extractor: processors, operating system, architecture, memory and
//! core count.

use super::Host;
use compspec_core::CompspecError;
use compspec_core::extract::Section;
use regex::Regex;
use std::collections::BTreeMap;

pub const NAME: &str = "system";
pub const SECTIONS: &[&str] = &["processor", "os", "arch", "memory", "cpu"];

const CPUINFO_FILE: &str = "/proc/cpuinfo";
const MEMINFO_FILE: &str = "/proc/meminfo";
const OS_RELEASE_FILE: &str = "/etc/os-release";

/// Dynamic linker present on each architecture.
const LINKERS: [(&str, &str); 3] = [
    ("amd64", "/lib64/ld-linux-x86-64.so.2"),
    ("i386", "/lib/ld-linux.so.2"),
    ("arm64", "/lib/ld-linux-aarch64.so.1"),
];

/// ARM `CPU implementer` ids.
const ARM_VENDORS: [(&str, &str); 17] = [
    ("0x41", "ARM"),
    ("0x42", "Broadcom"),
    ("0x43", "Cavium"),
    ("0x44", "DEC"),
    ("0x46", "Fujitsu"),
    ("0x48", "HiSilicon"),
    ("0x49", "Infineon Technologies AG"),
    ("0x4d", "Motorola"),
    ("0x4e", "Nvidia"),
    ("0x50", "APM"),
    ("0x51", "Qualcomm"),
    ("0x53", "Samsung"),
    ("0x56", "Marvell"),
    ("0x61", "Apple"),
    ("0x66", "Faraday"),
    ("0x68", "HXT"),
    ("0x69", "Intel"),
];

pub(super) fn section(host: &Host, name: &str) -> Result<Section, CompspecError> {
    match name {
        "processor" => Ok(parse_cpuinfo(&host.read(CPUINFO_FILE)?)),
        "os" => os(host),
        "arch" => arch(host),
        "memory" => Ok(parse_meminfo(&host.read(MEMINFO_FILE)?)),
        "cpu" => Ok(cpu()),
        other => Err(CompspecError::Config(format!(
            "section {} is not known for extractor {}",
            other, NAME
        ))),
    }
}

// =============================================================================
// PROCESSOR
// =============================================================================

/// Flatten `/proc/cpuinfo` into `<processor>.normalized.*` and
/// `<processor>.raw.*` fields.
///
/// Keys are lowercased with spaces replaced by `_`. On PowerPC (detected by
/// a `timebase` field) every non-`processor` field is global and copied to
/// each processor.
pub fn parse_cpuinfo(raw: &str) -> Section {
    let is_ppc = raw.contains("timebase");
    let mut processors: Vec<BTreeMap<String, String>> = Vec::new();
    let mut global = BTreeMap::new();
    let mut current = BTreeMap::new();

    for line in raw.lines().map(str::trim) {
        if line.is_empty() {
            if !current.is_empty() {
                processors.push(std::mem::take(&mut current));
            }
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().replace(' ', "_").to_lowercase();
        let value = value.trim().to_string();

        if is_ppc && key != "processor" {
            global.insert(key, value);
        } else if !value.is_empty() {
            current.insert(key, value);
        }
    }
    if !current.is_empty() {
        processors.push(current);
    }

    let mut section = Section::new();
    for (i, processor) in processors.iter().enumerate() {
        let Some(uid) = processor.get("processor") else {
            tracing::warn!("Processor block {} has no 'processor' id, skipping", i);
            continue;
        };

        let mut put = |key: &str, value: Option<&String>| {
            if let Some(value) = value {
                section.insert(format!("{}.{}", uid, key), value.clone());
            }
        };

        let vendor = lookup(processor, &["vendor_id", "cpu_implementer"]).map(|v| {
            ARM_VENDORS
                .iter()
                .find(|(id, _)| *id == v.as_str())
                .map_or_else(|| v.clone(), |(_, name)| (*name).to_string())
        });
        put("normalized.vendor", vendor.as_ref());
        put("normalized.bogomips", processor.get("bogomips"));
        put("normalized.features", lookup(processor, &["flags", "features"]));
        put("normalized.family", lookup(processor, &["cpu_family", "cpu_architecture"]));
        put("normalized.model", lookup(processor, &["model_name", "cpu_variant"]));

        if is_ppc {
            for (key, value) in &global {
                put(key.as_str(), Some(value));
            }
        }
        for (key, value) in processor {
            put(format!("raw.{}", key).as_str(), Some(value));
        }
    }
    section
}

fn lookup<'a>(fields: &'a BTreeMap<String, String>, keys: &[&str]) -> Option<&'a String> {
    keys.iter().find_map(|key| fields.get(*key))
}

// =============================================================================
// OPERATING SYSTEM
// =============================================================================

/// `PRETTY_NAME`, `ID` and `VERSION_ID` of an os-release file as
/// `(name, vendor, version)`.
pub fn parse_os_release(raw: &str) -> (String, String, String) {
    let mut name = String::new();
    let mut vendor = String::new();
    let mut version = String::new();

    for line in raw.lines().map(str::trim) {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim_matches('"').to_string();
        match key {
            "PRETTY_NAME" => name = value,
            "ID" => vendor = value,
            "VERSION_ID" => version = value,
            _ => {}
        }
    }
    (name, vendor, version)
}

fn capture(pattern: &str, text: &str, group: usize) -> Option<String> {
    Regex::new(pattern)
        .ok()?
        .captures(text)?
        .get(group)
        .map(|m| m.as_str().to_string())
}

/// Vendor specific release number.
pub fn os_release(host: &Host, pretty_name: &str, vendor: &str) -> Option<String> {
    match vendor {
        "debian" => host
            .read("/etc/debian_version")
            .ok()
            .map(|v| v.trim().to_string()),
        "ubuntu" => capture(r"[\( ]([\d\.]+)", pretty_name, 1),
        "centos" => capture(
            r"^CentOS( Linux)? release ([\d\.]+)",
            &host.read("/etc/centos-release").ok()?,
            2,
        ),
        "rocky" => capture(
            r"^Rocky( Linux)? release ([\d\.]+)",
            &host.read("/etc/rocky-release").ok()?,
            2,
        ),
        "rhel" => host
            .read("/etc/redhat-release")
            .ok()
            .and_then(|raw| capture(r"[\( ]([\d\.]+)", &raw, 1))
            .or_else(|| capture(r"[\( ]([\d\.]+)", pretty_name, 1)),
        _ => None,
    }
}

fn os(host: &Host) -> Result<Section, CompspecError> {
    let raw = host.read(OS_RELEASE_FILE).map_err(|_| {
        CompspecError::Io(format!(
            "cannot find {} to determine OS metadata and release",
            OS_RELEASE_FILE
        ))
    })?;
    let (name, vendor, version) = parse_os_release(&raw);

    let release = os_release(host, &name, &vendor).ok_or_else(|| {
        CompspecError::Io(format!("cannot find os release for vendor {}", vendor))
    })?;

    Ok(Section::from([
        ("name".to_string(), name),
        ("vendor".to_string(), vendor),
        ("version".to_string(), version),
        ("release".to_string(), release),
    ]))
}

// =============================================================================
// ARCH / MEMORY / CPU
// =============================================================================

fn arch(host: &Host) -> Result<Section, CompspecError> {
    let (name, _) = LINKERS
        .iter()
        .find(|(_, linker)| host.exists(linker))
        .ok_or_else(|| {
            CompspecError::Io("cannot find architecture based on linker file".to_string())
        })?;

    Ok(Section::from([
        ("name".to_string(), (*name).to_string()),
        ("arch".to_string(), std::env::consts::ARCH.to_string()),
    ]))
}

/// `/proc/meminfo` with keys lowercased, `(` as `_` and `)` removed.
pub fn parse_meminfo(raw: &str) -> Section {
    raw.lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| {
            let key = key.trim().replace('(', "_").replace(')', "").to_lowercase();
            (key, value.trim().to_string())
        })
        .collect()
}

fn cpu() -> Section {
    let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
    Section::from([("cores".to_string(), cores.to_string())])
}
