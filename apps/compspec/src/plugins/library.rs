//! Library extractor: MPI flavor and version from `mpirun --version`.

use compspec_core::CompspecError;
use compspec_core::extract::Section;
use regex::Regex;
use std::process::Command;

pub const NAME: &str = "library";
pub const SECTIONS: &[&str] = &["mpi"];

const MPIRUN: &str = "mpirun";

pub(super) fn section(name: &str) -> Result<Section, CompspecError> {
    match name {
        "mpi" => mpi(),
        other => Err(CompspecError::Config(format!(
            "section {} is not known for extractor {}",
            other, NAME
        ))),
    }
}

fn mpi() -> Result<Section, CompspecError> {
    let output = match Command::new(MPIRUN).arg("--version").output() {
        Ok(output) => output,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("{} not found, no MPI metadata", MPIRUN);
            return Ok(Section::new());
        }
        Err(e) => {
            return Err(CompspecError::Io(format!("Cannot run {}: {}", MPIRUN, e)));
        }
    };

    let text = String::from_utf8_lossy(&output.stdout);
    let section = parse_mpi_version(&text);
    if section.is_empty() {
        tracing::debug!("Unrecognized {} --version output: {}", MPIRUN, text.trim());
    }
    Ok(section)
}

/// Detect Open MPI, Intel MPI or MPICH from `mpirun --version` output.
///
/// The first matching line decides: `mpi.variant` and, when present,
/// `mpi.version`.
pub fn parse_mpi_version(output: &str) -> Section {
    let mut section = Section::new();
    let last_word = |line: &str| line.split(' ').next_back().unwrap_or_default().to_string();

    for line in output.lines().map(str::trim) {
        if line.contains("Open MPI") {
            section.insert("mpi.variant".into(), "OpenMPI".into());
            section.insert("mpi.version".into(), last_word(line));
            break;
        }
        if line.contains("Intel") {
            section.insert("mpi.variant".into(), "intel-mpi".into());
            let version = Regex::new(r"Version (\S+) ")
                .ok()
                .and_then(|re| re.captures(line))
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string());
            if let Some(version) = version {
                section.insert("mpi.version".into(), version);
            }
            break;
        }
        if line.contains("Version:") {
            section.insert("mpi.variant".into(), "mpich".into());
            section.insert("mpi.version".into(), last_word(line));
            break;
        }
    }
    section
}
