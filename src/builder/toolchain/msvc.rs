//! Visual Studio developer environment capture.
//!
//! Outside a Developer Command Prompt `cl.exe` is not on PATH and the
//! compiler cannot find its headers or libraries. We locate the newest
//! Visual Studio with the C++ workload through `vswhere`, run
//! `vcvarsall.bat` for the host architecture and keep the variables the
//! compiler and linker need. The captured values are injected into every
//! stage process instead of being set on our own process.

use std::collections::BTreeMap;
use std::ffi::OsString;
#[cfg(windows)]
use std::path::PathBuf;
use std::time::Duration;

/// Variables kept from the developer environment.
pub(super) const CAPTURED_VARS: [&str; 5] = ["PATH", "INCLUDE", "LIB", "LIBPATH", "VSCMD_ARG_TGT_ARCH"];

/// Variables captured from `vcvarsall.bat`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct DevEnvironment {
    pub vars: BTreeMap<String, String>,
}

impl DevEnvironment {
    /// Keep only [`CAPTURED_VARS`] from `set` output.
    pub fn from_set_output(output: &str) -> Option<Self> {
        let vars: BTreeMap<String, String> = output
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim().to_uppercase(), value.to_string()))
            .filter(|(key, _)| CAPTURED_VARS.contains(&key.as_str()))
            .collect();

        if vars.get("PATH").is_none_or(|p| p.is_empty()) {
            tracing::warn!(
                "vcvarsall.bat produced empty PATH - MSVC environment may not be properly configured"
            );
            return None;
        }

        Some(DevEnvironment { vars })
    }

    /// The captured PATH, for tool lookup.
    pub fn search_path(&self) -> Option<OsString> {
        self.vars.get("PATH").map(OsString::from)
    }
}

/// Capture the developer environment for the host architecture.
#[cfg(windows)]
pub(super) fn capture(timeout: Duration) -> Option<DevEnvironment> {
    use std::io::Write;

    use crate::util::process::ProcessBuilder;

    let vswhere = find_vswhere()?;
    tracing::debug!("Found vswhere at: {}", vswhere.display());

    let output = ProcessBuilder::new(&vswhere)
        .args([
            "-latest",
            "-requires",
            "Microsoft.VisualStudio.Component.VC.Tools.x86.x64",
            "-property",
            "installationPath",
            "-format",
            "value",
        ])
        .exec_with_timeout(timeout)
        .ok()
        .flatten()?;
    let vs_path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() || vs_path.is_empty() {
        tracing::debug!("vswhere found no Visual Studio with the C++ workload");
        return None;
    }

    let vcvarsall = PathBuf::from(vs_path)
        .join("VC")
        .join("Auxiliary")
        .join("Build")
        .join("vcvarsall.bat");
    if !vcvarsall.exists() {
        tracing::debug!("vcvarsall.bat not found at: {}", vcvarsall.display());
        return None;
    }

    let arch = match std::env::consts::ARCH {
        "x86_64" => "x64",
        "x86" => "x86",
        "aarch64" => "arm64",
        other => {
            tracing::debug!("No vcvarsall target for host architecture {}", other);
            return None;
        }
    };

    tracing::info!("Capturing MSVC environment via {}", vcvarsall.display());

    // A batch file sidesteps cmd.exe quoting of the vcvarsall path.
    let mut batch = tempfile::Builder::new()
        .prefix("lattice_vcvars")
        .suffix(".bat")
        .tempfile()
        .ok()?;
    write!(
        batch,
        "@echo off\r\ncall \"{}\" {} >nul 2>&1\r\nif errorlevel 1 exit /b 1\r\nset\r\n",
        vcvarsall.display(),
        arch
    )
    .ok()?;
    batch.flush().ok()?;

    let output = ProcessBuilder::new("cmd")
        .arg("/c")
        .arg(batch.path())
        .exec_with_timeout(timeout.max(VCVARS_TIMEOUT))
        .ok()
        .flatten()?;
    if !output.status.success() {
        tracing::warn!(
            "vcvarsall.bat failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        return None;
    }

    DevEnvironment::from_set_output(&String::from_utf8_lossy(&output.stdout))
}

/// vcvarsall commonly needs several seconds on a cold start.
#[cfg(windows)]
const VCVARS_TIMEOUT: Duration = Duration::from_secs(60);

#[cfg(not(windows))]
pub(super) fn capture(_timeout: Duration) -> Option<DevEnvironment> {
    None
}

/// Find vswhere.exe in its standard location or on PATH.
#[cfg(windows)]
fn find_vswhere() -> Option<PathBuf> {
    let program_files_x86 = std::env::var("ProgramFiles(x86)")
        .unwrap_or_else(|_| "C:\\Program Files (x86)".to_string());

    let standard_path = PathBuf::from(program_files_x86)
        .join("Microsoft Visual Studio")
        .join("Installer")
        .join("vswhere.exe");

    if standard_path.exists() {
        return Some(standard_path);
    }

    which::which("vswhere").ok()
}
