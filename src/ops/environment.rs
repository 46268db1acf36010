//! The materialized toolchain environment.
//!
//! Detection results are saved to `.lattice/toolchain.env` so later runs can
//! skip probing. The file is flat `key=value` text:
//!
//! ```text
//! # Generated by lattice; delete to force re-detection.
//! cmake.found=true
//! cmake.path=/usr/bin/cmake
//! cmake.version=3.28.1
//! compiler.clang.found=false
//! env.INCLUDE=C:\Program Files\...
//! checksum=9f86d081884c7d65...
//! ```
//!
//! Every save rewrites the whole file. A file that fails to parse, whose
//! checksum does not match, or that records a tool path which no longer
//! exists is ignored and the host is inspected again.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::builder::toolchain::{Detector, Tool, ToolStatus, ToolchainStatus};
use crate::util::fs::write_atomic;

const HEADER: &str = "# Generated by lattice; delete to force re-detection.\n";
const CHECKSUM_KEY: &str = "checksum";
const ENV_PREFIX: &str = "env.";

/// Why a saved environment was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
enum ArtifactError {
    #[error("missing checksum")]
    MissingChecksum,

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("malformed line {0}")]
    Malformed(usize),

    #[error("unknown key `{0}`")]
    UnknownKey(String),

    #[error("invalid value for `{0}`")]
    InvalidValue(String),

    #[error("no entry for {0}")]
    Incomplete(&'static str),

    #[error("{} no longer exists", .0.display())]
    Stale(PathBuf),
}

/// Where a [`ToolchainStatus`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Loaded,
    Detected,
}

/// The environment file of one project.
#[derive(Debug, Clone)]
pub struct EnvironmentFile {
    path: PathBuf,
}

impl EnvironmentFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        EnvironmentFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the file with `status`.
    pub fn save(&self, status: &ToolchainStatus) -> Result<()> {
        write_atomic(&self.path, &render(status))?;
        tracing::debug!("Saved toolchain environment to {}", self.path.display());
        Ok(())
    }

    /// Load a previously saved status, or `None` if the file is absent or
    /// unusable.
    pub fn load(&self) -> Option<ToolchainStatus> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::debug!("No usable {}: {}", self.path.display(), e);
                return None;
            }
        };

        match parse(&contents) {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::warn!(
                    "Ignoring {} ({}); re-detecting toolchain",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    /// The saved status unless `redetect` is set, the file is unusable, or
    /// the host has changed since it was written; otherwise inspect the host.
    ///
    /// A fresh detection is written back only when `persist` is set.
    pub fn load_or_detect(
        &self,
        detector: &Detector,
        redetect: bool,
        persist: bool,
    ) -> (ToolchainStatus, Provenance) {
        if !redetect {
            if let Some(status) = self.load() {
                match detector.outdated(&status) {
                    None => return (status, Provenance::Loaded),
                    Some(tool) => tracing::debug!(
                        "{} changed since {} was saved; re-detecting",
                        tool,
                        self.path.display()
                    ),
                }
            }
        }

        let status = detector.detect();
        if persist {
            if let Err(e) = self.save(&status) {
                tracing::warn!("Could not save toolchain environment: {:#}", e);
            }
        }
        (status, Provenance::Detected)
    }
}

fn render(status: &ToolchainStatus) -> String {
    let mut entries = BTreeMap::new();

    for (tool, tool_status) in status.tools() {
        let key = tool.key();
        entries.insert(format!("{}.found", key), tool_status.found.to_string());
        if let Some(path) = &tool_status.path {
            entries.insert(format!("{}.path", key), path.display().to_string());
        }
        if let Some(version) = &tool_status.version {
            entries.insert(format!("{}.version", key), version.clone());
        }
    }

    for (name, value) in status.env() {
        if value.contains('\n') {
            tracing::warn!("Not saving multi-line variable {}", name);
            continue;
        }
        entries.insert(format!("{}{}", ENV_PREFIX, name), value.clone());
    }

    let mut body = String::from(HEADER);
    for (key, value) in entries {
        body.push_str(&key);
        body.push('=');
        body.push_str(&value);
        body.push('\n');
    }

    let checksum = checksum(&body);
    body.push_str(&format!("{}={}\n", CHECKSUM_KEY, checksum));
    body
}

fn checksum(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}

fn parse(contents: &str) -> Result<ToolchainStatus, ArtifactError> {
    let marker = format!("\n{}=", CHECKSUM_KEY);
    let split = contents.rfind(&marker).ok_or(ArtifactError::MissingChecksum)?;
    let (body, trailer) = contents.split_at(split + 1);

    let recorded = trailer
        .strip_prefix(CHECKSUM_KEY)
        .and_then(|t| t.strip_prefix('='))
        .map(str::trim)
        .ok_or(ArtifactError::MissingChecksum)?;
    if recorded != checksum(body) {
        return Err(ArtifactError::ChecksumMismatch);
    }

    let mut tools: BTreeMap<Tool, ToolStatus> = BTreeMap::new();
    let mut found_seen: Vec<Tool> = Vec::new();
    let mut status = ToolchainStatus::default();

    for (index, line) in body.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .ok_or(ArtifactError::Malformed(index + 1))?;

        if let Some(name) = key.strip_prefix(ENV_PREFIX) {
            status.set_env(name, value);
            continue;
        }

        let (tool_key, field) = key
            .rsplit_once('.')
            .ok_or_else(|| ArtifactError::UnknownKey(key.to_string()))?;
        let tool =
            Tool::from_key(tool_key).ok_or_else(|| ArtifactError::UnknownKey(key.to_string()))?;
        let entry = tools.entry(tool).or_default();

        match field {
            "found" => {
                entry.found = value
                    .parse()
                    .map_err(|_| ArtifactError::InvalidValue(key.to_string()))?;
                found_seen.push(tool);
            }
            "path" => entry.path = Some(PathBuf::from(value)),
            "version" => entry.version = Some(value.to_string()),
            _ => return Err(ArtifactError::UnknownKey(key.to_string())),
        }
    }

    for tool in Tool::ALL {
        if !found_seen.contains(&tool) {
            return Err(ArtifactError::Incomplete(tool.name()));
        }
    }

    for (tool, tool_status) in tools {
        if tool_status.found {
            match &tool_status.path {
                Some(path) if path.exists() => {}
                Some(path) => return Err(ArtifactError::Stale(path.clone())),
                None => return Err(ArtifactError::InvalidValue(format!("{}.path", tool.key()))),
            }
        }
        status.insert(tool, tool_status);
    }

    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dimensions::Compiler;
    use crate::util::vcpkg::VcpkgLocator;
    use tempfile::TempDir;

    /// A status whose found tools point at real files in `dir`.
    fn status_in(dir: &Path) -> ToolchainStatus {
        let mut status = ToolchainStatus::default();
        for tool in Tool::ALL {
            status.insert(tool, ToolStatus::missing());
        }
        let cmake = dir.join("cmake");
        fs::write(&cmake, "").unwrap();
        status.insert(
            Tool::CMake,
            ToolStatus::found(&cmake, Some("3.28.1".to_string())),
        );
        status.insert(
            Tool::Compiler(Compiler::Gcc),
            ToolStatus {
                found: false,
                version: Some("4.8.5".to_string()),
                path: Some(dir.join("gcc")),
            },
        );
        status.set_env("LIB", "C:\\lib;D:\\lib");
        status
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let file = EnvironmentFile::new(tmp.path().join(".lattice").join("toolchain.env"));
        let status = status_in(tmp.path());

        file.save(&status).unwrap();
        assert_eq!(file.load(), Some(status));

        let text = fs::read_to_string(file.path()).unwrap();
        assert!(text.contains("cmake.version=3.28.1\n"));
        assert!(text.contains("env.LIB=C:\\lib;D:\\lib\n"));
        assert!(text.lines().last().unwrap().starts_with("checksum="));
    }

    #[test]
    fn test_save_overwrites_previous_entries() {
        let tmp = TempDir::new().unwrap();
        let file = EnvironmentFile::new(tmp.path().join("toolchain.env"));

        file.save(&status_in(tmp.path())).unwrap();
        let mut without_env = ToolchainStatus::default();
        for (tool, s) in status_in(tmp.path()).tools() {
            without_env.insert(*tool, s.clone());
        }
        file.save(&without_env).unwrap();

        let loaded = file.load().unwrap();
        assert!(loaded.env().is_empty());
    }

    #[test]
    fn test_missing_file_is_none() {
        let tmp = TempDir::new().unwrap();
        let file = EnvironmentFile::new(tmp.path().join("toolchain.env"));
        assert_eq!(file.load(), None);
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let file = EnvironmentFile::new(tmp.path().join("toolchain.env"));
        fs::write(file.path(), "\u{0}\u{1}garbage without structure").unwrap();
        assert_eq!(file.load(), None);
    }

    #[test]
    fn test_edited_file_fails_checksum() {
        let tmp = TempDir::new().unwrap();
        let file = EnvironmentFile::new(tmp.path().join("toolchain.env"));
        file.save(&status_in(tmp.path())).unwrap();

        let text = fs::read_to_string(file.path()).unwrap();
        fs::write(file.path(), text.replace("3.28.1", "3.30.0")).unwrap();

        let err = parse(&fs::read_to_string(file.path()).unwrap()).unwrap_err();
        assert_eq!(err, ArtifactError::ChecksumMismatch);
        assert_eq!(file.load(), None);
    }

    #[test]
    fn test_removed_tool_makes_file_stale() {
        let tmp = TempDir::new().unwrap();
        let file = EnvironmentFile::new(tmp.path().join("toolchain.env"));
        file.save(&status_in(tmp.path())).unwrap();

        fs::remove_file(tmp.path().join("cmake")).unwrap();

        let err = parse(&fs::read_to_string(file.path()).unwrap()).unwrap_err();
        assert!(matches!(err, ArtifactError::Stale(_)));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let body = format!("{}make.found=true\n", HEADER);
        let contents = format!("{}checksum={}\n", body, checksum(&body));
        assert_eq!(
            parse(&contents).unwrap_err(),
            ArtifactError::UnknownKey("make.found".to_string())
        );
    }

    #[test]
    fn test_load_or_detect_prefers_saved_file() {
        let tmp = TempDir::new().unwrap();
        let file = EnvironmentFile::new(tmp.path().join("toolchain.env"));
        let saved = status_in(tmp.path());
        file.save(&saved).unwrap();

        let empty = tmp.path().join("empty-path");
        fs::create_dir_all(&empty).unwrap();
        let detector = Detector::new(std::time::Duration::from_secs(1), VcpkgLocator::new())
            .search_path(&empty)
            .cc(None);

        let (status, provenance) = file.load_or_detect(&detector, false, true);
        assert_eq!(provenance, Provenance::Loaded);
        assert_eq!(status, saved);

        let (status, provenance) = file.load_or_detect(&detector, true, false);
        assert_eq!(provenance, Provenance::Detected);
        assert!(!status.is_found(Tool::CMake));
        // not persisted
        assert_eq!(file.load(), Some(saved));

        let (status, _) = file.load_or_detect(&detector, true, true);
        assert_eq!(file.load(), Some(status));
    }

    #[cfg(unix)]
    #[test]
    fn test_tools_installed_after_save_trigger_detection() {
        use std::os::unix::fs::PermissionsExt;

        use crate::util::vcpkg::{KnownLocations, ROOT_MARKER};

        let tmp = TempDir::new().unwrap();
        let bin = tmp.path().join("bin");
        let vcpkg_root = tmp.path().join("vcpkg");
        fs::create_dir_all(&bin).unwrap();
        let file = EnvironmentFile::new(tmp.path().join("toolchain.env"));
        let detector = || {
            Detector::new(
                std::time::Duration::from_secs(5),
                VcpkgLocator::new().with(KnownLocations::new(vec![vcpkg_root.clone()])),
            )
            .search_path(&bin)
            .cc(None)
        };

        let (first, _) = file.load_or_detect(&detector(), false, true);
        assert!(!first.is_found(Tool::Ninja));
        assert!(!first.is_found(Tool::Vcpkg));

        let ninja = bin.join("ninja");
        fs::write(&ninja, "#!/bin/sh\necho 1.11.1\n").unwrap();
        fs::set_permissions(&ninja, fs::Permissions::from_mode(0o755)).unwrap();
        fs::create_dir_all(&vcpkg_root).unwrap();
        fs::write(vcpkg_root.join(ROOT_MARKER), "").unwrap();

        let (second, provenance) = file.load_or_detect(&detector(), false, true);
        assert_eq!(provenance, Provenance::Detected);
        assert!(second.is_found(Tool::Ninja));
        assert_eq!(second.path(Tool::Vcpkg), Some(vcpkg_root.as_path()));

        // nothing changed since, so the saved file is used again
        let (_, provenance) = file.load_or_detect(&detector(), false, true);
        assert_eq!(provenance, Provenance::Loaded);
    }

    #[test]
    fn test_vcpkg_root_change_triggers_detection() {
        use crate::util::vcpkg::{ConfiguredRoot, ROOT_MARKER};

        let tmp = TempDir::new().unwrap();
        let file = EnvironmentFile::new(tmp.path().join("toolchain.env"));
        let empty = tmp.path().join("empty-path");
        let root = tmp.path().join("override");
        fs::create_dir_all(&empty).unwrap();
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(ROOT_MARKER), "").unwrap();
        file.save(&status_in(tmp.path())).unwrap();

        let detector = Detector::new(
            std::time::Duration::from_secs(1),
            VcpkgLocator::new().with(ConfiguredRoot::new(Some(root.clone()))),
        )
        .search_path(&empty)
        .cc(None);

        let (status, provenance) = file.load_or_detect(&detector, false, true);
        assert_eq!(provenance, Provenance::Detected);
        assert_eq!(status.path(Tool::Vcpkg), Some(root.as_path()));
    }
}
