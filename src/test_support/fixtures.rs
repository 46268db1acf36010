//! Test fixtures for common test scenarios.

use std::path::{Path, PathBuf};

use serde_json::json;

use crate::builder::toolchain::{Tool, ToolStatus, ToolchainStatus};
use crate::core::catalog::PresetCatalog;
use crate::core::dimensions::BuildDimensions;
use crate::core::preset::PresetId;
use crate::util::config::DEFAULT_PRESETS_FILE;

/// A presets file declaring every preset the resolver can produce, all
/// inheriting a hidden Ninja base.
pub fn presets_json() -> String {
    let mut presets = vec![json!({
        "name": "base",
        "hidden": true,
        "generator": "Ninja",
        "binaryDir": "${sourceDir}/out/build/${presetName}",
    })];
    for dims in BuildDimensions::enumerate() {
        presets.push(json!({
            "name": PresetId::from_dimensions(&dims).as_str(),
            "inherits": "base",
        }));
    }

    json!({ "version": 3, "configurePresets": presets }).to_string()
}

/// The catalog from [`presets_json`], as if read from `root`.
pub fn preset_catalog(root: impl AsRef<Path>) -> PresetCatalog {
    PresetCatalog::from_json(root.as_ref().join(DEFAULT_PRESETS_FILE), &presets_json())
        .expect("fixture presets parse")
}

/// Write a project with a full presets file into `dir`.
pub fn write_project(dir: &Path) -> PathBuf {
    let path = dir.join(DEFAULT_PRESETS_FILE);
    std::fs::write(&path, presets_json()).expect("write presets");
    path
}

/// A host with every tool present.
pub fn full_toolchain() -> ToolchainStatus {
    let mut status = ToolchainStatus::default();
    for tool in Tool::ALL {
        let path = match tool {
            Tool::Vcpkg => PathBuf::from("/opt/vcpkg"),
            other => PathBuf::from("/usr/bin").join(other.key().replace("compiler.", "")),
        };
        status.insert(tool, ToolStatus::found(path, Some("1.0.0".to_string())));
    }
    status.insert(
        Tool::CMake,
        ToolStatus::found("/usr/bin/cmake", Some("3.28.1".to_string())),
    );
    status
}
