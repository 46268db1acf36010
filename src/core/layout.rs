//! On-disk output layout.
//!
//! All jobs share one output root. Each job writes only below
//! `build/<PresetId>` and `install/<PresetId>`, which is what lets CI and
//! IDEs find artifacts without asking us.

use std::path::{Path, PathBuf};

use crate::core::preset::PresetId;

/// Output directories for a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        OutputLayout { root: root.into() }
    }

    /// The shared output root. Removing it removes every preset's output.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn build_root(&self) -> PathBuf {
        self.root.join("build")
    }

    pub fn install_root(&self) -> PathBuf {
        self.root.join("install")
    }

    pub fn build_dir(&self, preset: &PresetId) -> PathBuf {
        self.build_root().join(preset.as_str())
    }

    pub fn install_dir(&self, preset: &PresetId) -> PathBuf {
        self.install_root().join(preset.as_str())
    }
}
