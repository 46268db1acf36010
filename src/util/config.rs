//! Configuration file support for Lattice.
//!
//! Lattice reads two configuration file locations:
//! - Global: `~/.lattice/config.toml` - User-wide defaults
//! - Project: `.lattice/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config, and command-line
//! flags take precedence over both.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::builder::toolchain::DEFAULT_DETECT_TIMEOUT;

/// Default presets file, relative to the project root.
pub const DEFAULT_PRESETS_FILE: &str = "CMakePresets.json";

/// Default output root, relative to the project root.
pub const DEFAULT_OUTPUT_ROOT: &str = "out";

/// Lattice configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build settings
    pub build: BuildConfig,

    /// vcpkg settings
    pub vcpkg: VcpkgConfig,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Presets file, relative to the project root
    pub presets: Option<PathBuf>,

    /// Root of the shared build and install trees
    pub output_root: Option<PathBuf>,

    /// Matrix jobs to run at once (1 = sequential)
    pub jobs: Option<usize>,

    /// Upper bound for each toolchain check, in milliseconds
    pub detect_timeout_ms: Option<u64>,
}

/// vcpkg configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VcpkgConfig {
    /// vcpkg root, consulted after `VCPKG_ROOT`
    pub root: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.build.presets.is_some() {
            self.build.presets = other.build.presets;
        }
        if other.build.output_root.is_some() {
            self.build.output_root = other.build.output_root;
        }
        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.build.detect_timeout_ms.is_some() {
            self.build.detect_timeout_ms = other.build.detect_timeout_ms;
        }

        if other.vcpkg.root.is_some() {
            self.vcpkg.root = other.vcpkg.root;
        }
    }

    /// Matrix worker count, at least 1.
    pub fn jobs(&self) -> usize {
        self.build.jobs.unwrap_or(1).max(1)
    }

    pub fn detect_timeout(&self) -> Duration {
        self.build
            .detect_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DETECT_TIMEOUT)
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.lattice/config.toml)
/// 2. Global config (~/.lattice/config.toml)
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        config.merge(Config::load_or_default(global_path));
    }

    config.merge(Config::load_or_default(project_path));

    config
}
