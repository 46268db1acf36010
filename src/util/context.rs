//! Global context for Lattice operations.
//!
//! Provides centralized access to configuration, paths, and environment.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::BaseDirs;

use crate::core::layout::OutputLayout;
use crate::util::config::{load_config, Config, DEFAULT_OUTPUT_ROOT, DEFAULT_PRESETS_FILE};

/// Overrides the global Lattice directory (`~/.lattice`).
pub const HOME_ENV: &str = "LATTICE_HOME";

/// Name of the project-local state directory.
pub const PROJECT_DIR: &str = ".lattice";

/// Name of the materialized toolchain file inside [`PROJECT_DIR`].
pub const ENV_FILE: &str = "toolchain.env";

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Nearest ancestor of `cwd` holding a presets file, or `cwd`
    project_root: PathBuf,

    /// Home directory for global Lattice data (~/.lattice/)
    home: PathBuf,

    /// Merged global and project configuration
    config: Config,

    /// Whether to use verbose output
    verbose: bool,
}

impl GlobalContext {
    /// Create a new GlobalContext for the current directory.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Self::with_cwd(cwd)
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Result<Self> {
        let home = match std::env::var_os(HOME_ENV) {
            Some(home) if !home.is_empty() => PathBuf::from(home),
            _ => BaseDirs::new()
                .map(|d| d.home_dir().join(PROJECT_DIR))
                .unwrap_or_else(|| PathBuf::from(PROJECT_DIR)),
        };

        let project_root = find_project_root(&cwd).unwrap_or_else(|| cwd.clone());
        let config = load_config(
            Some(&home.join("config.toml")),
            &project_root.join(PROJECT_DIR).join("config.toml"),
        );

        tracing::debug!("Project root: {}", project_root.display());

        Ok(GlobalContext {
            cwd,
            project_root,
            home,
            config,
            verbose: false,
        })
    }

    /// Set verbose mode.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Get the Lattice home directory (~/.lattice/).
    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the project-local Lattice directory.
    pub fn project_lattice_dir(&self) -> PathBuf {
        self.project_root.join(PROJECT_DIR)
    }

    /// Path of the materialized toolchain file.
    pub fn env_file_path(&self) -> PathBuf {
        self.project_lattice_dir().join(ENV_FILE)
    }

    /// The presets file: the explicit path if given, else the configured or
    /// default file under the project root.
    pub fn presets_path(&self, explicit: Option<&Path>) -> PathBuf {
        match explicit {
            Some(path) => self.cwd.join(path),
            None => self.project_root.join(
                self.config
                    .build
                    .presets
                    .as_deref()
                    .unwrap_or(Path::new(DEFAULT_PRESETS_FILE)),
            ),
        }
    }

    /// Shared build and install roots.
    pub fn output_layout(&self) -> OutputLayout {
        let root = self
            .config
            .build
            .output_root
            .as_deref()
            .unwrap_or(Path::new(DEFAULT_OUTPUT_ROOT));
        OutputLayout::new(self.project_root.join(root))
    }

    /// Check if verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Ensure a directory exists, creating it if necessary.
    pub fn ensure_dir(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::create_dir_all(path)
                .with_context(|| format!("failed to create directory: {}", path.display()))?;
        }
        Ok(())
    }
}

/// Search upward from `start` for a directory containing a presets file.
fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(DEFAULT_PRESETS_FILE).is_file())
        .map(Path::to_path_buf)
}
