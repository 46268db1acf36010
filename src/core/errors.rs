//! Error taxonomy for matrix builds.

use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::util::diagnostic::Diagnostic;

/// Errors raised while resolving or running build jobs.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum LatticeError {
    #[error("unsupported combination: {architecture} with compiler `{compiler}` on {platform} ({reason})")]
    #[diagnostic(code(lattice::config::invalid_combination))]
    InvalidCombination {
        architecture: String,
        compiler: String,
        platform: String,
        reason: String,
    },

    #[error("preset `{preset}` is not declared in {}", .catalog.display())]
    #[diagnostic(
        code(lattice::config::unknown_preset),
        help("declare the preset in the presets file, or run `lattice presets` to see what is declared")
    )]
    UnknownPreset { preset: String, catalog: PathBuf },

    #[error("failed to read presets file {}: {message}", .path.display())]
    #[diagnostic(code(lattice::config::presets_file))]
    PresetCatalog { path: PathBuf, message: String },

    #[error("{tool} is required for preset `{preset}` but was not found")]
    #[diagnostic(code(lattice::toolchain::missing))]
    ToolchainMissing {
        tool: String,
        preset: String,
        #[help]
        guidance: String,
    },

    #[error("preset `{preset}` builds tools with native dependencies, but vcpkg was not found")]
    #[diagnostic(
        code(lattice::toolchain::package_manager_required),
        help("set VCPKG_ROOT to a bootstrapped vcpkg checkout, or run `lattice fetch-vcpkg`")
    )]
    PackageManagerRequired { preset: String },

    #[error("{stage} failed for preset `{preset}`{}", exit_suffix(.code))]
    #[diagnostic(code(lattice::stage::failed))]
    StageFailed {
        stage: String,
        preset: String,
        code: Option<i32>,
    },

    #[error("{stage} for preset `{preset}` was cancelled")]
    #[diagnostic(code(lattice::stage::cancelled))]
    Cancelled { stage: String, preset: String },
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" (exit code {})", code),
        None => String::new(),
    }
}

impl LatticeError {
    /// Errors decided locally from the request alone. These fail a run
    /// before any external process is spawned.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            LatticeError::InvalidCombination { .. }
                | LatticeError::UnknownPreset { .. }
                | LatticeError::PresetCatalog { .. }
        )
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            LatticeError::InvalidCombination { reason, .. } => Diagnostic::error(self.to_string())
                .with_context(reason.clone())
                .with_suggestion("Pick a different architecture or compiler"),

            LatticeError::UnknownPreset { catalog, .. } => Diagnostic::error(self.to_string())
                .with_location(catalog.clone())
                .with_suggestion("Run `lattice presets` to list the declared presets"),

            LatticeError::PresetCatalog { path, .. } => {
                Diagnostic::error(self.to_string()).with_location(path.clone())
            }

            LatticeError::ToolchainMissing { guidance, .. } => {
                Diagnostic::error(self.to_string()).with_suggestion(guidance.clone())
            }

            LatticeError::PackageManagerRequired { .. } => Diagnostic::error(self.to_string())
                .with_suggestion("Set VCPKG_ROOT to a bootstrapped vcpkg checkout")
                .with_suggestion("Run `lattice fetch-vcpkg` to clone and bootstrap vcpkg")
                .with_suggestion("Drop `--build-tools` to build without the auxiliary tools"),

            LatticeError::StageFailed { .. } => Diagnostic::error(self.to_string())
                .with_suggestion("Re-run with `--verbose` to see the full tool output"),

            LatticeError::Cancelled { .. } => Diagnostic::warning(self.to_string()),
        }
    }
}
