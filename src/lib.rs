//! Lattice - a preset-driven build matrix orchestrator for CMake projects
//!
//! This crate provides the core library functionality for Lattice:
//! toolchain detection, preset resolution, the per-preset stage pipeline
//! and the build matrix driver.

pub mod builder;
pub mod core;
pub mod ops;
pub mod util;

/// Test utilities and mocks for Lattice unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests.
#[cfg(test)]
pub mod test_support;

pub use core::{
    catalog::PresetCatalog,
    dimensions::BuildDimensions,
    errors::LatticeError,
    preset::{PresetId, PresetResolver},
};

pub use builder::toolchain::ToolchainStatus;
pub use util::context::GlobalContext;
