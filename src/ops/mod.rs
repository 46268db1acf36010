//! High-level operations.
//!
//! This module contains the implementation of Lattice commands.

pub mod environment;
pub mod fetch;
pub mod lattice_build;
pub mod report;

pub use environment::{EnvironmentFile, Provenance};
pub use fetch::{fetch_vcpkg, FetchOptions};
pub use lattice_build::{
    build, clean_output, host_toolchain, plan_jobs, BuildOptions, MatrixDriver, MatrixReport,
    MatrixRequest, Selector,
};
pub use report::{format_toolchain_report, ToolchainReport};
