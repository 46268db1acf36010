//! Command implementations

pub mod build;
pub mod clean;
pub mod completions;
pub mod fetch;
pub mod presets;
pub mod resolve;
pub mod toolchain;
