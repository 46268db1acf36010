//! Toolchain detection and the per-preset CMake pipeline.

pub mod cmake;
pub mod events;
pub mod pipeline;
pub mod toolchain;

pub use events::BuildEvent;
pub use pipeline::{BuildObserver, Pipeline, ProcessRunner, StageRunner};
pub use toolchain::{Detector, Tool, ToolStatus, ToolchainStatus};
