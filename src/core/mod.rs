//! Core data structures for Lattice.
//!
//! - Build dimensions and the presets they resolve to
//! - The preset catalog read from the presets file
//! - Jobs, stage outcomes and the output layout

pub mod catalog;
pub mod dimensions;
pub mod errors;
pub mod job;
pub mod layout;
pub mod preset;

pub use catalog::PresetCatalog;
pub use dimensions::{Architecture, BuildDimensions, Compiler, Configuration, Feature, Platform};
pub use errors::LatticeError;
pub use job::{BuildJob, JobResult, Stage, StageOutcome, StageSet};
pub use layout::OutputLayout;
pub use preset::{PresetId, PresetResolver};
