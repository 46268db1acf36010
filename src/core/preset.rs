//! Preset identity and resolution.
//!
//! A [`PresetId`] is both the external build tool's configure preset name
//! and the output directory segment for a job. It is derived from
//! [`BuildDimensions`] by joining tokens in a fixed order:
//!
//! ```text
//! <arch>-<Config>[-Cross][-<feature suffixes>][-<compiler suffix>]
//! ```
//!
//! Optional tokens are omitted when the dimension has its default value.
//! Every optional token is distinct from every other and from all
//! architecture and configuration tokens, so two tuples that differ in any
//! field always produce different ids.

use std::fmt;

use serde::Serialize;

use crate::builder::toolchain::ToolchainStatus;
use crate::core::catalog::PresetCatalog;
use crate::core::dimensions::BuildDimensions;
use crate::core::errors::LatticeError;

/// Canonical name of a build variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PresetId(String);

impl PresetId {
    /// Serialize dimensions into their preset name.
    pub fn from_dimensions(dims: &BuildDimensions) -> PresetId {
        let mut tokens: Vec<&str> = vec![
            dims.architecture().as_str(),
            dims.configuration().as_str(),
        ];

        if let Some(suffix) = dims.platform().suffix() {
            tokens.push(suffix);
        }

        tokens.extend(dims.features().iter().map(|f| f.suffix()));

        if let Some(suffix) = dims.compiler().suffix() {
            tokens.push(suffix);
        }

        PresetId(tokens.join("-"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PresetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PresetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Maps build dimensions to declared presets.
pub struct PresetResolver<'a> {
    catalog: &'a PresetCatalog,
}

impl<'a> PresetResolver<'a> {
    pub fn new(catalog: &'a PresetCatalog) -> Self {
        PresetResolver { catalog }
    }

    /// Resolve dimensions to a declared preset without consulting the host.
    pub fn resolve_declared(&self, dims: &BuildDimensions) -> Result<PresetId, LatticeError> {
        let id = PresetId::from_dimensions(dims);
        if !self.catalog.contains(id.as_str()) {
            return Err(LatticeError::UnknownPreset {
                preset: id.to_string(),
                catalog: self.catalog.path().to_path_buf(),
            });
        }
        Ok(id)
    }

    /// Resolve dimensions to a declared preset and check that the host has
    /// every mandatory tool the preset needs.
    ///
    /// The package manager is not checked here: a preset that needs it still
    /// resolves, and its configure stage reports the absence.
    pub fn resolve(
        &self,
        dims: &BuildDimensions,
        availability: &ToolchainStatus,
    ) -> Result<PresetId, LatticeError> {
        let id = self.resolve_declared(dims)?;
        availability.require_for(dims, &id)?;
        Ok(id)
    }
}
