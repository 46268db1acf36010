//! The preset catalog read from `CMakePresets.json`.
//!
//! The catalog is the compatibility boundary with the external build
//! description: every PresetId the resolver produces must name a visible
//! configure preset declared here. `CMakeUserPresets.json` next to the
//! presets file is merged in the same way CMake does.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::errors::LatticeError;

/// Name of the user presets file CMake merges with the project presets.
pub const USER_PRESETS_FILE: &str = "CMakeUserPresets.json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresetsFile {
    #[serde(default)]
    configure_presets: Vec<ConfigurePreset>,
}

/// A configure preset as declared in the presets file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurePreset {
    pub name: String,

    #[serde(default)]
    pub hidden: bool,

    #[serde(default, deserialize_with = "one_or_many")]
    pub inherits: Vec<String>,

    #[serde(default)]
    pub generator: Option<String>,

    #[serde(default)]
    pub display_name: Option<String>,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(name) => vec![name],
        OneOrMany::Many(names) => names,
    })
}

/// All configure presets declared for a project.
#[derive(Debug, Clone)]
pub struct PresetCatalog {
    path: PathBuf,
    presets: BTreeMap<String, ConfigurePreset>,
}

impl PresetCatalog {
    /// Load the catalog from a presets file, merging `CMakeUserPresets.json`
    /// from the same directory when present.
    pub fn load(path: &Path) -> Result<Self, LatticeError> {
        let mut catalog = PresetCatalog {
            path: path.to_path_buf(),
            presets: BTreeMap::new(),
        };
        catalog.merge_file(path)?;

        if let Some(dir) = path.parent() {
            let user = dir.join(USER_PRESETS_FILE);
            if user.exists() && user != path {
                catalog.merge_file(&user)?;
            }
        }

        tracing::debug!(
            "Loaded {} configure preset(s) from {}",
            catalog.presets.len(),
            path.display()
        );

        Ok(catalog)
    }

    /// Parse a catalog from JSON text.
    pub fn from_json(path: impl Into<PathBuf>, json: &str) -> Result<Self, LatticeError> {
        let path = path.into();
        let mut catalog = PresetCatalog {
            path: path.clone(),
            presets: BTreeMap::new(),
        };
        catalog.merge_str(&path, json)?;
        Ok(catalog)
    }

    fn merge_file(&mut self, path: &Path) -> Result<(), LatticeError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| LatticeError::PresetCatalog {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        self.merge_str(path, &contents)
    }

    fn merge_str(&mut self, path: &Path, json: &str) -> Result<(), LatticeError> {
        let file: PresetsFile =
            serde_json::from_str(json).map_err(|e| LatticeError::PresetCatalog {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        for preset in file.configure_presets {
            if self.presets.contains_key(&preset.name) {
                return Err(LatticeError::PresetCatalog {
                    path: path.to_path_buf(),
                    message: format!("duplicate configure preset `{}`", preset.name),
                });
            }
            self.presets.insert(preset.name.clone(), preset);
        }

        Ok(())
    }

    /// Path of the project presets file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a non-hidden configure preset with this name is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.presets.get(name).is_some_and(|p| !p.hidden)
    }

    pub fn get(&self, name: &str) -> Option<&ConfigurePreset> {
        self.presets.get(name)
    }

    /// Names of all visible configure presets, sorted.
    pub fn visible(&self) -> impl Iterator<Item = &ConfigurePreset> {
        self.presets.values().filter(|p| !p.hidden)
    }

    /// The generator a preset ends up with after following `inherits`.
    ///
    /// Parents are searched depth-first in declaration order, matching
    /// CMake's precedence for inherited fields.
    pub fn effective_generator(&self, name: &str) -> Option<&str> {
        let mut stack = vec![name];
        let mut seen = Vec::new();

        while let Some(current) = stack.pop() {
            if seen.contains(&current) {
                continue;
            }
            seen.push(current);

            let Some(preset) = self.presets.get(current) else {
                continue;
            };
            if let Some(generator) = preset.generator.as_deref() {
                return Some(generator);
            }
            stack.extend(preset.inherits.iter().rev().map(String::as_str));
        }

        None
    }
}
