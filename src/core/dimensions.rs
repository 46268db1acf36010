//! Build dimensions.
//!
//! A [`BuildDimensions`] value is one point in the build matrix: a
//! configuration, platform, architecture, compiler and set of optional
//! features. Values are validated on construction and immutable afterwards,
//! so anything holding one can assume the combination is buildable.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::LatticeError;

/// Build configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Configuration {
    Debug,
    Release,
}

impl Configuration {
    pub const ALL: [Configuration; 2] = [Configuration::Debug, Configuration::Release];

    /// Token used in preset names (`Debug`, `Release`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Configuration::Debug => "Debug",
            Configuration::Release => "Release",
        }
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Configuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Configuration::Debug),
            "release" => Ok(Configuration::Release),
            _ => Err(format!(
                "invalid configuration '{}'; expected 'debug' or 'release'",
                s
            )),
        }
    }
}

/// Target platform.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Platform {
    /// Build for the machine running the build.
    #[default]
    Host,
    /// Build for the cross target declared in the presets file.
    Cross,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Host, Platform::Cross];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Host => "host",
            Platform::Cross => "cross",
        }
    }

    /// Preset name suffix, `None` for the default platform.
    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            Platform::Host => None,
            Platform::Cross => Some("Cross"),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "host" | "native" => Ok(Platform::Host),
            "cross" => Ok(Platform::Cross),
            _ => Err(format!(
                "invalid platform '{}'; expected 'host' or 'cross'",
                s
            )),
        }
    }
}

/// Target CPU architecture.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Architecture {
    #[default]
    X64,
    X86,
    Arm64,
    /// ARM64 with x64 interop (Windows only, MSVC only).
    Arm64ec,
}

impl Architecture {
    pub const ALL: [Architecture; 4] = [
        Architecture::X64,
        Architecture::X86,
        Architecture::Arm64,
        Architecture::Arm64ec,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::X64 => "x64",
            Architecture::X86 => "x86",
            Architecture::Arm64 => "arm64",
            Architecture::Arm64ec => "arm64ec",
        }
    }

    /// Architectures buildable with the given compiler on the given platform,
    /// in declaration order.
    pub fn supported_by(compiler: Compiler, platform: Platform) -> Vec<Architecture> {
        Architecture::ALL
            .into_iter()
            .filter(|arch| check_combination(*arch, compiler, platform).is_ok())
            .collect()
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "x64" | "x86_64" | "amd64" => Ok(Architecture::X64),
            "x86" | "i686" | "win32" => Ok(Architecture::X86),
            "arm64" | "aarch64" => Ok(Architecture::Arm64),
            "arm64ec" => Ok(Architecture::Arm64ec),
            _ => Err(format!(
                "invalid architecture '{}'; expected one of x64, x86, arm64, arm64ec",
                s
            )),
        }
    }
}

/// Compiler selection.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Compiler {
    /// The host's default compiler (MSVC on Windows).
    #[default]
    Default,
    Clang,
    Gcc,
}

impl Compiler {
    pub const ALL: [Compiler; 3] = [Compiler::Default, Compiler::Clang, Compiler::Gcc];

    pub fn as_str(&self) -> &'static str {
        match self {
            Compiler::Default => "default",
            Compiler::Clang => "clang",
            Compiler::Gcc => "gcc",
        }
    }

    /// Preset name suffix, `None` for the default compiler.
    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            Compiler::Default => None,
            Compiler::Clang => Some("Clang"),
            Compiler::Gcc => Some("GCC"),
        }
    }
}

impl fmt::Display for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Compiler {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" | "msvc" => Ok(Compiler::Default),
            "clang" | "clang-cl" => Ok(Compiler::Clang),
            "gcc" => Ok(Compiler::Gcc),
            _ => Err(format!(
                "invalid compiler '{}'; expected 'default', 'clang' or 'gcc'",
                s
            )),
        }
    }
}

/// Optional build feature.
///
/// Declaration order is the order feature suffixes appear in preset names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Feature {
    /// Also build the auxiliary tools. Pulls native dependencies through vcpkg.
    BuildTools,
}

impl Feature {
    pub fn suffix(&self) -> &'static str {
        match self {
            Feature::BuildTools => "Tools",
        }
    }

    /// Whether enabling this feature requires the package manager.
    pub fn needs_package_manager(&self) -> bool {
        match self {
            Feature::BuildTools => true,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::BuildTools => f.write_str("build-tools"),
        }
    }
}

/// A validated, immutable point in the build matrix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BuildDimensions {
    configuration: Configuration,
    platform: Platform,
    architecture: Architecture,
    compiler: Compiler,
    features: BTreeSet<Feature>,
}

impl BuildDimensions {
    /// Create a new set of dimensions, rejecting unbuildable combinations.
    pub fn new(
        configuration: Configuration,
        platform: Platform,
        architecture: Architecture,
        compiler: Compiler,
        features: impl IntoIterator<Item = Feature>,
    ) -> Result<Self, LatticeError> {
        check_combination(architecture, compiler, platform)?;

        Ok(BuildDimensions {
            configuration,
            platform,
            architecture,
            compiler,
            features: features.into_iter().collect(),
        })
    }

    /// Host, x64, default compiler, no features.
    pub fn defaults(configuration: Configuration) -> Self {
        BuildDimensions {
            configuration,
            platform: Platform::default(),
            architecture: Architecture::default(),
            compiler: Compiler::default(),
            features: BTreeSet::new(),
        }
    }

    pub fn configuration(&self) -> Configuration {
        self.configuration
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn compiler(&self) -> Compiler {
        self.compiler
    }

    pub fn features(&self) -> &BTreeSet<Feature> {
        &self.features
    }

    /// Whether any requested feature needs the package manager.
    pub fn needs_package_manager(&self) -> bool {
        self.features.iter().any(|f| f.needs_package_manager())
    }

    /// Every valid point of the dimension space.
    pub fn enumerate() -> Vec<BuildDimensions> {
        let feature_sets: [&[Feature]; 2] = [&[], &[Feature::BuildTools]];
        let mut all = Vec::new();
        for platform in Platform::ALL {
            for configuration in Configuration::ALL {
                for compiler in Compiler::ALL {
                    for architecture in Architecture::supported_by(compiler, platform) {
                        for features in feature_sets {
                            if let Ok(dims) = BuildDimensions::new(
                                configuration,
                                platform,
                                architecture,
                                compiler,
                                features.iter().copied(),
                            ) {
                                all.push(dims);
                            }
                        }
                    }
                }
            }
        }
        all
    }
}

impl fmt::Display for BuildDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} compiler={}",
            self.architecture, self.configuration, self.platform, self.compiler
        )?;
        for feature in &self.features {
            write!(f, " +{}", feature)?;
        }
        Ok(())
    }
}

fn check_combination(
    architecture: Architecture,
    compiler: Compiler,
    platform: Platform,
) -> Result<(), LatticeError> {
    let reason = match (architecture, compiler, platform) {
        (Architecture::Arm64ec, Compiler::Default, Platform::Host) => None,
        (Architecture::Arm64ec, Compiler::Default, Platform::Cross) => {
            Some("arm64ec is only available for host builds")
        }
        (Architecture::Arm64ec, _, _) => Some("arm64ec requires the default (MSVC) compiler"),
        (Architecture::X86, Compiler::Gcc, Platform::Cross) => {
            Some("no x86 cross toolchain is declared for gcc")
        }
        _ => None,
    };

    match reason {
        Some(reason) => Err(LatticeError::InvalidCombination {
            architecture: architecture.to_string(),
            compiler: compiler.to_string(),
            platform: platform.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tokens() {
        assert_eq!("Release".parse::<Configuration>().unwrap(), Configuration::Release);
        assert_eq!("aarch64".parse::<Architecture>().unwrap(), Architecture::Arm64);
        assert_eq!("native".parse::<Platform>().unwrap(), Platform::Host);
        assert_eq!("clang-cl".parse::<Compiler>().unwrap(), Compiler::Clang);
        assert!("both".parse::<Configuration>().is_err());
        assert!("mips".parse::<Architecture>().is_err());
    }

    #[test]
    fn test_arm64ec_requires_default_compiler() {
        let err = BuildDimensions::new(
            Configuration::Debug,
            Platform::Host,
            Architecture::Arm64ec,
            Compiler::Clang,
            [],
        )
        .unwrap_err();
        assert!(matches!(err, LatticeError::InvalidCombination { .. }));
        assert!(err.to_string().contains("arm64ec"));
    }

    #[test]
    fn test_arm64ec_rejected_for_cross() {
        assert!(BuildDimensions::new(
            Configuration::Release,
            Platform::Cross,
            Architecture::Arm64ec,
            Compiler::Default,
            [],
        )
        .is_err());
    }

    #[test]
    fn test_supported_by_filters_architectures() {
        assert_eq!(
            Architecture::supported_by(Compiler::Default, Platform::Host),
            Architecture::ALL.to_vec()
        );
        assert_eq!(
            Architecture::supported_by(Compiler::Clang, Platform::Host),
            vec![Architecture::X64, Architecture::X86, Architecture::Arm64]
        );
        assert_eq!(
            Architecture::supported_by(Compiler::Gcc, Platform::Cross),
            vec![Architecture::X64, Architecture::Arm64]
        );
    }

    #[test]
    fn test_features_are_deduplicated() {
        let dims = BuildDimensions::new(
            Configuration::Debug,
            Platform::Host,
            Architecture::X64,
            Compiler::Default,
            [Feature::BuildTools, Feature::BuildTools],
        )
        .unwrap();
        assert_eq!(dims.features().len(), 1);
        assert!(dims.needs_package_manager());
    }

    #[test]
    fn test_defaults() {
        let dims = BuildDimensions::defaults(Configuration::Release);
        assert_eq!(dims.architecture(), Architecture::X64);
        assert_eq!(dims.platform(), Platform::Host);
        assert_eq!(dims.compiler(), Compiler::Default);
        assert!(dims.features().is_empty());
    }
}
