//! Host toolchain availability.
//!
//! [`ToolchainStatus`] is an immutable snapshot of which tools the host
//! provides. It is produced by the [`Detector`] (or loaded from the
//! materialized environment file) once per run and threaded explicitly
//! through resolution and the pipeline; nothing reads tool locations from
//! process-wide state.
//!
//! Tool probing order:
//! 1. CMake and Ninja from PATH
//! 2. Compilers: `CC` for the default compiler, then well-known names on PATH
//! 3. On Windows, a Visual Studio developer environment captured via vswhere
//! 4. vcpkg through the root provider chain (see [`crate::util::vcpkg`])

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::dimensions::{BuildDimensions, Compiler};
use crate::core::errors::LatticeError;
use crate::core::preset::PresetId;

mod detect;
mod msvc;

pub use detect::{Detector, DEFAULT_DETECT_TIMEOUT, MIN_CMAKE_VERSION};

/// A tool the orchestrator may need on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Tool {
    CMake,
    Ninja,
    Compiler(Compiler),
    Vcpkg,
}

impl Tool {
    pub const ALL: [Tool; 6] = [
        Tool::CMake,
        Tool::Ninja,
        Tool::Compiler(Compiler::Default),
        Tool::Compiler(Compiler::Clang),
        Tool::Compiler(Compiler::Gcc),
        Tool::Vcpkg,
    ];

    /// Human-readable tool name.
    pub fn name(&self) -> &'static str {
        match self {
            Tool::CMake => "CMake",
            Tool::Ninja => "Ninja",
            Tool::Compiler(Compiler::Default) => "C/C++ compiler",
            Tool::Compiler(Compiler::Clang) => "Clang",
            Tool::Compiler(Compiler::Gcc) => "GCC",
            Tool::Vcpkg => "vcpkg",
        }
    }

    /// Stable key used in the environment file.
    pub fn key(&self) -> &'static str {
        match self {
            Tool::CMake => "cmake",
            Tool::Ninja => "ninja",
            Tool::Compiler(Compiler::Default) => "compiler.default",
            Tool::Compiler(Compiler::Clang) => "compiler.clang",
            Tool::Compiler(Compiler::Gcc) => "compiler.gcc",
            Tool::Vcpkg => "vcpkg",
        }
    }

    pub fn from_key(key: &str) -> Option<Tool> {
        Tool::ALL.into_iter().find(|t| t.key() == key)
    }

    /// Whether a preset that needs this tool cannot run without it.
    pub fn is_mandatory(&self) -> bool {
        !matches!(self, Tool::Vcpkg)
    }

    /// Installation guidance shown when the tool is missing.
    pub fn guidance(&self) -> String {
        match self {
            Tool::CMake => format!(
                "Install CMake {} or newer (https://cmake.org/download/) and ensure it's in your PATH",
                MIN_CMAKE_VERSION
            ),
            Tool::Ninja => {
                "Install Ninja (https://ninja-build.org/) and ensure it's in your PATH".to_string()
            }
            Tool::Compiler(Compiler::Default) if cfg!(windows) => {
                "Install Visual Studio with the \"Desktop development with C++\" workload".to_string()
            }
            Tool::Compiler(Compiler::Default) => {
                "Install a C/C++ compiler (gcc or clang) or set the CC environment variable"
                    .to_string()
            }
            Tool::Compiler(Compiler::Clang) if cfg!(windows) => {
                "Install the \"C++ Clang tools for Windows\" Visual Studio component".to_string()
            }
            Tool::Compiler(Compiler::Clang) => {
                "Install clang and ensure it's in your PATH".to_string()
            }
            Tool::Compiler(Compiler::Gcc) => {
                "Install gcc and g++ and ensure they're in your PATH".to_string()
            }
            Tool::Vcpkg => {
                "Set VCPKG_ROOT to a bootstrapped vcpkg checkout or run `lattice fetch-vcpkg`"
                    .to_string()
            }
        }
    }

    /// Tools a preset with these dimensions needs.
    pub fn required_for(dims: &BuildDimensions) -> Vec<Tool> {
        let mut tools = vec![Tool::CMake, Tool::Ninja, Tool::Compiler(dims.compiler())];
        if dims.needs_package_manager() {
            tools.push(Tool::Vcpkg);
        }
        tools
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Detection result for a single tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolStatus {
    pub found: bool,
    pub version: Option<String>,
    /// Executable path, or the root directory for vcpkg
    pub path: Option<PathBuf>,
}

impl ToolStatus {
    pub fn found(path: impl Into<PathBuf>, version: Option<String>) -> Self {
        ToolStatus {
            found: true,
            version,
            path: Some(path.into()),
        }
    }

    pub fn missing() -> Self {
        ToolStatus::default()
    }
}

/// Availability of every detected tool plus any captured environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolchainStatus {
    tools: BTreeMap<Tool, ToolStatus>,
    /// Variables captured from a compiler developer environment
    env: BTreeMap<String, String>,
}

impl ToolchainStatus {
    pub fn insert(&mut self, tool: Tool, status: ToolStatus) {
        self.tools.insert(tool, status);
    }

    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    pub fn get(&self, tool: Tool) -> Option<&ToolStatus> {
        self.tools.get(&tool)
    }

    pub fn is_found(&self, tool: Tool) -> bool {
        self.get(tool).is_some_and(|s| s.found)
    }

    pub fn path(&self, tool: Tool) -> Option<&Path> {
        self.get(tool)
            .filter(|s| s.found)
            .and_then(|s| s.path.as_deref())
    }

    pub fn tools(&self) -> impl Iterator<Item = (&Tool, &ToolStatus)> {
        self.tools.iter()
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Mandatory tools needed by a preset that the host lacks.
    pub fn missing_for(&self, dims: &BuildDimensions) -> Vec<Tool> {
        Tool::required_for(dims)
            .into_iter()
            .filter(|t| t.is_mandatory() && !self.is_found(*t))
            .collect()
    }

    /// Fail with [`LatticeError::ToolchainMissing`] for the first mandatory
    /// tool the preset needs that is absent.
    pub fn require_for(&self, dims: &BuildDimensions, preset: &PresetId) -> Result<(), LatticeError> {
        match self.missing_for(dims).first() {
            Some(tool) => Err(LatticeError::ToolchainMissing {
                tool: tool.name().to_string(),
                preset: preset.to_string(),
                guidance: tool.guidance(),
            }),
            None => Ok(()),
        }
    }

    /// Environment every stage process runs with.
    pub fn stage_env(&self) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = self
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if let Some(root) = self.path(Tool::Vcpkg) {
            env.push(("VCPKG_ROOT".to_string(), root.display().to_string()));
        }

        env
    }

    /// `CC`/`CXX` for the configure stage. Empty for the default compiler,
    /// which the build description picks on its own.
    pub fn compiler_env(&self, compiler: Compiler) -> Vec<(String, String)> {
        if compiler == Compiler::Default {
            return Vec::new();
        }

        match self.path(Tool::Compiler(compiler)) {
            Some(cc) => vec![
                ("CC".to_string(), cc.display().to_string()),
                ("CXX".to_string(), infer_cxx(cc).display().to_string()),
            ],
            None => Vec::new(),
        }
    }
}

/// The C++ driver that pairs with a C compiler.
pub fn infer_cxx(cc: &Path) -> PathBuf {
    let Some(name) = cc.file_name().and_then(|n| n.to_str()) else {
        return cc.to_path_buf();
    };

    let cxx_name = if name.starts_with("clang-cl") || name == "cl" || name == "cl.exe" {
        name.to_string()
    } else if let Some(rest) = name.strip_prefix("clang") {
        format!("clang++{}", rest)
    } else if let Some(rest) = name.strip_prefix("gcc") {
        format!("g++{}", rest)
    } else if let Some(rest) = name.strip_suffix("-gcc") {
        format!("{}-g++", rest)
    } else if name == "cc" {
        "c++".to_string()
    } else {
        name.to_string()
    };

    cc.with_file_name(cxx_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dimensions::{Architecture, Configuration, Feature, Platform};

    #[test]
    fn test_tool_keys_round_trip() {
        for tool in Tool::ALL {
            assert_eq!(Tool::from_key(tool.key()), Some(tool));
        }
        assert_eq!(Tool::from_key("make"), None);
    }

    #[test]
    fn test_required_tools() {
        let dims = BuildDimensions::new(
            Configuration::Debug,
            Platform::Host,
            Architecture::X64,
            Compiler::Clang,
            [Feature::BuildTools],
        )
        .unwrap();
        assert_eq!(
            Tool::required_for(&dims),
            vec![
                Tool::CMake,
                Tool::Ninja,
                Tool::Compiler(Compiler::Clang),
                Tool::Vcpkg
            ]
        );
    }

    #[test]
    fn test_package_manager_is_never_blocking() {
        let dims = BuildDimensions::new(
            Configuration::Debug,
            Platform::Host,
            Architecture::X64,
            Compiler::Default,
            [Feature::BuildTools],
        )
        .unwrap();
        let mut status = ToolchainStatus::default();
        status.insert(Tool::CMake, ToolStatus::found("/usr/bin/cmake", None));
        status.insert(Tool::Ninja, ToolStatus::found("/usr/bin/ninja", None));
        status.insert(Tool::Compiler(Compiler::Default), ToolStatus::found("/usr/bin/cc", None));

        assert!(status.missing_for(&dims).is_empty());
    }

    #[test]
    fn test_require_for_names_first_missing_tool() {
        let dims = BuildDimensions::defaults(Configuration::Release);
        let mut status = ToolchainStatus::default();
        status.insert(Tool::CMake, ToolStatus::found("/usr/bin/cmake", None));

        let err = status
            .require_for(&dims, &PresetId::from_dimensions(&dims))
            .unwrap_err();
        assert!(err.to_string().starts_with("Ninja is required"));
    }

    #[test]
    fn test_compiler_env() {
        let mut status = ToolchainStatus::default();
        status.insert(
            Tool::Compiler(Compiler::Gcc),
            ToolStatus::found("/usr/bin/gcc-13", Some("13.2.0".to_string())),
        );

        assert!(status.compiler_env(Compiler::Default).is_empty());
        assert_eq!(
            status.compiler_env(Compiler::Gcc),
            vec![
                ("CC".to_string(), "/usr/bin/gcc-13".to_string()),
                ("CXX".to_string(), "/usr/bin/g++-13".to_string()),
            ]
        );
    }

    #[test]
    fn test_stage_env_exports_vcpkg_root() {
        let mut status = ToolchainStatus::default();
        status.insert(Tool::Vcpkg, ToolStatus::found("/opt/vcpkg", None));
        status.set_env("INCLUDE", "C:\\include");

        let env = status.stage_env();
        assert!(env.contains(&("INCLUDE".to_string(), "C:\\include".to_string())));
        assert!(env.contains(&("VCPKG_ROOT".to_string(), "/opt/vcpkg".to_string())));
    }

    #[test]
    fn test_infer_cxx() {
        assert_eq!(infer_cxx(Path::new("/usr/bin/clang")), PathBuf::from("/usr/bin/clang++"));
        assert_eq!(infer_cxx(Path::new("/usr/bin/clang-17")), PathBuf::from("/usr/bin/clang++-17"));
        assert_eq!(infer_cxx(Path::new("/usr/bin/cc")), PathBuf::from("/usr/bin/c++"));
        assert_eq!(
            infer_cxx(Path::new("/opt/x/aarch64-linux-gnu-gcc")),
            PathBuf::from("/opt/x/aarch64-linux-gnu-g++")
        );
        assert_eq!(infer_cxx(Path::new("clang-cl.exe")), PathBuf::from("clang-cl.exe"));
    }
}
