//! Toolchain detection.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use rayon::prelude::*;
use regex::Regex;
use semver::Version;

use crate::core::dimensions::Compiler;
use crate::util::process::ProcessBuilder;
use crate::util::vcpkg::{vcpkg_binary, VcpkgLocator};

use super::msvc::{self, DevEnvironment};
use super::{Tool, ToolStatus, ToolchainStatus};

/// Oldest CMake that reads version 3 presets files, where `generator` is
/// optional.
pub const MIN_CMAKE_VERSION: Version = Version::new(3, 21, 0);

/// Default per-tool timeout.
pub const DEFAULT_DETECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How the detector reads a tool's version.
#[derive(Debug, Clone, Copy)]
enum VersionQuery {
    /// `<tool> <arg>` prints the version on stdout.
    Flag(&'static str),
    /// The tool prints a banner on stderr when run without arguments.
    Banner,
}

enum VersionReply {
    Version(Option<String>),
    TimedOut,
    Failed,
}

/// Inspects the host for every [`Tool`].
///
/// Each tool check is bounded by the configured timeout. A tool that times out
/// still counts the tool as present, with an unknown version, since the
/// executable was located.
pub struct Detector {
    timeout: Duration,
    locator: VcpkgLocator,
    search_path: Option<OsString>,
    cc: Option<String>,
}

impl Detector {
    /// A detector that searches PATH and honours `CC`.
    pub fn new(timeout: Duration, locator: VcpkgLocator) -> Self {
        Detector {
            timeout,
            locator,
            search_path: None,
            cc: std::env::var("CC").ok().filter(|cc| !cc.is_empty()),
        }
    }

    /// Search this PATH-style list instead of the process PATH.
    pub fn search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    /// Override the `CC` value used for the default compiler.
    pub fn cc(mut self, cc: Option<String>) -> Self {
        self.cc = cc;
        self
    }

    /// Inspect every tool. Never fails: absent tools are recorded as missing.
    pub fn detect(&self) -> ToolchainStatus {
        let dev_env = self.developer_environment();

        let inspected: Vec<(Tool, ToolStatus)> = Tool::ALL
            .par_iter()
            .map(|tool| (*tool, self.inspect(*tool, dev_env.as_ref())))
            .collect();

        let mut status = ToolchainStatus::default();
        for (tool, tool_status) in inspected {
            match (&tool_status.path, tool_status.found) {
                (Some(path), true) => tracing::debug!(
                    "{}: {} ({})",
                    tool,
                    path.display(),
                    tool_status.version.as_deref().unwrap_or("unknown version")
                ),
                _ => tracing::debug!("{}: not found", tool),
            }
            status.insert(tool, tool_status);
        }

        if let Some(dev_env) = dev_env {
            for (key, value) in dev_env.vars {
                status.set_env(key, value);
            }
        }

        status
    }

    /// On Windows, capture a developer environment when `cl` is not
    /// already usable from the current one.
    fn developer_environment(&self) -> Option<DevEnvironment> {
        if !cfg!(windows) || self.search_path.is_some() {
            return None;
        }
        let ready = self.find("cl").is_some()
            && std::env::var_os("INCLUDE").is_some()
            && std::env::var_os("LIB").is_some();
        if ready {
            tracing::debug!("Using the existing MSVC developer environment");
            return None;
        }
        msvc::capture(self.timeout)
    }

    fn inspect(&self, tool: Tool, dev_env: Option<&DevEnvironment>) -> ToolStatus {
        match tool {
            Tool::CMake => self.inspect_cmake(),
            Tool::Ninja => {
                self.inspect_executable(executable_names(tool), VersionQuery::Flag("--version"))
            }
            Tool::Compiler(compiler) => self.inspect_compiler(compiler, dev_env),
            Tool::Vcpkg => self.inspect_vcpkg(),
        }
    }

    fn inspect_cmake(&self) -> ToolStatus {
        let mut status =
            self.inspect_executable(executable_names(Tool::CMake), VersionQuery::Flag("--version"));
        if !status.found {
            return status;
        }

        if let Some(version) = status.version.as_deref() {
            if !cmake_version_supported(version) {
                tracing::warn!(
                    "CMake {} is too old; {} or newer is required",
                    version,
                    MIN_CMAKE_VERSION
                );
                status.found = false;
            }
        }
        status
    }

    fn inspect_compiler(&self, compiler: Compiler, dev_env: Option<&DevEnvironment>) -> ToolStatus {
        let dev_path = dev_env.and_then(DevEnvironment::search_path);

        if compiler == Compiler::Default {
            if let Some(cc) = &self.cc {
                match self.find_cc(cc) {
                    Some(path) => {
                        let query = version_query_for(&path);
                        return self.status_for(path, query);
                    }
                    None => tracing::warn!("CC is set to `{}` but it was not found", cc),
                }
            }
        }

        for name in executable_names(Tool::Compiler(compiler)) {
            if let Some(path) = self.find(name).or_else(|| find_in(name, dev_path.as_ref())) {
                let query = version_query_for(&path);
                return self.status_for(path, query);
            }
        }
        ToolStatus::missing()
    }

    fn inspect_vcpkg(&self) -> ToolStatus {
        let Some(root) = self.locator.locate() else {
            return ToolStatus::missing();
        };

        let binary = vcpkg_binary(&root);
        let version = if binary.is_file() {
            match self.query_version(&binary, VersionQuery::Flag("version")) {
                VersionReply::Version(v) => v,
                VersionReply::TimedOut | VersionReply::Failed => None,
            }
        } else {
            tracing::debug!("vcpkg at {} is not bootstrapped", root.display());
            None
        };

        ToolStatus::found(root, version)
    }

    fn inspect_executable(&self, names: &[&str], query: VersionQuery) -> ToolStatus {
        names
            .iter()
            .find_map(|name| self.find(name))
            .map(|path| self.status_for(path, query))
            .unwrap_or_else(ToolStatus::missing)
    }

    fn status_for(&self, path: PathBuf, query: VersionQuery) -> ToolStatus {
        match self.query_version(&path, query) {
            VersionReply::Version(version) => ToolStatus::found(path, version),
            VersionReply::TimedOut => {
                tracing::warn!(
                    "`{}` did not report its version within {:?}; assuming it is usable",
                    path.display(),
                    self.timeout
                );
                ToolStatus::found(path, None)
            }
            VersionReply::Failed => ToolStatus::missing(),
        }
    }

    fn query_version(&self, path: &Path, query: VersionQuery) -> VersionReply {
        let cmd = match query {
            VersionQuery::Flag(flag) => ProcessBuilder::new(path).arg(flag),
            VersionQuery::Banner => ProcessBuilder::new(path),
        };

        match cmd.exec_with_timeout(self.timeout) {
            Ok(Some(output)) => {
                let text = match query {
                    VersionQuery::Flag(_) => String::from_utf8_lossy(&output.stdout),
                    VersionQuery::Banner => String::from_utf8_lossy(&output.stderr),
                };
                VersionReply::Version(parse_version(&text))
            }
            Ok(None) => VersionReply::TimedOut,
            Err(e) => {
                tracing::debug!("failed to run {}: {:#}", path.display(), e);
                VersionReply::Failed
            }
        }
    }

    /// The first tool whose saved entry no longer matches the host.
    ///
    /// Only cheap lookups run here, no tool is executed. A tool recorded as
    /// missing that can now be located is outdated, and so is a vcpkg root
    /// that differs from what the locator picks today.
    pub fn outdated(&self, saved: &ToolchainStatus) -> Option<Tool> {
        Tool::ALL.into_iter().find(|&tool| {
            let recorded = saved.get(tool);
            let recorded_path = recorded.and_then(|s| s.path.as_deref());
            let located = self.locate(tool);

            match tool {
                Tool::Vcpkg => located.as_deref() != recorded_path,
                _ => {
                    !recorded.is_some_and(|s| s.found)
                        && located.is_some()
                        && located.as_deref() != recorded_path
                }
            }
        })
    }

    /// Where a tool would be found, without running it.
    fn locate(&self, tool: Tool) -> Option<PathBuf> {
        match tool {
            Tool::Vcpkg => self.locator.locate(),
            Tool::Compiler(Compiler::Default) if self.cc.is_some() => {
                self.cc.as_deref().and_then(|cc| self.find_cc(cc))
            }
            _ => executable_names(tool).iter().find_map(|name| self.find(name)),
        }
    }

    fn find_cc(&self, cc: &str) -> Option<PathBuf> {
        self.find(cc)
            .or_else(|| Some(PathBuf::from(cc)).filter(|p| p.is_file()))
    }

    fn find(&self, name: &str) -> Option<PathBuf> {
        match &self.search_path {
            Some(path) => find_in(name, Some(path)),
            None => which::which(name).ok(),
        }
    }
}

fn find_in(name: &str, path: Option<&OsString>) -> Option<PathBuf> {
    let path = path?;
    let cwd = std::env::current_dir().ok()?;
    which::which_in(name, Some(path), cwd).ok()
}

/// Executable names searched for a tool, most preferred first.
fn executable_names(tool: Tool) -> &'static [&'static str] {
    match (tool, cfg!(windows)) {
        (Tool::CMake, _) => &["cmake"],
        (Tool::Ninja, _) => &["ninja", "ninja-build"],
        (Tool::Compiler(Compiler::Default), true) => &["cl"],
        (Tool::Compiler(Compiler::Default), false) => &["cc", "gcc", "clang"],
        (Tool::Compiler(Compiler::Clang), true) => &["clang-cl", "clang"],
        (Tool::Compiler(Compiler::Clang), false) => &["clang"],
        (Tool::Compiler(Compiler::Gcc), _) => &["gcc"],
        (Tool::Vcpkg, _) => &[],
    }
}

fn version_query_for(path: &Path) -> VersionQuery {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    if stem.eq_ignore_ascii_case("cl") {
        VersionQuery::Banner
    } else {
        VersionQuery::Flag("--version")
    }
}

/// First version-looking token in a tool banner.
///
/// Recognizes dotted versions (`3.28.1`, `19.38.33130`) and the dated
/// versions vcpkg uses (`2024-01-11`).
pub(crate) fn parse_version(text: &str) -> Option<String> {
    VERSION_RE.find(text).map(|m| m.as_str().to_string())
}

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2}|\d+\.\d+(?:\.\d+)*)").unwrap());

/// Whether a CMake version string meets [`MIN_CMAKE_VERSION`].
pub(crate) fn cmake_version_supported(version: &str) -> bool {
    let mut parts = version.split('.').map(|p| p.parse::<u64>());
    let (Some(Ok(major)), Some(Ok(minor))) = (parts.next(), parts.next()) else {
        return true;
    };
    let patch = parts.next().and_then(Result::ok).unwrap_or(0);
    Version::new(major, minor, patch) >= MIN_CMAKE_VERSION
}
