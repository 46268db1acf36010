//! CMake stage commands and output discovery.
//!
//! Every command names its directories explicitly so that the on-disk
//! layout does not depend on what a preset's `binaryDir` says:
//!
//! ```text
//! configure  cmake --preset <id> -B out/build/<id> -DCMAKE_INSTALL_PREFIX=out/install/<id>
//! build      cmake --build out/build/<id> --config <Config> --parallel
//! install    cmake --install out/build/<id> --config <Config> --prefix out/install/<id>
//! test       ctest --test-dir out/build/<id> -C <Config> --output-on-failure
//! ```

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::builder::toolchain::{Tool, ToolchainStatus};
use crate::core::catalog::PresetCatalog;
use crate::core::job::{ArtifactSet, BuildJob, Stage};
use crate::core::layout::OutputLayout;
use crate::util::process::ProcessBuilder;

/// Directories CMake creates for its own bookkeeping.
const SKIPPED_DIRS: &[&str] = &["CMakeFiles", "_deps", "vcpkg_installed", "Testing"];

/// Builds the external process for each pipeline stage.
pub struct StageCommands<'a> {
    catalog: &'a PresetCatalog,
    layout: &'a OutputLayout,
}

impl<'a> StageCommands<'a> {
    pub fn new(catalog: &'a PresetCatalog, layout: &'a OutputLayout) -> Self {
        StageCommands { catalog, layout }
    }

    pub fn layout(&self) -> &OutputLayout {
        self.layout
    }

    /// Directory CMake runs in: the one holding the presets file.
    pub fn source_dir(&self) -> &Path {
        self.catalog
            .path()
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
    }

    /// The command for `stage` of `job`, or `None` if the host lacks the
    /// build tool.
    pub fn command(
        &self,
        job: &BuildJob,
        stage: Stage,
        status: &ToolchainStatus,
    ) -> Option<ProcessBuilder> {
        let cmake = status.path(Tool::CMake)?;
        let preset = &job.preset;
        let config = job.dimensions.configuration().as_str();
        let build_dir = self.layout.build_dir(preset);
        let install_dir = self.layout.install_dir(preset);

        let cmd = match stage {
            Stage::Configure => {
                let mut cmd = ProcessBuilder::new(cmake)
                    .arg("--preset")
                    .arg(preset.as_str())
                    .arg("-B")
                    .arg(&build_dir)
                    .arg(format!("-DCMAKE_INSTALL_PREFIX={}", install_dir.display()));

                let generator = self.catalog.effective_generator(preset.as_str());
                if generator.is_none() {
                    cmd = cmd.args(["-G", "Ninja"]);
                }
                // Other generators bring their own build program.
                let uses_ninja = generator.map_or(true, |g| g.starts_with("Ninja"));
                if let (true, Some(ninja)) = (uses_ninja, status.path(Tool::Ninja)) {
                    cmd = cmd.arg(format!("-DCMAKE_MAKE_PROGRAM={}", ninja.display()));
                }

                cmd.envs(status.compiler_env(job.dimensions.compiler()))
            }
            Stage::Build => ProcessBuilder::new(cmake)
                .arg("--build")
                .arg(&build_dir)
                .args(["--config", config, "--parallel"]),
            Stage::Install => ProcessBuilder::new(cmake)
                .arg("--install")
                .arg(&build_dir)
                .args(["--config", config, "--prefix"])
                .arg(&install_dir),
            Stage::Test => ProcessBuilder::new(ctest_for(cmake))
                .arg("--test-dir")
                .arg(&build_dir)
                .args(["-C", config, "--output-on-failure"]),
        };

        Some(cmd.envs(status.stage_env()).cwd(self.source_dir()))
    }
}

/// `ctest` ships next to `cmake`.
fn ctest_for(cmake: &Path) -> PathBuf {
    let exe = if cfg!(windows) { "ctest.exe" } else { "ctest" };
    cmake.with_file_name(exe)
}

/// Collect library and executable outputs below `root`.
pub fn discover_artifacts(root: &Path) -> ArtifactSet {
    let mut artifacts = ArtifactSet {
        root: root.to_path_buf(),
        ..ArtifactSet::default()
    };

    let walker = WalkDir::new(root).into_iter().filter_entry(|e| {
        !(e.file_type().is_dir()
            && e.file_name()
                .to_str()
                .is_some_and(|n| SKIPPED_DIRS.contains(&n)))
    });

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if is_library(path) {
            artifacts.libraries.push(path.to_path_buf());
        } else if is_executable(path) {
            artifacts.executables.push(path.to_path_buf());
        }
    }

    artifacts.libraries.sort();
    artifacts.executables.sort();
    artifacts
}

fn is_library(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    match path.extension().and_then(|e| e.to_str()) {
        Some("a" | "lib" | "so" | "dylib" | "dll") => true,
        // libfoo.so.1.2.3
        _ => name.contains(".so."),
    }
}

#[cfg(windows)]
fn is_executable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("exe"))
}

#[cfg(not(windows))]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    if path.extension().is_some() {
        return false;
    }
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
