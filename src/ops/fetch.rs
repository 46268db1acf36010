//! Implementation of `lattice fetch-vcpkg`.
//!
//! Best effort: clone vcpkg and run its bootstrap script once. Failures are
//! reported and left for the user to fix; nothing is retried.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use git2::Repository;

use crate::util::context::GlobalContext;
use crate::util::process::ProcessBuilder;
use crate::util::shell::{Shell, Status};
use crate::util::vcpkg::{is_valid_vcpkg_root, vcpkg_binary, ROOT_ENV};

pub const VCPKG_REMOTE: &str = "https://github.com/microsoft/vcpkg.git";

/// Options for the fetch command.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Checkout directory; defaults to `vcpkg` under the Lattice home
    pub dir: Option<PathBuf>,
    pub remote: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            dir: None,
            remote: VCPKG_REMOTE.to_string(),
        }
    }
}

/// Where `fetch-vcpkg` puts vcpkg when no directory is given.
pub fn default_vcpkg_dir(ctx: &GlobalContext) -> PathBuf {
    ctx.home().join("vcpkg")
}

/// Clone and bootstrap vcpkg, returning its root.
pub fn fetch_vcpkg(ctx: &GlobalContext, options: &FetchOptions, shell: &Shell) -> Result<PathBuf> {
    let dir = match &options.dir {
        Some(dir) => ctx.cwd().join(dir),
        None => default_vcpkg_dir(ctx),
    };

    if is_valid_vcpkg_root(&dir) && vcpkg_binary(&dir).is_file() {
        shell.note(format!("vcpkg is already bootstrapped at {}", dir.display()));
        return Ok(dir);
    }

    if dir.join(".git").is_dir() {
        tracing::debug!("Reusing existing checkout at {}", dir.display());
    } else if is_non_empty_dir(&dir) {
        bail!(
            "{} exists and is not a vcpkg checkout\n\
             hint: pass `--dir` to choose another location",
            dir.display()
        );
    } else {
        shell.status(Status::Fetching, &options.remote);
        if let Some(parent) = dir.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
        Repository::clone(&options.remote, &dir)
            .with_context(|| format!("failed to clone {}", options.remote))?;
    }

    shell.status(Status::Building, "vcpkg (bootstrap)");
    bootstrap_command(&dir)
        .exec_and_check()
        .context("vcpkg bootstrap failed; run the bootstrap script by hand to see why")?;

    if !is_valid_vcpkg_root(&dir) {
        bail!("bootstrap finished but {} is not a vcpkg root", dir.display());
    }

    shell.status(Status::Created, format!("vcpkg at {}", dir.display()));
    shell.note(format!(
        "set {}={} or `[vcpkg] root` in .lattice/config.toml, then run `lattice toolchain --redetect`",
        ROOT_ENV,
        dir.display()
    ));
    Ok(dir)
}

/// The platform bootstrap script invocation for a checkout.
pub fn bootstrap_command(dir: &Path) -> ProcessBuilder {
    let cmd = if cfg!(windows) {
        ProcessBuilder::new("cmd")
            .arg("/C")
            .arg(dir.join("bootstrap-vcpkg.bat"))
    } else {
        ProcessBuilder::new("sh").arg(dir.join("bootstrap-vcpkg.sh"))
    };
    cmd.arg("-disableMetrics").cwd(dir)
}

fn is_non_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}
