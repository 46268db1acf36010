//! Locating a vcpkg checkout.
//!
//! Candidate roots come from an ordered chain of [`RootProvider`]s. The
//! first candidate that passes [`is_valid_vcpkg_root`] wins, so adding a new
//! search location means adding a provider, not editing the search.
//!
//! The standard chain is:
//! 1. `VCPKG_ROOT` (always wins when it points at a valid root)
//! 2. `[vcpkg] root` from the configuration file
//! 3. Well-known install locations for the host
//! 4. A `vcpkg` executable on PATH

use std::fs;
use std::path::{Path, PathBuf};

/// Marker file created by vcpkg's bootstrap script at the root of a checkout.
pub const ROOT_MARKER: &str = ".vcpkg-root";

/// Environment variable naming the vcpkg root.
pub const ROOT_ENV: &str = "VCPKG_ROOT";

/// A source of candidate vcpkg roots.
pub trait RootProvider: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Candidate directories, most preferred first.
    fn candidates(&self) -> Vec<PathBuf>;
}

/// Root named by an environment variable.
#[derive(Debug, Clone)]
pub struct EnvOverride {
    var: String,
}

impl EnvOverride {
    pub fn new(var: impl Into<String>) -> Self {
        EnvOverride { var: var.into() }
    }
}

impl Default for EnvOverride {
    fn default() -> Self {
        EnvOverride::new(ROOT_ENV)
    }
}

impl RootProvider for EnvOverride {
    fn name(&self) -> &str {
        &self.var
    }

    fn candidates(&self) -> Vec<PathBuf> {
        match std::env::var_os(&self.var) {
            Some(value) if !value.is_empty() => vec![PathBuf::from(value)],
            _ => Vec::new(),
        }
    }
}

/// Root set in the configuration file.
#[derive(Debug, Clone)]
pub struct ConfiguredRoot(Option<PathBuf>);

impl ConfiguredRoot {
    pub fn new(root: Option<PathBuf>) -> Self {
        ConfiguredRoot(root)
    }
}

impl RootProvider for ConfiguredRoot {
    fn name(&self) -> &str {
        "config"
    }

    fn candidates(&self) -> Vec<PathBuf> {
        self.0.iter().cloned().collect()
    }
}

/// Fixed list of directories where vcpkg is commonly cloned.
#[derive(Debug, Clone)]
pub struct KnownLocations {
    dirs: Vec<PathBuf>,
}

impl KnownLocations {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        KnownLocations { dirs }
    }

    /// Well-known locations for the host platform.
    pub fn for_host() -> Self {
        let home = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf());
        let mut dirs = Vec::new();

        if cfg!(windows) {
            dirs.extend(
                ["C:\\vcpkg", "C:\\src\\vcpkg", "C:\\tools\\vcpkg"]
                    .into_iter()
                    .map(PathBuf::from),
            );
            dirs.extend(home.map(|h| h.join("vcpkg")));
            if let Some(local) = std::env::var_os("LOCALAPPDATA") {
                dirs.push(PathBuf::from(local).join("vcpkg"));
            }
            dirs.extend(integration_root());
        } else {
            dirs.extend(home.map(|h| h.join("vcpkg")));
            dirs.extend(
                ["/opt/vcpkg", "/usr/local/vcpkg", "/usr/local/share/vcpkg"]
                    .into_iter()
                    .map(PathBuf::from),
            );
        }

        KnownLocations { dirs }
    }
}

impl RootProvider for KnownLocations {
    fn name(&self) -> &str {
        "known locations"
    }

    fn candidates(&self) -> Vec<PathBuf> {
        self.dirs.clone()
    }
}

/// Root derived from a `vcpkg` executable on PATH.
#[derive(Debug, Clone, Default)]
pub struct PathLookup;

impl RootProvider for PathLookup {
    fn name(&self) -> &str {
        "PATH"
    }

    fn candidates(&self) -> Vec<PathBuf> {
        let exe = if cfg!(windows) { "vcpkg.exe" } else { "vcpkg" };
        which::which(exe)
            .ok()
            .and_then(|p| fs::canonicalize(&p).ok().or(Some(p)))
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .into_iter()
            .collect()
    }
}

/// Ordered provider chain.
pub struct VcpkgLocator {
    providers: Vec<Box<dyn RootProvider>>,
}

impl VcpkgLocator {
    /// An empty chain that never finds anything.
    pub fn new() -> Self {
        VcpkgLocator {
            providers: Vec::new(),
        }
    }

    /// Append a provider to the end of the chain.
    pub fn with(mut self, provider: impl RootProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// The standard search order.
    pub fn standard(config_root: Option<PathBuf>) -> Self {
        VcpkgLocator::new()
            .with(EnvOverride::default())
            .with(ConfiguredRoot::new(config_root))
            .with(KnownLocations::for_host())
            .with(PathLookup)
    }

    /// The first valid root any provider offers.
    pub fn locate(&self) -> Option<PathBuf> {
        for provider in &self.providers {
            for candidate in provider.candidates() {
                if is_valid_vcpkg_root(&candidate) {
                    tracing::debug!(
                        "Found vcpkg via {}: {}",
                        provider.name(),
                        candidate.display()
                    );
                    return Some(candidate);
                }
                tracing::debug!(
                    "Ignoring vcpkg candidate from {} (no {}): {}",
                    provider.name(),
                    ROOT_MARKER,
                    candidate.display()
                );
            }
        }
        None
    }
}

impl Default for VcpkgLocator {
    fn default() -> Self {
        VcpkgLocator::new()
    }
}

/// Validate that a directory is a bootstrapped vcpkg root.
pub fn is_valid_vcpkg_root(path: &Path) -> bool {
    path.join(ROOT_MARKER).is_file()
}

/// Path of the vcpkg executable inside a root.
pub fn vcpkg_binary(root: &Path) -> PathBuf {
    let exe = if cfg!(windows) { "vcpkg.exe" } else { "vcpkg" };
    root.join(exe)
}

/// Root recorded by `vcpkg integrate install`.
fn integration_root() -> Option<PathBuf> {
    let local_app_data = std::env::var_os("LOCALAPPDATA")?;
    let targets_file = PathBuf::from(local_app_data)
        .join("vcpkg")
        .join("vcpkg.user.targets");
    let content = fs::read_to_string(targets_file).ok()?;

    // <Import Project="C:\vcpkg\scripts\buildsystems\msbuild\vcpkg.targets" ... />
    content.lines().find_map(|line| {
        let start = line.find("Project=\"")? + "Project=\"".len();
        let rest = &line[start..];
        let end = rest.find('"')?;
        PathBuf::from(&rest[..end])
            .ancestors()
            .nth(4)
            .map(Path::to_path_buf)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bootstrapped_root() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(ROOT_MARKER), "").unwrap();
        tmp
    }

    #[test]
    fn test_marker_required() {
        let tmp = TempDir::new().unwrap();
        assert!(!is_valid_vcpkg_root(tmp.path()));
        fs::write(tmp.path().join(ROOT_MARKER), "").unwrap();
        assert!(is_valid_vcpkg_root(tmp.path()));
    }

    #[test]
    fn test_first_valid_candidate_wins() {
        let empty = TempDir::new().unwrap();
        let first = bootstrapped_root();
        let second = bootstrapped_root();

        let locator = VcpkgLocator::new()
            .with(KnownLocations::new(vec![
                empty.path().to_path_buf(),
                first.path().to_path_buf(),
            ]))
            .with(ConfiguredRoot::new(Some(second.path().to_path_buf())));

        assert_eq!(locator.locate(), Some(first.path().to_path_buf()));
    }

    #[test]
    fn test_env_override_wins_over_known_locations() {
        let known = bootstrapped_root();
        let overridden = bootstrapped_root();
        let var = "LATTICE_TEST_VCPKG_ROOT_OVERRIDE";
        std::env::set_var(var, overridden.path());

        let locator = VcpkgLocator::new()
            .with(EnvOverride::new(var))
            .with(KnownLocations::new(vec![known.path().to_path_buf()]));
        let found = locator.locate();
        std::env::remove_var(var);

        assert_eq!(found, Some(overridden.path().to_path_buf()));
    }

    #[test]
    fn test_invalid_override_falls_through() {
        let known = bootstrapped_root();
        let bogus = TempDir::new().unwrap();
        let var = "LATTICE_TEST_VCPKG_ROOT_BOGUS";
        std::env::set_var(var, bogus.path());

        let locator = VcpkgLocator::new()
            .with(EnvOverride::new(var))
            .with(KnownLocations::new(vec![known.path().to_path_buf()]));
        let found = locator.locate();
        std::env::remove_var(var);

        assert_eq!(found, Some(known.path().to_path_buf()));
    }

    #[test]
    fn test_empty_chain_finds_nothing() {
        assert_eq!(VcpkgLocator::new().locate(), None);
    }
}
