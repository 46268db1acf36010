//! Implementation of `lattice build`.
//!
//! The matrix request is expanded into jobs in a fixed order (platform, then
//! configuration, then architecture), every preset is resolved against the
//! catalog before anything runs, and each job goes through the
//! [`Pipeline`]. One job failing never stops its siblings.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::builder::cmake::StageCommands;
use crate::builder::events::BuildEvent;
use crate::builder::pipeline::{BuildObserver, Pipeline, ProcessRunner};
use crate::builder::toolchain::{Detector, ToolchainStatus};
use crate::core::catalog::PresetCatalog;
use crate::core::dimensions::{Architecture, BuildDimensions, Compiler, Configuration, Feature, Platform};
use crate::core::errors::LatticeError;
use crate::core::job::{BuildJob, JobResult, Stage, StageOutcome, StageSet};
use crate::core::layout::OutputLayout;
use crate::core::preset::{PresetId, PresetResolver};
use crate::ops::environment::{EnvironmentFile, Provenance};
use crate::ops::fetch::default_vcpkg_dir;
use crate::ops::report;
use crate::util::context::GlobalContext;
use crate::util::fs::{relative_path, remove_dir_all_if_exists};
use crate::util::process::{CancelToken, ProcessBuilder};
use crate::util::shell::{Shell, Status};
use crate::util::vcpkg::{KnownLocations, VcpkgLocator};

/// A request for one dimension: every value, or a specific list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector<T> {
    All,
    Only(Vec<T>),
}

impl<T: Copy + PartialEq> Selector<T> {
    pub fn one(value: T) -> Self {
        Selector::Only(vec![value])
    }

    /// Selected values in the order of `all`, without duplicates.
    fn pick(&self, all: &[T]) -> Vec<T> {
        match self {
            Selector::All => all.to_vec(),
            Selector::Only(values) => all
                .iter()
                .copied()
                .filter(|v| values.contains(v))
                .collect(),
        }
    }
}

impl<T: FromStr<Err = String>> Selector<T> {
    /// Parse CLI values where `all` (or `both`) selects every value.
    pub fn parse_list<S: AsRef<str>>(values: &[S]) -> Result<Self, String> {
        if values
            .iter()
            .any(|v| matches!(v.as_ref().to_lowercase().as_str(), "all" | "both"))
        {
            return Ok(Selector::All);
        }
        values
            .iter()
            .map(|v| v.as_ref().parse())
            .collect::<Result<Vec<T>, String>>()
            .map(Selector::Only)
    }
}

impl<T> Default for Selector<T> {
    fn default() -> Self {
        Selector::Only(Vec::new())
    }
}

/// The requested cross product of build dimensions.
#[derive(Debug, Clone)]
pub struct MatrixRequest {
    pub configurations: Selector<Configuration>,
    pub platforms: Selector<Platform>,
    pub architectures: Selector<Architecture>,
    pub compiler: Compiler,
    pub features: BTreeSet<Feature>,
}

impl Default for MatrixRequest {
    fn default() -> Self {
        MatrixRequest {
            configurations: Selector::one(Configuration::Debug),
            platforms: Selector::one(Platform::Host),
            architectures: Selector::one(Architecture::X64),
            compiler: Compiler::Default,
            features: BTreeSet::new(),
        }
    }
}

impl MatrixRequest {
    /// Expand into concrete dimensions, platform-major.
    ///
    /// `All` architectures means every architecture the compiler supports
    /// on that platform. An explicitly requested combination that cannot
    /// be built fails the whole expansion.
    pub fn expand(&self) -> Result<Vec<BuildDimensions>, LatticeError> {
        let mut out: Vec<BuildDimensions> = Vec::new();

        for platform in self.platforms.pick(&Platform::ALL) {
            for configuration in self.configurations.pick(&Configuration::ALL) {
                let architectures = match &self.architectures {
                    Selector::All => Architecture::supported_by(self.compiler, platform),
                    only => only.pick(&Architecture::ALL),
                };
                for architecture in architectures {
                    let dims = BuildDimensions::new(
                        configuration,
                        platform,
                        architecture,
                        self.compiler,
                        self.features.iter().copied(),
                    )?;
                    if !out.contains(&dims) {
                        out.push(dims);
                    }
                }
            }
        }

        Ok(out)
    }
}

/// Options for the build command.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub request: MatrixRequest,

    pub stages: StageSet,

    /// Remove the shared output root before building
    pub clean: bool,

    /// Matrix workers; falls back to the configured value
    pub jobs: Option<usize>,

    /// Ignore the saved toolchain environment
    pub redetect: bool,

    /// Explicit presets file
    pub presets: Option<PathBuf>,
}

/// Results of a matrix run, in expansion order.
#[derive(Debug, Clone, Default)]
pub struct MatrixReport {
    pub results: Vec<JobResult>,
    pub duration: Duration,
    pub cancelled: bool,
}

impl MatrixReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        !self.cancelled && self.results.iter().all(|r| r.success)
    }

    /// Jobs that built but whose tests failed.
    pub fn test_failures(&self) -> impl Iterator<Item = &JobResult> {
        self.results.iter().filter(|r| r.test_failed)
    }
}

/// Runs a list of jobs through a pipeline.
pub struct MatrixDriver<'a> {
    pipeline: &'a Pipeline<'a>,
    jobs: usize,
}

impl<'a> MatrixDriver<'a> {
    pub fn new(pipeline: &'a Pipeline<'a>) -> Self {
        MatrixDriver { pipeline, jobs: 1 }
    }

    /// Run up to `jobs` presets at once. Each job owns its own output
    /// subtree, so order of execution does not matter on disk.
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Run every job and collect the results in input order.
    ///
    /// `on_finished` is called as each job reaches a terminal state.
    pub fn run(
        &self,
        jobs: &[BuildJob],
        status: &ToolchainStatus,
        on_finished: &(dyn Fn(&JobResult) + Sync),
    ) -> Vec<JobResult> {
        let run_one = |job: &BuildJob| {
            let result = self.pipeline.run(job, status);
            on_finished(&result);
            result
        };

        if self.jobs > 1 && jobs.len() > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(self.jobs).build() {
                Ok(pool) => {
                    use rayon::prelude::*;
                    return pool.install(|| jobs.par_iter().map(&run_one).collect());
                }
                Err(e) => tracing::warn!("Running jobs sequentially: {}", e),
            }
        }

        jobs.iter().map(&run_one).collect()
    }
}

/// Reports pipeline progress through the shell.
struct ShellObserver {
    shell: Arc<Shell>,
}

impl BuildObserver for ShellObserver {
    fn stage_started(&self, preset: &PresetId, stage: Stage, cmd: &ProcessBuilder) {
        let status = match stage {
            Stage::Configure => Status::Configuring,
            Stage::Build => Status::Building,
            Stage::Install => Status::Installing,
            Stage::Test => Status::Testing,
        };
        self.shell.status(status, preset);
        if self.shell.is_verbose() {
            self.shell.note(format!("`{}`", cmd.display_command()));
        }
    }

    fn stage_finished(&self, preset: &PresetId, stage: Stage, outcome: &StageOutcome, elapsed: Duration) {
        if self.shell.is_json() {
            let event = BuildEvent::StageFinished {
                preset: preset.clone(),
                stage,
                outcome: outcome.clone(),
                duration_ms: elapsed.as_millis() as u64,
            };
            self.shell.json_event(&event.to_value());
            return;
        }

        match outcome {
            StageOutcome::Failure { message } if stage == Stage::Test => self.shell.warn(message),
            StageOutcome::Failure { message } => self.shell.status(Status::Failed, message),
            StageOutcome::Cancelled => {
                self.shell.status(Status::Skipped, format!("{} {} (cancelled)", preset, stage))
            }
            StageOutcome::Success | StageOutcome::Skipped => {}
        }
    }

    fn stage_output(&self, preset: &PresetId, stage: Stage, lines: &[String]) {
        if self.shell.is_json() {
            return;
        }
        self.shell
            .note(format!("last {} line(s) of {} output for {}:", lines.len(), stage, preset));
        for line in lines {
            self.shell.note(format!("  {}", line));
        }
    }
}

/// Load the catalog and resolve every requested job.
///
/// Configuration errors abort before anything runs. A preset whose tools
/// are missing still becomes a job; the pipeline records it as failed.
pub fn plan_jobs(
    catalog: &PresetCatalog,
    request: &MatrixRequest,
    stages: StageSet,
    status: &ToolchainStatus,
    shell: &Shell,
) -> Result<Vec<BuildJob>, LatticeError> {
    let resolver = PresetResolver::new(catalog);
    let mut jobs = Vec::new();

    for dims in request.expand()? {
        let preset = match resolver.resolve(&dims, status) {
            Ok(preset) => preset,
            Err(e) if e.is_configuration_error() => return Err(e),
            Err(e) => {
                shell.warn(&e);
                if let LatticeError::ToolchainMissing { guidance, .. } = &e {
                    shell.note(guidance);
                }
                PresetId::from_dimensions(&dims)
            }
        };
        jobs.push(BuildJob::new(preset, dims, stages));
    }

    Ok(jobs)
}

/// Detect (or load) the host toolchain for this project.
///
/// With `persist`, a fresh detection replaces the saved environment file.
pub fn host_toolchain(
    ctx: &GlobalContext,
    redetect: bool,
    persist: bool,
) -> (ToolchainStatus, Provenance) {
    let config = ctx.config();
    let locator = VcpkgLocator::standard(config.vcpkg.root.clone())
        .with(KnownLocations::new(vec![default_vcpkg_dir(ctx)]));
    let detector = Detector::new(config.detect_timeout(), locator);
    EnvironmentFile::new(ctx.env_file_path()).load_or_detect(&detector, redetect, persist)
}

/// Remove the shared output root. This deletes every preset's output.
pub fn clean_output(layout: &OutputLayout, shell: &Shell) -> Result<()> {
    if !layout.root().exists() {
        return Ok(());
    }
    shell.warn(format!(
        "cleaning removes build and install output of every preset under {}",
        layout.root().display()
    ));
    remove_dir_all_if_exists(layout.root())?;
    shell.status(Status::Removed, layout.root().display());
    Ok(())
}

/// Run a build matrix.
pub fn build(
    ctx: &GlobalContext,
    options: &BuildOptions,
    shell: &Arc<Shell>,
    cancel: &CancelToken,
) -> Result<MatrixReport> {
    let start = Instant::now();

    let catalog = PresetCatalog::load(&ctx.presets_path(options.presets.as_deref()))?;
    // Reject bad requests before spending time on detection.
    options.request.expand()?;

    let (status, provenance) = host_toolchain(ctx, options.redetect, true);
    match provenance {
        Provenance::Loaded => {
            tracing::debug!("Using saved toolchain from {}", ctx.env_file_path().display())
        }
        Provenance::Detected => shell.status(
            Status::Detecting,
            format!(
                "host toolchain (saved to {})",
                relative_path(ctx.project_root(), &ctx.env_file_path()).display()
            ),
        ),
    }

    let jobs = plan_jobs(&catalog, &options.request, options.stages, &status, shell)?;

    let layout = ctx.output_layout();
    if options.clean {
        clean_output(&layout, shell).context("failed to clean output directory")?;
    }

    let workers = options.jobs.unwrap_or_else(|| ctx.config().jobs());
    shell.json_event(
        &BuildEvent::MatrixStarted {
            presets: jobs.iter().map(|j| j.preset.clone()).collect(),
            jobs: workers,
        }
        .to_value(),
    );

    let runner = ProcessRunner::new(shell.is_json() || !shell.is_verbose());
    let observer = ShellObserver {
        shell: Arc::clone(shell),
    };
    let pipeline = Pipeline::new(StageCommands::new(&catalog, &layout), &runner, cancel.clone())
        .observer(&observer);

    let progress = shell.progress(jobs.len() as u64, "building presets");
    let on_finished = |result: &JobResult| {
        progress.inc(1);
        progress.set_message(format!("finished {}", result.preset));
        shell.json_event(&BuildEvent::job_finished(result).to_value());
    };
    let results = MatrixDriver::new(&pipeline)
        .jobs(workers)
        .run(&jobs, &status, &on_finished);
    progress.finish();

    let report = MatrixReport {
        results,
        duration: start.elapsed(),
        cancelled: cancel.is_cancelled(),
    };

    if shell.is_json() {
        shell.json_event(
            &BuildEvent::MatrixFinished {
                success: report.all_succeeded(),
                succeeded: report.succeeded(),
                failed: report.failed(),
                cancelled: report.cancelled,
                duration_ms: report.duration.as_millis() as u64,
            }
            .to_value(),
        );
    } else {
        report::print_matrix_report(shell, &report, ctx.project_root());
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::toolchain::{Tool, ToolStatus};
    use crate::test_support::{full_toolchain, preset_catalog, MockRunner, MockStageOutput};
    use crate::util::shell::ColorChoice;

    fn quiet_shell() -> Shell {
        Shell::from_flags(true, false, ColorChoice::Never, false)
    }

    fn request(
        configurations: Selector<Configuration>,
        platforms: Selector<Platform>,
        architectures: Selector<Architecture>,
    ) -> MatrixRequest {
        MatrixRequest {
            configurations,
            platforms,
            architectures,
            ..MatrixRequest::default()
        }
    }

    fn ids(dims: &[BuildDimensions]) -> Vec<String> {
        dims.iter()
            .map(|d| PresetId::from_dimensions(d).to_string())
            .collect()
    }

    #[test]
    fn test_parse_selectors() {
        assert_eq!(
            Selector::<Configuration>::parse_list(&["both"]).unwrap(),
            Selector::All
        );
        assert_eq!(
            Selector::<Architecture>::parse_list(&["x64", "arm64"]).unwrap(),
            Selector::Only(vec![Architecture::X64, Architecture::Arm64])
        );
        assert!(Selector::<Platform>::parse_list(&["mars"]).is_err());
    }

    #[test]
    fn test_both_configurations_expand_to_two_jobs() {
        let req = request(
            Selector::All,
            Selector::one(Platform::Host),
            Selector::one(Architecture::X64),
        );
        assert_eq!(ids(&req.expand().unwrap()), ["x64-Debug", "x64-Release"]);
    }

    #[test]
    fn test_expansion_order_is_platform_then_config_then_arch() {
        let req = request(
            Selector::All,
            Selector::All,
            Selector::Only(vec![Architecture::Arm64, Architecture::X64, Architecture::X64]),
        );
        assert_eq!(
            ids(&req.expand().unwrap()),
            [
                "x64-Debug",
                "arm64-Debug",
                "x64-Release",
                "arm64-Release",
                "x64-Debug-Cross",
                "arm64-Debug-Cross",
                "x64-Release-Cross",
                "arm64-Release-Cross",
            ]
        );
    }

    #[test]
    fn test_all_architectures_skip_unsupported() {
        let mut req = request(
            Selector::one(Configuration::Release),
            Selector::one(Platform::Host),
            Selector::All,
        );
        req.compiler = Compiler::Gcc;
        let expanded = ids(&req.expand().unwrap());
        assert!(!expanded.iter().any(|id| id.starts_with("arm64ec")));
        assert!(expanded.contains(&"x64-Release-GCC".to_string()));
    }

    #[test]
    fn test_explicit_invalid_combination_fails() {
        let mut req = request(
            Selector::one(Configuration::Release),
            Selector::one(Platform::Host),
            Selector::one(Architecture::Arm64ec),
        );
        req.compiler = Compiler::Clang;
        let err = req.expand().unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_plan_rejects_undeclared_preset() {
        let catalog =
            PresetCatalog::from_json("/proj/CMakePresets.json", r#"{"configurePresets":[{"name":"x64-Debug"}]}"#)
                .unwrap();
        let req = request(
            Selector::All,
            Selector::one(Platform::Host),
            Selector::one(Architecture::X64),
        );
        let shell = quiet_shell();

        let err = plan_jobs(&catalog, &req, StageSet::default(), &full_toolchain(), &shell).unwrap_err();
        assert!(matches!(err, LatticeError::UnknownPreset { ref preset, .. } if preset == "x64-Release"));
    }

    #[test]
    fn test_plan_keeps_jobs_with_missing_tools() {
        let catalog = preset_catalog("/proj");
        let mut req = request(
            Selector::one(Configuration::Debug),
            Selector::one(Platform::Host),
            Selector::one(Architecture::X64),
        );
        req.compiler = Compiler::Clang;
        let mut status = full_toolchain();
        status.insert(Tool::Compiler(Compiler::Clang), ToolStatus::missing());
        let shell = quiet_shell();

        let jobs = plan_jobs(&catalog, &req, StageSet::default(), &status, &shell).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].preset.as_str(), "x64-Debug-Clang");
    }

    #[test]
    fn test_matrix_continues_after_failure() {
        let catalog = preset_catalog("/proj");
        let layout = OutputLayout::new("/proj/out");
        let runner = MockRunner::new();
        runner.expect_contains("--preset x64-Debug ", MockStageOutput::failure(1));

        let req = request(
            Selector::All,
            Selector::one(Platform::Host),
            Selector::one(Architecture::X64),
        );
        let shell = quiet_shell();
        let jobs = plan_jobs(&catalog, &req, StageSet::default(), &full_toolchain(), &shell).unwrap();

        let pipeline = Pipeline::new(StageCommands::new(&catalog, &layout), &runner, CancelToken::new());
        let results = MatrixDriver::new(&pipeline).run(&jobs, &full_toolchain(), &|_| {});

        let report = MatrixReport {
            results,
            ..MatrixReport::default()
        };
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert!(!report.all_succeeded());
        assert_eq!(report.results[0].failed_stage(), Some(Stage::Configure));
        assert!(report.results[1].success);
    }

    #[test]
    fn test_parallel_results_keep_expansion_order() {
        let catalog = preset_catalog("/proj");
        let layout = OutputLayout::new("/proj/out");
        let runner = MockRunner::new();
        let req = request(Selector::All, Selector::All, Selector::All);
        let shell = quiet_shell();
        let jobs = plan_jobs(&catalog, &req, StageSet::default(), &full_toolchain(), &shell).unwrap();

        let pipeline = Pipeline::new(StageCommands::new(&catalog, &layout), &runner, CancelToken::new());
        let finished = std::sync::atomic::AtomicUsize::new(0);
        let results = MatrixDriver::new(&pipeline).jobs(4).run(&jobs, &full_toolchain(), &|_| {
            finished.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        assert_eq!(finished.into_inner(), jobs.len());
        let expected: Vec<_> = jobs.iter().map(|j| j.preset.clone()).collect();
        let actual: Vec<_> = results.iter().map(|r| r.preset.clone()).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_clean_removes_output_root() {
        let tmp = tempfile::TempDir::new().unwrap();
        let layout = OutputLayout::new(tmp.path().join("out"));
        std::fs::create_dir_all(layout.build_root().join("x64-Debug")).unwrap();

        clean_output(&layout, &quiet_shell()).unwrap();
        assert!(!layout.root().exists());
        clean_output(&layout, &quiet_shell()).unwrap();
    }
}
