//! Per-job stage pipeline.
//!
//! A job runs configure, build, then install and test when requested.
//! Configure, build and install failures end the job; later stages stay
//! `Skipped`. A test failure is recorded and flagged but the job still
//! counts as built.

use std::time::{Duration, Instant};

use anyhow::Result;

use crate::builder::cmake::{discover_artifacts, StageCommands};
use crate::builder::toolchain::{Tool, ToolchainStatus};
use crate::core::errors::LatticeError;
use crate::core::job::{BuildJob, JobResult, JobState, Stage, StageOutcome};
use crate::core::preset::PresetId;
use crate::util::process::{CancelToken, ProcessBuilder, RunOutcome};

/// Runs one stage's external command.
pub trait StageRunner: Send + Sync {
    fn run(&self, stage: Stage, cmd: &ProcessBuilder, cancel: &CancelToken) -> Result<RunOutcome>;
}

/// Runs stages as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner {
    /// Collect output instead of streaming it to the terminal
    capture: bool,
}

impl ProcessRunner {
    pub fn new(capture: bool) -> Self {
        ProcessRunner { capture }
    }
}

impl StageRunner for ProcessRunner {
    fn run(&self, _stage: Stage, cmd: &ProcessBuilder, cancel: &CancelToken) -> Result<RunOutcome> {
        cmd.run_cancellable(cancel, self.capture)
    }
}

/// Hooks for reporting pipeline progress.
pub trait BuildObserver: Send + Sync {
    fn stage_started(&self, _preset: &PresetId, _stage: Stage, _cmd: &ProcessBuilder) {}

    fn stage_finished(
        &self,
        _preset: &PresetId,
        _stage: Stage,
        _outcome: &StageOutcome,
        _elapsed: Duration,
    ) {
    }

    /// Captured output of a failed stage.
    fn stage_output(&self, _preset: &PresetId, _stage: Stage, _lines: &[String]) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl BuildObserver for NoopObserver {}

/// Drives one job through its stages.
pub struct Pipeline<'a> {
    commands: StageCommands<'a>,
    runner: &'a dyn StageRunner,
    observer: &'a dyn BuildObserver,
    cancel: CancelToken,
}

impl<'a> Pipeline<'a> {
    pub fn new(commands: StageCommands<'a>, runner: &'a dyn StageRunner, cancel: CancelToken) -> Self {
        Pipeline {
            commands,
            runner,
            observer: &NoopObserver,
            cancel,
        }
    }

    pub fn observer(mut self, observer: &'a dyn BuildObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Run every requested stage of `job` and record the outcome.
    pub fn run(&self, job: &BuildJob, status: &ToolchainStatus) -> JobResult {
        let start = Instant::now();

        if self.cancel.is_cancelled() {
            return JobResult::cancelled_before_start(job);
        }

        let mut result = JobResult::new(job);

        // Nothing is spawned for a preset the host cannot build.
        if let Err(err) = status.require_for(&job.dimensions, &job.preset) {
            tracing::debug!("skipping {}: {}", job.preset, err);
            self.fail(&mut result, Stage::Configure, &err);
            result.duration = start.elapsed();
            return result;
        }

        for stage in Stage::ALL {
            if !job.stages.contains(stage) {
                continue;
            }

            if stage == Stage::Configure
                && job.dimensions.needs_package_manager()
                && !status.is_found(Tool::Vcpkg)
            {
                let err = LatticeError::PackageManagerRequired {
                    preset: job.preset.to_string(),
                };
                self.fail(&mut result, stage, &err);
                break;
            }

            result.state = JobState::running(stage);
            tracing::debug!("{}: {:?}", job.preset, result.state);

            let outcome = self.run_stage(job, stage, status);
            result.record(stage, outcome.clone());

            match outcome {
                StageOutcome::Success | StageOutcome::Skipped => {}
                StageOutcome::Failure { .. } if stage == Stage::Test => {
                    tracing::debug!("tests failed for preset `{}`", job.preset);
                    result.test_failed = true;
                }
                StageOutcome::Failure { message } => {
                    result.error = Some(message);
                    result.state = JobState::Failed;
                    break;
                }
                StageOutcome::Cancelled => {
                    let err = LatticeError::Cancelled {
                        stage: stage.to_string(),
                        preset: job.preset.to_string(),
                    };
                    result.error = Some(err.to_string());
                    result.state = JobState::Failed;
                    break;
                }
            }
        }

        if result.state != JobState::Failed {
            result.state = JobState::Done;
            result.success = true;

            let root = if result.outcome(Stage::Install).is_success() {
                self.commands.layout().install_dir(&job.preset)
            } else {
                self.commands.layout().build_dir(&job.preset)
            };
            result.artifacts = Some(discover_artifacts(&root));
        }

        result.duration = start.elapsed();
        result
    }

    fn run_stage(&self, job: &BuildJob, stage: Stage, status: &ToolchainStatus) -> StageOutcome {
        let Some(cmd) = self.commands.command(job, stage, status) else {
            return StageOutcome::failure(format!("no command available for {}", stage));
        };

        tracing::debug!("{} `{}`", stage, job.preset);
        tracing::debug!("running `{}`", cmd.display_command());
        self.observer.stage_started(&job.preset, stage, &cmd);

        let started = Instant::now();
        let outcome = match self.runner.run(stage, &cmd, &self.cancel) {
            Ok(run) if run.cancelled => StageOutcome::Cancelled,
            Ok(run) if run.success => StageOutcome::Success,
            Ok(run) => {
                if !run.output_tail.is_empty() {
                    self.observer
                        .stage_output(&job.preset, stage, &run.output_tail);
                }
                let err = LatticeError::StageFailed {
                    stage: stage.to_string(),
                    preset: job.preset.to_string(),
                    code: run.code,
                };
                StageOutcome::failure(err.to_string())
            }
            Err(e) => StageOutcome::failure(format!("{:#}", e)),
        };

        self.observer
            .stage_finished(&job.preset, stage, &outcome, started.elapsed());
        outcome
    }

    /// Record a failure decided before `stage` spawned anything.
    fn fail(&self, result: &mut JobResult, stage: Stage, err: &LatticeError) {
        let outcome = StageOutcome::failure(err.to_string());
        self.observer
            .stage_finished(&result.preset, stage, &outcome, Duration::ZERO);
        result.record(stage, outcome);
        result.error = Some(err.to_string());
        result.state = JobState::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::PresetCatalog;
    use crate::core::dimensions::{
        Architecture, BuildDimensions, Compiler, Configuration, Feature, Platform,
    };
    use crate::core::job::StageSet;
    use crate::core::layout::OutputLayout;
    use crate::test_support::{full_toolchain, preset_catalog, MockRunner, MockStageOutput};

    fn job(dims: BuildDimensions, install: bool, test: bool) -> BuildJob {
        BuildJob::new(
            PresetId::from_dimensions(&dims),
            dims,
            StageSet { install, test },
        )
    }

    fn release() -> BuildDimensions {
        BuildDimensions::defaults(Configuration::Release)
    }

    fn run(runner: &MockRunner, job: &BuildJob, status: &ToolchainStatus) -> JobResult {
        let catalog: PresetCatalog = preset_catalog("/proj");
        let layout = OutputLayout::new("/proj/out");
        let pipeline = Pipeline::new(StageCommands::new(&catalog, &layout), runner, CancelToken::new());
        pipeline.run(job, status)
    }

    #[test]
    fn test_all_stages_succeed() {
        let runner = MockRunner::new();
        let result = run(&runner, &job(release(), true, true), &full_toolchain());

        assert!(result.success);
        assert_eq!(result.state, JobState::Done);
        assert!(Stage::ALL.iter().all(|s| result.outcome(*s).is_success()));
        assert_eq!(
            runner.stages(),
            vec![Stage::Configure, Stage::Build, Stage::Install, Stage::Test]
        );
        assert_eq!(
            result.artifacts.as_ref().map(|a| a.root.clone()),
            Some(std::path::PathBuf::from("/proj/out/install/x64-Release"))
        );
    }

    #[test]
    fn test_build_failure_skips_later_stages() {
        let runner = MockRunner::new();
        runner.expect_contains("--build", MockStageOutput::failure(2));

        let result = run(&runner, &job(release(), true, true), &full_toolchain());

        assert!(!result.success);
        assert_eq!(result.state, JobState::Failed);
        assert_eq!(result.failed_stage(), Some(Stage::Build));
        assert_eq!(result.outcome(Stage::Install), &StageOutcome::Skipped);
        assert_eq!(result.outcome(Stage::Test), &StageOutcome::Skipped);
        assert!(result.error.as_deref().unwrap().contains("exit code 2"));
        assert!(result.artifacts.is_none());
        assert_eq!(runner.stages(), vec![Stage::Configure, Stage::Build]);
    }

    #[test]
    fn test_test_failure_is_not_fatal() {
        let runner = MockRunner::new();
        runner.expect_contains("ctest", MockStageOutput::failure(8));

        let result = run(&runner, &job(release(), false, true), &full_toolchain());

        assert!(result.success);
        assert!(result.test_failed);
        assert!(result.outcome(Stage::Test).is_failure());
        assert_eq!(result.outcome(Stage::Install), &StageOutcome::Skipped);
        assert_eq!(result.failed_stage(), None);
    }

    #[test]
    fn test_install_failure_is_terminal() {
        let runner = MockRunner::new();
        runner.expect_contains("--install", MockStageOutput::failure(1));

        let result = run(&runner, &job(release(), true, true), &full_toolchain());

        assert!(!result.success);
        assert_eq!(result.failed_stage(), Some(Stage::Install));
        assert_eq!(result.outcome(Stage::Test), &StageOutcome::Skipped);
    }

    #[test]
    fn test_missing_cmake_spawns_nothing() {
        let runner = MockRunner::new();
        let mut status = full_toolchain();
        status.insert(Tool::CMake, crate::builder::toolchain::ToolStatus::missing());

        let result = run(&runner, &job(release(), false, false), &status);

        assert!(!result.success);
        assert!(runner.calls().is_empty());
        assert_eq!(result.failed_stage(), Some(Stage::Configure));
        assert!(result.error.as_deref().unwrap().starts_with("CMake is required"));
    }

    #[test]
    fn test_build_tools_without_vcpkg_fail_configure() {
        let runner = MockRunner::new();
        let dims = BuildDimensions::new(
            Configuration::Debug,
            Platform::Cross,
            Architecture::X64,
            Compiler::Default,
            [Feature::BuildTools],
        )
        .unwrap();
        let mut status = full_toolchain();
        status.insert(Tool::Vcpkg, crate::builder::toolchain::ToolStatus::missing());

        let result = run(&runner, &job(dims, false, false), &status);

        assert!(runner.calls().is_empty());
        assert_eq!(result.failed_stage(), Some(Stage::Configure));
        assert!(result.error.as_deref().unwrap().contains("vcpkg was not found"));
    }

    #[test]
    fn test_cancelled_stage() {
        let runner = MockRunner::new();
        runner.expect_contains("--build", MockStageOutput::cancelled());

        let result = run(&runner, &job(release(), true, false), &full_toolchain());

        assert_eq!(result.outcome(Stage::Build), &StageOutcome::Cancelled);
        assert_eq!(result.outcome(Stage::Install), &StageOutcome::Skipped);
        assert_eq!(result.failed_stage(), Some(Stage::Build));
        assert!(result.error.as_deref().unwrap().contains("cancelled"));
    }

    #[test]
    fn test_cancelled_before_start() {
        let runner = MockRunner::new();
        let catalog = preset_catalog("/proj");
        let layout = OutputLayout::new("/proj/out");
        let cancel = CancelToken::new();
        cancel.cancel();
        let pipeline = Pipeline::new(StageCommands::new(&catalog, &layout), &runner, cancel);

        let result = pipeline.run(&job(release(), false, false), &full_toolchain());

        assert!(!result.success);
        assert!(runner.calls().is_empty());
        assert!(Stage::ALL
            .iter()
            .all(|s| result.outcome(*s) == &StageOutcome::Skipped));
    }
}
