//! Build jobs and their results.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::core::dimensions::BuildDimensions;
use crate::core::preset::PresetId;

/// A phase of the per-job pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Configure,
    Build,
    Install,
    Test,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Configure, Stage::Build, Stage::Install, Stage::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Configure => "configure",
            Stage::Build => "build",
            Stage::Install => "install",
            Stage::Test => "test",
        }
    }

    /// Whether a failure in this stage fails the job.
    pub fn is_mandatory(&self) -> bool {
        !matches!(self, Stage::Test)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which optional stages were requested. Configure and build always run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageSet {
    pub install: bool,
    pub test: bool,
}

impl StageSet {
    pub fn contains(&self, stage: Stage) -> bool {
        match stage {
            Stage::Configure | Stage::Build => true,
            Stage::Install => self.install,
            Stage::Test => self.test,
        }
    }
}

/// One unit of work for the pipeline.
#[derive(Debug, Clone)]
pub struct BuildJob {
    pub preset: PresetId,
    pub dimensions: BuildDimensions,
    pub stages: StageSet,
}

impl BuildJob {
    pub fn new(preset: PresetId, dimensions: BuildDimensions, stages: StageSet) -> Self {
        BuildJob {
            preset,
            dimensions,
            stages,
        }
    }
}

/// Outcome of a single stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum StageOutcome {
    Success,
    Failure { message: String },
    Skipped,
    Cancelled,
}

impl StageOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        StageOutcome::Failure {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Success)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StageOutcome::Failure { .. } | StageOutcome::Cancelled)
    }

    pub fn label(&self) -> &'static str {
        match self {
            StageOutcome::Success => "ok",
            StageOutcome::Failure { .. } => "FAILED",
            StageOutcome::Skipped => "skipped",
            StageOutcome::Cancelled => "cancelled",
        }
    }
}

/// Where a job is in its lifecycle.
///
/// ```text
/// Pending -> Configuring -> Building -> Installing -> Testing -> Done
///                 |             |           |
///                 +-------------+-----------+--> Failed
/// ```
/// Installing and Testing are passed through only when requested. A test
/// failure does not lead to Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Configuring,
    Building,
    Installing,
    Testing,
    Failed,
    Done,
}

impl JobState {
    /// State entered while running `stage`.
    pub fn running(stage: Stage) -> JobState {
        match stage {
            Stage::Configure => JobState::Configuring,
            Stage::Build => JobState::Building,
            Stage::Install => JobState::Installing,
            Stage::Test => JobState::Testing,
        }
    }
}

/// Library and executable outputs of a successful job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArtifactSet {
    /// Directory the artifacts were collected from
    pub root: PathBuf,
    pub libraries: Vec<PathBuf>,
    pub executables: Vec<PathBuf>,
}

impl ArtifactSet {
    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty() && self.executables.is_empty()
    }
}

/// The recorded result of one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub preset: PresetId,
    pub dimensions: BuildDimensions,
    /// Outcomes for all four stages in pipeline order
    pub stages: Vec<(Stage, StageOutcome)>,
    pub state: JobState,
    /// Every mandatory stage succeeded
    pub success: bool,
    /// The test stage ran and failed; does not affect `success`
    pub test_failed: bool,
    /// Error that stopped the job, if any
    pub error: Option<String>,
    pub artifacts: Option<ArtifactSet>,
    #[serde(skip)]
    pub duration: Duration,
}

impl JobResult {
    /// A result with every stage pending as `Skipped`.
    pub fn new(job: &BuildJob) -> Self {
        JobResult {
            preset: job.preset.clone(),
            dimensions: job.dimensions.clone(),
            stages: Stage::ALL
                .into_iter()
                .map(|s| (s, StageOutcome::Skipped))
                .collect(),
            state: JobState::Pending,
            success: false,
            test_failed: false,
            error: None,
            artifacts: None,
            duration: Duration::ZERO,
        }
    }

    /// A job that never started because the run was cancelled.
    pub fn cancelled_before_start(job: &BuildJob) -> Self {
        let mut result = JobResult::new(job);
        result.state = JobState::Failed;
        result.error = Some("cancelled before start".to_string());
        result
    }

    pub fn outcome(&self, stage: Stage) -> &StageOutcome {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, o)| o)
            .unwrap_or(&StageOutcome::Skipped)
    }

    pub fn record(&mut self, stage: Stage, outcome: StageOutcome) {
        if let Some(slot) = self.stages.iter_mut().find(|(s, _)| *s == stage) {
            slot.1 = outcome;
        }
    }

    /// The first mandatory stage that failed or was cancelled.
    pub fn failed_stage(&self) -> Option<Stage> {
        self.stages
            .iter()
            .find(|(s, o)| s.is_mandatory() && o.is_failure())
            .map(|(s, _)| *s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dimensions::Configuration;

    fn job() -> BuildJob {
        let dims = BuildDimensions::defaults(Configuration::Debug);
        BuildJob::new(PresetId::from_dimensions(&dims), dims, StageSet::default())
    }

    #[test]
    fn test_new_result_lists_all_stages_skipped() {
        let result = JobResult::new(&job());
        assert_eq!(result.stages.len(), 4);
        assert!(result.stages.iter().all(|(_, o)| *o == StageOutcome::Skipped));
        assert_eq!(result.state, JobState::Pending);
        assert!(!result.success);
    }

    #[test]
    fn test_failed_stage_ignores_test() {
        let mut result = JobResult::new(&job());
        result.record(Stage::Configure, StageOutcome::Success);
        result.record(Stage::Build, StageOutcome::Success);
        result.record(Stage::Test, StageOutcome::failure("1 test failed"));
        assert_eq!(result.failed_stage(), None);

        result.record(Stage::Build, StageOutcome::Cancelled);
        assert_eq!(result.failed_stage(), Some(Stage::Build));
    }

    #[test]
    fn test_stage_set() {
        let stages = StageSet {
            install: false,
            test: true,
        };
        assert!(stages.contains(Stage::Configure));
        assert!(stages.contains(Stage::Build));
        assert!(!stages.contains(Stage::Install));
        assert!(stages.contains(Stage::Test));
    }
}
