//! Build event types for JSON output.
//!
//! This module defines the JSON schema for machine-readable matrix output.
//! These events are emitted on stdout, one object per line, when using
//! `--message-format=json`.
//!
//! # Event Types
//!
//! - `matrix-started`: The matrix was expanded and jobs are about to run
//! - `stage-finished`: One stage of one job ended
//! - `job-finished`: A job reached a terminal state
//! - `matrix-finished`: Every job has a recorded result
//! - `diagnostic`: A warning or error not tied to a stage
//!
//! New fields may be added, but existing fields should not be removed or renamed.

use std::path::PathBuf;

use serde::Serialize;

use crate::core::job::{JobResult, Stage, StageOutcome};
use crate::core::preset::PresetId;

/// A matrix event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "reason")]
pub enum BuildEvent {
    #[serde(rename = "matrix-started")]
    MatrixStarted {
        /// Presets in execution order
        presets: Vec<PresetId>,
        /// Matrix workers
        jobs: usize,
    },

    #[serde(rename = "stage-finished")]
    StageFinished {
        preset: PresetId,
        stage: Stage,
        #[serde(flatten)]
        outcome: StageOutcome,
        duration_ms: u64,
    },

    #[serde(rename = "job-finished")]
    JobFinished {
        preset: PresetId,
        success: bool,
        test_failed: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        failed_stage: Option<Stage>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        libraries: Vec<PathBuf>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        executables: Vec<PathBuf>,
        duration_ms: u64,
    },

    #[serde(rename = "matrix-finished")]
    MatrixFinished {
        success: bool,
        succeeded: usize,
        failed: usize,
        cancelled: bool,
        duration_ms: u64,
    },

    /// A generic diagnostic message.
    #[serde(rename = "diagnostic")]
    Diagnostic {
        /// Severity level ("error", "warning", "note")
        level: String,
        /// Message text
        message: String,
    },
}

impl BuildEvent {
    /// Create a job finished event from its recorded result.
    pub fn job_finished(result: &JobResult) -> Self {
        let (libraries, executables) = result
            .artifacts
            .as_ref()
            .map(|a| (a.libraries.clone(), a.executables.clone()))
            .unwrap_or_default();

        BuildEvent::JobFinished {
            preset: result.preset.clone(),
            success: result.success,
            test_failed: result.test_failed,
            failed_stage: result.failed_stage(),
            error: result.error.clone(),
            libraries,
            executables,
            duration_ms: result.duration.as_millis() as u64,
        }
    }

    /// Create a diagnostic event.
    pub fn diagnostic(level: impl Into<String>, message: impl Into<String>) -> Self {
        BuildEvent::Diagnostic {
            level: level.into(),
            message: message.into(),
        }
    }

    /// Serialize this event to a JSON value.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Serialize this event to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dimensions::{BuildDimensions, Configuration};
    use crate::core::job::{ArtifactSet, BuildJob, StageSet};

    fn preset() -> PresetId {
        PresetId::from_dimensions(&BuildDimensions::defaults(Configuration::Release))
    }

    #[test]
    fn test_stage_finished_serialization() {
        let event = BuildEvent::StageFinished {
            preset: preset(),
            stage: Stage::Build,
            outcome: StageOutcome::failure("exit code 2"),
            duration_ms: 1200,
        };
        let json = event.to_json();
        assert!(json.contains("\"reason\":\"stage-finished\""));
        assert!(json.contains("\"preset\":\"x64-Release\""));
        assert!(json.contains("\"stage\":\"build\""));
        assert!(json.contains("\"outcome\":\"failure\""));
        assert!(json.contains("\"message\":\"exit code 2\""));
    }

    #[test]
    fn test_job_finished_lists_artifacts() {
        let dims = BuildDimensions::defaults(Configuration::Release);
        let job = BuildJob::new(preset(), dims, StageSet::default());
        let mut result = JobResult::new(&job);
        result.success = true;
        result.artifacts = Some(ArtifactSet {
            root: PathBuf::from("out/build/x64-Release"),
            libraries: vec![PathBuf::from("out/build/x64-Release/libcore.a")],
            executables: Vec::new(),
        });

        let json = BuildEvent::job_finished(&result).to_json();
        assert!(json.contains("\"reason\":\"job-finished\""));
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("libcore.a"));
        assert!(!json.contains("executables"));
        assert!(!json.contains("failed_stage"));
    }

    #[test]
    fn test_matrix_finished_serialization() {
        let event = BuildEvent::MatrixFinished {
            success: false,
            succeeded: 1,
            failed: 1,
            cancelled: false,
            duration_ms: 2340,
        };
        let json = event.to_json();
        assert!(json.contains("\"reason\":\"matrix-finished\""));
        assert!(json.contains("\"failed\":1"));
    }
}
