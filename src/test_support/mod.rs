//! Test utilities and mocks for Lattice unit tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use lattice::test_support::{MockRunner, MockStageOutput};
//!
//! let runner = MockRunner::new();
//! runner.expect_contains("--build", MockStageOutput::failure(2));
//! // hand `&runner` to a Pipeline ...
//! assert_eq!(runner.stages(), vec![Stage::Configure, Stage::Build]);
//! ```

pub mod fixtures;

use std::sync::Mutex;

use anyhow::{bail, Result};

use crate::builder::pipeline::StageRunner;
use crate::core::job::Stage;
use crate::util::process::{CancelToken, ProcessBuilder, RunOutcome};

pub use fixtures::*;

/// Scripted result of one stage.
#[derive(Debug, Clone, Default)]
pub struct MockStageOutput {
    pub code: i32,
    pub cancelled: bool,
    pub output: Vec<String>,
    /// Fail to spawn instead of returning an exit status
    pub spawn_error: Option<String>,
}

impl MockStageOutput {
    pub fn success() -> Self {
        MockStageOutput::default()
    }

    pub fn failure(code: i32) -> Self {
        MockStageOutput {
            code,
            ..MockStageOutput::default()
        }
    }

    pub fn cancelled() -> Self {
        MockStageOutput {
            code: -1,
            cancelled: true,
            ..MockStageOutput::default()
        }
    }

    pub fn spawn_error(message: impl Into<String>) -> Self {
        MockStageOutput {
            spawn_error: Some(message.into()),
            ..MockStageOutput::default()
        }
    }

    /// Attach captured output lines.
    pub fn with_output(mut self, lines: &[&str]) -> Self {
        self.output = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    fn to_outcome(&self) -> Result<RunOutcome> {
        if let Some(message) = &self.spawn_error {
            bail!("{}", message);
        }
        Ok(RunOutcome {
            code: Some(self.code),
            success: self.code == 0 && !self.cancelled,
            cancelled: self.cancelled,
            output_tail: self.output.clone(),
        })
    }
}

/// Pattern for matching commands in [`MockRunner`].
#[derive(Debug, Clone)]
pub enum CommandPattern {
    /// Match if the command contains a substring.
    Contains(String),
    /// Match using a regex pattern.
    Regex(String),
    /// Match one stage regardless of the command.
    Stage(Stage),
}

impl CommandPattern {
    pub fn matches(&self, stage: Stage, cmd: &str) -> bool {
        match self {
            CommandPattern::Contains(s) => cmd.contains(s.as_str()),
            CommandPattern::Regex(pattern) => regex::Regex::new(pattern)
                .map(|re| re.is_match(cmd))
                .unwrap_or(false),
            CommandPattern::Stage(s) => *s == stage,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    expectations: Vec<(CommandPattern, MockStageOutput)>,
    calls: Vec<(Stage, String)>,
}

/// Stage runner that records commands and returns scripted results.
///
/// Unmatched commands succeed. Expectations are checked in the order they
/// were added.
#[derive(Debug, Default)]
pub struct MockRunner {
    state: Mutex<MockState>,
}

impl MockRunner {
    pub fn new() -> Self {
        MockRunner::default()
    }

    /// Script the result for commands containing `substring`.
    pub fn expect_contains(&self, substring: &str, output: MockStageOutput) -> &Self {
        self.expect(CommandPattern::Contains(substring.to_string()), output)
    }

    pub fn expect(&self, pattern: CommandPattern, output: MockStageOutput) -> &Self {
        if let Ok(mut state) = self.state.lock() {
            state.expectations.push((pattern, output));
        }
        self
    }

    /// Every command run so far, as displayed.
    pub fn calls(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.calls.iter().map(|(_, c)| c.clone()).collect())
            .unwrap_or_default()
    }

    /// Stages run so far, in order.
    pub fn stages(&self) -> Vec<Stage> {
        self.state
            .lock()
            .map(|s| s.calls.iter().map(|(stage, _)| *stage).collect())
            .unwrap_or_default()
    }
}

impl StageRunner for MockRunner {
    fn run(&self, stage: Stage, cmd: &ProcessBuilder, _cancel: &CancelToken) -> Result<RunOutcome> {
        let line = cmd.display_command();
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => bail!("mock runner poisoned"),
        };
        state.calls.push((stage, line.clone()));

        match state
            .expectations
            .iter()
            .find(|(pattern, _)| pattern.matches(stage, &line))
        {
            Some((_, output)) => output.to_outcome(),
            None => MockStageOutput::success().to_outcome(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_runner_records_calls() {
        let runner = MockRunner::new();
        runner.expect(CommandPattern::Stage(Stage::Test), MockStageOutput::failure(8));

        let cancel = CancelToken::new();
        let build = ProcessBuilder::new("cmake").args(["--build", "out/build/x64-Debug"]);
        let test = ProcessBuilder::new("ctest").args(["--test-dir", "out/build/x64-Debug"]);

        assert!(runner.run(Stage::Build, &build, &cancel).unwrap().success);
        let outcome = runner.run(Stage::Test, &test, &cancel).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.code, Some(8));

        assert_eq!(runner.stages(), vec![Stage::Build, Stage::Test]);
        assert_eq!(runner.calls()[0], "cmake --build out/build/x64-Debug");
    }

    #[test]
    fn test_regex_pattern() {
        let pattern = CommandPattern::Regex(r"--preset x64-(Debug|Release)$".to_string());
        assert!(pattern.matches(Stage::Configure, "cmake --preset x64-Debug"));
        assert!(!pattern.matches(Stage::Configure, "cmake --preset x64-Debug-Clang"));
    }

    #[test]
    fn test_spawn_error() {
        let runner = MockRunner::new();
        runner.expect_contains("cmake", MockStageOutput::spawn_error("No such file"));
        let cmd = ProcessBuilder::new("cmake");
        assert!(runner.run(Stage::Configure, &cmd, &CancelToken::new()).is_err());
    }
}
