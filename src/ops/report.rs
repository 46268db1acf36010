//! Human-readable matrix and toolchain reports.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use crate::builder::toolchain::{Tool, ToolchainStatus};
use crate::core::job::{JobResult, Stage};
use crate::ops::lattice_build::MatrixReport;
use crate::util::fs::relative_path;
use crate::util::shell::{format_duration, Shell, Status};

/// Overall verdict for one row of the outcome table.
fn verdict(result: &JobResult) -> String {
    match (result.success, result.failed_stage()) {
        (true, _) if result.test_failed => "ok (tests failed)".to_string(),
        (true, _) => "ok".to_string(),
        (false, Some(stage)) => format!("FAILED ({})", stage),
        (false, None) => "cancelled".to_string(),
    }
}

/// Per-job outcome table, one row per preset in run order.
pub fn format_outcome_table(report: &MatrixReport) -> String {
    let width = report
        .results
        .iter()
        .map(|r| r.preset.as_str().len())
        .max()
        .unwrap_or(0)
        .max("Preset".len());

    let mut out = String::new();
    let _ = write!(out, "{:<width$}", "Preset", width = width);
    for stage in Stage::ALL {
        let _ = write!(out, "  {:<10}", stage);
    }
    let _ = writeln!(out, "  result");

    for result in &report.results {
        let _ = write!(out, "{:<width$}", result.preset.as_str(), width = width);
        for stage in Stage::ALL {
            let _ = write!(out, "  {:<10}", result.outcome(stage).label());
        }
        let _ = writeln!(out, "  {}", verdict(result));
    }

    out
}

/// Artifact listing for successful jobs, paths relative to `root`.
pub fn format_artifacts(report: &MatrixReport, root: &Path) -> String {
    let mut out = String::new();

    for result in report.results.iter().filter(|r| r.success) {
        let Some(artifacts) = &result.artifacts else {
            continue;
        };
        let _ = writeln!(
            out,
            "{} -> {}",
            result.preset,
            relative_path(root, &artifacts.root).display()
        );
        if artifacts.is_empty() {
            let _ = writeln!(out, "  (no libraries or executables found)");
        }
        for lib in &artifacts.libraries {
            let _ = writeln!(out, "  lib  {}", relative_path(&artifacts.root, lib).display());
        }
        for exe in &artifacts.executables {
            let _ = writeln!(out, "  exe  {}", relative_path(&artifacts.root, exe).display());
        }
    }

    out
}

/// Print the end-of-run report to stderr.
pub fn print_matrix_report(shell: &Shell, report: &MatrixReport, root: &Path) {
    eprintln!();
    eprint!("{}", format_outcome_table(report));

    let artifacts = format_artifacts(report, root);
    if !artifacts.is_empty() && !shell.is_quiet() {
        eprintln!();
        eprint!("{}", artifacts);
    }
    eprintln!();

    for result in report.test_failures() {
        shell.warn(format!("tests failed for preset `{}`", result.preset));
    }

    let summary = format!(
        "{} succeeded, {} failed in {}",
        report.succeeded(),
        report.failed(),
        format_duration(report.duration)
    );
    if report.cancelled {
        shell.status(Status::Warning, format!("cancelled; {}", summary));
    } else if report.all_succeeded() {
        shell.status(Status::Finished, summary);
    } else {
        shell.error(summary);
    }
}

/// Result of checking one tool.
#[derive(Debug, Clone)]
pub struct ToolCheck {
    pub tool: Tool,
    pub found: bool,
    pub path: Option<PathBuf>,
    pub version: Option<String>,
    /// Whether presets cannot run without it
    pub required: bool,
}

/// Every detected tool, in a fixed order.
#[derive(Debug, Clone)]
pub struct ToolchainReport {
    pub checks: Vec<ToolCheck>,
    pub env_vars: usize,
}

impl ToolchainReport {
    pub fn new(status: &ToolchainStatus) -> Self {
        let checks = Tool::ALL
            .into_iter()
            .map(|tool| {
                let tool_status = status.get(tool).cloned().unwrap_or_default();
                ToolCheck {
                    tool,
                    found: tool_status.found,
                    path: tool_status.path,
                    version: tool_status.version,
                    // Only the default compiler is needed by every preset.
                    required: matches!(
                        tool,
                        Tool::CMake
                            | Tool::Ninja
                            | Tool::Compiler(crate::core::dimensions::Compiler::Default)
                    ),
                }
            })
            .collect();

        ToolchainReport {
            checks,
            env_vars: status.env().len(),
        }
    }

    pub fn all_required_found(&self) -> bool {
        self.checks.iter().all(|c| c.found || !c.required)
    }

    pub fn missing_required(&self) -> impl Iterator<Item = &ToolCheck> {
        self.checks.iter().filter(|c| c.required && !c.found)
    }
}

/// Format the toolchain report for display.
pub fn format_toolchain_report(report: &ToolchainReport, verbose: bool) -> String {
    let mut out = String::new();

    for check in &report.checks {
        let mark = if check.found { "[OK]" } else { "[!!]" };
        let optional = if check.required { "" } else { " (optional)" };
        let version = check.version.as_deref().unwrap_or("unknown version");

        match (&check.path, check.found) {
            (Some(path), true) => {
                let _ = writeln!(out, "  {} {:<15} {}{}", mark, check.tool.name(), version, optional);
                if verbose {
                    let _ = writeln!(out, "       {}", path.display());
                }
            }
            // Located but unusable, e.g. CMake that is too old.
            (Some(path), false) => {
                let _ = writeln!(
                    out,
                    "  {} {:<15} {} at {} is not supported{}",
                    mark,
                    check.tool.name(),
                    version,
                    path.display(),
                    optional
                );
            }
            (None, _) => {
                let _ = writeln!(out, "  {} {:<15} not found{}", mark, check.tool.name(), optional);
            }
        }
    }

    if verbose && report.env_vars > 0 {
        let _ = writeln!(out, "\n  {} captured developer environment variable(s)", report.env_vars);
    }

    out
}
