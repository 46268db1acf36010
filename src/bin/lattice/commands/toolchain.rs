//! `lattice toolchain` command

use std::sync::Arc;

use anyhow::Result;

use crate::cli::ToolchainArgs;
use lattice::ops::{format_toolchain_report, host_toolchain, EnvironmentFile, Provenance, ToolchainReport};
use lattice::util::fs::relative_path;
use lattice::util::shell::Status;
use lattice::util::{GlobalContext, Shell};

pub fn execute(args: ToolchainArgs, shell: &Arc<Shell>) -> Result<bool> {
    let ctx = GlobalContext::new()?;
    let env_file = EnvironmentFile::new(ctx.env_file_path());

    let span = shell.span(Status::Detecting, "host toolchain");
    let (status, provenance) = host_toolchain(&ctx, args.redetect, args.save);
    span.finish_with_message(match provenance {
        Provenance::Loaded => "loaded saved toolchain",
        Provenance::Detected => "detected toolchain",
    });

    let report = ToolchainReport::new(&status);

    if shell.is_json() {
        shell.json_event(&serde_json::json!({
            "reason": "toolchain",
            "tools": status.tools().map(|(tool, s)| serde_json::json!({
                "tool": tool.key(),
                "found": s.found,
                "version": s.version,
                "path": s.path,
            })).collect::<Vec<_>>(),
            "ready": report.all_required_found(),
        }));
        return Ok(report.all_required_found());
    }

    let env_path = relative_path(ctx.project_root(), env_file.path());
    let source = match (provenance, args.save) {
        (Provenance::Loaded, _) => format!("saved in {}", env_path.display()),
        (Provenance::Detected, true) => format!("detected, saved to {}", env_path.display()),
        (Provenance::Detected, false) => "detected, not saved (pass --save to keep it)".to_string(),
    };
    shell.status(Status::Info, format!("toolchain {}", source));
    eprint!("{}", format_toolchain_report(&report, shell.is_verbose()));

    for missing in report.missing_required() {
        shell.error(format!("{} not found", missing.tool));
        shell.note(missing.tool.guidance());
    }

    Ok(report.all_required_found())
}
