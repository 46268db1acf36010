//! `lattice clean` command

use anyhow::Result;

use crate::cli::CleanArgs;
use lattice::ops::clean_output;
use lattice::util::{GlobalContext, Shell};

pub fn execute(_args: CleanArgs, shell: &Shell) -> Result<bool> {
    let ctx = GlobalContext::new()?;
    let layout = ctx.output_layout();

    if !layout.root().exists() {
        shell.note(format!("nothing to clean at {}", layout.root().display()));
        return Ok(true);
    }

    clean_output(&layout, shell)?;
    Ok(true)
}
