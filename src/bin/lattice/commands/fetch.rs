//! `lattice fetch-vcpkg` command

use anyhow::Result;

use crate::cli::FetchArgs;
use lattice::ops::{fetch_vcpkg, FetchOptions};
use lattice::util::{GlobalContext, Shell};

pub fn execute(args: FetchArgs, shell: &Shell) -> Result<bool> {
    let ctx = GlobalContext::new()?;
    let options = FetchOptions {
        dir: args.dir,
        ..FetchOptions::default()
    };

    fetch_vcpkg(&ctx, &options, shell)?;
    Ok(true)
}
