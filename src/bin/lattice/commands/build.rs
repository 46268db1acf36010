//! `lattice build` command

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::cli::{BuildArgs, MatrixArgs};
use lattice::core::{Feature, StageSet};
use lattice::ops::{build, BuildOptions, MatrixRequest, Selector};
use lattice::util::process::CancelToken;
use lattice::util::{GlobalContext, Shell};

pub fn execute(args: BuildArgs, shell: &Arc<Shell>) -> Result<bool> {
    let mut ctx = GlobalContext::new()?;
    ctx.set_verbose(shell.is_verbose());

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        let shell = Arc::clone(shell);
        ctrlc::set_handler(move || {
            if !cancel.is_cancelled() {
                shell.warn("interrupted; stopping the running stage");
            }
            cancel.cancel();
        })
        .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))?;
    }

    let opts = BuildOptions {
        request: matrix_request(&args.matrix)?,
        stages: StageSet {
            install: args.install,
            test: args.test,
        },
        clean: args.clean,
        jobs: args.jobs,
        redetect: args.redetect,
        presets: args.matrix.presets.clone(),
    };

    let report = build(&ctx, &opts, shell, &cancel)?;
    Ok(report.all_succeeded())
}

/// Turn the dimension flags into a matrix request.
pub fn matrix_request(args: &MatrixArgs) -> Result<MatrixRequest> {
    let mut features = BTreeSet::new();
    if args.build_tools {
        features.insert(Feature::BuildTools);
    }

    Ok(MatrixRequest {
        configurations: Selector::parse_list(&[args.config.as_str()]).map_err(|e| anyhow!(e))?,
        platforms: Selector::parse_list(&[args.platform.as_str()]).map_err(|e| anyhow!(e))?,
        architectures: Selector::parse_list(&args.arch).map_err(|e| anyhow!(e))?,
        compiler: args.compiler,
        features,
    })
}
