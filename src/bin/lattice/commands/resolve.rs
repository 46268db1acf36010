//! `lattice resolve` command

use anyhow::{anyhow, Result};

use crate::cli::ResolveArgs;
use lattice::core::{BuildDimensions, Feature, PresetCatalog, PresetResolver};
use lattice::ops::host_toolchain;
use lattice::util::{GlobalContext, Shell};

pub fn execute(args: ResolveArgs, shell: &Shell) -> Result<bool> {
    let ctx = GlobalContext::new()?;

    let features = args.build_tools.then_some(Feature::BuildTools);
    let dims = BuildDimensions::new(
        args.config.parse().map_err(|e: String| anyhow!(e))?,
        args.platform.parse().map_err(|e: String| anyhow!(e))?,
        args.arch.parse().map_err(|e: String| anyhow!(e))?,
        args.compiler,
        features,
    )?;

    let catalog = PresetCatalog::load(&ctx.presets_path(args.presets.as_deref()))?;
    let resolver = PresetResolver::new(&catalog);

    let preset = if args.check_tools {
        let (status, _) = host_toolchain(&ctx, false, true);
        resolver.resolve(&dims, &status)?
    } else {
        resolver.resolve_declared(&dims)?
    };

    if shell.is_json() {
        shell.json_event(&serde_json::json!({
            "reason": "resolved",
            "preset": preset,
            "dimensions": dims,
        }));
    } else {
        println!("{}", preset);
    }

    Ok(true)
}
