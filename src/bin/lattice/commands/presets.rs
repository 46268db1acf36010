//! `lattice presets` command

use std::collections::HashSet;

use anyhow::Result;

use crate::cli::PresetsArgs;
use lattice::core::{BuildDimensions, PresetCatalog, PresetId};
use lattice::util::{GlobalContext, Shell};

pub fn execute(args: PresetsArgs, shell: &Shell) -> Result<bool> {
    let ctx = GlobalContext::new()?;
    let catalog = PresetCatalog::load(&ctx.presets_path(args.presets.as_deref()))?;

    let resolvable: HashSet<String> = BuildDimensions::enumerate()
        .iter()
        .map(|dims| PresetId::from_dimensions(dims).as_str().to_string())
        .collect();

    if shell.is_json() {
        for preset in catalog.visible() {
            shell.json_event(&serde_json::json!({
                "reason": "preset",
                "name": preset.name,
                "display_name": preset.display_name,
                "generator": catalog.effective_generator(&preset.name),
                "resolvable": resolvable.contains(&preset.name),
            }));
        }
        return Ok(true);
    }

    for preset in catalog.visible() {
        let mark = if resolvable.contains(&preset.name) {
            "*"
        } else {
            " "
        };
        match &preset.display_name {
            Some(display) => println!("{} {:<28} {}", mark, preset.name, display),
            None => println!("{} {}", mark, preset.name),
        }
    }
    shell.note("* = produced by `lattice build` dimension flags");

    Ok(true)
}
