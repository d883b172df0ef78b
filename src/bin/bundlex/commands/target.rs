//! `bundlex target` command

use anyhow::Result;

use crate::cli::TargetArgs;
use bundlex::builder::context::resolve_target;
use bundlex::util::GlobalContext;

pub fn execute(args: TargetArgs) -> Result<()> {
    let gctx = GlobalContext::new()?;
    let config = match gctx.find_project_root() {
        Ok(root) => gctx.load_config(&root),
        Err(_) => gctx.load_config(gctx.cwd()),
    };

    let target = resolve_target(&config)?;
    let family = target.family()?;

    if args.json {
        let value = serde_json::json!({
            "target": target.to_string(),
            "architecture": target.architecture,
            "vendor": target.vendor,
            "os": target.os,
            "abi": target.abi,
            "family": family,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("target: {}", target);
        println!("family: {}", family);
    }

    Ok(())
}
