//! `bundlex build` command

use anyhow::Result;

use super::Session;
use crate::cli::BuildArgs;
use bundlex::builder::toolchain::GccToolchain;
use bundlex::ops::build::build;
use bundlex::ops::plan::PlanOptions;
use bundlex::util::fs::relative_path;

pub fn execute(args: BuildArgs) -> Result<()> {
    let session = Session::for_selection(&args.selection)?;
    let toolchain = GccToolchain::detect(&session.config.toolchain)?;

    let opts = PlanOptions {
        app: session.app(args.selection.app.as_ref()).to_string(),
        units: args.selection.units.clone(),
    };

    let artifacts = build(&session.build, &toolchain, &opts)?;
    for artifact in &artifacts {
        let shown = relative_path(&session.root, &artifact.path);
        eprintln!("    Finished {} -> {}", artifact.key, shown.display());
    }

    Ok(())
}
