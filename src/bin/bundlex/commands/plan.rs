//! `bundlex plan` command

use anyhow::Result;

use super::Session;
use crate::cli::PlanArgs;
use bundlex::ops::plan::{plan, PlanOptions};

pub fn execute(args: PlanArgs) -> Result<()> {
    let session = Session::for_selection(&args.selection)?;
    let opts = PlanOptions {
        app: session.app(args.selection.app.as_ref()).to_string(),
        units: args.selection.units.clone(),
    };

    let plan = plan(&session.build, &opts)?;

    if args.json {
        println!("{}", plan.to_json()?);
        return Ok(());
    }

    println!("# {} ({}, {})", plan.app, plan.target, plan.family);
    for unit in &plan.units {
        println!("{}", unit.key);
        println!("  output: {}", unit.output.display());
        for source in &unit.sources {
            println!("  source: {}", source.display());
        }
        for dep in &unit.depends_on {
            println!("  after:  {}", dep);
        }
    }

    Ok(())
}
