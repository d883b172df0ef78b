//! `bundlex flags` command

use anyhow::{bail, Result};

use super::Session;
use crate::cli::FlagsArgs;
use bundlex::core::project::Interface;
use bundlex::ops::plan::unit_flags;

pub fn execute(args: FlagsArgs) -> Result<()> {
    let session = Session::open(|_| {})?;
    let app = session.app(args.app.as_ref());
    let interface: Option<Interface> = args
        .interface
        .as_deref()
        .map(|s| s.parse::<Interface>().map_err(anyhow::Error::msg))
        .transpose()?;

    let project = session.build.store.get(app)?;
    let candidates: Vec<_> = project
        .units()
        .filter(|u| u.name == args.unit)
        .filter(|u| interface.is_none() || u.interface == interface)
        .collect();

    let unit = match candidates.as_slice() {
        [unit] => *unit,
        [] => bail!("unit `{}` not found in `{}`", args.unit, project.app),
        many => {
            let variants: Vec<String> =
                many.iter().map(|u| u.key(&project.app).to_string()).collect();
            bail!(
                "unit `{}` has several variants, pick one with --interface\n\
                 available: {}",
                args.unit,
                variants.join(", ")
            );
        }
    };

    let flags = unit_flags(&session.build, &project, unit)?;
    let key = unit.key(&project.app);

    if !args.link {
        println!("# Compile flags for {}:", key);
        for dir in &flags.includes {
            println!("  -I{}", dir.display());
        }
        for flag in &flags.compiler_flags {
            println!("  {}", flag);
        }
    }

    if !args.compile {
        if !args.link {
            println!();
        }
        println!("# Link flags for {}:", key);
        for dir in &flags.lib_dirs {
            println!("  -L{}", dir.display());
        }
        for lib in &flags.libs {
            println!("  -l{}", lib);
        }
        for flag in &flags.linker_flags {
            println!("  {}", flag);
        }
    }

    Ok(())
}
