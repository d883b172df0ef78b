//! `bundlex clean` command

use anyhow::Result;

use super::Session;
use crate::cli::CleanArgs;
use bundlex::ops::clean::{clean, CleanOptions};

pub fn execute(args: CleanArgs) -> Result<()> {
    let session = Session::open(|_| {})?;

    let removed = clean(
        &session.build,
        &CleanOptions {
            app: args.app,
            precompiled: args.precompiled,
        },
    )?;

    for dir in removed {
        eprintln!("     Removed {}", dir.display());
    }

    Ok(())
}
