//! Implementation of `bundlex clean`.

use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::builder::context::BuildContext;
use crate::util::fs::{is_plain_name, remove_dir_all_if_exists};

/// Options for the clean command.
#[derive(Debug, Clone, Default)]
pub struct CleanOptions {
    /// Only remove outputs of this application
    pub app: Option<String>,

    /// Also remove cached precompiled archives
    pub precompiled: bool,
}

/// Remove build outputs. Returns the removed directories.
pub fn clean(ctx: &BuildContext, opts: &CleanOptions) -> Result<Vec<PathBuf>> {
    if let Some(app) = &opts.app {
        if !is_plain_name(app) {
            bail!("invalid application name `{}`", app);
        }
    }

    let mut targets = Vec::new();

    let out_dir = ctx.layout.out_dir();
    targets.push(match &opts.app {
        Some(app) => out_dir.join(app),
        None => out_dir.to_path_buf(),
    });

    if opts.precompiled {
        let cache = ctx.acquirer.cache_root();
        targets.push(match &opts.app {
            Some(app) => cache.join(app),
            None => cache.to_path_buf(),
        });
    }

    let mut removed = Vec::new();
    for dir in targets {
        if dir.exists() {
            tracing::info!("Removing {}", dir.display());
            remove_dir_all_if_exists(&dir)?;
            removed.push(dir);
        }
    }
    Ok(removed)
}
