//! Command implementations

pub mod build;
pub mod clean;
pub mod completions;
pub mod flags;
pub mod plan;
pub mod target;

use std::path::PathBuf;

use anyhow::Result;

use bundlex::builder::BuildContext;
use bundlex::util::config::Config;
use bundlex::util::context::root_app_name;
use bundlex::util::GlobalContext;

use crate::cli::UnitSelection;

/// The project in the current directory, with its configuration.
pub struct Session {
    pub root: PathBuf,
    /// Application rooted at `root`
    pub app: String,
    pub config: Config,
    pub build: BuildContext,
}

impl Session {
    pub fn open(adjust: impl FnOnce(&mut Config)) -> Result<Self> {
        let gctx = GlobalContext::new()?;
        let root = gctx.find_project_root()?;
        let app = root_app_name(&root)?;

        let mut config = gctx.load_config(&root);
        adjust(&mut config);
        let build = BuildContext::from_config(&gctx, &root, &config)?;

        Ok(Session {
            root,
            app,
            config,
            build,
        })
    }

    /// Open with the overrides of a unit selection applied.
    pub fn for_selection(selection: &UnitSelection) -> Result<Self> {
        Session::open(|config| {
            if selection.jobs.is_some() {
                config.build.jobs = selection.jobs;
            }
            if selection.offline {
                config.net.offline = true;
            }
        })
    }

    /// Selected application, or the root one.
    pub fn app<'a>(&'a self, selected: Option<&'a String>) -> &'a str {
        selected.map(String::as_str).unwrap_or(&self.app)
    }
}
