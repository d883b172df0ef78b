//! Global context for bundlex operations.
//!
//! Provides centralized access to configuration, paths, and environment.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;

use crate::core::project::PROJECT_FILE;
use crate::util::config::{global_config_dir, load_config, project_config_path, Config};

/// Project directories for bundlex
static PROJECT_DIRS: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("org", "bundlex", "bundlex"));

/// Default output directory, relative to the project root.
pub const DEFAULT_OUTPUT_DIR: &str = "_build/bundlex";

/// Global context containing configuration and paths.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Home directory for global bundlex data (~/.bundlex/)
    home: PathBuf,

    /// Whether to use verbose output
    verbose: bool,

    /// Whether to use colors in output
    color: bool,
}

impl GlobalContext {
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        let home = global_config_dir().unwrap_or_else(|| PathBuf::from(".bundlex"));

        Ok(GlobalContext {
            cwd,
            home,
            verbose: false,
            color: true,
        })
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Result<Self> {
        let mut ctx = Self::new()?;
        ctx.cwd = cwd;
        Ok(ctx)
    }

    /// Use a different home directory (~/.bundlex/).
    pub fn with_home(mut self, home: PathBuf) -> Self {
        self.home = home;
        self
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn color(&self) -> bool {
        self.color
    }

    /// Global configuration file path.
    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    /// Default precompiled archive cache.
    ///
    /// Uses the platform cache directory, falling back to `~/.bundlex/cache`.
    pub fn default_cache_dir(&self) -> PathBuf {
        match PROJECT_DIRS.as_ref() {
            Some(dirs) => dirs.cache_dir().join("precompiled"),
            None => self.home.join("cache").join("precompiled"),
        }
    }

    /// Find `bundlex.toml` starting from cwd and searching upward.
    pub fn find_project_file(&self) -> Result<PathBuf> {
        let mut current = self.cwd.clone();
        loop {
            let candidate = current.join(PROJECT_FILE);
            if candidate.is_file() {
                return Ok(candidate);
            }
            if !current.pop() {
                bail!(
                    "could not find `{}` in `{}` or any parent directory",
                    PROJECT_FILE,
                    self.cwd.display()
                );
            }
        }
    }

    /// Directory of the nearest `bundlex.toml`.
    pub fn find_project_root(&self) -> Result<PathBuf> {
        let file = self.find_project_file()?;
        Ok(file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.cwd.clone()))
    }

    /// Merged global and project configuration for `project_root`.
    ///
    /// Relative `[apps]` paths are resolved against the project root.
    pub fn load_config(&self, project_root: &Path) -> Config {
        let mut config = load_config(&self.config_path(), &project_config_path(project_root));
        config.resolve_app_paths(project_root);
        config
    }
}

/// Name of the application rooted at `root`.
///
/// Taken from `[project] app` when present, else the directory name.
pub fn root_app_name(root: &Path) -> Result<String> {
    let file = root.join(PROJECT_FILE);
    if file.is_file() {
        let contents = std::fs::read_to_string(&file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        let value: toml::Table = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", file.display()))?;
        if let Some(app) = value
            .get("project")
            .and_then(|p| p.get("app"))
            .and_then(|a| a.as_str())
        {
            return Ok(app.to_string());
        }
    }

    root.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("cannot derive an application name from {}", root.display()))
}
