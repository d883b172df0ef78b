//! Configuration file support for bundlex.
//!
//! bundlex reads two configuration files:
//! - Global: `~/.bundlex/config.toml` - User-wide defaults
//! - Project: `.bundlex/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default download timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// bundlex configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build settings
    pub build: BuildConfig,

    /// Precompiled dependency settings
    pub precompiled: PrecompiledConfig,

    /// Network settings
    pub net: NetConfig,

    /// Application directories by name
    pub apps: BTreeMap<String, PathBuf>,

    /// Toolchain overrides
    pub toolchain: ToolchainSettings,

    /// Erlang runtime locations
    pub erlang: ErlangConfig,

    /// Preprocessors units may name, by name
    pub preprocessors: BTreeMap<String, PreprocessorConfig>,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Number of parallel jobs (None = auto-detect)
    pub jobs: Option<usize>,

    /// Output directory, relative to the project root
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecompiledConfig {
    /// Applications that must not use precompiled providers
    pub disabled_apps: Vec<String>,

    /// Archive cache location (defaults to the user cache directory)
    pub cache_dir: Option<PathBuf>,
}

/// Network-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Offline mode (don't fetch from network)
    pub offline: bool,

    /// Download timeout in seconds
    pub timeout: Option<u64>,
}

impl NetConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

/// Toolchain settings for C/C++ compilation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainSettings {
    /// Host target triple override (e.g., x86_64-pc-linux-gnu)
    pub target: Option<String>,

    /// Path to the C compiler (e.g., /usr/bin/clang)
    pub cc: Option<PathBuf>,

    /// Path to the C++ compiler (e.g., /usr/bin/clang++)
    pub cxx: Option<PathBuf>,

    /// Path to the archiver (e.g., /usr/bin/llvm-ar)
    pub ar: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErlangConfig {
    /// `erl_nif.h` / `ei.h` locations
    pub include_dirs: Vec<PathBuf>,

    /// `libei` locations
    pub lib_dirs: Vec<PathBuf>,
}

/// A preprocessor declared in configuration.
///
/// Entries are appended to the unit's config; `{app}` and `{unit}` expand
/// to the application and unit names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessorConfig {
    pub sources: Vec<String>,
    pub includes: Vec<String>,
    pub libs: Vec<String>,
    pub compiler_flags: Vec<String>,
    pub linker_flags: Vec<String>,

    /// Only apply to natives
    pub natives_only: bool,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    ///
    /// Disabled applications accumulate; application paths are merged per
    /// name.
    pub fn merge(&mut self, other: Config) {
        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.build.output_dir.is_some() {
            self.build.output_dir = other.build.output_dir;
        }

        for app in other.precompiled.disabled_apps {
            if !self.precompiled.disabled_apps.contains(&app) {
                self.precompiled.disabled_apps.push(app);
            }
        }
        if other.precompiled.cache_dir.is_some() {
            self.precompiled.cache_dir = other.precompiled.cache_dir;
        }

        if other.net.offline {
            self.net.offline = true;
        }
        if other.net.timeout.is_some() {
            self.net.timeout = other.net.timeout;
        }

        self.apps.extend(other.apps);

        if other.toolchain.target.is_some() {
            self.toolchain.target = other.toolchain.target;
        }
        if other.toolchain.cc.is_some() {
            self.toolchain.cc = other.toolchain.cc;
        }
        if other.toolchain.cxx.is_some() {
            self.toolchain.cxx = other.toolchain.cxx;
        }
        if other.toolchain.ar.is_some() {
            self.toolchain.ar = other.toolchain.ar;
        }

        if !other.erlang.include_dirs.is_empty() {
            self.erlang.include_dirs = other.erlang.include_dirs;
        }
        if !other.erlang.lib_dirs.is_empty() {
            self.erlang.lib_dirs = other.erlang.lib_dirs;
        }

        self.preprocessors.extend(other.preprocessors);
    }

    /// Resolve relative application paths against `base`.
    pub fn resolve_app_paths(&mut self, base: &Path) {
        for path in self.apps.values_mut() {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.bundlex/config.toml)
/// 2. Global config (~/.bundlex/config.toml)
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    if global_path.exists() {
        config.merge(Config::load_or_default(global_path));
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}

/// Get the global bundlex config directory (~/.bundlex).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".bundlex"))
}

/// Get the project config path (.bundlex/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".bundlex").join("config.toml")
}
