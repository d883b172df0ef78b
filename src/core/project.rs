//! Project descriptor model.
//!
//! A [`Project`] is the parsed, normalized content of one application's
//! `bundlex.toml`: its natives and libs, each expanded to exactly one
//! interface. Projects are immutable once built and shared as `Arc<Project>`
//! through the [`ProjectStore`](crate::core::store::ProjectStore).

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Project file name looked up in every application directory.
pub const PROJECT_FILE: &str = "bundlex.toml";

/// Runtime interface exposed by a native.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interface {
    /// Dynamically loaded into the VM
    Nif,
    /// Separate OS process talking over a socket
    Cnode,
    /// Separate OS process talking over a pipe
    Port,
}

impl Interface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interface::Nif => "nif",
            Interface::Cnode => "cnode",
            Interface::Port => "port",
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interface {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nif" => Ok(Interface::Nif),
            "cnode" => Ok(Interface::Cnode),
            "port" => Ok(Interface::Port),
            other => Err(format!(
                "unknown interface `{}` (expected nif, cnode or port)",
                other
            )),
        }
    }
}

/// Source language of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    C,
    Cpp,
}

impl Language {
    /// Standard flag used when a unit declares no compiler flags.
    pub fn default_std_flag(&self) -> &'static str {
        match self {
            Language::C => "-std=c11",
            Language::Cpp => "-std=c++17",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "c" => Ok(Language::C),
            "cpp" | "c++" => Ok(Language::Cpp),
            other => Err(format!("unknown language `{}` (expected c or cpp)", other)),
        }
    }
}

/// Whether a unit is a native or a lib.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Native,
    Lib,
}

impl UnitKind {
    /// Section name in the project file.
    pub fn section(&self) -> &'static str {
        match self {
            UnitKind::Native => "natives",
            UnitKind::Lib => "libs",
        }
    }
}

/// A strategy for resolving one OS dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// Query the system package registry; every name must resolve.
    PkgConfig { names: Vec<String> },

    /// Fetch a prebuilt archive. `url` is `None` when the project has no
    /// archive for the current platform.
    Precompiled {
        url: Option<String>,
        libs: Vec<String>,
    },
}

impl Provider {
    /// Short provider name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Provider::PkgConfig { .. } => "pkg_config",
            Provider::Precompiled { .. } => "precompiled",
        }
    }
}

/// An external library a unit needs, with its providers in fallback order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsDependency {
    pub name: String,
    pub providers: Vec<Provider>,
}

/// A reference to libs of another (or the same) application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepRef {
    pub app: String,
    pub names: Vec<String>,
}

/// Configuration shared by natives and libs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitConfig {
    /// Source files or glob patterns, relative to the unit source directory
    pub sources: Vec<String>,
    /// Include directories, relative paths resolved against the app root
    pub includes: Vec<PathBuf>,
    /// Library search directories, relative paths resolved against the app root
    pub lib_dirs: Vec<PathBuf>,
    /// Libraries to link (`-l<name>`)
    pub libs: Vec<String>,
    pub os_deps: Vec<OsDependency>,
    pub deps: Vec<DepRef>,
    /// Subdirectory of the project source path holding this unit's sources
    pub src_base: Option<String>,
    pub compiler_flags: Vec<String>,
    pub linker_flags: Vec<String>,
    pub language: Language,
    pub preprocessors: Vec<String>,
    /// Unrecognized keys, passed through untouched
    pub extra: toml::Table,
}

/// A normalized compilation unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub name: String,
    pub kind: UnitKind,
    /// Exactly one interface for natives; optional for libs
    pub interface: Option<Interface>,
    pub config: UnitConfig,
}

impl Unit {
    /// Key identifying this unit within `app`.
    pub fn key(&self, app: &str) -> UnitKey {
        UnitKey {
            app: app.to_string(),
            name: self.name.clone(),
            kind: self.kind,
            interface: self.interface,
        }
    }
}

/// Globally unique identity of a normalized unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitKey {
    pub app: String,
    pub name: String,
    pub kind: UnitKind,
    pub interface: Option<Interface>,
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            UnitKind::Native => "native",
            UnitKind::Lib => "lib",
        };
        match self.interface {
            Some(interface) => write!(f, "{}:{}:{}({})", self.app, kind, self.name, interface),
            None => write!(f, "{}:{}:{}", self.app, kind, self.name),
        }
    }
}

/// The parsed project of one application.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    /// Application identifier
    pub app: String,
    /// Application root directory
    pub root: PathBuf,
    /// Absolute path to the native sources
    pub src_path: PathBuf,
    pub natives: Vec<Unit>,
    pub libs: Vec<Unit>,
}

impl Project {
    /// All units, natives first, in declaration order.
    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.natives.iter().chain(self.libs.iter())
    }

    /// Find the lib variant linkable into a unit built for `interface`:
    /// the variant with the same interface, else the interface-less one.
    pub fn find_lib(&self, name: &str, interface: Option<Interface>) -> Option<&Unit> {
        let variant = |wanted: Option<Interface>| {
            self.libs
                .iter()
                .find(|lib| lib.name == name && lib.interface == wanted)
        };
        variant(interface).or_else(|| variant(None))
    }

    /// Find a unit by kind, name and interface.
    pub fn find_unit(
        &self,
        kind: UnitKind,
        name: &str,
        interface: Option<Interface>,
    ) -> Option<&Unit> {
        let units = match kind {
            UnitKind::Native => &self.natives,
            UnitKind::Lib => &self.libs,
        };
        units
            .iter()
            .find(|u| u.name == name && u.interface == interface)
    }

    /// Directory holding a unit's sources.
    pub fn unit_src_dir(&self, unit: &Unit) -> PathBuf {
        let base = unit.config.src_base.as_deref().unwrap_or(&self.app);
        self.src_path.join(base)
    }

    /// Resolve a path declared in the project file against the app root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}
