//! System package lookup through `pkg-config`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::util::process::{find_executable, ProcessBuilder};

/// Environment variable naming the `pkg-config` binary.
pub const PKG_CONFIG_ENV: &str = "PKG_CONFIG";

/// Flags reported by the package registry for one package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PkgConfigFlags {
    pub includes: Vec<PathBuf>,
    pub lib_dirs: Vec<PathBuf>,
    pub libs: Vec<String>,
    /// Compiler flags other than `-I`
    pub compiler_flags: Vec<String>,
    /// Linker flags other than `-L` and `-l`
    pub linker_flags: Vec<String>,
}

impl PkgConfigFlags {
    /// Split `--cflags` and `--libs` output into their components.
    pub fn parse(cflags: &str, libs: &str) -> Self {
        let mut flags = PkgConfigFlags::default();

        let mut tokens = cflags.split_whitespace();
        while let Some(token) = tokens.next() {
            match token.strip_prefix("-I") {
                Some("") => flags.includes.extend(tokens.next().map(PathBuf::from)),
                Some(dir) => flags.includes.push(PathBuf::from(dir)),
                None => flags.compiler_flags.push(token.to_string()),
            }
        }

        let mut tokens = libs.split_whitespace();
        while let Some(token) = tokens.next() {
            if let Some(dir) = token.strip_prefix("-L") {
                if dir.is_empty() {
                    flags.lib_dirs.extend(tokens.next().map(PathBuf::from));
                } else {
                    flags.lib_dirs.push(PathBuf::from(dir));
                }
            } else if let Some(lib) = token.strip_prefix("-l") {
                if !lib.is_empty() {
                    flags.libs.push(lib.to_string());
                }
            } else {
                flags.linker_flags.push(token.to_string());
            }
        }

        flags
    }
}

/// Queries the system package registry.
pub trait PkgConfig: Send + Sync {
    /// Flags for package `name`; an error means the package is unavailable.
    fn query(&self, name: &str) -> Result<PkgConfigFlags>;
}

/// [`PkgConfig`] backed by the `pkg-config` executable.
#[derive(Debug, Clone)]
pub struct PkgConfigCli {
    program: Option<PathBuf>,
}

impl PkgConfigCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        PkgConfigCli {
            program: Some(program.into()),
        }
    }

    /// Locate `pkg-config` via `PKG_CONFIG`, then `pkg-config` or `pkgconf`
    /// in PATH. A missing binary makes every query fail.
    pub fn detect() -> Self {
        let program = std::env::var(PKG_CONFIG_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .and_then(|p| find_executable(&p))
            .or_else(|| find_executable("pkg-config"))
            .or_else(|| find_executable("pkgconf"));

        if program.is_none() {
            tracing::debug!("pkg-config not found in PATH");
        }
        PkgConfigCli { program }
    }

    pub fn program(&self) -> Option<&PathBuf> {
        self.program.as_ref()
    }

    fn run(&self, program: &PathBuf, flag: &str, name: &str) -> Result<String> {
        let output = ProcessBuilder::new(program)
            .args([flag, name])
            .exec_and_check()
            .with_context(|| format!("pkg-config could not find `{}`", name))?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl PkgConfig for PkgConfigCli {
    fn query(&self, name: &str) -> Result<PkgConfigFlags> {
        let Some(program) = &self.program else {
            bail!("pkg-config executable not found");
        };

        let cflags = self.run(program, "--cflags", name)?;
        let libs = self.run(program, "--libs", name)?;
        tracing::debug!("pkg-config {}: {} {}", name, cflags.trim(), libs.trim());

        Ok(PkgConfigFlags::parse(&cflags, &libs))
    }
}
