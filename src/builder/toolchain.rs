//! Toolchain abstraction for C/C++ compilers.
//!
//! Turns a resolved [`UnitPlan`] into the compile, archive and link
//! commands a gcc/clang-style driver understands. Nothing here runs a
//! process; execution belongs to `ops::build`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::builder::plan::UnitPlan;
use crate::core::project::Language;
use crate::util::config::ToolchainSettings;
use crate::util::process::{find_ar, find_compiler};

/// What a command produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Compile,
    Archive,
    Link,
}

/// A command to execute, with program, arguments, and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub kind: StepKind,
    /// The program to run (e.g., "gcc", "ar")
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// File the command writes
    pub output: PathBuf,
}

impl CommandSpec {
    pub fn new(kind: StepKind, program: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        CommandSpec {
            kind,
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            output: output.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Trait for toolchain implementations.
pub trait Toolchain: Send + Sync {
    /// Commands building one unit, in execution order.
    fn commands(&self, plan: &UnitPlan) -> Vec<CommandSpec>;
}

/// GCC/Clang toolchain.
#[derive(Debug, Clone)]
pub struct GccToolchain {
    /// Path to the C compiler
    pub cc: PathBuf,
    /// Path to the C++ compiler
    pub cxx: PathBuf,
    /// Path to the archiver
    pub ar: PathBuf,
}

impl GccToolchain {
    pub fn new(cc: impl Into<PathBuf>, cxx: impl Into<PathBuf>, ar: impl Into<PathBuf>) -> Self {
        GccToolchain {
            cc: cc.into(),
            cxx: cxx.into(),
            ar: ar.into(),
        }
    }

    /// Locate the tools from settings, `CC`/`CXX`/`AR`, or PATH.
    pub fn detect(settings: &ToolchainSettings) -> Result<Self> {
        let cc = find_compiler(Language::C, settings.cc.as_deref())
            .context("no C compiler found (set CC or [toolchain] cc)")?;
        let cxx = find_compiler(Language::Cpp, settings.cxx.as_deref())
            .unwrap_or_else(|| Self::infer_cxx(&cc));
        let ar = find_ar(settings.ar.as_deref())
            .context("no archiver found (set AR or [toolchain] ar)")?;

        tracing::debug!(
            "using cc={} cxx={} ar={}",
            cc.display(),
            cxx.display(),
            ar.display()
        );
        Ok(Self::new(cc, cxx, ar))
    }

    /// Infer the C++ driver from the C driver.
    ///
    /// - gcc, x86_64-linux-gnu-gcc -> g++, x86_64-linux-gnu-g++
    /// - clang -> clang++
    /// - cc, /usr/bin/cc -> c++, /usr/bin/c++
    pub fn infer_cxx(cc: &Path) -> PathBuf {
        let cc_str = cc.to_string_lossy();

        if let Some(prefix) = cc_str.strip_suffix("gcc") {
            return PathBuf::from(format!("{}g++", prefix));
        }
        if cc_str.ends_with("clang") {
            return PathBuf::from(format!("{}++", cc_str));
        }
        let is_standalone_cc = cc_str == "cc"
            || cc_str.ends_with("/cc")
            || cc_str.ends_with("\\cc")
            || cc_str.ends_with("-cc");
        if is_standalone_cc {
            return PathBuf::from(format!("{}++", &cc_str[..cc_str.len() - 1]));
        }

        PathBuf::from(format!("{}++", cc_str))
    }

    fn driver(&self, language: Language) -> &Path {
        match language {
            Language::C => &self.cc,
            Language::Cpp => &self.cxx,
        }
    }

    fn compile_command(&self, plan: &UnitPlan, source: &Path, object: &Path) -> CommandSpec {
        let mut cmd = CommandSpec::new(StepKind::Compile, self.driver(plan.language), object)
            .arg("-c")
            .args(plan.compiler_flags.iter().cloned());

        for dir in &plan.includes {
            cmd = cmd.arg(format!("-I{}", dir.display()));
        }

        cmd.arg(source.display().to_string())
            .arg("-o")
            .arg(object.display().to_string())
    }

    fn archive_command(&self, plan: &UnitPlan, objects: &[PathBuf]) -> CommandSpec {
        CommandSpec::new(StepKind::Archive, &self.ar, &plan.output)
            .arg("rcs")
            .arg(plan.output.display().to_string())
            .args(objects.iter().map(|obj| obj.display().to_string()))
    }

    fn link_command(&self, plan: &UnitPlan, objects: &[PathBuf]) -> CommandSpec {
        let mut cmd = CommandSpec::new(StepKind::Link, self.driver(plan.language), &plan.output)
            .arg("-o")
            .arg(plan.output.display().to_string())
            .args(objects.iter().map(|obj| obj.display().to_string()))
            .args(plan.dep_artifacts.iter().map(|a| a.display().to_string()));

        for dir in &plan.lib_dirs {
            cmd = cmd.arg(format!("-L{}", dir.display()));
        }
        for lib in &plan.libs {
            cmd = cmd.arg(format!("-l{}", lib));
        }

        cmd.args(plan.linker_flags.iter().cloned())
    }
}

impl Toolchain for GccToolchain {
    fn commands(&self, plan: &UnitPlan) -> Vec<CommandSpec> {
        let objects = object_paths(plan);
        let mut commands: Vec<CommandSpec> = plan
            .sources
            .iter()
            .zip(&objects)
            .map(|(source, object)| self.compile_command(plan, source, object))
            .collect();

        if plan.is_lib() {
            commands.push(self.archive_command(plan, &objects));
        } else {
            commands.push(self.link_command(plan, &objects));
        }
        commands
    }
}

/// Object file for each source of `plan`, in source order.
///
/// Sources sharing a file stem get a numeric suffix.
pub fn object_paths(plan: &UnitPlan) -> Vec<PathBuf> {
    let mut used = HashSet::new();
    plan.sources
        .iter()
        .map(|source| {
            let stem = source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "source".to_string());
            let mut name = format!("{}.o", stem);
            let mut n = 1;
            while !used.insert(name.clone()) {
                name = format!("{}-{}.o", stem, n);
                n += 1;
            }
            plan.object_dir.join(name)
        })
        .collect()
}
