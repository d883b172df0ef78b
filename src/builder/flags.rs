//! Compiler and linker flag composition.
//!
//! Combines a unit's own settings with its resolved OS dependencies and the
//! libs it links into the final, ordered flag set. Linkers are sensitive to
//! library order, so every list keeps declaration order; include and library
//! search paths drop later duplicates.

use std::collections::HashSet;
use std::hash::Hash;
use std::path::PathBuf;

use serde::Serialize;

use crate::builder::dep_graph::ResolvedLib;
use crate::builder::provider::ResolvedDependency;
use crate::core::platform::Family;
use crate::core::project::{Interface, Project, Unit, UnitKind};

/// Libraries every C node links.
const CNODE_LIBS: &[&str] = &["ei", "pthread"];

/// Final flags of one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComposedFlags {
    pub includes: Vec<PathBuf>,
    pub lib_dirs: Vec<PathBuf>,
    pub libs: Vec<String>,
    pub compiler_flags: Vec<String>,
    pub linker_flags: Vec<String>,
}

/// Inputs for one unit.
#[derive(Debug, Clone, Copy)]
pub struct FlagInput<'a> {
    pub project: &'a Project,
    pub unit: &'a Unit,
    pub os_deps: &'a ResolvedDependency,
    pub dep_libs: &'a [ResolvedLib],
}

/// Composes flags for a platform family.
#[derive(Debug, Clone)]
pub struct FlagComposer {
    family: Family,
    erlang_includes: Vec<PathBuf>,
    erlang_lib_dirs: Vec<PathBuf>,
}

impl FlagComposer {
    pub fn new(family: Family) -> Self {
        FlagComposer {
            family,
            erlang_includes: Vec::new(),
            erlang_lib_dirs: Vec::new(),
        }
    }

    /// Add the Erlang runtime's header and library directories.
    pub fn with_erlang_dirs(mut self, includes: Vec<PathBuf>, lib_dirs: Vec<PathBuf>) -> Self {
        self.erlang_includes = includes;
        self.erlang_lib_dirs = lib_dirs;
        self
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn compose(&self, input: FlagInput<'_>) -> ComposedFlags {
        let FlagInput {
            project,
            unit,
            os_deps,
            dep_libs,
        } = input;
        let config = &unit.config;

        let mut includes: Vec<PathBuf> = config
            .includes
            .iter()
            .map(|path| project.resolve_path(path))
            .collect();
        for lib in dep_libs {
            includes.extend(
                lib.unit
                    .config
                    .includes
                    .iter()
                    .map(|path| lib.project.resolve_path(path)),
            );
            includes.push(lib.project.unit_src_dir(&lib.unit));
        }
        includes.extend(os_deps.includes.iter().cloned());
        includes.extend(self.erlang_includes.iter().cloned());

        let mut lib_dirs: Vec<PathBuf> = config
            .lib_dirs
            .iter()
            .map(|path| project.resolve_path(path))
            .collect();
        lib_dirs.extend(os_deps.lib_dirs.iter().cloned());
        lib_dirs.extend(self.erlang_lib_dirs.iter().cloned());

        let mut libs = config.libs.clone();
        for lib in dep_libs {
            libs.extend(lib.unit.config.libs.iter().cloned());
        }
        libs.extend(os_deps.libs.iter().cloned());
        if unit.kind == UnitKind::Native && unit.interface == Some(Interface::Cnode) {
            libs.extend(CNODE_LIBS.iter().map(|lib| lib.to_string()));
        }

        let mut compiler_flags = if config.compiler_flags.is_empty() {
            vec![config.language.default_std_flag().to_string()]
        } else {
            config.compiler_flags.clone()
        };
        compiler_flags.extend(os_deps.compiler_flags.iter().cloned());
        // A lib may end up in a shared object, whatever its first consumer.
        let position_independent =
            unit.kind == UnitKind::Lib || unit.interface == Some(Interface::Nif);
        if position_independent && !self.family.is_windows() {
            compiler_flags.push("-fPIC".to_string());
        }

        let mut linker_flags = config.linker_flags.clone();
        linker_flags.extend(os_deps.linker_flags.iter().cloned());
        if unit.kind == UnitKind::Native && unit.interface == Some(Interface::Nif) {
            linker_flags.extend(self.shared_object_flags().iter().map(|f| f.to_string()));
        }

        ComposedFlags {
            includes: dedup(includes),
            lib_dirs: dedup(lib_dirs),
            libs,
            compiler_flags,
            linker_flags,
        }
    }

    /// Flags producing a dynamically loadable object.
    pub fn shared_object_flags(&self) -> &'static [&'static str] {
        if self.family.is_macos() {
            &["-dynamiclib", "-undefined", "dynamic_lookup"]
        } else {
            &["-shared"]
        }
    }
}

/// Drop repeated items, keeping the first occurrence.
fn dedup<T: Eq + Hash + Clone>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
