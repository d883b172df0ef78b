//! Build plan model.
//!
//! A [`ProjectPlan`] holds one fully resolved [`UnitPlan`] per (unit,
//! interface) of an application, plus the plans of every lib pulled in from
//! other applications. Units are ordered so that each lib is built before
//! the units linking it. The plan carries everything a toolchain needs; no
//! further resolution happens after planning.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::path::{Path, PathBuf};

use petgraph::graph::DiGraph;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::core::errors::BundlexError;
use crate::core::platform::Family;
use crate::core::project::{Interface, Language, UnitKey, UnitKind};

/// A resolved compilation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPlan {
    pub key: UnitKey,
    pub language: Language,

    /// Source files to compile
    pub sources: Vec<PathBuf>,

    pub includes: Vec<PathBuf>,
    pub lib_dirs: Vec<PathBuf>,
    pub libs: Vec<String>,
    pub compiler_flags: Vec<String>,
    pub linker_flags: Vec<String>,

    /// Static archives of the libs linked in, in link order
    pub dep_artifacts: Vec<PathBuf>,

    /// Libs that must be built first
    pub depends_on: Vec<UnitKey>,

    /// Directory for object files
    pub object_dir: PathBuf,

    /// Final artifact
    pub output: PathBuf,
}

impl UnitPlan {
    pub fn is_lib(&self) -> bool {
        self.key.kind == UnitKind::Lib
    }
}

/// Everything needed to build one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectPlan {
    pub app: String,
    /// Host target triple
    pub target: String,
    pub family: Family,
    /// Units in build order
    pub units: Vec<UnitPlan>,
}

impl ProjectPlan {
    pub fn unit(&self, key: &UnitKey) -> Option<&UnitPlan> {
        self.units.iter().find(|unit| unit.key == *key)
    }

    /// Units declared by the planned application itself.
    pub fn own_units(&self) -> impl Iterator<Item = &UnitPlan> {
        self.units.iter().filter(move |unit| unit.key.app == self.app)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Where artifacts and objects go.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    out_dir: PathBuf,
    family: Family,
}

impl OutputLayout {
    pub fn new(out_dir: impl Into<PathBuf>, family: Family) -> Self {
        OutputLayout {
            out_dir: out_dir.into(),
            family,
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Final artifact of a unit.
    ///
    /// Natives land in `<out>/<app>/<interface>/`, libs in
    /// `<out>/<app>/lib[/<interface>]/`.
    pub fn artifact(&self, key: &UnitKey) -> PathBuf {
        let app_dir = self.out_dir.join(&key.app);

        match (key.kind, key.interface) {
            (UnitKind::Lib, interface) => {
                let mut dir = app_dir.join("lib");
                if let Some(interface) = interface {
                    dir = dir.join(interface.as_str());
                }
                if self.family.is_windows() {
                    dir.join(format!("{}.lib", key.name))
                } else {
                    dir.join(format!("lib{}.a", key.name))
                }
            }
            (UnitKind::Native, interface) => {
                let interface = interface.unwrap_or(Interface::Nif);
                let dir = app_dir.join(interface.as_str());
                let ext = match (interface, self.family) {
                    (Interface::Nif, family) if family.is_windows() => ".dll",
                    (Interface::Nif, _) => ".so",
                    (_, family) if family.is_windows() => ".exe",
                    _ => "",
                };
                dir.join(format!("{}{}", key.name, ext))
            }
        }
    }

    /// Object file directory of a unit.
    pub fn object_dir(&self, key: &UnitKey) -> PathBuf {
        let kind = match key.kind {
            UnitKind::Native => "native",
            UnitKind::Lib => "lib",
        };
        let name = match key.interface {
            Some(interface) => format!("{}-{}", key.name, interface),
            None => key.name.clone(),
        };
        self.out_dir.join(&key.app).join("obj").join(kind).join(name)
    }
}

/// Sort unit plans so that dependencies come first.
///
/// Ties keep the input order: among the units whose dependencies are all
/// placed, the earliest one goes next.
pub fn order_units(units: Vec<UnitPlan>) -> Result<Vec<UnitPlan>, BundlexError> {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<_> = (0..units.len()).map(|i| graph.add_node(i)).collect();
    let index: HashMap<&UnitKey, usize> = units
        .iter()
        .enumerate()
        .map(|(i, unit)| (&unit.key, i))
        .collect();

    for (i, unit) in units.iter().enumerate() {
        for dep in &unit.depends_on {
            if let Some(&j) = index.get(dep) {
                graph.update_edge(nodes[j], nodes[i], ());
            }
        }
    }

    let mut pending: Vec<usize> = nodes
        .iter()
        .map(|&node| graph.neighbors_directed(node, Direction::Incoming).count())
        .collect();
    let mut ready: BinaryHeap<Reverse<usize>> = pending
        .iter()
        .enumerate()
        .filter(|&(_, &count)| count == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(units.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for next in graph.neighbors_directed(nodes[i], Direction::Outgoing) {
            let j = graph[next];
            pending[j] -= 1;
            if pending[j] == 0 {
                ready.push(Reverse(j));
            }
        }
    }

    if order.len() < units.len() {
        let chain = pending
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(i, _)| units[i].key.to_string())
            .collect();
        return Err(BundlexError::CyclicDependency { chain });
    }

    let mut slots: Vec<Option<UnitPlan>> = units.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}
