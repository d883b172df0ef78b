//! Build planning.
//!
//! Resolves units into fully specified plans: lib closures, OS
//! dependencies, flags and output paths, and renders toolchain commands.

pub mod context;
pub mod dep_graph;
pub mod flags;
pub mod plan;
pub mod provider;
pub mod toolchain;

pub use context::BuildContext;
pub use dep_graph::{DepGraphResolver, ResolvedLib};
pub use flags::{ComposedFlags, FlagComposer};
pub use plan::{OutputLayout, ProjectPlan, UnitPlan};
pub use provider::{DisablePolicy, ProviderResolver, ResolvedDependency};
pub use toolchain::{CommandSpec, GccToolchain, Toolchain};
