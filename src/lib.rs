//! bundlex - native code build orchestration for Erlang/Elixir applications
//!
//! This crate resolves project declarations of natives and libs, their OS
//! dependencies and cross-application lib dependencies into build plans,
//! and drives a C/C++ toolchain over them.

pub mod builder;
pub mod core;
pub mod ops;
pub mod sources;
pub mod util;

/// Test utilities and mocks for bundlex unit tests.
///
/// Mock project loader, pkg-config and archive transport, plus on-disk
/// fixtures.
#[cfg(test)]
pub mod test_support;

pub use builder::{BuildContext, ProjectPlan, UnitPlan};
pub use core::{BundlexError, Project, ProjectStore, Target};
pub use util::context::GlobalContext;
