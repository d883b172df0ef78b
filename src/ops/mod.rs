//! High-level operations.
//!
//! This module contains the implementation of bundlex commands.

pub mod build;
pub mod clean;
pub mod plan;

pub use build::{build, execute_plan, Artifact};
pub use clean::{clean, CleanOptions};
pub use plan::{plan, PlanOptions};
