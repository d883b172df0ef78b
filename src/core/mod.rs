//! Core data structures for bundlex.
//!
//! This module contains the foundational types used throughout bundlex:
//! - Targets and platform families
//! - Project declarations, their parser and the process-wide store
//! - Typed errors

pub mod errors;
pub mod parser;
pub mod platform;
pub mod preprocessor;
pub mod project;
pub mod store;

pub use errors::{BundlexError, ProviderAttempt};
pub use parser::ProjectParser;
pub use platform::{Family, Target};
pub use project::{Interface, Language, Project, Unit, UnitKey, UnitKind, PROJECT_FILE};
pub use store::{AppLocator, FsProjectLoader, ProjectLoader, ProjectStore};
