//! OS dependency sources.
//!
//! Sources locate external libraries, either installed on the system
//! (pkg-config) or as precompiled archives.

pub mod pkg_config;
pub mod precompiled;

pub use pkg_config::{PkgConfig, PkgConfigCli, PkgConfigFlags};
pub use precompiled::{ArchiveTransport, ArtifactAcquirer, HttpTransport};
