//! Error taxonomy for project loading and native dependency resolution.

use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// One failed provider in an OS dependency chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAttempt {
    /// Provider kind (`pkg_config`, `precompiled`)
    pub provider: String,
    /// Why the provider did not match
    pub reason: String,
}

impl ProviderAttempt {
    pub fn new(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        ProviderAttempt {
            provider: provider.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ProviderAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.reason)
    }
}

/// Errors surfaced by the resolution core.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum BundlexError {
    #[error("invalid project specification for `{app}`: {reason}")]
    #[diagnostic(code(bundlex::project::invalid))]
    InvalidProjectSpecification { app: String, reason: String },

    #[error("no bundlex project in file {}", path.display())]
    #[diagnostic(
        code(bundlex::project::missing),
        help("declare the project under a `[project]` table")
    )]
    NoBundlexProjectInFile { path: PathBuf },

    #[error("unknown application `{app}`")]
    #[diagnostic(
        code(bundlex::project::unknown_app),
        help("add the application path under `[apps]` in .bundlex/config.toml")
    )]
    UnknownApplication { app: String },

    #[error("application `{app}` has no lib named `{name}`")]
    #[diagnostic(code(bundlex::deps::unknown))]
    UnknownDependency { app: String, name: String },

    #[error("no provider succeeded for OS dependency `{dependency}`")]
    #[diagnostic(code(bundlex::os_deps::unresolved))]
    NoProviderSucceeded {
        dependency: String,
        attempts: Vec<ProviderAttempt>,
    },

    #[error("failed to download {url}: {reason}")]
    #[diagnostic(code(bundlex::precompiled::download))]
    DownloadFailed { url: String, reason: String },

    #[error("failed to extract {url}: {reason}")]
    #[diagnostic(code(bundlex::precompiled::extract))]
    ExtractFailed { url: String, reason: String },

    #[error("unsupported target `{host}`: expected `arch-vendor-os[-abi]`")]
    #[diagnostic(
        code(bundlex::target::unsupported),
        help("set BUNDLEX_TARGET to a full target triple")
    )]
    UnsupportedTarget { host: String },

    #[error("unsupported platform for target `{target}`")]
    #[diagnostic(code(bundlex::target::platform))]
    UnsupportedPlatform { target: String },

    #[error("cyclic dependency: {}", chain.join(" -> "))]
    #[diagnostic(code(bundlex::deps::cycle))]
    CyclicDependency { chain: Vec<String> },

    #[error("in `{app}` unit `{unit}`: {source}")]
    #[diagnostic(code(bundlex::unit))]
    InUnit {
        app: String,
        unit: String,
        source: Box<BundlexError>,
    },
}

impl BundlexError {
    /// Tag this error with the unit that triggered it.
    pub fn in_unit(self, app: impl Into<String>, unit: impl Into<String>) -> Self {
        BundlexError::InUnit {
            app: app.into(),
            unit: unit.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with all unit tags stripped.
    pub fn root_cause(&self) -> &BundlexError {
        match self {
            BundlexError::InUnit { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Convert to a user-facing diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            BundlexError::InUnit { app, unit, source } => source
                .to_diagnostic()
                .with_context(format!("while resolving `{}` in application `{}`", unit, app)),

            BundlexError::NoProviderSucceeded {
                dependency,
                attempts,
            } => {
                let mut diag = Diagnostic::error(format!(
                    "could not resolve OS dependency `{}`",
                    dependency
                ));
                for attempt in attempts {
                    diag = diag.with_context(attempt.to_string());
                }
                diag.with_suggestion(suggestions::INSTALL_OS_DEP)
                    .with_suggestion(suggestions::CHECK_PRECOMPILED)
            }

            BundlexError::UnknownDependency { app, name } => Diagnostic::error(self.to_string())
                .with_context(format!("only libs of `{}` can be depended on", app))
                .with_suggestion(format!("declare `[project.libs.{}]` in `{}`", name, app)),

            BundlexError::CyclicDependency { .. } => Diagnostic::error(self.to_string())
                .with_suggestion("break the cycle by moving shared code into a separate lib"),

            BundlexError::NoBundlexProjectInFile { path } => {
                Diagnostic::error(self.to_string()).with_location(path)
            }

            BundlexError::UnknownApplication { .. } => {
                Diagnostic::error(self.to_string()).with_suggestion(suggestions::UNKNOWN_APP)
            }

            BundlexError::DownloadFailed { .. } => {
                Diagnostic::error(self.to_string()).with_suggestion(suggestions::FETCH_FAILED)
            }

            BundlexError::UnsupportedTarget { .. } | BundlexError::UnsupportedPlatform { .. } => {
                Diagnostic::error(self.to_string()).with_suggestion(suggestions::SET_TARGET)
            }

            _ => Diagnostic::error(self.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_display() {
        let attempt = ProviderAttempt::new("precompiled", "no url for platform");
        assert_eq!(attempt.to_string(), "precompiled: no url for platform");
    }

    #[test]
    fn test_root_cause_strips_tags() {
        let err = BundlexError::UnknownDependency {
            app: "b".to_string(),
            name: "ring".to_string(),
        }
        .in_unit("a", "decoder")
        .in_unit("root", "main");

        assert!(matches!(
            err.root_cause(),
            BundlexError::UnknownDependency { app, name } if app == "b" && name == "ring"
        ));
        assert!(err.to_string().contains("in `root` unit `main`"));
    }

    #[test]
    fn test_no_provider_diagnostic_lists_attempts() {
        let err = BundlexError::NoProviderSucceeded {
            dependency: "libfoo".to_string(),
            attempts: vec![
                ProviderAttempt::new("precompiled", "no url for platform"),
                ProviderAttempt::new("pkg_config", "libfoo not found"),
            ],
        };

        let output = err.to_diagnostic().format(false);
        assert!(output.contains("could not resolve OS dependency `libfoo`"));
        assert!(output.contains("precompiled: no url for platform"));
        assert!(output.contains("pkg_config: libfoo not found"));
    }
}
