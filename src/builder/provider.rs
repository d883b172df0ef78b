//! OS dependency resolution through ordered provider chains.
//!
//! Each OS dependency lists its providers in fallback order. Providers are
//! tried left to right and the first one that succeeds wins; every provider
//! that does not match leaves a [`ProviderAttempt`] behind so a total
//! failure can explain itself.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::Serialize;

use crate::core::errors::{BundlexError, ProviderAttempt};
use crate::core::project::{OsDependency, Provider};
use crate::sources::pkg_config::PkgConfig;
use crate::sources::precompiled::ArtifactAcquirer;

/// Comma-separated list of applications whose precompiled providers are
/// skipped.
pub const DISABLE_PRECOMPILED_ENV: &str = "BUNDLEX_DISABLE_PRECOMPILED_OS_DEPS";

/// Applications for which precompiled providers must not be used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisablePolicy {
    apps: BTreeSet<String>,
}

impl DisablePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.apps.insert(app.into());
        self
    }

    /// Parse a comma-separated application list.
    pub fn parse(value: &str) -> Self {
        DisablePolicy {
            apps: value
                .split(',')
                .map(str::trim)
                .filter(|app| !app.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Configured applications plus those named in the environment.
    pub fn from_config_and_env<'a>(configured: impl IntoIterator<Item = &'a String>) -> Self {
        let mut policy = std::env::var(DISABLE_PRECOMPILED_ENV)
            .map(|value| DisablePolicy::parse(&value))
            .unwrap_or_default();
        policy.apps.extend(configured.into_iter().cloned());
        policy
    }

    pub fn is_disabled(&self, app: &str) -> bool {
        self.apps.contains(app)
    }

    pub fn apps(&self) -> impl Iterator<Item = &str> {
        self.apps.iter().map(String::as_str)
    }
}

/// What a successful provider contributes to a unit's flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedDependency {
    pub includes: Vec<PathBuf>,
    pub lib_dirs: Vec<PathBuf>,
    pub libs: Vec<String>,
    pub compiler_flags: Vec<String>,
    pub linker_flags: Vec<String>,
}

impl ResolvedDependency {
    pub fn extend(&mut self, other: ResolvedDependency) {
        self.includes.extend(other.includes);
        self.lib_dirs.extend(other.lib_dirs);
        self.libs.extend(other.libs);
        self.compiler_flags.extend(other.compiler_flags);
        self.linker_flags.extend(other.linker_flags);
    }
}

/// Resolves OS dependencies for units of one build.
pub struct ProviderResolver<'a> {
    pkg_config: &'a dyn PkgConfig,
    acquirer: &'a ArtifactAcquirer,
    policy: &'a DisablePolicy,
}

impl<'a> ProviderResolver<'a> {
    pub fn new(
        pkg_config: &'a dyn PkgConfig,
        acquirer: &'a ArtifactAcquirer,
        policy: &'a DisablePolicy,
    ) -> Self {
        ProviderResolver {
            pkg_config,
            acquirer,
            policy,
        }
    }

    /// Resolve every dependency in declared order and union the results.
    pub fn resolve_all(
        &self,
        app: &str,
        dependencies: &[OsDependency],
    ) -> Result<ResolvedDependency, BundlexError> {
        let mut resolved = ResolvedDependency::default();
        for dependency in dependencies {
            resolved.extend(self.resolve(app, dependency)?);
        }
        Ok(resolved)
    }

    /// Resolve one dependency declared by a unit of `app`.
    pub fn resolve(
        &self,
        app: &str,
        dependency: &OsDependency,
    ) -> Result<ResolvedDependency, BundlexError> {
        let mut attempts = Vec::new();

        for provider in &dependency.providers {
            match self.try_provider(app, &dependency.name, provider) {
                Ok(resolved) => {
                    tracing::debug!(
                        "resolved {} for `{}` via {}",
                        dependency.name,
                        app,
                        provider.kind()
                    );
                    return Ok(resolved);
                }
                Err(attempt) => {
                    tracing::debug!("{}: {}", dependency.name, attempt);
                    attempts.push(attempt);
                }
            }
        }

        Err(BundlexError::NoProviderSucceeded {
            dependency: dependency.name.clone(),
            attempts,
        })
    }

    fn try_provider(
        &self,
        app: &str,
        dependency: &str,
        provider: &Provider,
    ) -> Result<ResolvedDependency, ProviderAttempt> {
        match provider {
            Provider::PkgConfig { names } => {
                let mut resolved = ResolvedDependency::default();
                for name in names {
                    let flags = self.pkg_config.query(name).map_err(|e| {
                        tracing::debug!("pkg-config query for {} failed: {:#}", name, e);
                        ProviderAttempt::new("pkg_config", format!("{} not found", name))
                    })?;
                    resolved.includes.extend(flags.includes);
                    resolved.lib_dirs.extend(flags.lib_dirs);
                    resolved.libs.extend(flags.libs);
                    resolved.compiler_flags.extend(flags.compiler_flags);
                    resolved.linker_flags.extend(flags.linker_flags);
                }
                Ok(resolved)
            }

            Provider::Precompiled { url, libs } => {
                if self.policy.is_disabled(app) {
                    return Err(ProviderAttempt::new(
                        "precompiled",
                        format!("disabled for application `{}`", app),
                    ));
                }

                let Some(url) = url else {
                    return Err(ProviderAttempt::new("precompiled", "no url for platform"));
                };

                let artifact = self
                    .acquirer
                    .acquire(app, dependency, url, libs)
                    .map_err(|e| ProviderAttempt::new("precompiled", e.to_string()))?;

                Ok(ResolvedDependency {
                    includes: artifact.includes,
                    lib_dirs: artifact.lib_dirs,
                    libs: artifact.libs,
                    ..ResolvedDependency::default()
                })
            }
        }
    }
}
