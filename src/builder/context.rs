//! Build context: target, collaborators and policy for one invocation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::builder::flags::FlagComposer;
use crate::builder::plan::OutputLayout;
use crate::builder::provider::{DisablePolicy, ProviderResolver};
use crate::core::errors::BundlexError;
use crate::core::parser::ProjectParser;
use crate::core::platform::{host_target, Family, Target, TARGET_ENV};
use crate::core::preprocessor::PreprocessorRegistry;
use crate::core::store::{AppLocator, FsProjectLoader, ProjectLoader, ProjectStore};
use crate::sources::pkg_config::{PkgConfig, PkgConfigCli};
use crate::sources::precompiled::{ArchiveTransport, ArtifactAcquirer, HttpTransport};
use crate::util::config::Config;
use crate::util::context::{root_app_name, GlobalContext, DEFAULT_OUTPUT_DIR};

/// Everything planning needs, shared by all units of a build.
pub struct BuildContext {
    pub target: Target,
    pub family: Family,

    /// Loaded project descriptors
    pub store: ProjectStore,

    pub pkg_config: Arc<dyn PkgConfig>,
    pub acquirer: ArtifactAcquirer,
    pub policy: DisablePolicy,
    pub composer: FlagComposer,
    pub layout: OutputLayout,

    /// Number of parallel jobs (None = rayon default)
    pub jobs: Option<usize>,
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("target", &self.target)
            .field("family", &self.family)
            .field("store", &self.store)
            .field("acquirer", &self.acquirer)
            .field("policy", &self.policy)
            .field("layout", &self.layout)
            .field("jobs", &self.jobs)
            .finish()
    }
}

impl BuildContext {
    /// Create a context from explicit collaborators.
    pub fn new(
        target: Target,
        loader: Arc<dyn ProjectLoader>,
        pkg_config: Arc<dyn PkgConfig>,
        acquirer: ArtifactAcquirer,
        out_dir: impl Into<PathBuf>,
    ) -> Result<Self, BundlexError> {
        let family = target.family()?;

        Ok(BuildContext {
            store: ProjectStore::new(loader, ProjectParser::new(family)),
            pkg_config,
            acquirer,
            policy: DisablePolicy::new(),
            composer: FlagComposer::new(family),
            layout: OutputLayout::new(out_dir, family),
            jobs: None,
            target,
            family,
        })
    }

    pub fn with_policy(mut self, policy: DisablePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_composer(mut self, composer: FlagComposer) -> Self {
        self.composer = composer;
        self
    }

    pub fn with_jobs(mut self, jobs: Option<usize>) -> Self {
        self.jobs = jobs;
        self
    }

    /// Parse declarations through `preprocessors`. Projects loaded earlier
    /// are discarded.
    pub fn with_preprocessors(mut self, preprocessors: PreprocessorRegistry) -> Self {
        let parser = ProjectParser::new(self.family).with_preprocessors(preprocessors);
        self.store = ProjectStore::new(Arc::clone(self.store.loader()), parser);
        self
    }

    /// Build the default context for the application rooted at `root`.
    pub fn from_config(gctx: &GlobalContext, root: &Path, config: &Config) -> Result<Self> {
        let target = resolve_target(config)?;
        let app = root_app_name(root)?;

        let locator = AppLocator::new()
            .with_root(app.clone(), root)
            .with_apps(config.apps.clone())
            .with_deps_dir(root.join("deps"));
        let loader: Arc<dyn ProjectLoader> = Arc::new(FsProjectLoader::new(locator));

        let transport: Arc<dyn ArchiveTransport> = Arc::new(
            HttpTransport::new()
                .with_timeout(config.net.timeout())
                .with_offline(config.net.offline),
        );
        let cache_dir = config
            .precompiled
            .cache_dir
            .clone()
            .unwrap_or_else(|| gctx.default_cache_dir());
        let acquirer = ArtifactAcquirer::new(cache_dir, transport);

        let out_dir = root.join(
            config
                .build
                .output_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
        );

        let ctx = BuildContext::new(
            target,
            loader,
            Arc::new(PkgConfigCli::detect()),
            acquirer,
            out_dir,
        )
        .with_context(|| format!("failed to set up build for `{}`", app))?;

        let composer = FlagComposer::new(ctx.family).with_erlang_dirs(
            config.erlang.include_dirs.clone(),
            config.erlang.lib_dirs.clone(),
        );

        Ok(ctx
            .with_policy(DisablePolicy::from_config_and_env(
                &config.precompiled.disabled_apps,
            ))
            .with_composer(composer)
            .with_preprocessors(PreprocessorRegistry::from_config(&config.preprocessors))
            .with_jobs(config.build.jobs))
    }

    /// Provider resolver borrowing this context's collaborators.
    pub fn providers(&self) -> ProviderResolver<'_> {
        ProviderResolver::new(self.pkg_config.as_ref(), &self.acquirer, &self.policy)
    }
}

/// Host target: `BUNDLEX_TARGET`, then `[toolchain] target`, then the
/// platform bundlex was built for.
pub fn resolve_target(config: &Config) -> Result<Target, BundlexError> {
    let env_set = std::env::var(TARGET_ENV).is_ok_and(|v| !v.trim().is_empty());
    match &config.toolchain.target {
        Some(target) if !env_set => Target::parse(target),
        _ => host_target(),
    }
}
