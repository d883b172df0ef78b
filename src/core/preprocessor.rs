//! Unit config preprocessors.
//!
//! A unit may name preprocessors in its `preprocessors` list. Each one gets
//! to rewrite the unit's config before interface expansion, which lets code
//! generators add their generated sources, includes or flags.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::project::{UnitConfig, UnitKind};
use crate::util::config::PreprocessorConfig;

/// A named transformation applied to unit configs at parse time.
pub trait Preprocessor: Send + Sync {
    /// Name units refer to this preprocessor by.
    fn name(&self) -> &str;

    fn preprocess_native(&self, _name: &str, config: UnitConfig, _app: &str) -> UnitConfig {
        config
    }

    fn preprocess_lib(&self, _name: &str, config: UnitConfig, _app: &str) -> UnitConfig {
        config
    }
}

/// Preprocessors available to the parser, by name.
#[derive(Clone, Default)]
pub struct PreprocessorRegistry {
    preprocessors: HashMap<String, Arc<dyn Preprocessor>>,
}

impl PreprocessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a preprocessor, replacing any with the same name.
    pub fn register(&mut self, preprocessor: Arc<dyn Preprocessor>) {
        self.preprocessors
            .insert(preprocessor.name().to_string(), preprocessor);
    }

    pub fn with(mut self, preprocessor: Arc<dyn Preprocessor>) -> Self {
        self.register(preprocessor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Preprocessor>> {
        self.preprocessors.get(name)
    }

    /// Run the unit's preprocessors in declared order.
    ///
    /// Returns the name of the first unknown preprocessor as the error.
    pub fn apply(
        &self,
        kind: UnitKind,
        name: &str,
        mut config: UnitConfig,
        app: &str,
    ) -> Result<UnitConfig, String> {
        for preprocessor_name in config.preprocessors.clone() {
            let preprocessor = self
                .get(&preprocessor_name)
                .ok_or_else(|| preprocessor_name.clone())?;

            config = match kind {
                UnitKind::Native => preprocessor.preprocess_native(name, config, app),
                UnitKind::Lib => preprocessor.preprocess_lib(name, config, app),
            };
        }
        Ok(config)
    }
}

impl PreprocessorRegistry {
    /// Registry of the `[preprocessors]` declared in configuration.
    pub fn from_config(preprocessors: &BTreeMap<String, PreprocessorConfig>) -> Self {
        let mut registry = Self::new();
        for (name, config) in preprocessors {
            registry.register(Arc::new(TemplatePreprocessor::new(name, config.clone())));
        }
        registry
    }
}

/// Appends configured entries to a unit, expanding `{app}` and `{unit}`.
#[derive(Debug, Clone)]
pub struct TemplatePreprocessor {
    name: String,
    config: PreprocessorConfig,
}

impl TemplatePreprocessor {
    pub fn new(name: impl Into<String>, config: PreprocessorConfig) -> Self {
        TemplatePreprocessor {
            name: name.into(),
            config,
        }
    }

    fn append(&self, unit: &str, mut config: UnitConfig, app: &str) -> UnitConfig {
        let expand = |items: &[String]| -> Vec<String> {
            items
                .iter()
                .map(|item| item.replace("{app}", app).replace("{unit}", unit))
                .collect()
        };

        config.sources.extend(expand(&self.config.sources));
        config
            .includes
            .extend(expand(&self.config.includes).into_iter().map(PathBuf::from));
        config.libs.extend(expand(&self.config.libs));
        config.compiler_flags.extend(expand(&self.config.compiler_flags));
        config.linker_flags.extend(expand(&self.config.linker_flags));
        config
    }
}

impl Preprocessor for TemplatePreprocessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn preprocess_native(&self, name: &str, config: UnitConfig, app: &str) -> UnitConfig {
        self.append(name, config, app)
    }

    fn preprocess_lib(&self, name: &str, config: UnitConfig, app: &str) -> UnitConfig {
        if self.config.natives_only {
            config
        } else {
            self.append(name, config, app)
        }
    }
}

impl fmt::Debug for PreprocessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.preprocessors.keys().collect();
        names.sort();
        f.debug_struct("PreprocessorRegistry")
            .field("preprocessors", &names)
            .finish()
    }
}
