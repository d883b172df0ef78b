//! Project descriptor store.
//!
//! The store maps application names to parsed projects. A project file is
//! located, read and parsed at most once per store; every later `get` for the
//! same application returns the same `Arc<Project>`.
//!
//! First loads are serialized per application: each key owns a slot mutex,
//! so two threads asking for `shared` wait on each other while a thread
//! asking for `codecs` proceeds. Failed loads leave the slot empty and the
//! next caller retries.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::core::errors::BundlexError;
use crate::core::parser::ProjectParser;
use crate::core::project::{Project, PROJECT_FILE};

/// Raw project declaration as read from disk.
#[derive(Debug, Clone)]
pub struct LoadedDeclaration {
    /// Project file the declaration came from
    pub file: PathBuf,
    /// Application root directory
    pub root: PathBuf,
    /// The `[project]` table, `None` when the file declares no project
    pub declaration: Option<toml::Value>,
}

/// Finds and reads the declaration of an application.
pub trait ProjectLoader: Send + Sync {
    fn load(&self, app: &str) -> Result<LoadedDeclaration, BundlexError>;
}

/// Maps application names to their directories.
///
/// Lookup order: explicitly configured paths, `<deps_dir>/<app>`, then the
/// root application itself.
#[derive(Debug, Clone, Default)]
pub struct AppLocator {
    root: Option<(String, PathBuf)>,
    apps: BTreeMap<String, PathBuf>,
    deps_dir: Option<PathBuf>,
}

impl AppLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application the command was invoked in.
    pub fn with_root(mut self, app: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.root = Some((app.into(), dir.into()));
        self
    }

    pub fn with_app(mut self, app: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.apps.insert(app.into(), dir.into());
        self
    }

    pub fn with_apps(mut self, apps: impl IntoIterator<Item = (String, PathBuf)>) -> Self {
        self.apps.extend(apps);
        self
    }

    pub fn with_deps_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.deps_dir = Some(dir.into());
        self
    }

    pub fn root_app(&self) -> Option<&str> {
        self.root.as_ref().map(|(app, _)| app.as_str())
    }

    /// Directory of `app`, if known.
    pub fn locate(&self, app: &str) -> Option<PathBuf> {
        if let Some(dir) = self.apps.get(app) {
            return Some(dir.clone());
        }

        if let Some(deps_dir) = &self.deps_dir {
            let candidate = deps_dir.join(app);
            if candidate.is_dir() {
                return Some(candidate);
            }
        }

        match &self.root {
            Some((root_app, dir)) if root_app == app => Some(dir.clone()),
            _ => None,
        }
    }
}

/// Loads `bundlex.toml` files from application directories.
#[derive(Debug, Clone)]
pub struct FsProjectLoader {
    locator: AppLocator,
}

impl FsProjectLoader {
    pub fn new(locator: AppLocator) -> Self {
        FsProjectLoader { locator }
    }
}

impl ProjectLoader for FsProjectLoader {
    fn load(&self, app: &str) -> Result<LoadedDeclaration, BundlexError> {
        let root = self
            .locator
            .locate(app)
            .ok_or_else(|| BundlexError::UnknownApplication {
                app: app.to_string(),
            })?;

        read_declaration(app, &root)
    }
}

/// Read the `[project]` table of the project file in `root`.
pub fn read_declaration(app: &str, root: &Path) -> Result<LoadedDeclaration, BundlexError> {
    let file = root.join(PROJECT_FILE);
    if !file.is_file() {
        return Err(BundlexError::NoBundlexProjectInFile { path: file });
    }

    let content = fs::read_to_string(&file).map_err(|e| {
        BundlexError::InvalidProjectSpecification {
            app: app.to_string(),
            reason: format!("failed to read {}: {}", file.display(), e),
        }
    })?;

    let mut table: toml::Table =
        toml::from_str(&content).map_err(|e| BundlexError::InvalidProjectSpecification {
            app: app.to_string(),
            reason: format!("failed to parse {}: {}", file.display(), e),
        })?;

    tracing::debug!("read project file {}", file.display());

    Ok(LoadedDeclaration {
        declaration: table.remove("project"),
        root: root.to_path_buf(),
        file,
    })
}

type Slot = Arc<Mutex<Option<Arc<Project>>>>;

/// Process-wide registry of parsed projects.
pub struct ProjectStore {
    loader: Arc<dyn ProjectLoader>,
    parser: ProjectParser,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ProjectStore {
    pub fn new(loader: Arc<dyn ProjectLoader>, parser: ProjectParser) -> Self {
        ProjectStore {
            loader,
            parser,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn parser(&self) -> &ProjectParser {
        &self.parser
    }

    pub fn loader(&self) -> &Arc<dyn ProjectLoader> {
        &self.loader
    }

    fn slot(&self, app: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(app.to_string()).or_default().clone()
    }

    /// Get the project of `app`, loading and parsing it on first use.
    pub fn get(&self, app: &str) -> Result<Arc<Project>, BundlexError> {
        let slot = self.slot(app);
        let mut entry = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(project) = entry.as_ref() {
            return Ok(Arc::clone(project));
        }

        tracing::debug!("loading project `{}`", app);
        let loaded = self.loader.load(app)?;
        let declaration = loaded
            .declaration
            .ok_or(BundlexError::NoBundlexProjectInFile { path: loaded.file })?;

        let project = Arc::new(self.parser.parse(app, &loaded.root, &declaration)?);
        *entry = Some(Arc::clone(&project));
        Ok(project)
    }

    /// Seed the store with an already parsed project.
    ///
    /// Returns the project held by the store afterwards, which is the
    /// existing one if `app` was already loaded.
    pub fn insert_if_absent(&self, project: Project) -> Arc<Project> {
        let slot = self.slot(&project.app);
        let mut entry = slot.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(entry.get_or_insert_with(|| Arc::new(project)))
    }

    /// Whether `app` has been loaded.
    pub fn contains(&self, app: &str) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(app).is_some_and(|slot| {
            slot.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some()
        })
    }
}

impl std::fmt::Debug for ProjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let mut apps: Vec<_> = slots.keys().collect();
        apps.sort();
        f.debug_struct("ProjectStore").field("apps", &apps).finish()
    }
}
