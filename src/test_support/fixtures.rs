//! On-disk application fixtures.

use std::fs;
use std::path::{Path, PathBuf};

use crate::core::project::PROJECT_FILE;

/// An application directory to materialize in a temp dir.
#[derive(Debug, Clone)]
pub struct AppFixture {
    pub name: String,
    /// `bundlex.toml` content
    pub manifest: String,
    /// Files relative to the application root
    pub files: Vec<(PathBuf, String)>,
}

impl AppFixture {
    pub fn new(name: impl Into<String>, manifest: impl Into<String>) -> Self {
        AppFixture {
            name: name.into(),
            manifest: manifest.into(),
            files: Vec::new(),
        }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.files.push((path.into(), contents.into()));
        self
    }

    /// Add a C source under `c_src/<app>/`.
    pub fn with_source(self, file: &str) -> Self {
        let path = PathBuf::from("c_src").join(&self.name).join(file);
        self.with_file(path, minimal_c_source())
    }

    /// Write the application into `dir` and return its root.
    pub fn write(&self, dir: &Path) -> PathBuf {
        let root = dir.join(&self.name);
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(PROJECT_FILE), &self.manifest).unwrap();

        for (path, contents) in &self.files {
            let path = root.join(path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, contents).unwrap();
        }
        root
    }
}

/// Write `root` into `dir` and every dependency under `<root>/deps/`.
pub fn write_workspace(dir: &Path, root: &AppFixture, deps: &[AppFixture]) -> PathBuf {
    let root_dir = root.write(dir);
    let deps_dir = root_dir.join("deps");
    for dep in deps {
        dep.write(&deps_dir);
    }
    root_dir
}

pub fn minimal_c_source() -> &'static str {
    "int bundlex_fixture(void) { return 0; }\n"
}
