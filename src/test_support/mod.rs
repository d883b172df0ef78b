//! Test utilities and mocks for bundlex unit tests.
//!
//! The resolution core only talks to its collaborators through traits, so
//! tests swap in the mocks below to count loads and downloads or to simulate
//! missing packages without touching the network or the system registry.
//!
//! ```rust,ignore
//! use bundlex::test_support::{tarball, MockTransport};
//!
//! let transport = MockTransport::new()
//!     .with_archive("https://example.org/foo.tar.gz", tarball(&[("include/foo.h", "")]));
//! ```

pub mod fixtures;

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::core::errors::BundlexError;
use crate::core::project::PROJECT_FILE;
use crate::core::store::{LoadedDeclaration, ProjectLoader};
use crate::sources::pkg_config::{PkgConfig, PkgConfigFlags};
use crate::sources::precompiled::ArchiveTransport;

pub use fixtures::*;

/// In-memory [`ProjectLoader`] that counts loads per application.
#[derive(Debug, Default)]
pub struct MockLoader {
    projects: HashMap<String, (PathBuf, String)>,
    loads: Mutex<HashMap<String, usize>>,
    delay: Option<Duration>,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `app` at `/apps/<app>` with the given `bundlex.toml` content.
    pub fn with_project(self, app: &str, source: &str) -> Self {
        let root = PathBuf::from("/apps").join(app);
        self.with_project_at(app, root, source)
    }

    pub fn with_project_at(mut self, app: &str, root: impl Into<PathBuf>, source: &str) -> Self {
        self.projects
            .insert(app.to_string(), (root.into(), source.to_string()));
        self
    }

    /// Sleep inside every load, widening race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn load_count(&self, app: &str) -> usize {
        let loads = self.loads.lock().unwrap();
        loads.get(app).copied().unwrap_or(0)
    }
}

impl ProjectLoader for MockLoader {
    fn load(&self, app: &str) -> Result<LoadedDeclaration, BundlexError> {
        *self.loads.lock().unwrap().entry(app.to_string()).or_default() += 1;
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }

        let (root, source) =
            self.projects
                .get(app)
                .ok_or_else(|| BundlexError::UnknownApplication {
                    app: app.to_string(),
                })?;

        let mut table: toml::Table =
            toml::from_str(source).map_err(|e| BundlexError::InvalidProjectSpecification {
                app: app.to_string(),
                reason: e.to_string(),
            })?;

        Ok(LoadedDeclaration {
            file: root.join(PROJECT_FILE),
            root: root.clone(),
            declaration: table.remove("project"),
        })
    }
}

/// [`PkgConfig`] answering from a fixed package table.
#[derive(Debug, Default)]
pub struct MockPkgConfig {
    packages: HashMap<String, PkgConfigFlags>,
    queries: Mutex<Vec<String>>,
}

impl MockPkgConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_package(mut self, name: &str, flags: PkgConfigFlags) -> Self {
        self.packages.insert(name.to_string(), flags);
        self
    }

    /// Package names queried so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

impl PkgConfig for MockPkgConfig {
    fn query(&self, name: &str) -> Result<PkgConfigFlags> {
        self.queries.lock().unwrap().push(name.to_string());
        match self.packages.get(name) {
            Some(flags) => Ok(flags.clone()),
            None => bail!("Package {} was not found in the pkg-config search path", name),
        }
    }
}

/// [`ArchiveTransport`] serving in-memory archives and counting downloads.
///
/// Unknown URLs fail like an HTTP 404.
#[derive(Debug, Default)]
pub struct MockTransport {
    archives: HashMap<String, Vec<u8>>,
    downloads: Mutex<HashMap<String, usize>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_archive(mut self, url: &str, data: Vec<u8>) -> Self {
        self.archives.insert(url.to_string(), data);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn download_count(&self, url: &str) -> usize {
        self.downloads.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_downloads(&self) -> usize {
        self.downloads.lock().unwrap().values().sum()
    }
}

impl ArchiveTransport for MockTransport {
    fn download(&self, url: &str) -> Result<Vec<u8>, BundlexError> {
        *self
            .downloads
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }

        self.archives
            .get(url)
            .cloned()
            .ok_or_else(|| BundlexError::DownloadFailed {
                url: url.to_string(),
                reason: "HTTP 404 Not Found".to_string(),
            })
    }
}

/// Build a gzip-compressed tarball from `(path, contents)` pairs.
pub fn tarball(entries: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap()
}

/// Build a zip archive from `(path, contents)` pairs.
pub fn zip_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();

    for (path, contents) in entries {
        writer.start_file(*path, options).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }

    writer.finish().unwrap().into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_loader_counts() {
        let loader = MockLoader::new().with_project("shared", "[project]\n");
        assert!(loader.load("shared").unwrap().declaration.is_some());
        assert!(loader.load("missing").is_err());
        assert_eq!(loader.load_count("shared"), 1);
        assert_eq!(loader.load_count("missing"), 1);
    }

    #[test]
    fn test_mock_transport_404() {
        let transport = MockTransport::new();
        assert!(matches!(
            transport.download("https://example.org/x.tgz"),
            Err(BundlexError::DownloadFailed { .. })
        ));
        assert_eq!(transport.total_downloads(), 1);
    }
}
