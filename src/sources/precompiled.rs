//! Precompiled OS dependency archives.
//!
//! A precompiled provider names an archive holding a prebuilt library. The
//! acquirer downloads it once, extracts it into a per-application cache
//! directory keyed by dependency name, and hands back the conventional
//! `include/` and `lib/` directories inside it:
//!
//! ```text
//! <cache_root>/
//! └── <app>/
//!     └── <dependency>/
//!         ├── .bundlex-artifact   # marker: url + archive sha256
//!         ├── include/
//!         └── lib/
//! ```
//!
//! Extraction happens in a staging directory next to the entry, which is
//! renamed into place once complete, so a half-extracted archive is never
//! visible to other builds.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use url::Url;
use zip::ZipArchive;

use crate::core::errors::BundlexError;
use crate::util::fs::is_plain_name;
use crate::util::hash::sha256_bytes;

/// Marker written into a completed cache entry.
pub const MARKER_FILE: &str = ".bundlex-artifact";

/// Archive formats understood by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Tar,
    Zip,
}

impl ArchiveFormat {
    /// Format implied by the URL suffix.
    pub fn from_url(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
        if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if path.ends_with(".tar") {
            Some(ArchiveFormat::Tar)
        } else if path.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else {
            None
        }
    }

    /// Format recognized from the archive's leading bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0x1f, 0x8b]) {
            Some(ArchiveFormat::TarGz)
        } else if data.starts_with(b"PK\x03\x04") || data.starts_with(b"PK\x05\x06") {
            Some(ArchiveFormat::Zip)
        } else if data.len() > 262 && &data[257..262] == b"ustar" {
            Some(ArchiveFormat::Tar)
        } else {
            None
        }
    }
}

/// Fetches and unpacks archives.
pub trait ArchiveTransport: Send + Sync {
    /// Fetch the archive bytes at `url`.
    fn download(&self, url: &str) -> Result<Vec<u8>, BundlexError>;

    /// Unpack `data` into `dest`.
    fn extract(&self, url: &str, data: &[u8], dest: &Path) -> Result<(), BundlexError> {
        extract_archive(url, data, dest).map_err(|e| BundlexError::ExtractFailed {
            url: url.to_string(),
            reason: format!("{:#}", e),
        })
    }
}

/// [`ArchiveTransport`] for `http(s)://`, `file://` and plain paths.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    timeout: Duration,
    offline: bool,
}

impl Default for HttpTransport {
    fn default() -> Self {
        HttpTransport {
            timeout: Duration::from_secs(60),
            offline: false,
        }
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Refuse network downloads; local archives still work.
    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    fn fetch_http(&self, url: &str) -> Result<Vec<u8>> {
        if self.offline {
            bail!("network access is disabled (offline mode)");
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .context("failed to create HTTP client")?;

        let response = client
            .get(url)
            .send()
            .with_context(|| format!("request to {} failed", url))?;

        if !response.status().is_success() {
            bail!("HTTP {}", response.status());
        }

        let bytes = response.bytes().context("failed to read response body")?;
        Ok(bytes.to_vec())
    }
}

impl ArchiveTransport for HttpTransport {
    fn download(&self, url: &str) -> Result<Vec<u8>, BundlexError> {
        let result = match Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => self.fetch_http(url),
            Ok(parsed) if parsed.scheme() == "file" => parsed
                .to_file_path()
                .map_err(|_| anyhow::anyhow!("not a local file url"))
                .and_then(|path| {
                    fs::read(&path).with_context(|| format!("failed to read {}", path.display()))
                }),
            Ok(parsed) if parsed.scheme().len() > 1 => {
                Err(anyhow::anyhow!("unsupported url scheme `{}`", parsed.scheme()))
            }
            // Plain paths, including Windows drive letters parsed as a scheme.
            _ => fs::read(url).with_context(|| format!("failed to read {}", url)),
        };

        result.map_err(|e| BundlexError::DownloadFailed {
            url: url.to_string(),
            reason: format!("{:#}", e),
        })
    }
}

/// Extract an archive, picking the format from the URL or the content.
pub fn extract_archive(url: &str, data: &[u8], dest: &Path) -> Result<()> {
    let format = ArchiveFormat::from_url(url)
        .or_else(|| ArchiveFormat::sniff(data))
        .ok_or_else(|| anyhow::anyhow!("unrecognized archive format"))?;

    fs::create_dir_all(dest)
        .with_context(|| format!("failed to create directory: {}", dest.display()))?;

    match format {
        ArchiveFormat::TarGz => unpack_tar(GzDecoder::new(Cursor::new(data)), dest),
        ArchiveFormat::Tar => unpack_tar(Cursor::new(data), dest),
        ArchiveFormat::Zip => unpack_zip(data, dest),
    }
}

fn unpack_tar<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive
        .unpack(dest)
        .with_context(|| format!("failed to unpack tarball into {}", dest.display()))
}

fn unpack_zip(data: &[u8], dest: &Path) -> Result<()> {
    let mut archive = ZipArchive::new(Cursor::new(data)).context("failed to read zip archive")?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).context("failed to read zip entry")?;
        let Some(relative) = entry.enclosed_name() else {
            bail!("zip entry escapes destination directory: {}", entry.name());
        };
        let path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&path)?;
            continue;
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(mode))?;
        }
    }

    Ok(())
}

/// Directories an extracted archive is expected to provide.
const LAYOUT_DIRS: &[&str] = &["include", "lib"];

/// Move the contents of a lone top-level directory up into `dir`.
///
/// Hidden entries such as `.DS_Store` are ignored when deciding. A lone
/// `include/` or `lib/` is already the expected layout and stays put.
pub fn strip_single_root(dir: &Path) -> io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
    entries.retain(|e| !e.file_name().to_string_lossy().starts_with('.'));

    if entries.len() != 1 || !entries[0].file_type()?.is_dir() {
        return Ok(());
    }
    if LAYOUT_DIRS.iter().any(|name| entries[0].file_name() == *name) {
        return Ok(());
    }

    let top_level = entries[0].path();
    for entry in fs::read_dir(&top_level)? {
        let entry = entry?;
        fs::rename(entry.path(), dir.join(entry.file_name()))?;
    }
    fs::remove_dir(top_level)
}

#[derive(Debug, Serialize, Deserialize)]
struct Marker {
    url: String,
    sha256: String,
}

/// Include and lib paths of an extracted archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcquiredArtifact {
    pub root: PathBuf,
    pub includes: Vec<PathBuf>,
    pub lib_dirs: Vec<PathBuf>,
    pub libs: Vec<String>,
}

/// Downloads and caches precompiled archives.
pub struct ArtifactAcquirer {
    cache_root: PathBuf,
    transport: Arc<dyn ArchiveTransport>,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl ArtifactAcquirer {
    pub fn new(cache_root: impl Into<PathBuf>, transport: Arc<dyn ArchiveTransport>) -> Self {
        ArtifactAcquirer {
            cache_root: cache_root.into(),
            transport,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Cache directory of `dependency` for `app`.
    ///
    /// `None` when either name would leave the cache root.
    pub fn cache_dir(&self, app: &str, dependency: &str) -> Option<PathBuf> {
        if !is_plain_name(app) || !is_plain_name(dependency) {
            return None;
        }
        let dir = self.cache_root.join(app).join(dependency);
        dir.starts_with(&self.cache_root).then_some(dir)
    }

    fn lock_for(&self, dir: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(dir.to_path_buf()).or_default().clone()
    }

    /// Make the archive at `url` available locally and return its paths.
    pub fn acquire(
        &self,
        app: &str,
        dependency: &str,
        url: &str,
        libs: &[String],
    ) -> Result<AcquiredArtifact, BundlexError> {
        let dir = self
            .cache_dir(app, dependency)
            .ok_or_else(|| BundlexError::ExtractFailed {
                url: url.to_string(),
                reason: format!("invalid cache key `{}/{}`", app, dependency),
            })?;
        let lock = self.lock_for(&dir);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        match read_marker(&dir) {
            Some(marker) if marker.url == url => {
                tracing::debug!("using cached {} for `{}`", dependency, app);
            }
            previous => {
                if let Some(marker) = previous {
                    tracing::info!(
                        "archive for {} changed from {} to {}, re-fetching",
                        dependency,
                        marker.url,
                        url
                    );
                }
                self.fetch_into(url, &dir)?;
            }
        }

        Ok(AcquiredArtifact {
            includes: vec![dir.join("include")],
            lib_dirs: vec![dir.join("lib")],
            libs: libs.to_vec(),
            root: dir,
        })
    }

    fn fetch_into(&self, url: &str, dir: &Path) -> Result<(), BundlexError> {
        let extract_failed = |reason: String| BundlexError::ExtractFailed {
            url: url.to_string(),
            reason,
        };

        tracing::info!("Downloading {}", url);
        let data = self.transport.download(url)?;

        let parent = dir
            .parent()
            .ok_or_else(|| extract_failed(format!("invalid cache path {}", dir.display())))?;
        fs::create_dir_all(parent)
            .map_err(|e| extract_failed(format!("failed to create {}: {}", parent.display(), e)))?;

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(parent)
            .map_err(|e| extract_failed(format!("failed to create staging directory: {}", e)))?;

        self.transport.extract(url, &data, staging.path())?;
        strip_single_root(staging.path())
            .map_err(|e| extract_failed(format!("failed to unwrap archive root: {}", e)))?;

        let marker = Marker {
            url: url.to_string(),
            sha256: sha256_bytes(&data),
        };
        let marker = toml::to_string(&marker).map_err(|e| extract_failed(e.to_string()))?;
        fs::write(staging.path().join(MARKER_FILE), marker)
            .map_err(|e| extract_failed(format!("failed to write marker: {}", e)))?;

        if dir.exists() {
            fs::remove_dir_all(dir).map_err(|e| {
                extract_failed(format!("failed to remove stale {}: {}", dir.display(), e))
            })?;
        }
        fs::rename(staging.path(), dir).map_err(|e| {
            extract_failed(format!("failed to move archive into {}: {}", dir.display(), e))
        })?;

        tracing::info!("Extracted {} to {}", url, dir.display());
        Ok(())
    }
}

impl std::fmt::Debug for ArtifactAcquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactAcquirer")
            .field("cache_root", &self.cache_root)
            .finish_non_exhaustive()
    }
}

fn read_marker(dir: &Path) -> Option<Marker> {
    let content = fs::read_to_string(dir.join(MARKER_FILE)).ok()?;
    toml::from_str(&content).ok()
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use tempfile::TempDir;

    use super::*;
    use crate::test_support::{tarball, zip_archive, MockTransport};

    const URL: &str = "https://example.org/ffmpeg-6.1-linux.tar.gz";

    fn ffmpeg_tarball() -> Vec<u8> {
        tarball(&[
            ("ffmpeg-6.1/include/libavcodec/avcodec.h", "/* avcodec */"),
            ("ffmpeg-6.1/lib/libavcodec.a", "!<arch>\n"),
        ])
    }

    #[test]
    fn test_acquire_extracts_and_unwraps_root() {
        let tmp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new().with_archive(URL, ffmpeg_tarball()));
        let acquirer = ArtifactAcquirer::new(tmp.path(), transport.clone());

        let libs = vec!["avcodec".to_string()];
        let artifact = acquirer.acquire("my_app", "ffmpeg", URL, &libs).unwrap();

        let root = tmp.path().join("my_app").join("ffmpeg");
        assert_eq!(artifact.root, root);
        assert_eq!(artifact.includes, vec![root.join("include")]);
        assert_eq!(artifact.lib_dirs, vec![root.join("lib")]);
        assert_eq!(artifact.libs, libs);
        assert!(root.join("include/libavcodec/avcodec.h").is_file());
        assert!(root.join(MARKER_FILE).is_file());
    }

    #[test]
    fn test_acquire_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new().with_archive(URL, ffmpeg_tarball()));
        let acquirer = ArtifactAcquirer::new(tmp.path(), transport.clone());

        let first = acquirer.acquire("my_app", "ffmpeg", URL, &[]).unwrap();
        let second = acquirer.acquire("my_app", "ffmpeg", URL, &[]).unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.download_count(URL), 1);

        // A fresh acquirer over the same cache reuses the entry on disk.
        let again = ArtifactAcquirer::new(tmp.path(), transport.clone());
        again.acquire("my_app", "ffmpeg", URL, &[]).unwrap();
        assert_eq!(transport.download_count(URL), 1);
    }

    #[test]
    fn test_changed_url_refetches() {
        let tmp = TempDir::new().unwrap();
        let newer = "https://example.org/ffmpeg-7.0-linux.tar.gz";
        let transport = Arc::new(
            MockTransport::new()
                .with_archive(URL, ffmpeg_tarball())
                .with_archive(newer, tarball(&[("include/v7.h", "")])),
        );
        let acquirer = ArtifactAcquirer::new(tmp.path(), transport.clone());

        acquirer.acquire("my_app", "ffmpeg", URL, &[]).unwrap();
        let artifact = acquirer.acquire("my_app", "ffmpeg", newer, &[]).unwrap();

        assert_eq!(transport.download_count(newer), 1);
        assert!(artifact.root.join("include/v7.h").is_file());
        assert!(!artifact.root.join("lib/libavcodec.a").exists());
    }

    #[test]
    fn test_include_only_archive_keeps_layout() {
        let tmp = TempDir::new().unwrap();
        let transport = Arc::new(
            MockTransport::new().with_archive(URL, tarball(&[("include/stb_image.h", "")])),
        );
        let acquirer = ArtifactAcquirer::new(tmp.path(), transport);

        let artifact = acquirer.acquire("my_app", "stb", URL, &[]).unwrap();
        assert!(artifact.includes[0].join("stb_image.h").is_file());
        assert!(!artifact.root.join("stb_image.h").exists());
    }

    #[test]
    fn test_lib_only_zip_keeps_layout() {
        let tmp = TempDir::new().unwrap();
        let data = zip_archive(&[("lib/libz.a", "")]);
        extract_archive("https://example.org/zlib.zip", &data, tmp.path()).unwrap();
        strip_single_root(tmp.path()).unwrap();
        assert!(tmp.path().join("lib/libz.a").is_file());
    }

    #[test]
    fn test_cache_key_cannot_leave_cache_root() {
        let tmp = TempDir::new().unwrap();
        let cache = tmp.path().join("cache");
        let victim = tmp.path().join("victim");
        fs::create_dir_all(&victim).unwrap();
        fs::write(victim.join("precious.txt"), "keep").unwrap();

        let transport = Arc::new(MockTransport::new().with_archive(URL, ffmpeg_tarball()));
        let acquirer = ArtifactAcquirer::new(&cache, transport.clone());

        assert_eq!(acquirer.cache_dir("my_app", "../../victim"), None);
        assert_eq!(acquirer.cache_dir("..", "victim"), None);
        assert_eq!(
            acquirer.cache_dir("my_app", "ffmpeg"),
            Some(cache.join("my_app").join("ffmpeg"))
        );

        let err = acquirer.acquire("my_app", "../../victim", URL, &[]).unwrap_err();
        assert!(matches!(err, BundlexError::ExtractFailed { .. }));
        assert!(victim.join("precious.txt").is_file());
        assert_eq!(transport.total_downloads(), 0);
    }

    #[test]
    fn test_concurrent_acquire_downloads_once() {
        let tmp = TempDir::new().unwrap();
        let transport = Arc::new(
            MockTransport::new()
                .with_archive(URL, ffmpeg_tarball())
                .with_delay(Duration::from_millis(20)),
        );
        let acquirer = Arc::new(ArtifactAcquirer::new(tmp.path(), transport.clone()));
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let acquirer = Arc::clone(&acquirer);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    acquirer.acquire("my_app", "ffmpeg", URL, &[]).unwrap()
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(transport.download_count(URL), 1);
    }

    #[test]
    fn test_download_failure_leaves_no_entry() {
        let tmp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new());
        let acquirer = ArtifactAcquirer::new(tmp.path(), transport);

        let err = acquirer.acquire("my_app", "ffmpeg", URL, &[]).unwrap_err();
        assert!(matches!(err, BundlexError::DownloadFailed { .. }));
        assert!(!tmp.path().join("my_app/ffmpeg").exists());
    }

    #[test]
    fn test_corrupt_archive_is_extract_failure() {
        let tmp = TempDir::new().unwrap();
        let transport =
            Arc::new(MockTransport::new().with_archive(URL, b"definitely not gzip".to_vec()));
        let acquirer = ArtifactAcquirer::new(tmp.path(), transport);

        let err = acquirer.acquire("my_app", "ffmpeg", URL, &[]).unwrap_err();
        assert!(matches!(err, BundlexError::ExtractFailed { .. }));
        assert!(!tmp.path().join("my_app/ffmpeg").exists());
    }

    #[test]
    fn test_zip_archive() {
        let tmp = TempDir::new().unwrap();
        let data = zip_archive(&[("sdl2/include/SDL.h", ""), ("sdl2/lib/SDL2.lib", "")]);
        extract_archive("https://example.org/sdl2.zip", &data, tmp.path()).unwrap();
        strip_single_root(tmp.path()).unwrap();
        assert!(tmp.path().join("include/SDL.h").is_file());
        assert!(tmp.path().join("lib/SDL2.lib").is_file());
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ArchiveFormat::from_url(URL), Some(ArchiveFormat::TarGz));
        assert_eq!(
            ArchiveFormat::from_url("https://x.org/a.TGZ?sig=1"),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(ArchiveFormat::from_url("https://x.org/a.zip"), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_url("https://x.org/download"), None);
        assert_eq!(ArchiveFormat::sniff(&ffmpeg_tarball()), Some(ArchiveFormat::TarGz));
    }

    #[test]
    fn test_file_transport_and_offline() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("local.tar.gz");
        fs::write(&archive, ffmpeg_tarball()).unwrap();

        let transport = HttpTransport::new().with_offline(true);
        let url = Url::from_file_path(&archive).unwrap().to_string();
        assert_eq!(transport.download(&url).unwrap(), ffmpeg_tarball());
        assert_eq!(
            transport.download(archive.to_str().unwrap()).unwrap(),
            ffmpeg_tarball()
        );

        let err = transport.download(URL).unwrap_err();
        match err {
            BundlexError::DownloadFailed { reason, .. } => assert!(reason.contains("offline")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
