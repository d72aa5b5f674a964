//! Local byte cache for encoded track audio.
//!
//! Entries are keyed by `{version}-{url}` and stored as one file per entry,
//! named by the SHA-256 of that key. Bumping the version makes every older
//! entry unreachable without any migration step.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Cache format version - increment when the stored representation changes
pub const CACHE_VERSION: &str = "v2";

const ENTRY_EXTENSION: &str = "bin";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to create cache dir {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read cache entry {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write cache entry {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to clear cache dir {path}: {source}")]
    Clear {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Filesystem-backed store mapping fetch URLs to raw encoded bytes.
///
/// Cloning is cheap; clones share the same directory. Entries are written
/// through a temp file and renamed into place, so concurrent loads of
/// different tracks never observe a half-written entry.
#[derive(Debug, Clone)]
pub struct ByteCache {
    dir: PathBuf,
    version: String,
}

impl ByteCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_version(dir, CACHE_VERSION)
    }

    pub fn with_version(dir: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            version: version.into(),
        }
    }

    /// Platform cache location (`~/.cache/stagemix/audio` on Linux).
    pub fn default_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("stagemix").join("audio"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn cache_key(&self, url: &str) -> String {
        format!("{}-{}", self.version, url)
    }

    fn entry_path(&self, url: &str) -> PathBuf {
        let digest = Sha256::digest(self.cache_key(url).as_bytes());
        self.dir
            .join(format!("{:x}.{}", digest, ENTRY_EXTENSION))
    }

    fn ensure_dir(&self) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).map_err(|source| CacheError::CreateDir {
            path: self.dir.clone(),
            source,
        })
    }

    pub fn try_get(&self, url: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.entry_path(url);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheError::Read { path, source }),
        }
    }

    pub fn try_put(&self, url: &str, bytes: &[u8]) -> Result<(), CacheError> {
        self.ensure_dir()?;
        let path = self.entry_path(url);
        let tmp = path.with_extension(format!(
            "tmp-{}-{}",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        };

        write().map_err(|source| {
            let _ = fs::remove_file(&tmp);
            CacheError::Write {
                path: path.clone(),
                source,
            }
        })
    }

    pub fn try_clear(&self) -> Result<(), CacheError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(CacheError::Clear {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        for entry in entries {
            let entry = entry.map_err(|source| CacheError::Clear {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() {
                fs::remove_file(&path).map_err(|source| CacheError::Clear { path, source })?;
            }
        }
        Ok(())
    }

    /// Cached bytes for `url`. Any read failure is logged and reported as a miss.
    pub fn get(&self, url: &str) -> Option<Vec<u8>> {
        match self.try_get(url) {
            Ok(Some(bytes)) => {
                log::debug!("[byte-cache] hit for {}", url);
                Some(bytes)
            }
            Ok(None) => {
                log::debug!("[byte-cache] miss for {}", url);
                None
            }
            Err(err) => {
                log::warn!("[byte-cache] {}", err);
                None
            }
        }
    }

    /// Stores a copy of `bytes`. Failures are logged and otherwise ignored.
    pub fn put(&self, url: &str, bytes: &[u8]) {
        match self.try_put(url, bytes) {
            Ok(()) => log::debug!("[byte-cache] cached {} ({} bytes)", url, bytes.len()),
            Err(err) => log::warn!("[byte-cache] {}", err),
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entry_path(url).is_file()
    }

    pub fn clear(&self) {
        match self.try_clear() {
            Ok(()) => log::info!("[byte-cache] cleared {}", self.dir.display()),
            Err(err) => log::warn!("[byte-cache] {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_returns_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ByteCache::new(dir.path());
        let url = "/api/download-stream?fileKey=song/lead.mp3";

        let mut buffer = vec![1u8, 2, 3, 4, 5];
        cache.put(url, &buffer);
        cache.put(url, &buffer);
        buffer[0] = 99;

        assert_eq!(cache.get(url), Some(vec![1, 2, 3, 4, 5]));
        assert_eq!(cache.get(url), Some(vec![1, 2, 3, 4, 5]));
    }

    #[test]
    fn clear_evicts_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ByteCache::new(dir.path());
        cache.put("a", b"first");
        cache.put("b", b"second");
        assert!(cache.contains("a"));

        cache.clear();

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), None);
        assert!(!cache.contains("b"));
    }

    #[test]
    fn version_bump_invalidates_old_entries() {
        let dir = tempfile::tempdir().unwrap();
        let old = ByteCache::with_version(dir.path(), "v1");
        old.put("track.wav", b"old format");

        let new = ByteCache::with_version(dir.path(), "v2");
        assert_eq!(new.get("track.wav"), None);
        assert_eq!(old.get("track.wav"), Some(b"old format".to_vec()));
        assert_eq!(new.cache_key("track.wav"), "v2-track.wav");
    }

    #[test]
    fn unusable_dir_degrades_to_miss() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"file").unwrap();
        let cache = ByteCache::new(blocker.join("cache"));

        cache.put("url", b"bytes");
        assert_eq!(cache.get("url"), None);
        assert!(cache.try_put("url", b"bytes").is_err());
    }

    #[test]
    fn clear_on_missing_dir_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ByteCache::new(dir.path().join("never-created"));
        assert!(cache.try_clear().is_ok());
    }
}
