use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use bytes::Bytes;

use super::CacheStore;
use crate::{Error, Result};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Cache storing one file per key under a root directory.
///
/// Entries are the raw feed bytes with no envelope; the file modification
/// time is the entry's write time.
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Open a cache rooted at `root`, creating the directory if needed.
    ///
    /// Fails with [`Error::Config`] when the directory cannot be created or
    /// written to, since every later write would fail as well.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        std::fs::create_dir_all(&root).map_err(|e| {
            Error::Config(format!(
                "Cannot create cache directory {}: {}",
                root.display(),
                e
            ))
        })?;

        let probe = root.join(format!(".probe-{}", std::process::id()));
        std::fs::write(&probe, b"").map_err(|e| {
            Error::Config(format!(
                "Cache directory {} is not writable: {}",
                root.display(),
                e
            ))
        })?;
        let _ = std::fs::remove_file(&probe);

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the entry file for a key
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn temp_path_for(&self, key: &str) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(format!(".{}.{}.{}.tmp", key, std::process::id(), n))
    }

    /// Remove every entry (and leftover temp file) in the cache directory.
    /// Returns the number of files removed.
    pub async fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        let mut dir = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let is_entry = name.len() == 40 && name.chars().all(|c| c.is_ascii_hexdigit());
            let is_temp = name.starts_with('.') && name.ends_with(".tmp");
            if !(is_entry || is_temp) {
                continue;
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Failed to remove cache file {}: {}", name, e),
            }
        }

        Ok(removed)
    }
}

#[async_trait::async_trait]
impl CacheStore for FileCache {
    async fn exists(&self, key: &str) -> bool {
        tokio::fs::metadata(self.path_for(key))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn age(&self, key: &str) -> Result<Duration> {
        let metadata = tokio::fs::metadata(self.path_for(key))
            .await
            .map_err(|e| not_found_or_io(e, key))?;
        let modified = metadata.modified()?;

        // A timestamp in the future (clock skew) counts as brand new.
        Ok(SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO))
    }

    async fn read(&self, key: &str) -> Result<Bytes> {
        let data = tokio::fs::read(self.path_for(key))
            .await
            .map_err(|e| not_found_or_io(e, key))?;
        Ok(Bytes::from(data))
    }

    async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let temp = self.temp_path_for(key);
        let target = self.path_for(key);

        let result = async {
            tokio::fs::write(&temp, data).await?;
            tokio::fs::rename(&temp, &target).await
        }
        .await;

        result.map_err(|source| {
            let _ = std::fs::remove_file(&temp);
            Error::CacheWrite {
                key: key.to_string(),
                source,
            }
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

fn not_found_or_io(e: std::io::Error, key: &str) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::CacheMiss(key.to_string())
    } else {
        Error::Io(e)
    }
}
