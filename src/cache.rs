//! On-disk memoization of fetched series keyed by (identifier, date range).

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::series::{DateRange, RawSeries};

const CACHE_FILE_EXTENSION: &str = "json";

/// Hex SHA-256 of `"{id}_{start}_{end}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn compute_cache_key(id: &str, range: &DateRange) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(format!("{id}_{}_{}", range.start(), range.end()));
    CacheKey(hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(RawSeries),
    Miss,
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid cache path: {0}")]
    InvalidPath(PathBuf),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    key: String,
    series: RawSeries,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesCache {
    dir: PathBuf,
}

impl SeriesCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir
            .join(format!("{}.{CACHE_FILE_EXTENSION}", key.as_str()))
    }

    pub fn lookup(&self, key: &CacheKey) -> CacheLookup {
        let path = self.entry_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return CacheLookup::Miss,
            Err(err) => return CacheLookup::Corrupt(format!("read failed: {err}")),
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(err) => return CacheLookup::Corrupt(format!("decode failed: {err}")),
        };

        if entry.key != key.as_str() {
            return CacheLookup::Corrupt(format!(
                "entry key {} does not match requested key",
                entry.key
            ));
        }
        if !entry.series.is_well_formed() {
            return CacheLookup::Corrupt("observations are not strictly increasing".to_string());
        }

        CacheLookup::Hit(entry.series)
    }

    /// Corrupt and unreadable entries count as misses.
    pub fn load(&self, key: &CacheKey) -> Option<RawSeries> {
        match self.lookup(key) {
            CacheLookup::Hit(series) => Some(series),
            CacheLookup::Miss => None,
            CacheLookup::Corrupt(reason) => {
                warn!(
                    component = "cache",
                    event = "cache.entry.corrupt",
                    key = key.as_str(),
                    path = %self.entry_path(key).display(),
                    reason = %reason
                );
                None
            }
        }
    }

    pub fn try_save(&self, key: &CacheKey, series: &RawSeries) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;
        let entry = CacheEntry {
            key: key.as_str().to_string(),
            series: series.clone(),
        };
        let bytes = serde_json::to_vec(&entry)?;
        write_atomic(&self.entry_path(key), &bytes)?;

        debug!(
            component = "cache",
            event = "cache.entry.saved",
            key = key.as_str(),
            observations = series.len(),
            bytes = bytes.len()
        );
        Ok(())
    }

    /// Best-effort write; returns whether the entry landed on disk.
    pub fn save(&self, key: &CacheKey, series: &RawSeries) -> bool {
        match self.try_save(key, series) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    component = "cache",
                    event = "cache.entry.write_failed",
                    key = key.as_str(),
                    error = %err
                );
                false
            }
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| CacheError::InvalidPath(path.to_path_buf()))?;
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}
