use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::{
    error::{DistillError, Result},
    pipeline::METHOD_VERSION,
    types::{CacheEntry, ConsolidatedSummary},
};

/// Cache key: SHA-256 of the summarization method version, source id and transcript text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(source_id: &str, transcript_text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(METHOD_VERSION.to_le_bytes());
        hasher.update(source_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(transcript_text.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where finished summaries live. Reads and writes are atomic per entry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>>;

    /// Replace any entry for `fingerprint` and return what was stored.
    async fn put(
        &self,
        fingerprint: &Fingerprint,
        payload: &ConsolidatedSummary,
    ) -> Result<CacheEntry>;
}

fn new_entry(fingerprint: &Fingerprint, payload: &ConsolidatedSummary) -> CacheEntry {
    CacheEntry {
        fingerprint: fingerprint.to_string(),
        payload: ConsolidatedSummary {
            cached: false,
            cached_at: None,
            ..payload.clone()
        },
        cached_at: Utc::now(),
    }
}

#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(fingerprint)
            .cloned())
    }

    async fn put(
        &self,
        fingerprint: &Fingerprint,
        payload: &ConsolidatedSummary,
    ) -> Result<CacheEntry> {
        let entry = new_entry(fingerprint, payload);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(fingerprint.clone(), entry.clone());
        Ok(entry)
    }
}

pub fn get_root_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("distill")
}

/// Default directory for cached summaries
pub fn get_summary_cache_dir() -> PathBuf {
    get_root_cache_dir().join("summaries")
}

/// One JSON file per fingerprint. Writes go to a temp file that is renamed into place.
pub struct FileCacheStore {
    root: PathBuf,
}

impl FileCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the path for a cached summary file
    pub fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(format!("{}.json", fingerprint))
    }

    fn io_error(path: &Path, source: std::io::Error) -> DistillError {
        DistillError::CacheIo {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(fingerprint);
        let json_content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_error(&path, e)),
        };
        let entry: CacheEntry = serde_json::from_str(&json_content)?;
        Ok(Some(entry))
    }

    async fn put(
        &self,
        fingerprint: &Fingerprint,
        payload: &ConsolidatedSummary,
    ) -> Result<CacheEntry> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Self::io_error(&self.root, e))?;

        let entry = new_entry(fingerprint, payload);
        let pretty_json = serde_json::to_string_pretty(&entry)?;

        let path = self.entry_path(fingerprint);
        let tmp_path = self
            .root
            .join(format!(".{}.{}.tmp", fingerprint, uuid::Uuid::new_v4()));

        if let Err(e) = fs::write(&tmp_path, &pretty_json).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Self::io_error(&tmp_path, e));
        }
        if let Err(e) = fs::rename(&tmp_path, &path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Self::io_error(&path, e));
        }

        Ok(entry)
    }
}
