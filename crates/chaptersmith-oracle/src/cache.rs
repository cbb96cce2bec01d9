//! On-disk oracle response cache.
//!
//! Keys are `sha256(model_id ‖ normalized prompt)`; writes are atomic file
//! replaces so concurrent runs can share a cache directory without locks.
//! A warm cache makes an entire segmentation run bit-for-bit reproducible.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chaptersmith_core::Result;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::oracle::TextOracle;

/// Stable cache key for a (model, prompt) pair. Whitespace runs collapse to
/// a single space so formatting drift does not defeat memoization.
pub fn cache_key(model_id: &str, prompt: &str) -> String {
    let normalized: String = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hasher = Sha256::new();
    hasher.update(model_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Disk-backed response store with an in-memory read-through index.
pub struct ResponseCache {
    dir: PathBuf,
    memo: Mutex<HashMap<String, String>>,
}

impl ResponseCache {
    /// Open (creating if needed) a cache directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            memo: Mutex::new(HashMap::new()),
        })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.txt"))
    }

    /// Fetch a cached completion. Lock-free on disk; the in-memory index
    /// only short-circuits repeat reads within a process.
    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(hit) = self.memo.lock().get(key) {
            return Some(hit.clone());
        }
        match std::fs::read_to_string(self.entry_path(key)) {
            Ok(value) => {
                self.memo.lock().insert(key.to_string(), value.clone());
                Some(value)
            }
            Err(_) => None,
        }
    }

    /// Store a completion atomically (temp file + rename).
    pub fn put(&self, key: &str, value: &str) {
        let result = (|| -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
            tmp.write_all(value.as_bytes())?;
            tmp.persist(self.entry_path(key))
                .map_err(|e| e.error)?;
            Ok(())
        })();

        if let Err(e) = result {
            warn!("Cache write failed for {}: {}", &key[..12.min(key.len())], e);
            return;
        }
        self.memo.lock().insert(key.to_string(), value.to_string());
    }
}

/// Memoizing wrapper around any oracle.
pub struct CachedOracle {
    inner: Arc<dyn TextOracle>,
    cache: Arc<ResponseCache>,
}

impl CachedOracle {
    pub fn new(inner: Arc<dyn TextOracle>, cache: Arc<ResponseCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl TextOracle for CachedOracle {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let key = cache_key(self.inner.model_id(), prompt);
        if let Some(hit) = self.cache.get(&key) {
            debug!("Cache hit: {}", &key[..12]);
            return Ok(hit);
        }
        let completion = self.inner.complete(prompt).await?;
        self.cache.put(&key, &completion);
        Ok(completion)
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}
