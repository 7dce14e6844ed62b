//! File-backed media cache.
//!
//! Caches downloaded media payloads under a single directory the cache
//! exclusively owns. State is an `index.json` written atomically
//! (temp → rename) plus one payload file per entry named `<key><ext>`,
//! where the key is the SHA-256 of the source URL.
//!
//! Eviction is LRU by `lastAccessAtMs` under a byte cap; TTL-expired entries
//! are deleted by whichever read or write traverses them first. Integrity
//! verification on `get` is configurable: `size` compares the on-disk length,
//! `hash` recomputes SHA-256, `none` just refreshes the recorded size.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::error::{CacheError, CacheResult};
use crate::fs::move_file;

const INDEX_FILE: &str = "index.json";
const INDEX_VERSION: u32 = 1;

/// Integrity verification mode for cache hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VerifyMode {
    #[default]
    Size,
    Hash,
    None,
}

impl FromStr for VerifyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "size" => Ok(VerifyMode::Size),
            "hash" => Ok(VerifyMode::Hash),
            "none" => Ok(VerifyMode::None),
            other => Err(format!("unknown verify mode '{other}'")),
        }
    }
}

/// One cached download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaCacheEntry {
    pub url: String,
    /// `<key><ext>`, relative to the cache directory.
    pub file_name: String,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Original download filename, when the source supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub created_at_ms: i64,
    pub last_access_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MediaIndex {
    version: u32,
    entries: HashMap<String, MediaCacheEntry>,
}

impl Default for MediaIndex {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            entries: HashMap::new(),
        }
    }
}

/// Media cache configuration.
#[derive(Debug, Clone)]
pub struct MediaCacheConfig {
    pub dir: PathBuf,
    pub max_bytes: u64,
    pub ttl_ms: Option<i64>,
    pub verify: VerifyMode,
}

/// The media cache. Exclusively owns its directory and index.
pub struct MediaCache {
    config: MediaCacheConfig,
    state: Mutex<MediaIndex>,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Cache key: SHA-256 hex over the trimmed URL.
fn cache_key(url: &str) -> String {
    format!("{:x}", Sha256::digest(url.trim().as_bytes()))
}

/// Infer a payload extension (with dot) from filename, URL path, or MIME type.
fn infer_extension(url: &str, media_type: Option<&str>, filename: Option<&str>) -> String {
    let from_name = |name: &str| {
        name.rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
    };

    if let Some(ext) = filename.and_then(from_name) {
        return format!(".{ext}");
    }
    if let Some(ext) = Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments().and_then(|s| s.last().map(String::from)))
        .as_deref()
        .and_then(from_name)
    {
        return format!(".{ext}");
    }
    match media_type {
        Some("audio/mpeg") => ".mp3".to_string(),
        Some("audio/mp4") | Some("audio/x-m4a") => ".m4a".to_string(),
        Some("audio/wav") | Some("audio/x-wav") => ".wav".to_string(),
        Some("video/mp4") => ".mp4".to_string(),
        Some("video/webm") => ".webm".to_string(),
        Some("application/pdf") => ".pdf".to_string(),
        _ => String::new(),
    }
}

async fn sha256_file(path: &Path) -> CacheResult<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

impl MediaCache {
    /// Open the cache, loading the index. A corrupt index starts empty.
    pub async fn open(config: MediaCacheConfig) -> CacheResult<Self> {
        tokio::fs::create_dir_all(&config.dir)
            .await
            .map_err(|_| CacheError::DirectoryUnavailable(config.dir.clone()))?;

        let index_path = config.dir.join(INDEX_FILE);
        let index = match tokio::fs::read(&index_path).await {
            Ok(bytes) => match serde_json::from_slice::<MediaIndex>(&bytes) {
                Ok(index) if index.version == INDEX_VERSION => index,
                Ok(_) | Err(_) => {
                    warn!(path = %index_path.display(), "Corrupt or foreign media index, starting empty");
                    MediaIndex::default()
                }
            },
            Err(_) => MediaIndex::default(),
        };

        Ok(Self {
            config,
            state: Mutex::new(index),
        })
    }

    fn payload_path(&self, entry: &MediaCacheEntry) -> PathBuf {
        self.config.dir.join(&entry.file_name)
    }

    async fn persist(&self, index: &MediaIndex) -> CacheResult<()> {
        let tmp = self.config.dir.join(format!("{INDEX_FILE}.tmp"));
        let final_path = self.config.dir.join(INDEX_FILE);
        let bytes = serde_json::to_vec_pretty(index)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &final_path).await?;
        Ok(())
    }

    async fn remove_entry(&self, index: &mut MediaIndex, key: &str) {
        if let Some(entry) = index.entries.remove(key) {
            let path = self.payload_path(&entry);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to delete cached payload");
                }
            }
        }
    }

    /// Delete entries whose TTL has elapsed.
    async fn sweep_expired(&self, index: &mut MediaIndex, now: i64) {
        let expired: Vec<String> = index
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at_ms.is_some_and(|exp| exp <= now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            debug!(key = %key, "Media cache TTL sweep");
            self.remove_entry(index, &key).await;
        }
    }

    /// Evict by ascending access time until under the byte cap.
    async fn evict_over_cap(&self, index: &mut MediaIndex) {
        loop {
            let total: u64 = index.entries.values().map(|e| e.size_bytes).sum();
            if total <= self.config.max_bytes {
                return;
            }
            let victim = index
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access_at_ms)
                .map(|(k, _)| k.clone());
            match victim {
                Some(key) => {
                    debug!(key = %key, "Media cache evicted LRU entry over byte cap");
                    self.remove_entry(index, &key).await;
                }
                None => return,
            }
        }
    }

    /// Store a downloaded payload.
    ///
    /// Only http(s) URLs are cacheable; other schemes return `None` without
    /// touching the source. Sources over the byte cap are rejected (`None`).
    /// The source file is moved (rename, copy+unlink across filesystems).
    pub async fn put(
        &self,
        url: &str,
        source: &Path,
        media_type: Option<&str>,
        filename: Option<&str>,
    ) -> CacheResult<Option<PathBuf>> {
        self.put_at(url, source, media_type, filename, now_ms()).await
    }

    pub(crate) async fn put_at(
        &self,
        url: &str,
        source: &Path,
        media_type: Option<&str>,
        filename: Option<&str>,
        now: i64,
    ) -> CacheResult<Option<PathBuf>> {
        let scheme_ok = Url::parse(url)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !scheme_ok {
            return Ok(None);
        }

        let size_bytes = tokio::fs::metadata(source).await?.len();
        if size_bytes > self.config.max_bytes {
            debug!(url = %url, size_bytes, "Source exceeds media cache cap, not caching");
            return Ok(None);
        }

        let mut index = self.state.lock().await;
        self.sweep_expired(&mut index, now).await;

        let key = cache_key(url);
        let ext = infer_extension(url, media_type, filename);
        let file_name = format!("{key}{ext}");
        let dest = self.config.dir.join(&file_name);

        move_file(source, &dest).await?;

        let sha256 = if self.config.verify == VerifyMode::Hash {
            Some(sha256_file(&dest).await?)
        } else {
            None
        };

        index.entries.insert(
            key,
            MediaCacheEntry {
                url: url.to_string(),
                file_name,
                size_bytes,
                sha256,
                media_type: media_type.map(String::from),
                filename: filename.map(String::from),
                created_at_ms: now,
                last_access_at_ms: now,
                expires_at_ms: self.config.ttl_ms.map(|ttl| now + ttl),
            },
        );

        self.evict_over_cap(&mut index).await;
        self.persist(&index).await?;
        Ok(Some(dest))
    }

    /// Look up a cached payload, verifying per the configured mode.
    pub async fn get(&self, url: &str) -> CacheResult<Option<PathBuf>> {
        self.get_at(url, now_ms()).await
    }

    pub(crate) async fn get_at(&self, url: &str, now: i64) -> CacheResult<Option<PathBuf>> {
        let mut index = self.state.lock().await;
        let before = index.entries.len();
        self.sweep_expired(&mut index, now).await;

        let key = cache_key(url);
        let Some(entry) = index.entries.get(&key).cloned() else {
            if index.entries.len() != before {
                self.persist(&index).await?;
            }
            return Ok(None);
        };

        let path = self.payload_path(&entry);
        let meta = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(_) => {
                debug!(url = %url, "Cached payload missing on disk, dropping entry");
                index.entries.remove(&key);
                self.persist(&index).await?;
                return Ok(None);
            }
        };

        // Decide before mutating; eviction and refresh both need the map.
        let refreshed_sha = match self.config.verify {
            VerifyMode::Size => {
                if meta.len() != entry.size_bytes {
                    debug!(url = %url, "Cached payload size mismatch, evicting");
                    self.remove_entry(&mut index, &key).await;
                    self.persist(&index).await?;
                    return Ok(None);
                }
                None
            }
            VerifyMode::Hash => {
                let actual = sha256_file(&path).await?;
                if entry.sha256.as_deref().is_some_and(|stored| stored != actual) {
                    debug!(url = %url, "Cached payload hash mismatch, evicting");
                    self.remove_entry(&mut index, &key).await;
                    self.persist(&index).await?;
                    return Ok(None);
                }
                Some(actual)
            }
            VerifyMode::None => None,
        };

        let entry = index.entries.get_mut(&key).expect("entry just observed");
        if let Some(sha) = refreshed_sha {
            entry.sha256 = Some(sha);
        }
        entry.size_bytes = meta.len();
        entry.last_access_at_ms = now;
        self.persist(&index).await?;
        Ok(Some(path))
    }

    /// Remove every entry and payload (`--clear-cache`).
    pub async fn clear(&self) -> CacheResult<()> {
        let mut index = self.state.lock().await;
        let keys: Vec<String> = index.entries.keys().cloned().collect();
        for key in keys {
            self.remove_entry(&mut index, &key).await;
        }
        self.persist(&index).await
    }

    /// Entry count and total payload size.
    pub async fn stats(&self) -> (u64, u64) {
        let index = self.state.lock().await;
        let total: u64 = index.entries.values().map(|e| e.size_bytes).sum();
        (index.entries.len() as u64, total)
    }
}
