//! JSON-file backed stores.
//!
//! Both stores keep their full contents in memory and rewrite the file on
//! persist. Writes go to a sibling temp file that is then renamed over the
//! target, so a crash mid-write never leaves a truncated file behind.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use tokio::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::{DedupStore, GeocodeCache};
use crate::types::geo::{CacheEntry, QueryKey};

#[derive(Debug, Default, Serialize, Deserialize)]
struct SeenFile {
    #[serde(default)]
    urls: BTreeSet<String>,
}

/// Dedup store persisted as a JSON document.
pub struct FileDedupStore {
    path: PathBuf,
    seen: RwLock<HashSet<String>>,
    degraded: AtomicBool,
    write_lock: Mutex<()>,
}

impl FileDedupStore {
    /// Open the store, loading any previously flushed URLs.
    ///
    /// A missing file is an empty store. An unreadable or corrupt file is
    /// an error so it is never silently overwritten.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let seen = match tokio::fs::read_to_string(&path).await {
            Ok(data) if data.trim().is_empty() => HashSet::new(),
            Ok(data) => {
                let file: SeenFile = serde_json::from_str(&data)?;
                file.urls.into_iter().collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        tracing::debug!(path = %path.display(), urls = seen.len(), "Loaded seen URLs");

        Ok(Self {
            path,
            seen: RwLock::new(seen),
            degraded: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the last flush failed. Cleared by the next successful flush.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> SeenFile {
        SeenFile {
            urls: self
                .seen
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .cloned()
                .collect(),
        }
    }
}

#[async_trait]
impl DedupStore for FileDedupStore {
    fn contains(&self, url: &str) -> bool {
        self.seen.read().unwrap_or_else(PoisonError::into_inner).contains(url)
    }

    fn mark_seen(&self, url: &str) {
        self.seen.write().unwrap_or_else(PoisonError::into_inner).insert(url.to_string());
    }

    fn len(&self) -> usize {
        self.seen.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn flush(&self) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let data = serde_json::to_vec_pretty(&self.snapshot())?;

        match write_atomic(&self.path, &data).await {
            Ok(()) => {
                if self.degraded.swap(false, Ordering::SeqCst) {
                    tracing::info!(path = %self.path.display(), "Seen-URL store recovered");
                }
                Ok(())
            }
            Err(e) => {
                self.degraded.store(true, Ordering::SeqCst);
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to persist seen URLs, continuing in memory"
                );
                Err(e)
            }
        }
    }

    async fn reset(&self) -> StoreResult<()> {
        self.seen.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.flush().await
    }
}

/// Unsaved entries that trigger a rewrite from `put`.
const GEOCACHE_WRITE_BATCH: usize = 32;

/// Geocode cache persisted as a JSON object keyed by query key.
///
/// Puts are written in batches of [`GEOCACHE_WRITE_BATCH`]; `flush` writes
/// whatever is left.
pub struct FileGeocodeCache {
    path: PathBuf,
    entries: RwLock<HashMap<QueryKey, CacheEntry>>,
    unsaved: AtomicUsize,
    write_lock: Mutex<()>,
}

impl FileGeocodeCache {
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let entries: HashMap<QueryKey, CacheEntry> = match tokio::fs::read_to_string(&path).await
        {
            Ok(data) if data.trim().is_empty() => HashMap::new(),
            Ok(data) => serde_json::from_str(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "Loaded geocode cache");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
            unsaved: AtomicUsize::new(0),
            write_lock: Mutex::new(()),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries put since the last successful write.
    pub fn unsaved(&self) -> usize {
        self.unsaved.load(Ordering::SeqCst)
    }

    async fn persist(&self) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let pending = self.unsaved.swap(0, Ordering::SeqCst);
        if pending == 0 {
            return Ok(());
        }

        let data = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            let ordered: BTreeMap<&QueryKey, &CacheEntry> = entries.iter().collect();
            serde_json::to_vec_pretty(&ordered)?
        };
        if let Err(e) = write_atomic(&self.path, &data).await {
            self.unsaved.fetch_add(pending, Ordering::SeqCst);
            return Err(e);
        }
        tracing::debug!(path = %self.path.display(), written = pending, "Geocode cache saved");
        Ok(())
    }
}

#[async_trait]
impl GeocodeCache for FileGeocodeCache {
    async fn get(&self, key: &QueryKey) -> StoreResult<Option<CacheEntry>> {
        Ok(self.entries.read().unwrap_or_else(PoisonError::into_inner).get(key).cloned())
    }

    /// Updates memory first; a failed write still leaves the entry usable
    /// for the rest of the process.
    async fn put(&self, key: &QueryKey, entry: &CacheEntry) -> StoreResult<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), entry.clone());

        if self.unsaved.fetch_add(1, Ordering::SeqCst) + 1 >= GEOCACHE_WRITE_BATCH {
            self.persist().await?;
        }
        Ok(())
    }

    async fn flush(&self) -> StoreResult<()> {
        self.persist().await
    }
}

/// Write `data` to a temp file next to `path`, then rename it into place.
async fn write_atomic(path: &Path, data: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, data)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::io(path, e))
}
