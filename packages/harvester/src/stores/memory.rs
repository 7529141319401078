//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::error::{StoreError, StoreResult};
use crate::traits::store::{DedupStore, GeocodeCache, IncidentStore};
use crate::types::{
    geo::{CacheEntry, Coordinate, QueryKey},
    incident::{IncidentRecord, StoredIncident},
};

/// In-memory storage for seen URLs, geocode entries and incidents.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart.
pub struct MemoryStore {
    seen: RwLock<HashSet<String>>,
    geocache: RwLock<HashMap<QueryKey, CacheEntry>>,
    incidents: RwLock<Vec<StoredIncident>>,
    next_id: AtomicI64,
    fail_writes: RwLock<bool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            seen: RwLock::new(HashSet::new()),
            geocache: RwLock::new(HashMap::new()),
            incidents: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
            fail_writes: RwLock::new(false),
        }
    }

    /// Make every durable write (flush, put, insert) fail.
    pub fn with_failing_writes(self) -> Self {
        *self.fail_writes.write().unwrap_or_else(PoisonError::into_inner) = true;
        self
    }

    /// Get the number of cached geocode entries.
    pub fn geocache_count(&self) -> usize {
        self.geocache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Snapshot of stored incidents.
    pub fn incidents(&self) -> Vec<StoredIncident> {
        self.incidents.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn check_writable(&self) -> StoreResult<()> {
        if *self.fail_writes.read().unwrap_or_else(PoisonError::into_inner) {
            return Err(StoreError::Database("memory store writes disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DedupStore for MemoryStore {
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
        self.check_writable()
    }

    async fn reset(&self) -> StoreResult<()> {
        self.seen.write().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(())
    }
}

#[async_trait]
impl GeocodeCache for MemoryStore {
    async fn get(&self, key: &QueryKey) -> StoreResult<Option<CacheEntry>> {
        Ok(self.geocache.read().unwrap_or_else(PoisonError::into_inner).get(key).cloned())
    }

    async fn put(&self, key: &QueryKey, entry: &CacheEntry) -> StoreResult<()> {
        self.check_writable()?;
        self.geocache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), entry.clone());
        Ok(())
    }
}

#[async_trait]
impl IncidentStore for MemoryStore {
    async fn exists(&self, record: &IncidentRecord) -> StoreResult<bool> {
        let place = record.place_name().unwrap_or("");
        Ok(self.incidents.read().unwrap_or_else(PoisonError::into_inner).iter().any(|i| {
            i.country.eq_ignore_ascii_case(record.country.trim())
                && i.category == record.category.trim()
                && i.description == record.description.trim()
                && i.place.as_deref().unwrap_or("") == place
        }))
    }

    async fn insert(
        &self,
        record: &IncidentRecord,
        coordinate: Option<&Coordinate>,
    ) -> StoreResult<i64> {
        self.check_writable()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.incidents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(StoredIncident::from_record(id, record, coordinate));
        Ok(id)
    }

    async fn pending_geocode(&self) -> StoreResult<Vec<StoredIncident>> {
        Ok(self
            .incidents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|i| i.needs_geocode())
            .cloned()
            .collect())
    }

    async fn update_geocode(&self, id: i64, coordinate: &Coordinate) -> StoreResult<()> {
        self.check_writable()?;
        let mut incidents = self.incidents.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(incident) = incidents.iter_mut().find(|i| i.id == id) {
            incident.apply_coordinate(coordinate);
        }
        Ok(())
    }
}
