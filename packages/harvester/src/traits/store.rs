//! Storage traits.
//!
//! The storage layer is split into focused traits:
//! - `DedupStore`: durable set of already-processed URLs
//! - `GeocodeCache`: durable query-key to geocode result mapping
//! - `IncidentStore`: the incident table (external collaborator)
//! - `CandidateSink`: receiver of accepted harvest candidates

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::StoreResult;
use crate::types::{
    geo::{CacheEntry, Coordinate, QueryKey},
    incident::{IncidentRecord, StoredIncident},
    page::CandidatePage,
};

/// Durable set of visited URLs.
///
/// Lookups and inserts hit the in-memory index only; `flush` persists.
/// A failed flush leaves the in-memory set untouched.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Whether the URL was already processed.
    fn contains(&self, url: &str) -> bool;

    /// Record the URL as processed. Idempotent.
    fn mark_seen(&self, url: &str);

    /// Number of URLs in the set.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persist the current set.
    async fn flush(&self) -> StoreResult<()>;

    /// Forget every URL, in memory and in storage.
    async fn reset(&self) -> StoreResult<()>;
}

/// Durable cache of geocode lookups.
#[async_trait]
pub trait GeocodeCache: Send + Sync {
    /// Get the entry for a key.
    async fn get(&self, key: &QueryKey) -> StoreResult<Option<CacheEntry>>;

    /// Store or overwrite the entry for a key.
    async fn put(&self, key: &QueryKey, entry: &CacheEntry) -> StoreResult<()>;

    /// Persist buffered entries. Backends that write through need nothing.
    async fn flush(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Persistence for incidents.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Whether an incident with the same country, category, description and
    /// place already exists.
    async fn exists(&self, record: &IncidentRecord) -> StoreResult<bool>;

    /// Insert a record, with its resolved coordinate if any. Returns the id.
    async fn insert(
        &self,
        record: &IncidentRecord,
        coordinate: Option<&Coordinate>,
    ) -> StoreResult<i64>;

    /// Incidents with a place but no coordinates, oldest first.
    async fn pending_geocode(&self) -> StoreResult<Vec<StoredIncident>>;

    /// Write a resolved coordinate back to an incident.
    async fn update_geocode(&self, id: i64, coordinate: &Coordinate) -> StoreResult<()>;
}

/// Receives accepted candidates from a harvest run.
#[async_trait]
pub trait CandidateSink: Send + Sync {
    async fn accept(&self, target: &str, page: &CandidatePage) -> StoreResult<()>;
}

#[async_trait]
impl<T: DedupStore + ?Sized> DedupStore for Arc<T> {
    fn contains(&self, url: &str) -> bool {
        (**self).contains(url)
    }

    fn mark_seen(&self, url: &str) {
        (**self).mark_seen(url)
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    async fn flush(&self) -> StoreResult<()> {
        (**self).flush().await
    }

    async fn reset(&self) -> StoreResult<()> {
        (**self).reset().await
    }
}

#[async_trait]
impl<T: GeocodeCache + ?Sized> GeocodeCache for Arc<T> {
    async fn get(&self, key: &QueryKey) -> StoreResult<Option<CacheEntry>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &QueryKey, entry: &CacheEntry) -> StoreResult<()> {
        (**self).put(key, entry).await
    }

    async fn flush(&self) -> StoreResult<()> {
        (**self).flush().await
    }
}

#[async_trait]
impl<T: IncidentStore + ?Sized> IncidentStore for Arc<T> {
    async fn exists(&self, record: &IncidentRecord) -> StoreResult<bool> {
        (**self).exists(record).await
    }

    async fn insert(
        &self,
        record: &IncidentRecord,
        coordinate: Option<&Coordinate>,
    ) -> StoreResult<i64> {
        (**self).insert(record, coordinate).await
    }

    async fn pending_geocode(&self) -> StoreResult<Vec<StoredIncident>> {
        (**self).pending_geocode().await
    }

    async fn update_geocode(&self, id: i64, coordinate: &Coordinate) -> StoreResult<()> {
        (**self).update_geocode(id, coordinate).await
    }
}

#[async_trait]
impl<T: CandidateSink + ?Sized> CandidateSink for Arc<T> {
    async fn accept(&self, target: &str, page: &CandidatePage) -> StoreResult<()> {
        (**self).accept(target, page).await
    }
}
