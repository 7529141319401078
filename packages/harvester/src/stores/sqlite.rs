//! SQLite storage implementation.
//!
//! A file-based backend holding the incident table, the geocode cache and
//! the seen-URL set in one database. Good for:
//! - Single-host deployments
//! - Local development against real data

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use crate::error::{StoreError, StoreResult};
use crate::traits::store::{DedupStore, GeocodeCache, IncidentStore};
use crate::types::{
    geo::{CacheEntry, CachedResult, Coordinate, GeocodeSource, PrecisionTier, QueryKey},
    incident::{IncidentRecord, StoredIncident},
};

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(Box::new(e))
}

fn parse_time(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Database(format!("Invalid date {raw:?}: {e}").into()))
}

fn parse_source(raw: &str) -> Option<GeocodeSource> {
    match raw {
        "cache" => Some(GeocodeSource::Cache),
        "provider" => Some(GeocodeSource::Provider),
        "input" => Some(GeocodeSource::Input),
        _ => None,
    }
}

/// SQLite-backed store.
pub struct SqliteStore {
    pool: SqlitePool,
    seen: RwLock<HashSet<String>>,
    pending_seen: RwLock<Vec<String>>,
}

impl SqliteStore {
    /// Create a new SQLite store with the given connection URL.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` - In-memory database (ephemeral)
    /// - `sqlite://./data/harvest.db?mode=rwc` - Create if not exists
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(db_err)?;

        let store = Self {
            pool,
            seen: RwLock::new(HashSet::new()),
            pending_seen: RwLock::new(Vec::new()),
        };
        store.run_migrations().await?;
        store.load_seen().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub async fn in_memory() -> StoreResult<Self> {
        Self::new("sqlite::memory:").await
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS incidents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                country TEXT NOT NULL,
                category TEXT NOT NULL,
                description TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                lat REAL,
                lon REAL,
                place TEXT,
                admin1 TEXT,
                admin2 TEXT,
                precision TEXT,
                geocode_source TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_incidents_country ON incidents(country);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS geocache (
                query_key TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                lat REAL,
                lon REAL,
                precision TEXT,
                admin1 TEXT,
                admin2 TEXT,
                resolved_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seen_urls (
                url TEXT PRIMARY KEY,
                seen_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn load_seen(&self) -> StoreResult<()> {
        let urls: Vec<(String,)> = sqlx::query_as("SELECT url FROM seen_urls")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        self.seen
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(urls.into_iter().map(|(url,)| url));
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(Debug, FromRow)]
struct GeocacheRow {
    query_key: String,
    status: String,
    lat: Option<f64>,
    lon: Option<f64>,
    precision: Option<String>,
    admin1: Option<String>,
    admin2: Option<String>,
    resolved_at: String,
}

impl GeocacheRow {
    fn into_entry(self) -> StoreResult<CacheEntry> {
        let result = match (self.status.as_str(), self.lat, self.lon) {
            ("resolved", Some(lat), Some(lon)) => {
                let precision = self
                    .precision
                    .as_deref()
                    .map(PrecisionTier::parse)
                    .unwrap_or(PrecisionTier::Unknown);
                CachedResult::Resolved(
                    Coordinate::new(lat, lon, precision)
                        .with_admin(self.admin1, self.admin2)
                        .with_source(GeocodeSource::Cache),
                )
            }
            _ => CachedResult::Unresolved,
        };

        Ok(CacheEntry {
            query_key: QueryKey::from_raw(self.query_key),
            result,
            resolved_at: parse_time(&self.resolved_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct IncidentRow {
    id: i64,
    country: String,
    category: String,
    description: String,
    source: String,
    lat: Option<f64>,
    lon: Option<f64>,
    place: Option<String>,
    admin1: Option<String>,
    admin2: Option<String>,
    precision: Option<String>,
    geocode_source: Option<String>,
    created_at: String,
    updated_at: String,
}

impl IncidentRow {
    fn into_incident(self) -> StoreResult<StoredIncident> {
        Ok(StoredIncident {
            id: self.id,
            country: self.country,
            category: self.category,
            description: self.description,
            source: self.source,
            lat: self.lat,
            lon: self.lon,
            place: self.place,
            admin1: self.admin1,
            admin2: self.admin2,
            precision: self.precision.as_deref().map(PrecisionTier::parse),
            geocode_source: self.geocode_source.as_deref().and_then(parse_source),
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
        })
    }
}

#[async_trait]
impl DedupStore for SqliteStore {
    fn contains(&self, url: &str) -> bool {
        self.seen.read().unwrap_or_else(PoisonError::into_inner).contains(url)
    }

    fn mark_seen(&self, url: &str) {
        if self.seen.write().unwrap_or_else(PoisonError::into_inner).insert(url.to_string()) {
            self.pending_seen.write().unwrap_or_else(PoisonError::into_inner).push(url.to_string());
        }
    }

    fn len(&self) -> usize {
        self.seen.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn flush(&self) -> StoreResult<()> {
        let pending = std::mem::take(
            &mut *self
                .pending_seen
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if pending.is_empty() {
            return Ok(());
        }

        let result = async {
            let now = Utc::now().to_rfc3339();
            let mut tx = self.pool.begin().await.map_err(db_err)?;
            for url in &pending {
                sqlx::query("INSERT OR IGNORE INTO seen_urls (url, seen_at) VALUES (?, ?)")
                    .bind(url)
                    .bind(&now)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
            }
            tx.commit().await.map_err(db_err)
        }
        .await;

        if result.is_err() {
            // Keep them queued for the next flush.
            self.pending_seen.write().unwrap_or_else(PoisonError::into_inner).extend(pending);
        }
        result
    }

    async fn reset(&self) -> StoreResult<()> {
        sqlx::query("DELETE FROM seen_urls")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        self.seen.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.pending_seen.write().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(())
    }
}

#[async_trait]
impl GeocodeCache for SqliteStore {
    async fn get(&self, key: &QueryKey) -> StoreResult<Option<CacheEntry>> {
        let row: Option<GeocacheRow> = sqlx::query_as(
            "SELECT query_key, status, lat, lon, precision, admin1, admin2, resolved_at
             FROM geocache WHERE query_key = ?",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(GeocacheRow::into_entry).transpose()
    }

    async fn put(&self, key: &QueryKey, entry: &CacheEntry) -> StoreResult<()> {
        let (status, coordinate) = match &entry.result {
            CachedResult::Resolved(c) => ("resolved", Some(c)),
            CachedResult::Unresolved => ("unresolved", None),
        };

        sqlx::query(
            r#"
            INSERT INTO geocache (query_key, status, lat, lon, precision, admin1, admin2, resolved_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(query_key) DO UPDATE SET
                status = excluded.status,
                lat = excluded.lat,
                lon = excluded.lon,
                precision = excluded.precision,
                admin1 = excluded.admin1,
                admin2 = excluded.admin2,
                resolved_at = excluded.resolved_at
            "#,
        )
        .bind(key.as_str())
        .bind(status)
        .bind(coordinate.map(|c| c.lat))
        .bind(coordinate.map(|c| c.lon))
        .bind(coordinate.map(|c| c.precision.as_str()))
        .bind(coordinate.and_then(|c| c.admin1.clone()))
        .bind(coordinate.and_then(|c| c.admin2.clone()))
        .bind(entry.resolved_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}

#[async_trait]
impl IncidentStore for SqliteStore {
    async fn exists(&self, record: &IncidentRecord) -> StoreResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT id FROM incidents
            WHERE lower(country) = lower(?)
              AND category = ?
              AND description = ?
              AND COALESCE(place, '') = ?
            LIMIT 1
            "#,
        )
        .bind(record.country.trim())
        .bind(record.category.trim())
        .bind(record.description.trim())
        .bind(record.place_name().unwrap_or(""))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.is_some())
    }

    async fn insert(
        &self,
        record: &IncidentRecord,
        coordinate: Option<&Coordinate>,
    ) -> StoreResult<i64> {
        let incident = StoredIncident::from_record(0, record, coordinate);

        let result = sqlx::query(
            r#"
            INSERT INTO incidents
                (country, category, description, source, lat, lon, place,
                 admin1, admin2, precision, geocode_source, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&incident.country)
        .bind(&incident.category)
        .bind(&incident.description)
        .bind(&incident.source)
        .bind(incident.lat)
        .bind(incident.lon)
        .bind(&incident.place)
        .bind(&incident.admin1)
        .bind(&incident.admin2)
        .bind(incident.precision.map(|p| p.as_str()))
        .bind(incident.geocode_source.map(|s| s.as_str()))
        .bind(incident.created_at.to_rfc3339())
        .bind(incident.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.last_insert_rowid())
    }

    async fn pending_geocode(&self) -> StoreResult<Vec<StoredIncident>> {
        let rows: Vec<IncidentRow> = sqlx::query_as(
            r#"
            SELECT * FROM incidents
            WHERE (lat IS NULL OR lon IS NULL)
              AND place IS NOT NULL AND trim(place) <> ''
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(IncidentRow::into_incident).collect()
    }

    async fn update_geocode(&self, id: i64, coordinate: &Coordinate) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE incidents
            SET lat = ?, lon = ?, admin1 = ?, admin2 = ?, precision = ?,
                geocode_source = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(coordinate.lat)
        .bind(coordinate.lon)
        .bind(&coordinate.admin1)
        .bind(&coordinate.admin2)
        .bind(coordinate.precision.as_str())
        .bind(coordinate.source.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_geocache_roundtrip() {
        let store = SqliteStore::in_memory().await.unwrap();
        let key = QueryKey::from_raw("misrata||libya");
        let coordinate = Coordinate::new(32.37, 15.09, PrecisionTier::Locality)
            .with_admin(Some("Misrata District".into()), None);

        store
            .put(&key, &CacheEntry::resolved(key.clone(), coordinate))
            .await
            .unwrap();

        let entry = store.get(&key).await.unwrap().unwrap();
        match entry.result {
            CachedResult::Resolved(c) => {
                assert_eq!(c.precision, PrecisionTier::Locality);
                assert_eq!(c.admin1.as_deref(), Some("Misrata District"));
                assert_eq!(c.source, GeocodeSource::Cache);
            }
            CachedResult::Unresolved => panic!("expected resolved entry"),
        }

        store
            .put(&key, &CacheEntry::unresolved(key.clone()))
            .await
            .unwrap();
        let entry = store.get(&key).await.unwrap().unwrap();
        assert_eq!(entry.result, CachedResult::Unresolved);
    }

    #[tokio::test]
    async fn test_incident_lifecycle() {
        let store = SqliteStore::in_memory().await.unwrap();
        let record = IncidentRecord::new("Haiti", "A2", "Gang attack on convoy")
            .with_source("report")
            .with_place("Croix-des-Bouquets");

        let id = store.insert(&record, None).await.unwrap();
        assert!(store.exists(&record).await.unwrap());

        let pending = store.pending_geocode().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);

        let coordinate = Coordinate::new(18.57, -72.22, PrecisionTier::Locality);
        store.update_geocode(id, &coordinate).await.unwrap();
        assert!(store.pending_geocode().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_seen_urls_flush_and_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("harvest.db").display());

        let store = SqliteStore::new(&url).await.unwrap();
        store.mark_seen("https://example.com/a");
        DedupStore::flush(&store).await.unwrap();
        store.pool().close().await;

        let reopened = SqliteStore::new(&url).await.unwrap();
        assert!(reopened.contains("https://example.com/a"));
    }
}
