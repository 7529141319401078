//! Cache-first geocode resolution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::query::{build_queries, canonical_country, query_key};
use crate::error::GeocodeError;
use crate::limiter::{Channel, RateLimiter};
use crate::traits::{geocoder::GeocodeProvider, store::GeocodeCache};
use crate::types::geo::{
    CacheEntry, CachedResult, GeocodeOutcome, GeocodeSource, QueryKey, UnresolvedReason,
};

/// Resolver behavior, fixed at construction.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Never call the provider; cache hits are still served
    pub offline: bool,

    /// Pause after the provider signals throttling
    pub throttle_cooldown: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            offline: false,
            throttle_cooldown: Duration::from_secs(5),
        }
    }
}

impl ResolverConfig {
    pub fn online() -> Self {
        Self::default()
    }

    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn with_throttle_cooldown(mut self, cooldown: Duration) -> Self {
        self.throttle_cooldown = cooldown;
        self
    }
}

/// Resolves free-text places to coordinates through a durable cache.
///
/// Provider and cache failures never escape: they surface as
/// [`GeocodeOutcome::Unresolved`] and log lines.
pub struct GeocodeResolver<P, C> {
    provider: P,
    cache: C,
    limiter: RateLimiter,
    config: ResolverConfig,
    degraded: AtomicBool,
}

impl<P, C> GeocodeResolver<P, C>
where
    P: GeocodeProvider,
    C: GeocodeCache,
{
    pub fn new(provider: P, cache: C, limiter: RateLimiter, config: ResolverConfig) -> Self {
        Self {
            provider,
            cache,
            limiter,
            config,
            degraded: AtomicBool::new(false),
        }
    }

    pub fn is_offline(&self) -> bool {
        self.config.offline
    }

    /// Whether a cache write has failed during this process.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Resolve a place with an optional country hint.
    pub async fn resolve(&self, place: &str, country_hint: Option<&str>) -> GeocodeOutcome {
        self.resolve_with_cancel(place, country_hint, &CancellationToken::new())
            .await
    }

    /// Like [`resolve`](Self::resolve), stopping before the next provider
    /// call once `cancel` fires. A cancelled resolve caches nothing.
    #[instrument(skip(self, cancel), fields(provider = self.provider.name()))]
    pub async fn resolve_with_cancel(
        &self,
        place: &str,
        country_hint: Option<&str>,
        cancel: &CancellationToken,
    ) -> GeocodeOutcome {
        if place.trim().is_empty() {
            return GeocodeOutcome::Unresolved(UnresolvedReason::EmptyQuery);
        }

        let country = canonical_country(country_hint);
        let key = query_key(place, country.as_deref());

        match self.cache.get(&key).await {
            Ok(Some(entry)) => {
                debug!(key = %key, "Geocode cache hit");
                return match entry.result {
                    CachedResult::Resolved(coordinate) => {
                        GeocodeOutcome::Resolved(coordinate.with_source(GeocodeSource::Cache))
                    }
                    CachedResult::Unresolved => {
                        GeocodeOutcome::Unresolved(UnresolvedReason::Cached)
                    }
                };
            }
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "Geocode cache read failed, treating as miss"),
        }

        if self.config.offline {
            debug!(key = %key, "Offline mode, skipping provider");
            return GeocodeOutcome::Unresolved(UnresolvedReason::NotAttempted);
        }

        let queries = build_queries(place, country.as_deref());
        if queries.is_empty() {
            return GeocodeOutcome::Unresolved(UnresolvedReason::EmptyQuery);
        }

        let mut answered = false;
        for query in &queries {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return GeocodeOutcome::Unresolved(UnresolvedReason::NotAttempted);
                }
                _ = self.limiter.acquire(Channel::Geocode) => {}
            }

            match self.provider.lookup(query).await {
                Ok(Some(found)) => {
                    let coordinate = found.into_coordinate();
                    info!(
                        key = %key,
                        query = %query,
                        lat = coordinate.lat,
                        lon = coordinate.lon,
                        precision = %coordinate.precision,
                        "Geocoded"
                    );
                    self.store(&key, CacheEntry::resolved(key.clone(), coordinate.clone()))
                        .await;
                    return GeocodeOutcome::Resolved(coordinate);
                }
                Ok(None) => {
                    answered = true;
                    debug!(query = %query, "No match");
                }
                Err(GeocodeError::Throttled { status }) => {
                    warn!(
                        query = %query,
                        status,
                        cooldown_ms = self.config.throttle_cooldown.as_millis() as u64,
                        "Geocoding provider throttled, backing off"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return GeocodeOutcome::Unresolved(UnresolvedReason::NotAttempted);
                        }
                        _ = tokio::time::sleep(self.config.throttle_cooldown) => {}
                    }
                }
                Err(e) => {
                    warn!(query = %query, error = %e, "Geocoding lookup failed");
                }
            }
        }

        let reason = if answered {
            UnresolvedReason::NotFound
        } else {
            UnresolvedReason::ProviderFailed
        };
        info!(key = %key, attempts = queries.len(), reason = ?reason, "Place not resolved");
        self.store(&key, CacheEntry::unresolved(key.clone())).await;
        GeocodeOutcome::Unresolved(reason)
    }

    /// Persist cache entries buffered by the backend. Failures are logged
    /// and mark the resolver degraded.
    pub async fn flush_cache(&self) {
        if let Err(e) = self.cache.flush().await {
            self.degraded.store(true, Ordering::SeqCst);
            warn!(error = %e, "Geocode cache flush failed, entries kept in memory");
        }
    }

    async fn store(&self, key: &QueryKey, entry: CacheEntry) {
        if let Err(e) = self.cache.put(key, &entry).await {
            self.degraded.store(true, Ordering::SeqCst);
            warn!(key = %key, error = %e, "Geocode cache write failed, continuing without persistence");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::testing::MockGeocoder;
    use crate::types::geo::{PrecisionTier, ProviderMatch};
    use std::sync::Arc;

    fn resolver(
        geocoder: Arc<MockGeocoder>,
        cache: Arc<MemoryStore>,
        config: ResolverConfig,
    ) -> GeocodeResolver<Arc<MockGeocoder>, Arc<MemoryStore>> {
        GeocodeResolver::new(geocoder, cache, RateLimiter::new(), config)
    }

    #[tokio::test]
    async fn test_second_resolve_hits_cache() {
        let geocoder = Arc::new(
            MockGeocoder::new()
                .with_match("Zawiya", ProviderMatch::new(32.75, 12.72, PrecisionTier::Locality)),
        );
        let cache = Arc::new(MemoryStore::new());
        let resolver = resolver(geocoder.clone(), cache, ResolverConfig::online());

        let first = resolver.resolve("Zawiya", Some("Libya")).await;
        let second = resolver.resolve("  zawiya ", Some("libia")).await;

        assert!(first.is_resolved());
        assert_eq!(first.coordinate().unwrap().lat, second.coordinate().unwrap().lat);
        assert_eq!(second.coordinate().unwrap().source, GeocodeSource::Cache);
        assert_eq!(geocoder.call_count(), 1);
    }

    #[tokio::test]
    async fn test_falls_through_variants() {
        let geocoder = Arc::new(
            MockGeocoder::new()
                .with_match("Tripoli, Libya", ProviderMatch::new(32.88, 13.19, PrecisionTier::Locality)),
        );
        let cache = Arc::new(MemoryStore::new());
        let resolver = resolver(geocoder.clone(), cache, ResolverConfig::online());

        let outcome = resolver.resolve("Tripoli", Some("Libya")).await;

        assert!(outcome.is_resolved());
        assert_eq!(geocoder.queries(), vec!["Tripoli", "Tripoli, Libya"]);
    }

    #[tokio::test]
    async fn test_unresolved_is_cached() {
        let geocoder = Arc::new(MockGeocoder::new());
        let cache = Arc::new(MemoryStore::new());
        let resolver = resolver(geocoder.clone(), cache, ResolverConfig::online());

        let first = resolver.resolve("Atlantis", None).await;
        let calls = geocoder.call_count();
        let second = resolver.resolve("Atlantis", None).await;

        assert_eq!(first, GeocodeOutcome::Unresolved(UnresolvedReason::NotFound));
        assert_eq!(second, GeocodeOutcome::Unresolved(UnresolvedReason::Cached));
        assert_eq!(geocoder.call_count(), calls);
    }

    #[tokio::test]
    async fn test_provider_errors_do_not_propagate() {
        let geocoder = Arc::new(MockGeocoder::new().failing());
        let cache = Arc::new(MemoryStore::new());
        let resolver = resolver(geocoder, cache, ResolverConfig::online());

        let outcome = resolver.resolve("Sirte", Some("Libya")).await;
        assert_eq!(
            outcome,
            GeocodeOutcome::Unresolved(UnresolvedReason::ProviderFailed)
        );
    }

    #[tokio::test]
    async fn test_throttle_backs_off() {
        let geocoder = Arc::new(MockGeocoder::new().throttled());
        let cache = Arc::new(MemoryStore::new());
        let cooldown = Duration::from_millis(30);
        let resolver = resolver(
            geocoder.clone(),
            cache,
            ResolverConfig::online().with_throttle_cooldown(cooldown),
        );

        let start = std::time::Instant::now();
        resolver.resolve("Sirte", Some("Libya")).await;

        // Two variants, each followed by a cooldown.
        assert_eq!(geocoder.call_count(), 2);
        assert!(start.elapsed() >= cooldown * 2);
    }

    #[tokio::test]
    async fn test_cache_write_failure_degrades() {
        let geocoder = Arc::new(
            MockGeocoder::new()
                .with_match("Misrata", ProviderMatch::new(32.37, 15.09, PrecisionTier::Locality)),
        );
        let cache = Arc::new(MemoryStore::new().with_failing_writes());
        let resolver = resolver(geocoder, cache, ResolverConfig::online());

        let outcome = resolver.resolve("Misrata", None).await;

        assert!(outcome.is_resolved());
        assert!(resolver.is_degraded());
    }

    #[tokio::test]
    async fn test_empty_place() {
        let geocoder = Arc::new(MockGeocoder::new());
        let resolver = resolver(geocoder.clone(), Arc::new(MemoryStore::new()), ResolverConfig::online());

        assert_eq!(
            resolver.resolve("   ", Some("Libya")).await,
            GeocodeOutcome::Unresolved(UnresolvedReason::EmptyQuery)
        );
        assert_eq!(geocoder.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_resolve_caches_nothing() {
        let geocoder = Arc::new(MockGeocoder::new());
        let cache = Arc::new(MemoryStore::new());
        let resolver = resolver(geocoder.clone(), cache.clone(), ResolverConfig::online());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = resolver.resolve_with_cancel("Sabha", None, &cancel).await;

        assert_eq!(outcome, GeocodeOutcome::Unresolved(UnresolvedReason::NotAttempted));
        assert_eq!(geocoder.call_count(), 0);
        assert_eq!(cache.geocache_count(), 0);
    }
}
