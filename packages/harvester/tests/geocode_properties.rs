//! Geocode cache idempotence, offline fallback and provider pacing.

use harvester::geocode::query_key;
use harvester::testing::MockGeocoder;
use harvester::{
    Channel, FileGeocodeCache, GeocodeOutcome, GeocodeResolver, GeocodeSource, MemoryStore,
    PrecisionTier, ProviderMatch, RateLimiter, ResolverConfig, UnresolvedReason,
};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn tripoli() -> ProviderMatch {
    ProviderMatch::new(32.8872, 13.1913, PrecisionTier::Locality)
}

#[tokio::test]
async fn test_resolve_is_idempotent() {
    let geocoder = Arc::new(MockGeocoder::new().with_match("Tripoli", tripoli()));
    let resolver = GeocodeResolver::new(
        geocoder.clone(),
        Arc::new(MemoryStore::new()),
        RateLimiter::new(),
        ResolverConfig::online(),
    );

    let first = resolver.resolve("Tripoli", Some("Libia")).await;
    let calls = geocoder.call_count();
    let second = resolver.resolve("tripoli", Some("Libya")).await;

    assert_eq!(
        first.coordinate().map(|c| (c.lat, c.lon)),
        second.coordinate().map(|c| (c.lat, c.lon))
    );
    assert_eq!(geocoder.call_count(), calls);
}

#[tokio::test]
async fn test_offline_then_online_retry() {
    let geocoder = Arc::new(MockGeocoder::new().with_match("Benghazi", tripoli()));
    let cache = Arc::new(MemoryStore::new());

    let offline = GeocodeResolver::new(
        geocoder.clone(),
        cache.clone(),
        RateLimiter::new(),
        ResolverConfig::offline(),
    );
    assert_eq!(
        offline.resolve("Benghazi", Some("Libya")).await,
        GeocodeOutcome::Unresolved(UnresolvedReason::NotAttempted)
    );
    assert_eq!(geocoder.call_count(), 0);
    assert_eq!(cache.geocache_count(), 0);

    let online = GeocodeResolver::new(
        geocoder.clone(),
        cache.clone(),
        RateLimiter::new(),
        ResolverConfig::online(),
    );
    let outcome = online.resolve("Benghazi", Some("Libya")).await;
    assert_eq!(outcome.coordinate().unwrap().source, GeocodeSource::Provider);

    // Offline mode still serves what the online run cached.
    let cached = offline.resolve("Benghazi", Some("Libya")).await;
    assert_eq!(cached.coordinate().unwrap().source, GeocodeSource::Cache);
}

#[tokio::test]
async fn test_cache_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("geocache.json");
    let geocoder = Arc::new(MockGeocoder::new().with_match("Tripoli", tripoli()));

    {
        let cache = FileGeocodeCache::open(&path).await.unwrap();
        let resolver =
            GeocodeResolver::new(geocoder.clone(), cache, RateLimiter::new(), ResolverConfig::online());
        assert!(resolver.resolve("Tripoli", None).await.is_resolved());
        assert!(!resolver.resolve("Nowhere-on-earth", None).await.is_resolved());
        resolver.flush_cache().await;
        assert!(!resolver.is_degraded());
    }
    let calls = geocoder.call_count();

    let cache = FileGeocodeCache::open(&path).await.unwrap();
    assert_eq!(cache.len(), 2);
    let resolver = GeocodeResolver::new(geocoder.clone(), cache, RateLimiter::new(), ResolverConfig::online());

    assert!(resolver.resolve("Tripoli", None).await.is_resolved());
    assert_eq!(
        resolver.resolve("Nowhere-on-earth", None).await,
        GeocodeOutcome::Unresolved(UnresolvedReason::Cached)
    );
    assert_eq!(geocoder.call_count(), calls);
}

#[tokio::test]
async fn test_provider_calls_are_spaced() {
    let interval = Duration::from_millis(40);
    let geocoder = Arc::new(MockGeocoder::new());
    let limiter = RateLimiter::new().with_interval(Channel::Geocode, interval);
    let resolver = GeocodeResolver::new(
        geocoder.clone(),
        Arc::new(MemoryStore::new()),
        limiter,
        ResolverConfig::online(),
    );

    let start = Instant::now();
    resolver.resolve("Zliten", Some("Libya")).await;
    resolver.resolve("Khoms", Some("Libya")).await;

    // Two variants per place: four provider calls, three full intervals.
    assert_eq!(geocoder.call_count(), 4);
    assert!(start.elapsed() >= interval * 3);
}

#[tokio::test]
async fn test_shared_limiter_paces_across_resolvers() {
    let interval = Duration::from_millis(40);
    let limiter = RateLimiter::new().with_interval(Channel::Geocode, interval);
    let a = GeocodeResolver::new(
        Arc::new(MockGeocoder::new()),
        Arc::new(MemoryStore::new()),
        limiter.clone(),
        ResolverConfig::online(),
    );
    let b = GeocodeResolver::new(
        Arc::new(MockGeocoder::new()),
        Arc::new(MemoryStore::new()),
        limiter,
        ResolverConfig::online(),
    );

    let start = Instant::now();
    tokio::join!(a.resolve("Derna", None), b.resolve("Tobruk", None));

    assert!(start.elapsed() >= interval);
}

proptest! {
    #[test]
    fn prop_query_key_ignores_case_and_padding(
        place in "[A-Za-z][A-Za-z ]{0,20}[A-Za-z]",
        pad in " {0,3}",
    ) {
        let padded = format!("{pad}{}{pad}", place.to_uppercase());
        prop_assert_eq!(
            query_key(&place, Some("Libia")),
            query_key(&padded, Some(" libya "))
        );
    }
}
