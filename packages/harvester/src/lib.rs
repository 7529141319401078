//! Incident Source Harvesting Library
//!
//! Bounded, resumable site crawling and cache-first geocoding for incident
//! reports.
//!
//! # Design Philosophy
//!
//! - Every crawl terminates: `max_visits` is always finite
//! - A URL is fetched at most once across runs, except the seed
//! - External failures degrade, they never abort a batch
//! - One rate limiter per process, shared by every caller
//!
//! # Usage
//!
//! ```rust,ignore
//! use harvester::{CrawlLimits, HttpFetcher, FileDedupStore, RateLimiter, SiteCrawler};
//! use futures::StreamExt;
//! use tokio_util::sync::CancellationToken;
//!
//! let dedup = FileDedupStore::open("data/scrape_seen.json").await?;
//! let crawler = SiteCrawler::new(HttpFetcher::new("IncidentHarvester/1.0")?, dedup, RateLimiter::new());
//!
//! let pages = crawler.crawl("https://www.haitilibre.com", CrawlLimits::default(), CancellationToken::new());
//! futures::pin_mut!(pages);
//! while let Some(page) = pages.next().await {
//!     println!("{} ({} chars)", page.url, page.content.len());
//! }
//! crawler.dedup().flush().await?;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Seams for fetching, geocoding and storage
//! - [`types`] - Limits, pages, coordinates and incident records
//! - [`limiter`] - Process-wide per-channel rate limiter
//! - [`crawler`] - Site crawler and HTTP fetcher
//! - [`geocode`] - Query normalization, Nominatim provider, resolver
//! - [`stores`] - Dedup store and geocode cache backends
//! - [`harvest`] - Job configuration, orchestration and scheduling
//! - [`incidents`] - Incident import and deferred geocoding
//! - [`testing`] - Mock implementations for testing

pub mod crawler;
pub mod error;
pub mod geocode;
pub mod harvest;
pub mod incidents;
pub mod limiter;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use crawler::{HttpFetcher, SiteCrawler};
pub use error::{ConfigError, CrawlError, GeocodeError, HarvestError, StoreError};
pub use geocode::{GeocodeResolver, NominatimProvider, ResolverConfig};
pub use harvest::{
    HarvestJob, HarvestReport, HarvestSettings, Harvester, ItemCaps, JournalSink, LimitOverrides,
    SourceCatalog,
};
pub use incidents::{parse_records, ImportOptions, IncidentService, ResolveSummary};
pub use limiter::{Channel, RateLimiter};
pub use stores::{FileDedupStore, FileGeocodeCache, MemoryStore};
#[cfg(feature = "sqlite")]
pub use stores::SqliteStore;
pub use traits::{
    fetcher::PageFetcher,
    geocoder::GeocodeProvider,
    store::{CandidateSink, DedupStore, GeocodeCache, IncidentStore},
};
pub use types::{
    geo::{
        CacheEntry, CachedResult, Coordinate, GeocodeOutcome, GeocodeSource, PrecisionTier,
        ProviderMatch, QueryKey, UnresolvedReason,
    },
    incident::{BatchSummary, IncidentRecord, ParsedRecord, RecordOutcome, StoredIncident},
    limits::{CrawlLimits, Limit},
    page::{CandidatePage, FetchedPage},
};
