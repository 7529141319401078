//! Wiring of settings into concrete harvesters and services.

use anyhow::{Context, Result};
use harvester::{
    Channel, FileDedupStore, FileGeocodeCache, GeocodeResolver, HarvestSettings, Harvester,
    HttpFetcher, IncidentService, JournalSink, NominatimProvider, RateLimiter, ResolverConfig,
    SiteCrawler, SourceCatalog, SqliteStore,
};

pub type CliHarvester = Harvester<HttpFetcher, FileDedupStore, JournalSink>;
pub type CliIncidents = IncidentService<NominatimProvider, FileGeocodeCache, SqliteStore>;

pub struct AppContext {
    pub settings: HarvestSettings,
    /// Shared by every component that calls out.
    pub limiter: RateLimiter,
}

impl AppContext {
    pub fn from_env() -> Result<Self> {
        let settings = HarvestSettings::from_env().context("Failed to load configuration")?;
        let limiter = RateLimiter::new()
            .with_interval(Channel::Geocode, settings.geocode_min_interval)
            .with_interval(Channel::Fetch, settings.fetch_min_interval);

        tracing::debug!(
            data_dir = %settings.data_dir.display(),
            offline = settings.geocoder_offline,
            "Configuration loaded"
        );
        Ok(Self { settings, limiter })
    }

    pub async fn dedup_store(&self) -> Result<FileDedupStore> {
        let path = self.settings.seen_path();
        FileDedupStore::open(&path)
            .await
            .with_context(|| format!("Failed to open seen-URL store {}", path.display()))
    }

    pub async fn harvester(&self) -> Result<CliHarvester> {
        let fetcher =
            HttpFetcher::new(&self.settings.harvest_user_agent).context("Failed to build HTTP client")?;
        let crawler = SiteCrawler::new(fetcher, self.dedup_store().await?, self.limiter.clone());

        Ok(Harvester::new(
            crawler,
            JournalSink::new(&self.settings.data_dir),
            SourceCatalog::default(),
        )
        .with_sources_file(self.settings.sources_path())
        .with_defaults(self.settings.limits)
        .with_caps(self.settings.caps))
    }

    pub async fn incidents(&self) -> Result<CliIncidents> {
        tokio::fs::create_dir_all(&self.settings.data_dir)
            .await
            .context("Failed to create data directory")?;

        let store = SqliteStore::new(&self.settings.database_url())
            .await
            .context("Failed to open incident database")?;
        let cache_path = self.settings.geocache_path();
        let cache = FileGeocodeCache::open(&cache_path)
            .await
            .with_context(|| format!("Failed to open geocode cache {}", cache_path.display()))?;
        let provider = NominatimProvider::new(self.settings.geocoder_user_agent.clone())
            .context("Failed to build geocoding client")?;
        let config = if self.settings.geocoder_offline {
            ResolverConfig::offline()
        } else {
            ResolverConfig::online()
        };

        let resolver = GeocodeResolver::new(provider, cache, self.limiter.clone(), config);
        Ok(IncidentService::new(resolver, store))
    }
}
