//! Harvest job orchestration: one crawl per configured site, filtered and
//! capped, forwarded to a [`CandidateSink`].

use futures::StreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::config::{ItemCaps, LimitDefaults, LimitOverrides};
use super::filter;
use super::sources::SourceCatalog;
use crate::crawler::{
    links::{normalize_url, SiteScope},
    site::SiteCrawler,
};
use crate::error::{HarvestError, Result};
use crate::traits::{fetcher::PageFetcher, store::CandidateSink, store::DedupStore};
use crate::types::limits::CrawlLimits;

/// A request to harvest one target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvestJob {
    /// Country key or an "all" alias
    pub target: String,
    pub overrides: LimitOverrides,
}

impl HarvestJob {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            overrides: LimitOverrides::default(),
        }
    }

    pub fn with_overrides(mut self, overrides: LimitOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

/// Outcome of one site within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SiteStatus {
    Ok,
    /// Country cap already reached, site not crawled
    SkippedMaxCountry,
    /// The site's domain already hit its cap in this country
    SkippedMaxDomain,
    Error(String),
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteStatus::Ok => write!(f, "ok"),
            SiteStatus::SkippedMaxCountry => write!(f, "skip:max_country"),
            SiteStatus::SkippedMaxDomain => write!(f, "skip:max_domain"),
            SiteStatus::Error(msg) => write!(f, "error:{}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteReport {
    pub url: String,
    pub added: usize,
    pub status: SiteStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountryReport {
    pub country: String,
    pub added: usize,
    pub sites: Vec<SiteReport>,
}

/// Summary of one harvest run.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestReport {
    /// Also recorded on the run's log span
    pub run_id: Uuid,
    pub target: String,
    pub limits: CrawlLimits,
    pub caps: ItemCaps,
    pub countries: Vec<CountryReport>,
    pub total: usize,
    /// Dedup store could not be persisted after the run
    pub degraded: bool,
    pub cancelled: bool,
    /// Overrides that were ignored
    pub warnings: Vec<String>,
}

fn cap_label(cap: Option<usize>) -> String {
    cap.map(|n| n.to_string()).unwrap_or_else(|| "∞".to_string())
}

impl fmt::Display for HarvestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Harvest {} ({}): {} new item(s)",
            self.target, self.run_id, self.total
        )?;
        writeln!(
            f,
            "Limits: max_pages={} min_len={} visit_factor={} max_visits={} per_country={} per_domain={}",
            self.limits.max_pages,
            self.limits.min_length,
            self.limits.visit_factor,
            self.limits.max_visits,
            cap_label(self.caps.per_country),
            cap_label(self.caps.per_domain),
        )?;
        for country in &self.countries {
            writeln!(f, "{}: {}", country.country, country.added)?;
            for site in &country.sites {
                writeln!(f, "  {} +{} {}", site.url, site.added, site.status)?;
            }
        }
        for warning in &self.warnings {
            writeln!(f, "warning: {}", warning)?;
        }
        if self.cancelled {
            writeln!(f, "Run cancelled before completion")?;
        }
        if self.degraded {
            writeln!(f, "Degraded: visited URLs were not persisted")?;
        }
        Ok(())
    }
}

/// Item counters shared across the sites of one country.
#[derive(Default)]
struct CountryTally {
    added: usize,
    per_domain: HashMap<String, usize>,
}

/// Runs harvest jobs. Concurrent `run` calls on one harvester are
/// serialized; share it behind an `Arc` to serialize a whole process.
pub struct Harvester<F, D, S> {
    crawler: SiteCrawler<F, D>,
    sink: S,
    catalog: RwLock<SourceCatalog>,
    sources_path: Option<PathBuf>,
    defaults: LimitDefaults,
    caps: ItemCaps,
    run_lock: Mutex<()>,
}

impl<F, D, S> Harvester<F, D, S>
where
    F: PageFetcher,
    D: DedupStore,
    S: CandidateSink,
{
    pub fn new(crawler: SiteCrawler<F, D>, sink: S, catalog: SourceCatalog) -> Self {
        Self {
            crawler,
            sink,
            catalog: RwLock::new(catalog),
            sources_path: None,
            defaults: LimitDefaults::default(),
            caps: ItemCaps::default(),
            run_lock: Mutex::new(()),
        }
    }

    /// Re-read the catalog from `path` at the start of every run.
    pub fn with_sources_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources_path = Some(path.into());
        self
    }

    pub fn with_defaults(mut self, defaults: LimitDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_caps(mut self, caps: ItemCaps) -> Self {
        self.caps = caps;
        self
    }

    pub fn dedup(&self) -> &D {
        self.crawler.dedup()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run a job to completion (or cancellation).
    #[instrument(skip(self, job, cancel), fields(target = %job.target, run_id = tracing::field::Empty))]
    pub async fn run(&self, job: &HarvestJob, cancel: CancellationToken) -> Result<HarvestReport> {
        let _guard = self.run_lock.lock().await;
        let run_id = Uuid::now_v7();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        if let Some(path) = &self.sources_path {
            let fresh = SourceCatalog::load(path)?;
            *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        }
        let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner).clone();

        let countries = catalog
            .expand_target(&job.target)
            .ok_or_else(|| HarvestError::UnknownTarget {
                target: job.target.clone(),
            })?;

        let resolved = job.overrides.resolve(&self.defaults);
        let limits = resolved.limits;
        info!(
            countries = countries.len(),
            max_pages = %limits.max_pages,
            min_len = limits.min_length,
            visit_factor = %limits.visit_factor,
            max_visits = limits.max_visits.get(),
            "Harvest starting"
        );

        let mut reports = Vec::with_capacity(countries.len());
        let mut cancelled = false;
        for country in &countries {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            reports.push(
                self.harvest_country(country, catalog.urls(country), &limits, &cancel)
                    .await,
            );
        }
        cancelled |= cancel.is_cancelled();

        let degraded = match self.crawler.dedup().flush().await {
            Ok(()) => false,
            Err(e) => {
                warn!(error = %e, "Dedup flush failed, run marked degraded");
                true
            }
        };

        let total = reports.iter().map(|c| c.added).sum();
        info!(total, degraded, cancelled, "Harvest finished");

        Ok(HarvestReport {
            run_id,
            target: job.target.clone(),
            limits,
            caps: self.caps,
            countries: reports,
            total,
            degraded,
            cancelled,
            warnings: resolved.warnings,
        })
    }

    async fn harvest_country(
        &self,
        country: &str,
        urls: &[String],
        limits: &CrawlLimits,
        cancel: &CancellationToken,
    ) -> CountryReport {
        let mut tally = CountryTally::default();
        let mut sites = Vec::with_capacity(urls.len());

        for url in urls {
            if self.country_full(&tally) {
                sites.push(SiteReport {
                    url: url.clone(),
                    added: 0,
                    status: SiteStatus::SkippedMaxCountry,
                });
                continue;
            }
            if cancel.is_cancelled() {
                break;
            }
            sites.push(self.harvest_site(country, url, limits, &mut tally, cancel).await);
        }

        info!(country, added = tally.added, sites = sites.len(), "Country harvested");
        CountryReport {
            country: country.to_string(),
            added: tally.added,
            sites,
        }
    }

    async fn harvest_site(
        &self,
        country: &str,
        url: &str,
        limits: &CrawlLimits,
        tally: &mut CountryTally,
        cancel: &CancellationToken,
    ) -> SiteReport {
        let Some(seed) = normalize_url(url) else {
            warn!(country, url, "Skipping invalid site URL");
            return SiteReport {
                url: url.to_string(),
                added: 0,
                status: SiteStatus::Error("invalid URL".to_string()),
            };
        };
        if let Some(domain) = SiteScope::from_url(&seed).map(|s| s.host().to_string()) {
            if self.domain_full(tally, &domain) {
                debug!(url, domain = %domain, "Domain cap already reached, site skipped");
                return SiteReport {
                    url: url.to_string(),
                    added: 0,
                    status: SiteStatus::SkippedMaxDomain,
                };
            }
        }

        let mut added = 0;
        let mut status = SiteStatus::Ok;
        let stream = self.crawler.crawl(url, *limits, cancel.clone());
        tokio::pin!(stream);

        while let Some(page) = stream.next().await {
            if let Some(rejection) = filter::check(&page, limits.min_length) {
                debug!(url = %page.url, reason = rejection.as_str(), "Candidate filtered");
                continue;
            }

            // Yielded pages are already marked seen; stop pulling once a cap fills.
            let domain = page.domain();
            if self.domain_full(tally, &domain) {
                debug!(url = %page.url, domain = %domain, "Domain cap reached after redirect");
                break;
            }

            if let Err(e) = self.sink.accept(country, &page).await {
                warn!(url = %page.url, error = %e, "Sink rejected candidate");
                status = SiteStatus::Error(e.to_string());
                break;
            }

            added += 1;
            tally.added += 1;
            *tally.per_domain.entry(domain.clone()).or_insert(0) += 1;

            if self.country_full(tally) {
                debug!(country, "Country cap reached");
                break;
            }
            if self.domain_full(tally, &domain) {
                debug!(domain = %domain, "Domain cap reached");
                break;
            }
        }

        SiteReport {
            url: url.to_string(),
            added,
            status,
        }
    }

    fn country_full(&self, tally: &CountryTally) -> bool {
        self.caps.per_country.is_some_and(|cap| tally.added >= cap)
    }

    fn domain_full(&self, tally: &CountryTally, domain: &str) -> bool {
        let count = tally.per_domain.get(domain).copied().unwrap_or(0);
        self.caps.per_domain.is_some_and(|cap| count >= cap)
    }
}
