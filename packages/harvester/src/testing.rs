//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the harvester library
//! without making real network calls.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{CrawlError, CrawlResult, GeocodeError, GeocodeResult, StoreResult};
use crate::traits::{fetcher::PageFetcher, geocoder::GeocodeProvider, store::CandidateSink};
use crate::types::{
    geo::ProviderMatch,
    page::{CandidatePage, FetchedPage},
};

type PageGenerator = Arc<dyn Fn(&str) -> Option<FetchedPage> + Send + Sync>;

/// A mock fetcher serving a fixed site graph.
///
/// Unknown URLs fail like a 404 unless a generator is installed.
#[derive(Default, Clone)]
pub struct MockFetcher {
    /// Predefined pages by URL
    pages: Arc<RwLock<HashMap<String, FetchedPage>>>,

    /// URLs that should fail
    fail_urls: Arc<RwLock<Vec<String>>>,

    /// Fallback for URLs without a predefined page
    generator: Option<PageGenerator>,

    /// Fetched URLs in call order
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockFetcher {
    /// Create a new mock fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predefined page, keyed by its URL.
    pub fn with_page(self, page: FetchedPage) -> Self {
        self.pages.write().unwrap_or_else(PoisonError::into_inner).insert(page.url.clone(), page);
        self
    }

    /// Add a titled page with content and links.
    pub fn with_site_page(
        self,
        url: &str,
        content: impl Into<String>,
        links: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let page = FetchedPage::new(url, content)
            .with_title(format!("Page {url}"))
            .with_links(links);
        self.with_page(page)
    }

    /// Serve pages for URLs without a predefined page.
    pub fn with_generator(
        mut self,
        generator: impl Fn(&str) -> Option<FetchedPage> + Send + Sync + 'static,
    ) -> Self {
        self.generator = Some(Arc::new(generator));
        self
    }

    /// Mark a URL as failing.
    pub fn fail_url(self, url: impl Into<String>) -> Self {
        self.fail_urls.write().unwrap_or_else(PoisonError::into_inner).push(url.into());
        self
    }

    /// URLs fetched so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// How many times a URL was fetched.
    pub fn fetch_count(&self, url: &str) -> usize {
        self.calls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|u| *u == url)
            .count()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> CrawlResult<FetchedPage> {
        self.calls.write().unwrap_or_else(PoisonError::into_inner).push(url.to_string());

        if self.fail_urls.read().unwrap_or_else(PoisonError::into_inner).iter().any(|u| u == url) {
            return Err(CrawlError::Http(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Mock connection refused",
            ))));
        }

        let page = self.pages.read().unwrap_or_else(PoisonError::into_inner).get(url).cloned();
        page.or_else(|| self.generator.as_ref().and_then(|g| g(url)))
            .ok_or_else(|| CrawlError::Status {
                url: url.to_string(),
                status: 404,
            })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum GeocoderFailure {
    Error,
    Throttled,
}

/// A mock geocoding provider with canned matches and a call counter.
#[derive(Default, Clone)]
pub struct MockGeocoder {
    /// Matches by lowercased query
    matches: Arc<RwLock<HashMap<String, ProviderMatch>>>,

    failure: Option<GeocoderFailure>,

    /// Queries received, in order
    queries: Arc<RwLock<Vec<String>>>,

    calls: Arc<AtomicUsize>,
}

impl MockGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `query` (case-insensitive) with `found`.
    pub fn with_match(self, query: &str, found: ProviderMatch) -> Self {
        self.matches
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(query.to_lowercase(), found);
        self
    }

    /// Fail every lookup with a transport error.
    pub fn failing(mut self) -> Self {
        self.failure = Some(GeocoderFailure::Error);
        self
    }

    /// Answer every lookup with HTTP 429.
    pub fn throttled(mut self) -> Self {
        self.failure = Some(GeocoderFailure::Throttled);
        self
    }

    /// Number of provider calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl GeocodeProvider for MockGeocoder {
    async fn lookup(&self, query: &str) -> GeocodeResult<Option<ProviderMatch>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.write().unwrap_or_else(PoisonError::into_inner).push(query.to_string());

        match self.failure {
            Some(GeocoderFailure::Error) => Err(GeocodeError::Http(Box::new(
                std::io::Error::new(std::io::ErrorKind::TimedOut, "Mock timeout"),
            ))),
            Some(GeocoderFailure::Throttled) => Err(GeocodeError::Throttled { status: 429 }),
            None => Ok(self
                .matches
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&query.to_lowercase())
                .cloned()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// A sink that keeps every accepted candidate in memory.
#[derive(Default)]
pub struct CollectingSink {
    accepted: RwLock<Vec<(String, CandidatePage)>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepted candidates with their target, in arrival order.
    pub fn accepted(&self) -> Vec<(String, CandidatePage)> {
        self.accepted.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.accepted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, page)| page.url.clone())
            .collect()
    }
}

#[async_trait]
impl CandidateSink for CollectingSink {
    async fn accept(&self, target: &str, page: &CandidatePage) -> StoreResult<()> {
        self.accepted
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((target.to_string(), page.clone()));
        Ok(())
    }
}
