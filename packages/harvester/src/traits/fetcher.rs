//! Page fetcher trait.

use async_trait::async_trait;

use crate::error::CrawlResult;
use crate::types::page::FetchedPage;

/// Fetches one page and extracts its text and links.
///
/// The crawler owns traversal, limits, dedup and pacing; a fetcher only
/// performs a single request.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a single page by URL.
    async fn fetch(&self, url: &str) -> CrawlResult<FetchedPage>;

    /// Name for logging.
    fn name(&self) -> &str {
        "fetcher"
    }
}

#[async_trait]
impl<T: PageFetcher + ?Sized> PageFetcher for std::sync::Arc<T> {
    async fn fetch(&self, url: &str) -> CrawlResult<FetchedPage> {
        (**self).fetch(url).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
