//! Bounded breadth-first site crawl.
//!
//! One FIFO frontier, one visit counter, one stop predicate. Every popped URL
//! counts as a visit, so a frontier full of already-seen URLs still drains
//! the `max_visits` budget and the crawl always terminates.

use async_stream::stream;
use futures::Stream;
use std::collections::{HashSet, VecDeque};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::links::{normalize_url, SiteScope};
use crate::limiter::{Channel, RateLimiter};
use crate::traits::{fetcher::PageFetcher, store::DedupStore};
use crate::types::limits::CrawlLimits;
use crate::types::page::{CandidatePage, FetchedPage};

/// Traversal state of a single crawl.
#[derive(Debug, Default)]
pub struct CrawlState {
    frontier: VecDeque<String>,
    queued: HashSet<String>,
    visited: usize,
    accepted: usize,
    failed: usize,
    dropped: usize,
}

impl CrawlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The single termination predicate, evaluated before each pop.
    pub fn should_stop(&self, limits: &CrawlLimits) -> bool {
        if self.visited >= limits.max_visits.get() {
            return true;
        }
        if let Some(max_pages) = limits.max_pages.get() {
            if self.accepted >= max_pages {
                return true;
            }
        }
        if let Some(budget) = limits.visit_budget() {
            if self.visited >= budget {
                return true;
            }
        }
        false
    }

    /// Queue a URL unless it was queued before in this crawl.
    ///
    /// The frontier holds at most `cap` URLs; extra links are dropped.
    pub fn enqueue(&mut self, url: String, cap: usize) -> bool {
        if self.queued.contains(&url) {
            return false;
        }
        if self.frontier.len() >= cap {
            self.dropped += 1;
            return false;
        }
        self.queued.insert(url.clone());
        self.frontier.push_back(url);
        true
    }

    /// Pop the next URL, counting it as a visit.
    pub fn next_visit(&mut self) -> Option<String> {
        let url = self.frontier.pop_front()?;
        self.visited += 1;
        Some(url)
    }

    pub fn visited(&self) -> usize {
        self.visited
    }

    pub fn accepted(&self) -> usize {
        self.accepted
    }

    pub fn frontier_len(&self) -> usize {
        self.frontier.len()
    }
}

/// Whether a fetched page qualifies as a candidate.
///
/// Length is measured in characters and the bound is inclusive.
pub fn is_candidate(page: &FetchedPage, min_length: usize) -> bool {
    page.title.as_deref().is_some_and(|t| !t.trim().is_empty())
        && page.content_len() >= min_length
}

/// Crawls one site at a time, yielding candidate pages as they are found.
pub struct SiteCrawler<F, D> {
    fetcher: F,
    dedup: D,
    limiter: RateLimiter,
}

impl<F, D> SiteCrawler<F, D>
where
    F: PageFetcher,
    D: DedupStore,
{
    pub fn new(fetcher: F, dedup: D, limiter: RateLimiter) -> Self {
        Self {
            fetcher,
            dedup,
            limiter,
        }
    }

    pub fn dedup(&self) -> &D {
        &self.dedup
    }

    /// Crawl `seed` within `limits`.
    ///
    /// The stream is lazy: nothing is fetched until it is polled. Cancelling
    /// `cancel` ends the stream before the next network call; pages already
    /// yielded stay valid.
    pub fn crawl<'a>(
        &'a self,
        seed: &str,
        limits: CrawlLimits,
        cancel: CancellationToken,
    ) -> impl Stream<Item = CandidatePage> + 'a {
        let seed = seed.to_string();

        stream! {
            let Some(seed_url) = normalize_url(&seed) else {
                warn!(url = %seed, "Invalid seed URL, nothing to crawl");
                return;
            };
            let Some(mut scope) = SiteScope::from_url(&seed_url) else {
                return;
            };

            let cap = limits.max_visits.get().saturating_mul(2);
            let mut state = CrawlState::new();
            let mut scope_resolved = false;
            state.enqueue(seed_url.clone(), cap);

            info!(
                url = %seed_url,
                max_pages = %limits.max_pages,
                min_length = limits.min_length,
                visit_factor = %limits.visit_factor,
                max_visits = limits.max_visits.get(),
                "Crawl starting"
            );

            loop {
                if state.should_stop(&limits) {
                    break;
                }
                let Some(url) = state.next_visit() else {
                    break;
                };

                let is_seed = url == seed_url;
                let already_seen = self.dedup.contains(&url);
                if already_seen && !is_seed {
                    debug!(url = %url, "Already seen, skipping");
                    continue;
                }

                if cancel.is_cancelled() {
                    info!(url = %seed_url, "Crawl cancelled");
                    break;
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!(url = %seed_url, "Crawl cancelled");
                        break;
                    }
                    _ = self.limiter.acquire(Channel::Fetch) => {}
                }

                let page = match self.fetcher.fetch(&url).await {
                    Ok(page) => page,
                    Err(e) => {
                        warn!(url = %url, error = %e, "Fetch failed, skipping");
                        state.failed += 1;
                        self.dedup.mark_seen(&url);
                        continue;
                    }
                };

                // Redirects of the seed (example.com -> www.example.com) move the site.
                if !scope_resolved {
                    scope_resolved = true;
                    if let Some(resolved) = normalize_url(&page.final_url)
                        .as_deref()
                        .and_then(SiteScope::from_url)
                    {
                        if resolved != scope {
                            info!(
                                original = %scope.host(),
                                resolved = %resolved.host(),
                                "Site host resolved after redirect"
                            );
                            scope = resolved;
                        }
                    }
                }

                let mut new_links = 0usize;
                for link in &page.links {
                    let Some(link) = normalize_url(link) else {
                        continue;
                    };
                    if !scope.contains(&link) || self.dedup.contains(&link) {
                        continue;
                    }
                    if state.enqueue(link, cap) {
                        new_links += 1;
                    }
                }
                debug!(url = %url, new_links, frontier = state.frontier_len(), "Page visited");

                if already_seen {
                    continue;
                }

                if is_candidate(&page, limits.min_length) {
                    self.dedup.mark_seen(&url);
                    state.accepted += 1;
                    yield CandidatePage::from_fetched(url, &seed_url, page);
                } else {
                    debug!(
                        url = %url,
                        content_len = page.content_len(),
                        min_length = limits.min_length,
                        "Not a candidate"
                    );
                }
            }

            info!(
                url = %seed_url,
                visited = state.visited,
                accepted = state.accepted,
                failed = state.failed,
                dropped_links = state.dropped,
                "Crawl finished"
            );
        }
    }
}
