//! Page types - fetched pages and accepted candidates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A page as returned by a [`PageFetcher`](crate::traits::fetcher::PageFetcher).
///
/// Links are absolute and in document order; scoping to the crawled site
/// happens in the crawler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPage {
    /// URL that was requested
    pub url: String,

    /// URL after redirects
    pub final_url: String,

    /// Page title if available
    pub title: Option<String>,

    /// Extracted text content
    pub content: String,

    /// Outbound links, absolute, in discovery order
    #[serde(default)]
    pub links: Vec<String>,

    /// When the page was fetched
    pub fetched_at: DateTime<Utc>,
}

impl FetchedPage {
    /// Create a new fetched page with no links.
    pub fn new(url: impl Into<String>, content: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            final_url: url.clone(),
            url,
            title: None,
            content: content.into(),
            links: Vec::new(),
            fetched_at: Utc::now(),
        }
    }

    /// Set the page title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the outbound links.
    pub fn with_links(mut self, links: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.links = links.into_iter().map(Into::into).collect();
        self
    }

    /// Set the URL reached after redirects.
    pub fn with_final_url(mut self, final_url: impl Into<String>) -> Self {
        self.final_url = final_url.into();
        self
    }

    /// Content length in characters (not bytes).
    pub fn content_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// A fetched, sufficiently long page offered to the extraction collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePage {
    /// Normalized URL of the page
    pub url: String,

    /// Seed site the page was reached from
    pub site_url: String,

    /// Page title (may be empty)
    pub title: String,

    /// Extracted text content
    pub content: String,

    /// When the page was fetched
    pub fetched_at: DateTime<Utc>,
}

impl CandidatePage {
    pub(crate) fn from_fetched(url: String, site_url: &str, page: FetchedPage) -> Self {
        Self {
            url,
            site_url: site_url.to_string(),
            title: page.title.unwrap_or_default(),
            content: page.content,
            fetched_at: page.fetched_at,
        }
    }

    /// Host of the candidate URL, `"web"` when it has none.
    pub fn domain(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "web".to_string())
    }
}
