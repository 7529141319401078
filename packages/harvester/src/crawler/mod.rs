//! Site crawling: the bounded traversal, the HTTP fetcher and URL helpers.

pub mod http;
pub mod links;
pub mod site;

pub use http::HttpFetcher;
pub use links::{normalize_url, SiteScope};
pub use site::{CrawlState, SiteCrawler};
