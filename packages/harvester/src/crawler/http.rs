//! HTTP page fetcher.
//!
//! Fetches a page with reqwest, caps the body size and extracts a title,
//! readable text and outbound links with the `scraper` crate.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::links::resolve_link;
use crate::error::{CrawlError, CrawlResult};
use crate::traits::fetcher::PageFetcher;
use crate::types::page::FetchedPage;

/// Responses are truncated past this many bytes.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Text blocks at or below this many characters are ignored.
const MIN_BLOCK_CHARS: usize = 40;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; IncidentHarvester/1.0)";

lazy_static! {
    static ref OG_TITLE: Selector =
        Selector::parse(r#"meta[property="og:title"], meta[name="og:title"]"#).unwrap();
    static ref TITLE: Selector = Selector::parse("title").unwrap();
    static ref TEXT_BLOCKS: Selector = Selector::parse("h1, h2, p").unwrap();
    static ref ANCHORS: Selector = Selector::parse("a[href]").unwrap();
    static ref JSON_LD: Selector =
        Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();

    // Install banners some news sites inject into every page.
    static ref NOISE_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)install\s+pwa\s+using\s+add\s+to\s+home\s+screen").unwrap(),
        Regex::new(r"(?i)for\s+ios\s+and\s+ipad\s+browsers.*add\s+to\s+(home\s+screen|dock)").unwrap(),
        Regex::new(r"(?i)add\s+to\s+home\s+screen\s+in\s+ios\s+safari").unwrap(),
    ];
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref BLANK_LINES: Regex = Regex::new(r"\n{3,}").unwrap();
}

/// Fetches pages over HTTP.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    /// Create a fetcher sending the given User-Agent.
    pub fn new(user_agent: &str) -> CrawlResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(12))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| CrawlError::Http(Box::new(e)))?;

        Ok(Self {
            client,
            max_body_bytes: MAX_BODY_BYTES,
        })
    }

    /// Set a custom HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    async fn fetch_body(&self, url: &str) -> CrawlResult<(String, Url)> {
        let target = Url::parse(url)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| CrawlError::InvalidUrl {
                url: url.to_string(),
            })?;

        let mut response = self.client.get(target).send().await.map_err(|e| {
            if e.is_timeout() {
                CrawlError::Timeout {
                    url: url.to_string(),
                }
            } else {
                CrawlError::Http(Box::new(e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| CrawlError::Http(Box::new(e)))?
        {
            if body.len() + chunk.len() > self.max_body_bytes {
                debug!(url = %url, limit = self.max_body_bytes, "Response truncated");
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok((String::from_utf8_lossy(&body).into_owned(), final_url))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> CrawlResult<FetchedPage> {
        debug!(url = %url, "HTTP fetch starting");

        let (html, final_url) = self.fetch_body(url).await.map_err(|e| {
            warn!(url = %url, error = %e, "HTTP fetch failed");
            e
        })?;

        Ok(parse_page(url, &final_url, &html))
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Build a [`FetchedPage`] from raw HTML.
pub fn parse_page(url: &str, final_url: &Url, html: &str) -> FetchedPage {
    let document = Html::parse_document(html);

    let (title, content) = match json_ld_article(&document) {
        Some((title, body)) => (
            title.filter(|t| !t.is_empty()).or_else(|| page_title(&document)),
            body,
        ),
        None => (page_title(&document), text_blocks(&document)),
    };

    let title = title
        .map(|t| strip_noise(&WHITESPACE.replace_all(&t, " ")))
        .filter(|t| !t.is_empty());
    let content = strip_noise(&content);

    let links = document
        .select(&ANCHORS)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve_link(final_url, href))
        .collect::<Vec<_>>();

    let mut page = FetchedPage::new(url, content)
        .with_final_url(final_url.as_str())
        .with_links(links);
    if let Some(title) = title {
        page = page.with_title(title);
    }
    page
}

fn page_title(document: &Html) -> Option<String> {
    document
        .select(&OG_TITLE)
        .filter_map(|m| m.value().attr("content"))
        .map(|t| t.trim().to_string())
        .find(|t| !t.is_empty())
        .or_else(|| {
            document
                .select(&TITLE)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .filter(|t| !t.is_empty())
        })
}

fn text_blocks(document: &Html) -> String {
    document
        .select(&TEXT_BLOCKS)
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .map(|t| WHITESPACE.replace_all(t.trim(), " ").into_owned())
        .filter(|t| t.chars().count() > MIN_BLOCK_CHARS)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Headline and body from an embedded schema.org `NewsArticle`/`Article`.
///
/// Some publishers only ship the article body this way.
fn json_ld_article(document: &Html) -> Option<(Option<String>, String)> {
    for script in document.select(&JSON_LD) {
        let raw = script.text().collect::<String>();
        let Ok(value) = serde_json::from_str::<serde_json::Value>(raw.trim()) else {
            continue;
        };

        let nodes = match value {
            serde_json::Value::Array(items) => items,
            other => vec![other],
        };

        for node in nodes {
            if !is_article(&node) {
                continue;
            }
            let body = match node.get("articleBody").or_else(|| node.get("description")) {
                Some(serde_json::Value::String(s)) => s.trim().to_string(),
                Some(serde_json::Value::Array(parts)) => parts
                    .iter()
                    .filter_map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join("\n"),
                _ => continue,
            };
            if body.is_empty() {
                continue;
            }
            let headline = node
                .get("headline")
                .or_else(|| node.get("name"))
                .and_then(|h| h.as_str())
                .map(|h| h.trim().to_string());
            return Some((headline, body));
        }
    }
    None
}

fn is_article(node: &serde_json::Value) -> bool {
    let matches = |t: &str| {
        let t = t.to_lowercase();
        t == "newsarticle" || t == "article"
    };
    match node.get("@type") {
        Some(serde_json::Value::String(t)) => matches(t),
        Some(serde_json::Value::Array(types)) => {
            types.iter().filter_map(|t| t.as_str()).any(matches)
        }
        _ => false,
    }
}

/// Drop noise lines, collapse intra-line whitespace, squeeze blank runs.
pub fn strip_noise(text: &str) -> String {
    let kept = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !NOISE_PATTERNS.iter().any(|p| p.is_match(line)))
        .map(|line| WHITESPACE.replace_all(line, " ").into_owned())
        .collect::<Vec<_>>()
        .join("\n");

    BLANK_LINES.replace_all(&kept, "\n\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: &str = "Armed clashes were reported overnight near the coastal road west of the city.";

    fn base() -> Url {
        Url::parse("https://news.example.com/world/").unwrap()
    }

    #[test]
    fn test_prefers_og_title() {
        let html = format!(
            r#"<html><head><title>Site | Story</title>
            <meta property="og:title" content="Story headline"></head>
            <body><p>{LONG}</p></body></html>"#
        );
        let page = parse_page("https://news.example.com/world/", &base(), &html);
        assert_eq!(page.title.as_deref(), Some("Story headline"));
    }

    #[test]
    fn test_short_blocks_are_dropped() {
        let html = format!(
            r#"<html><head><title>T</title></head>
            <body><h1>Short</h1><p>{LONG}</p><p>Also short</p></body></html>"#
        );
        let page = parse_page("https://news.example.com/world/", &base(), &html);
        assert_eq!(page.content, LONG);
    }

    #[test]
    fn test_links_are_resolved_and_filtered() {
        let html = r##"<html><body>
            <a href="/world/a.html#top">A</a>
            <a href="b.html">B</a>
            <a href="#section">Anchor</a>
            <a href="mailto:desk@example.com">Mail</a>
            <a href="https://other.org/">Other</a>
        </body></html>"##;
        let page = parse_page("https://news.example.com/world/", &base(), html);
        assert_eq!(
            page.links,
            vec![
                "https://news.example.com/world/a.html",
                "https://news.example.com/world/b.html",
                "https://other.org/",
            ]
        );
    }

    #[test]
    fn test_json_ld_article_body() {
        let html = r#"<html><head>
            <script type="application/ld+json">
            {"@type": "NewsArticle", "headline": "Port closed", "articleBody": "The port was closed after shelling."}
            </script></head><body></body></html>"#;
        let page = parse_page("https://news.example.com/world/", &base(), html);
        assert_eq!(page.title.as_deref(), Some("Port closed"));
        assert_eq!(page.content, "The port was closed after shelling.");
    }

    #[test]
    fn test_strip_noise() {
        let text = "Real line one\n\n\nInstall PWA using Add to Home Screen\n  spaced    out  ";
        assert_eq!(strip_noise(text), "Real line one\nspaced out");
    }

    #[tokio::test]
    async fn test_invalid_urls_fail_without_a_request() {
        let fetcher = HttpFetcher::new("harvester-test").unwrap();

        for url in ["not a url", "ftp://files.example.com/report.txt"] {
            assert!(matches!(
                fetcher.fetch(url).await,
                Err(CrawlError::InvalidUrl { .. })
            ));
        }
    }
}
