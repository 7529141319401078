//! URL normalization and site scoping.

use url::Url;

/// Canonical form used for dedup and frontier membership.
///
/// Scheme and host are lowercased, the fragment is dropped and a default
/// port is removed. Only `http` and `https` URLs are accepted.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.host_str()?;
    url.set_fragment(None);
    Some(url.to_string())
}

/// Resolve an `href` against the page it appeared on and normalize it.
///
/// Skips in-page anchors and non-navigational schemes.
pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
    {
        return None;
    }

    let resolved = base.join(href).ok()?;
    normalize_url(resolved.as_str())
}

/// Host and explicit port identifying a crawled site. The scheme is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteScope {
    host: String,
    port: Option<u16>,
}

impl SiteScope {
    pub fn from_url(url: &str) -> Option<Self> {
        let url = Url::parse(url).ok()?;
        Some(Self {
            host: url.host_str()?.to_lowercase(),
            port: url.port(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether `url` belongs to this site.
    pub fn contains(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .map(|u| {
                u.host_str().map(str::to_lowercase).as_deref() == Some(self.host.as_str())
                    && u.port() == self.port
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("HTTPS://Example.COM:443/News#top").as_deref(),
            Some("https://example.com/News")
        );
        assert_eq!(
            normalize_url("http://example.com:80").as_deref(),
            Some("http://example.com/")
        );
        assert_eq!(
            normalize_url("http://example.com:8080/a").as_deref(),
            Some("http://example.com:8080/a")
        );
        assert_eq!(normalize_url("ftp://example.com/file"), None);
        assert_eq!(normalize_url("not a url"), None);
    }

    #[test]
    fn test_resolve_link() {
        let base = Url::parse("https://example.com/news/index.html").unwrap();

        assert_eq!(
            resolve_link(&base, "story.html#comments").as_deref(),
            Some("https://example.com/news/story.html")
        );
        assert_eq!(
            resolve_link(&base, "/about").as_deref(),
            Some("https://example.com/about")
        );
        assert_eq!(resolve_link(&base, "#top"), None);
        assert_eq!(resolve_link(&base, "mailto:desk@example.com"), None);
        assert_eq!(resolve_link(&base, "javascript:void(0)"), None);
        assert_eq!(resolve_link(&base, "tel:+100"), None);
    }

    #[test]
    fn test_site_scope() {
        let scope = SiteScope::from_url("https://www.example.com/").unwrap();

        assert!(scope.contains("https://www.example.com/a"));
        assert!(scope.contains("https://WWW.EXAMPLE.COM/b"));
        assert!(!scope.contains("https://example.com/a"));
        assert!(!scope.contains("https://other.com/"));
        assert!(scope.contains("http://www.example.com/c"));
        assert!(!scope.contains("https://www.example.com:8443/"));
    }
}
