//! Relevance filter applied to crawl candidates before they reach the sink.

use crate::types::page::CandidatePage;

/// Incident vocabulary, English and Spanish. Stems match by substring.
pub const INCIDENT_KEYWORDS: &[&str] = &[
    "attack", "killed", "deaths", "shooting", "gunfire", "explosion", "blast", "airstrike",
    "air strike", "shelling", "clash", "armed group", "militia", "kidnap", "abduction",
    "hostage", "riot", "protest", "demonstration", "looting", "robbery", "gang",
    "ataque", "muert", "herid", "tiroteo", "disparo", "explos", "bomba", "enfrentamiento",
    "enfrent", "choque", "secuest", "homicid", "asesinat", "disturb", "protesta",
    "manifestac", "bloqueo", "barricada", "saqueo",
];

/// Why a candidate was not forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotHttps,
    MissingText,
    TooShort,
    OffTopic,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::NotHttps => "not_https",
            Rejection::MissingText => "missing_text",
            Rejection::TooShort => "too_short",
            Rejection::OffTopic => "off_topic",
        }
    }
}

pub fn mentions_incident(text: &str) -> bool {
    let text = text.to_lowercase();
    INCIDENT_KEYWORDS.iter().any(|kw| text.contains(kw))
}

/// Check a candidate against the harvest filters. `None` means accept.
pub fn check(page: &CandidatePage, min_len: usize) -> Option<Rejection> {
    if !page.url.starts_with("https://") {
        return Some(Rejection::NotHttps);
    }
    if page.title.trim().is_empty() || page.content.trim().is_empty() {
        return Some(Rejection::MissingText);
    }
    if page.content.chars().count() < min_len {
        return Some(Rejection::TooShort);
    }
    if !mentions_incident(&page.title) && !mentions_incident(&page.content) {
        return Some(Rejection::OffTopic);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candidate(url: &str, title: &str, content: &str) -> CandidatePage {
        CandidatePage {
            url: url.to_string(),
            site_url: "https://news.example".to_string(),
            title: title.to_string(),
            content: content.to_string(),
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_accepts_incident_story() {
        let page = candidate(
            "https://news.example/a",
            "Clashes in Tripoli",
            "Armed clashes broke out overnight near the port, residents said.",
        );
        assert_eq!(check(&page, 20), None);
    }

    #[test]
    fn test_spanish_stems() {
        assert!(mentions_incident("Secuestran a dos comerciantes en Puerto Príncipe"));
        assert!(mentions_incident("MANIFESTACIONES en la capital"));
        assert!(!mentions_incident("Festival de cine abre sus puertas"));
    }

    #[test]
    fn test_rejections() {
        let body = "An explosion was reported in the market district this morning.";
        assert_eq!(
            check(&candidate("http://news.example/a", "Blast", body), 10),
            Some(Rejection::NotHttps)
        );
        assert_eq!(
            check(&candidate("https://news.example/a", " ", body), 10),
            Some(Rejection::MissingText)
        );
        assert_eq!(
            check(&candidate("https://news.example/a", "Blast", body), 500),
            Some(Rejection::TooShort)
        );
        assert_eq!(
            check(
                &candidate("https://news.example/a", "Weather", "Sunny skies all week long, forecasters say."),
                10
            ),
            Some(Rejection::OffTopic)
        );
    }
}
