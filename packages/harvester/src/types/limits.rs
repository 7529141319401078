//! Crawl limits and the "unbounded" sentinel.
//!
//! Raw operator input (`"full"`, `"*"`, `0`, `-5`, ...) is normalized once
//! into [`Limit`]; nothing downstream looks at raw sentinel values again.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;

/// Tokens that mean "no limit" when given for `max_pages` or `visit_factor`.
pub const UNBOUNDED_TOKENS: &[&str] = &[
    "full", "*", "all", "todo", "todos", "global", "inf", "infinite", "completo", "∞",
];

/// Hard ceiling used when neither the operator nor the page budget gives one.
pub const FALLBACK_MAX_VISITS: usize = 500;

/// Smallest accepted `min_length`.
pub const MIN_LENGTH_FLOOR: usize = 10;

/// A limit that is either a positive bound or explicitly unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Limit {
    Bounded(NonZeroUsize),
    Unbounded,
}

impl Limit {
    /// Build from an integer. Zero and negatives mean unbounded.
    pub fn from_i64(value: i64) -> Self {
        usize::try_from(value)
            .ok()
            .and_then(NonZeroUsize::new)
            .map(Limit::Bounded)
            .unwrap_or(Limit::Unbounded)
    }

    /// Parse operator input.
    ///
    /// Returns `None` when the input is neither a sentinel token nor an
    /// integer, so the caller can fall back to the next configuration layer.
    pub fn parse(raw: &str) -> Option<Self> {
        let token = raw.trim().to_lowercase();
        if token.is_empty() {
            return None;
        }
        if UNBOUNDED_TOKENS.contains(&token.as_str()) {
            return Some(Limit::Unbounded);
        }
        token.parse::<i64>().ok().map(Limit::from_i64)
    }

    /// The bound, if any.
    pub fn get(&self) -> Option<usize> {
        match self {
            Limit::Bounded(n) => Some(n.get()),
            Limit::Unbounded => None,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self, Limit::Unbounded)
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Bounded(n) => write!(f, "{}", n),
            Limit::Unbounded => write!(f, "∞"),
        }
    }
}

/// Effective limits for one crawl.
///
/// `max_visits` is always finite; it is what guarantees termination when
/// both other limits are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlLimits {
    /// Accepted candidate pages to collect before stopping
    pub max_pages: Limit,

    /// Minimum content length (chars) for a page to be a candidate (inclusive)
    pub min_length: usize,

    /// Visit budget multiplier relative to `max_pages`
    pub visit_factor: Limit,

    /// Absolute ceiling on visit attempts
    pub max_visits: NonZeroUsize,
}

impl Default for CrawlLimits {
    fn default() -> Self {
        let max_pages = Limit::from_i64(5);
        let visit_factor = Limit::from_i64(3);
        Self {
            max_pages,
            min_length: 50,
            visit_factor,
            max_visits: derive_max_visits(max_pages, visit_factor, None),
        }
    }
}

impl CrawlLimits {
    /// Limits with everything unbounded except the hard visit ceiling.
    pub fn unbounded(max_visits: NonZeroUsize) -> Self {
        Self {
            max_pages: Limit::Unbounded,
            min_length: 0,
            visit_factor: Limit::Unbounded,
            max_visits,
        }
    }

    pub fn with_max_pages(mut self, max_pages: Limit) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_min_length(mut self, min_length: usize) -> Self {
        self.min_length = min_length;
        self
    }

    pub fn with_visit_factor(mut self, visit_factor: Limit) -> Self {
        self.visit_factor = visit_factor;
        self
    }

    pub fn with_max_visits(mut self, max_visits: NonZeroUsize) -> Self {
        self.max_visits = max_visits;
        self
    }

    /// Visit budget from `max_pages * visit_factor`, when both are bounded.
    pub fn visit_budget(&self) -> Option<usize> {
        match (self.max_pages.get(), self.visit_factor.get()) {
            (Some(pages), Some(factor)) => Some(pages.saturating_mul(factor)),
            _ => None,
        }
    }
}

/// Resolve the hard visit ceiling.
///
/// An explicit value wins; otherwise `max(max_pages * visit_factor, max_pages)`
/// when the page budget is bounded; otherwise [`FALLBACK_MAX_VISITS`].
pub fn derive_max_visits(
    max_pages: Limit,
    visit_factor: Limit,
    explicit: Option<NonZeroUsize>,
) -> NonZeroUsize {
    if let Some(explicit) = explicit {
        return explicit;
    }

    let derived = match (max_pages.get(), visit_factor.get()) {
        (Some(pages), Some(factor)) => Some(pages.saturating_mul(factor).max(pages)),
        _ => None,
    };

    derived
        .and_then(NonZeroUsize::new)
        .or_else(|| NonZeroUsize::new(FALLBACK_MAX_VISITS))
        .unwrap_or(NonZeroUsize::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_normalize_to_unbounded() {
        assert_eq!(Limit::parse("full"), Some(Limit::Unbounded));
        assert_eq!(Limit::parse("*"), Some(Limit::Unbounded));
        assert_eq!(Limit::parse("0"), Some(Limit::Unbounded));
        assert_eq!(Limit::parse("-5"), Some(Limit::Unbounded));
        assert_eq!(Limit::parse(" FULL "), Some(Limit::Unbounded));
        assert_eq!(Limit::from_i64(0), Limit::Unbounded);
        assert_eq!(Limit::from_i64(-5), Limit::Unbounded);
    }

    #[test]
    fn test_parse_bounded_and_invalid() {
        assert_eq!(Limit::parse("7").and_then(|l| l.get()), Some(7));
        assert_eq!(Limit::parse("seven"), None);
        assert_eq!(Limit::parse("   "), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Limit::Unbounded.to_string(), "∞");
        assert_eq!(Limit::from_i64(12).to_string(), "12");
    }

    #[test]
    fn test_derive_max_visits() {
        let five = Limit::from_i64(5);
        let three = Limit::from_i64(3);

        assert_eq!(derive_max_visits(five, three, None).get(), 15);
        assert_eq!(
            derive_max_visits(Limit::Unbounded, three, None).get(),
            FALLBACK_MAX_VISITS
        );
        assert_eq!(
            derive_max_visits(five, three, NonZeroUsize::new(42)).get(),
            42
        );
    }

    #[test]
    fn test_visit_budget() {
        let limits = CrawlLimits::default();
        assert_eq!(limits.visit_budget(), Some(15));

        let limits = limits.with_visit_factor(Limit::Unbounded);
        assert_eq!(limits.visit_budget(), None);
    }
}
