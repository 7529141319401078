//! Geocoding types: coordinates, precision tiers, cache entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse ranking of how precise a geocoding match is.
///
/// Ordered from most to least precise, so `Exact < Country`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecisionTier {
    Exact,
    Street,
    Locality,
    Region,
    Country,
    Unknown,
}

impl PrecisionTier {
    /// Map a provider place classification to a tier.
    ///
    /// Accepts the Nominatim `addresstype` / `type` vocabulary; anything
    /// unrecognized is `Unknown`.
    pub fn from_place_type(kind: &str) -> Self {
        match kind.trim().to_lowercase().as_str() {
            "house" | "building" | "house_number" | "address" | "amenity" => Self::Exact,
            "road" | "street" | "residential" | "highway" | "neighbourhood" | "quarter" => {
                Self::Street
            }
            "city" | "town" | "village" | "hamlet" | "suburb" | "locality" | "municipality"
            | "city_district" | "borough" | "isolated_dwelling" => Self::Locality,
            "state" | "county" | "region" | "province" | "district" | "state_district" => {
                Self::Region
            }
            "country" => Self::Country,
            _ => Self::Unknown,
        }
    }

    /// Map a Nominatim `place_rank` (4 country ... 30 house) to a tier.
    pub fn from_place_rank(rank: u8) -> Self {
        match rank {
            1..=4 => Self::Country,
            5..=12 => Self::Region,
            13..=25 => Self::Locality,
            26..=27 => Self::Street,
            28..=30 => Self::Exact,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Street => "street",
            Self::Locality => "locality",
            Self::Region => "region",
            Self::Country => "country",
            Self::Unknown => "unknown",
        }
    }

    /// Inverse of [`as_str`](Self::as_str); unknown text maps to `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "exact" => Self::Exact,
            "street" => Self::Street,
            "locality" => Self::Locality,
            "region" => Self::Region,
            "country" => Self::Country,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for PrecisionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a coordinate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeocodeSource {
    Cache,
    Provider,
    Input,
}

impl GeocodeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Provider => "provider",
            Self::Input => "input",
        }
    }
}

/// A resolved coordinate with its precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
    pub precision: PrecisionTier,

    /// First-level administrative area (state, region)
    #[serde(default)]
    pub admin1: Option<String>,

    /// Second-level administrative area (county, municipality, city)
    #[serde(default)]
    pub admin2: Option<String>,

    pub source: GeocodeSource,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64, precision: PrecisionTier) -> Self {
        Self {
            lat,
            lon,
            precision,
            admin1: None,
            admin2: None,
            source: GeocodeSource::Provider,
        }
    }

    pub fn with_admin(mut self, admin1: Option<String>, admin2: Option<String>) -> Self {
        self.admin1 = admin1;
        self.admin2 = admin2;
        self
    }

    pub fn with_source(mut self, source: GeocodeSource) -> Self {
        self.source = source;
        self
    }
}

/// A single match reported by the external provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderMatch {
    pub lat: f64,
    pub lon: f64,
    pub precision: PrecisionTier,
    pub admin1: Option<String>,
    pub admin2: Option<String>,
    pub display_name: Option<String>,
}

impl ProviderMatch {
    pub fn new(lat: f64, lon: f64, precision: PrecisionTier) -> Self {
        Self {
            lat,
            lon,
            precision,
            admin1: None,
            admin2: None,
            display_name: None,
        }
    }

    pub(crate) fn into_coordinate(self) -> Coordinate {
        Coordinate::new(self.lat, self.lon, self.precision).with_admin(self.admin1, self.admin2)
    }
}

/// Normalized composite of (place text, country hint).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(String);

impl QueryKey {
    /// Wrap an already-normalized key (used by store backends).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cached outcome of a lookup that reached the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CachedResult {
    Resolved(Coordinate),
    Unresolved,
}

/// A geocode cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub query_key: QueryKey,
    pub result: CachedResult,
    pub resolved_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn resolved(query_key: QueryKey, coordinate: Coordinate) -> Self {
        Self {
            query_key,
            result: CachedResult::Resolved(coordinate),
            resolved_at: Utc::now(),
        }
    }

    pub fn unresolved(query_key: QueryKey) -> Self {
        Self {
            query_key,
            result: CachedResult::Unresolved,
            resolved_at: Utc::now(),
        }
    }
}

/// Why a resolve call produced no coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// Nothing usable in the input
    EmptyQuery,
    /// Offline mode; a later online run may retry
    NotAttempted,
    /// Provider was asked and found nothing
    NotFound,
    /// Provider failed for every query variant
    ProviderFailed,
    /// A previous attempt was cached as unresolved
    Cached,
}

impl UnresolvedReason {
    /// Whether a real lookup was attempted at some point.
    pub fn was_attempted(&self) -> bool {
        matches!(self, Self::NotFound | Self::ProviderFailed | Self::Cached)
    }
}

/// Result of [`GeocodeResolver::resolve`](crate::geocode::GeocodeResolver::resolve).
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeOutcome {
    Resolved(Coordinate),
    Unresolved(UnresolvedReason),
}

impl GeocodeOutcome {
    pub fn coordinate(&self) -> Option<&Coordinate> {
        match self {
            Self::Resolved(c) => Some(c),
            Self::Unresolved(_) => None,
        }
    }

    pub fn into_coordinate(self) -> Option<Coordinate> {
        match self {
            Self::Resolved(c) => Some(c),
            Self::Unresolved(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}
