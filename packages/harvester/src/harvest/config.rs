//! Harvest configuration.
//!
//! Limits are layered: job override > environment default > built-in
//! fallback. Every layer goes through the same parsers, so sentinel values
//! are normalized exactly once, here.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::error::ConfigError;
use crate::types::limits::{derive_max_visits, CrawlLimits, Limit, MIN_LENGTH_FLOOR};

pub const DEFAULT_MAX_PAGES: i64 = 5;
pub const DEFAULT_MIN_LEN: usize = 50;
pub const DEFAULT_VISIT_FACTOR: i64 = 3;
pub const DEFAULT_MAX_ITEMS_PER_COUNTRY: usize = 200;
pub const DEFAULT_MAX_ITEMS_PER_DOMAIN: usize = 50;
pub const DEFAULT_GEOCODE_INTERVAL_MS: u64 = 1050;
pub const DEFAULT_FETCH_INTERVAL_MS: u64 = 100;
/// Every six hours, on the hour.
pub const DEFAULT_CRON: &str = "0 0 */6 * * *";

/// Environment-level limit defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitDefaults {
    pub max_pages: Limit,
    pub min_len: usize,
    pub visit_factor: Limit,
    /// `None` means derive from the page budget
    pub max_visits: Option<NonZeroUsize>,
}

impl Default for LimitDefaults {
    fn default() -> Self {
        Self {
            max_pages: Limit::from_i64(DEFAULT_MAX_PAGES),
            min_len: DEFAULT_MIN_LEN,
            visit_factor: Limit::from_i64(DEFAULT_VISIT_FACTOR),
            max_visits: None,
        }
    }
}

/// Volume caps on stored candidates. `None` disables a cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ItemCaps {
    pub per_country: Option<usize>,
    pub per_domain: Option<usize>,
}

impl Default for ItemCaps {
    fn default() -> Self {
        Self {
            per_country: Some(DEFAULT_MAX_ITEMS_PER_COUNTRY),
            per_domain: Some(DEFAULT_MAX_ITEMS_PER_DOMAIN),
        }
    }
}

/// Process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub data_dir: PathBuf,
    pub database_url: Option<String>,
    pub limits: LimitDefaults,
    pub caps: ItemCaps,
    pub geocoder_offline: bool,
    pub geocode_min_interval: Duration,
    pub fetch_min_interval: Duration,
    pub geocoder_user_agent: String,
    pub harvest_user_agent: String,
    pub cron: String,
}

impl HarvestSettings {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Unparseable numbers fall back to their defaults with a warning; an
    /// unrecognized boolean is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let fallback = LimitDefaults::default();
        let max_pages = get("SCRAPE_MAX_PAGES")
            .and_then(|raw| parse_env_value("SCRAPE_MAX_PAGES", &raw, Limit::parse))
            .unwrap_or(fallback.max_pages);
        let visit_factor = get("SCRAPE_VISIT_FACTOR")
            .and_then(|raw| parse_env_value("SCRAPE_VISIT_FACTOR", &raw, Limit::parse))
            .unwrap_or(fallback.visit_factor);
        let min_len = get("SCRAPE_MIN_LEN")
            .and_then(|raw| parse_env_value("SCRAPE_MIN_LEN", &raw, |v| v.parse::<i64>().ok()))
            .map(clamp_min_len)
            .unwrap_or(fallback.min_len);
        let max_visits = get("SCRAPE_MAX_VISITS")
            .and_then(|raw| parse_env_value("SCRAPE_MAX_VISITS", &raw, |v| v.parse::<i64>().ok()))
            .and_then(positive);

        let cap = |key: &str, default: usize| match get(key) {
            None => Some(default),
            Some(raw) => match raw.parse::<i64>() {
                Ok(n) => positive(n).map(NonZeroUsize::get),
                Err(_) => {
                    warn!(key, value = %raw, "Invalid value, using default");
                    Some(default)
                }
            },
        };

        let millis = |key: &str, default: u64| {
            let ms = get(key)
                .and_then(|raw| parse_env_value(key, &raw, |v| v.parse::<u64>().ok()))
                .unwrap_or(default);
            Duration::from_millis(ms)
        };

        let geocoder_offline = match get("GEOCODER_OFFLINE") {
            None => false,
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "GEOCODER_OFFLINE".to_string(),
                value: raw.clone(),
            })?,
        };

        Ok(Self {
            data_dir: get("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            database_url: get("DATABASE_URL"),
            limits: LimitDefaults {
                max_pages,
                min_len,
                visit_factor,
                max_visits,
            },
            caps: ItemCaps {
                per_country: cap("SCRAPE_MAX_ITEMS_PER_COUNTRY", DEFAULT_MAX_ITEMS_PER_COUNTRY),
                per_domain: cap("SCRAPE_MAX_ITEMS_PER_DOMAIN", DEFAULT_MAX_ITEMS_PER_DOMAIN),
            },
            geocoder_offline,
            geocode_min_interval: millis("GEOCODE_MIN_INTERVAL_MS", DEFAULT_GEOCODE_INTERVAL_MS),
            fetch_min_interval: millis("FETCH_MIN_INTERVAL_MS", DEFAULT_FETCH_INTERVAL_MS),
            geocoder_user_agent: get("GEOCODER_USER_AGENT")
                .unwrap_or_else(|| crate::geocode::nominatim::DEFAULT_USER_AGENT.to_string()),
            harvest_user_agent: get("HARVEST_USER_AGENT")
                .unwrap_or_else(|| crate::crawler::http::DEFAULT_USER_AGENT.to_string()),
            cron: get("HARVEST_CRON").unwrap_or_else(|| DEFAULT_CRON.to_string()),
        })
    }

    pub fn seen_path(&self) -> PathBuf {
        self.data_dir.join("scrape_seen.json")
    }

    pub fn geocache_path(&self) -> PathBuf {
        self.data_dir.join("geocache.json")
    }

    pub fn sources_path(&self) -> PathBuf {
        self.data_dir.join("web_sources.json")
    }

    /// `DATABASE_URL`, or a SQLite file inside the data directory.
    pub fn database_url(&self) -> String {
        self.database_url.clone().unwrap_or_else(|| {
            format!(
                "sqlite://{}?mode=rwc",
                self.data_dir.join("incidents.db").display()
            )
        })
    }
}

fn parse_env_value<T>(key: &str, raw: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let parsed = parse(raw);
    if parsed.is_none() {
        warn!(key, value = %raw, "Invalid value, using default");
    }
    parsed
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn positive(n: i64) -> Option<NonZeroUsize> {
    usize::try_from(n).ok().and_then(NonZeroUsize::new)
}

fn clamp_min_len(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0).max(MIN_LENGTH_FLOOR)
}

/// Per-job overrides as given by an operator or a scheduled job payload.
///
/// Values stay raw until [`resolve`](Self::resolve): a number or a string
/// (`"full"`, `"*"`, `"12"`) are both accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_len: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visit_factor: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_visits: Option<Value>,
}

/// Limits after layering, plus any override that had to be ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLimits {
    pub limits: CrawlLimits,
    pub warnings: Vec<String>,
}

impl LimitOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object payload.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::InvalidValue {
            key: "overrides".to_string(),
            value: format!("{raw} ({e})"),
        })
    }

    pub fn with_max_pages(mut self, value: impl Into<Value>) -> Self {
        self.max_pages = Some(value.into());
        self
    }

    pub fn with_min_len(mut self, value: impl Into<Value>) -> Self {
        self.min_len = Some(value.into());
        self
    }

    pub fn with_visit_factor(mut self, value: impl Into<Value>) -> Self {
        self.visit_factor = Some(value.into());
        self
    }

    pub fn with_max_visits(mut self, value: impl Into<Value>) -> Self {
        self.max_visits = Some(value.into());
        self
    }

    /// Layer these overrides over `defaults`.
    pub fn resolve(&self, defaults: &LimitDefaults) -> ResolvedLimits {
        let mut warnings = Vec::new();

        let max_pages = override_layer("max_pages", &self.max_pages, value_as_limit, &mut warnings)
            .unwrap_or(defaults.max_pages);
        let visit_factor =
            override_layer("visit_factor", &self.visit_factor, value_as_limit, &mut warnings)
                .unwrap_or(defaults.visit_factor);
        let min_len = override_layer("min_len", &self.min_len, value_as_int, &mut warnings)
            .map(clamp_min_len)
            .unwrap_or_else(|| defaults.min_len.max(MIN_LENGTH_FLOOR));
        // Zero or negative asks for the derived ceiling.
        let max_visits = match override_layer("max_visits", &self.max_visits, value_as_int, &mut warnings) {
            Some(n) => positive(n),
            None => defaults.max_visits,
        };

        let limits = CrawlLimits {
            max_pages,
            min_length: min_len,
            visit_factor,
            max_visits: derive_max_visits(max_pages, visit_factor, max_visits),
        };

        ResolvedLimits { limits, warnings }
    }
}

fn override_layer<T>(
    key: &str,
    value: &Option<Value>,
    parse: impl Fn(&Value) -> Option<T>,
    warnings: &mut Vec<String>,
) -> Option<T> {
    let value = value.as_ref().filter(|v| !is_blank(v))?;
    let parsed = parse(value);
    if parsed.is_none() {
        warn!(key, value = %value, "Invalid override, falling back to default");
        warnings.push(format!("ignored invalid {key}: {value}"));
    }
    parsed
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn value_as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn value_as_limit(value: &Value) -> Option<Limit> {
    match value {
        Value::String(s) => Limit::parse(s),
        other => value_as_int(other).map(Limit::from_i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<HarvestSettings, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        HarvestSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_env() {
        let settings = settings(&[]).unwrap();
        assert_eq!(settings.limits, LimitDefaults::default());
        assert_eq!(settings.caps, ItemCaps::default());
        assert!(!settings.geocoder_offline);
        assert_eq!(settings.geocode_min_interval, Duration::from_millis(1050));
        assert_eq!(settings.cron, DEFAULT_CRON);
        assert_eq!(settings.seen_path(), PathBuf::from("./data/scrape_seen.json"));
    }

    #[test]
    fn test_env_layer() {
        let settings = settings(&[
            ("SCRAPE_MAX_PAGES", "full"),
            ("SCRAPE_MIN_LEN", "3"),
            ("SCRAPE_VISIT_FACTOR", "-1"),
            ("SCRAPE_MAX_VISITS", "40"),
            ("SCRAPE_MAX_ITEMS_PER_DOMAIN", "0"),
            ("GEOCODER_OFFLINE", "1"),
            ("DATA_DIR", "/var/lib/harvest"),
        ])
        .unwrap();

        assert_eq!(settings.limits.max_pages, Limit::Unbounded);
        assert_eq!(settings.limits.min_len, MIN_LENGTH_FLOOR);
        assert_eq!(settings.limits.visit_factor, Limit::Unbounded);
        assert_eq!(settings.limits.max_visits.map(NonZeroUsize::get), Some(40));
        assert_eq!(settings.caps.per_domain, None);
        assert!(settings.geocoder_offline);
        assert_eq!(
            settings.database_url(),
            "sqlite:///var/lib/harvest/incidents.db?mode=rwc"
        );
    }

    #[test]
    fn test_invalid_env_numbers_fall_back() {
        let settings = settings(&[("SCRAPE_MAX_PAGES", "lots"), ("SCRAPE_MIN_LEN", "long")]).unwrap();
        assert_eq!(settings.limits.max_pages, Limit::from_i64(DEFAULT_MAX_PAGES));
        assert_eq!(settings.limits.min_len, DEFAULT_MIN_LEN);
    }

    #[test]
    fn test_invalid_offline_flag_is_error() {
        assert!(matches!(
            settings(&[("GEOCODER_OFFLINE", "maybe")]),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let overrides = LimitOverrides::new()
            .with_max_pages(10)
            .with_min_len("80")
            .with_visit_factor(2);
        let resolved = overrides.resolve(&LimitDefaults::default());

        assert_eq!(resolved.limits.max_pages.get(), Some(10));
        assert_eq!(resolved.limits.min_length, 80);
        assert_eq!(resolved.limits.visit_factor.get(), Some(2));
        assert_eq!(resolved.limits.max_visits.get(), 20);
        assert!(resolved.warnings.is_empty());
    }

    #[test]
    fn test_sentinel_overrides_are_unbounded() {
        for value in [json!("full"), json!("*"), json!(0), json!(-5), json!("∞")] {
            let overrides = LimitOverrides {
                max_pages: Some(value.clone()),
                ..Default::default()
            };
            let resolved = overrides.resolve(&LimitDefaults::default());
            assert_eq!(resolved.limits.max_pages, Limit::Unbounded, "value {value}");
            assert_eq!(resolved.limits.max_visits.get(), 500);
        }
    }

    #[test]
    fn test_invalid_override_falls_back() {
        let overrides = LimitOverrides::new()
            .with_max_pages("many")
            .with_min_len(json!([1]));
        let resolved = overrides.resolve(&LimitDefaults::default());

        assert_eq!(resolved.limits.max_pages.get(), Some(5));
        assert_eq!(resolved.limits.min_length, DEFAULT_MIN_LEN);
        assert_eq!(resolved.warnings.len(), 2);
    }

    #[test]
    fn test_min_len_override_is_clamped() {
        let resolved = LimitOverrides::new()
            .with_min_len(2)
            .resolve(&LimitDefaults::default());
        assert_eq!(resolved.limits.min_length, MIN_LENGTH_FLOOR);
    }

    #[test]
    fn test_payload_accepts_numbers_and_strings() {
        let overrides =
            LimitOverrides::from_json(r#"{"max_pages": "full", "min_len": 60, "max_visits": 30}"#)
                .unwrap();
        let resolved = overrides.resolve(&LimitDefaults::default());

        assert!(resolved.limits.max_pages.is_unbounded());
        assert_eq!(resolved.limits.min_length, 60);
        assert_eq!(resolved.limits.max_visits.get(), 30);
    }
}
