//! Per-country site catalog (`web_sources.json`).

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ConfigError;

/// Target names that select every country in the catalog.
pub const ALL_TARGETS: &[&str] = &["all", "global", "todos", "todo", "allcountries"];

/// Country -> seed URLs. Keys are lowercased and iterate in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceCatalog {
    sites: BTreeMap<String, Vec<String>>,
}

impl SourceCatalog {
    /// Load from a JSON object of `country -> [url, ...]`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingSources {
            path: path.display().to_string(),
        })?;
        Self::parse(&raw).map_err(|reason| ConfigError::MalformedSources {
            path: path.display().to_string(),
            reason,
        })
    }

    fn parse(raw: &str) -> Result<Self, String> {
        let value: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        let Value::Object(map) = value else {
            return Err("expected an object of country -> [urls]".to_string());
        };

        let mut catalog = Self::default();
        for (country, urls) in map {
            let urls = match urls {
                Value::Null => Vec::new(),
                Value::Array(items) => items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(url) if !url.trim().is_empty() => {
                            Some(url.trim().to_string())
                        }
                        _ => None,
                    })
                    .collect(),
                _ => return Err(format!("sources for {country:?} must be a list")),
            };
            catalog.insert(&country, urls);
        }
        Ok(catalog)
    }

    pub fn from_map<K, U>(sites: impl IntoIterator<Item = (K, U)>) -> Self
    where
        K: AsRef<str>,
        U: IntoIterator<Item = String>,
    {
        let mut catalog = Self::default();
        for (country, urls) in sites {
            catalog.insert(country.as_ref(), urls.into_iter().collect());
        }
        catalog
    }

    fn insert(&mut self, country: &str, urls: Vec<String>) {
        self.sites
            .entry(country.trim().to_lowercase())
            .or_default()
            .extend(urls);
    }

    /// Countries in sorted order.
    pub fn countries(&self) -> impl Iterator<Item = &str> {
        self.sites.keys().map(String::as_str)
    }

    /// Seed URLs for a country (case-insensitive). Empty when unknown.
    pub fn urls(&self, country: &str) -> &[String] {
        self.sites
            .get(&country.trim().to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Expand a job target into the countries it covers.
    ///
    /// `None` when a single-country target has no configured sites.
    pub fn expand_target(&self, target: &str) -> Option<Vec<String>> {
        let target = target.trim().to_lowercase();
        if ALL_TARGETS.contains(&target.as_str()) {
            return Some(self.countries().map(str::to_string).collect());
        }
        if self.urls(&target).is_empty() {
            return None;
        }
        Some(vec![target])
    }
}
