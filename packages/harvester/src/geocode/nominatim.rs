//! Nominatim (OpenStreetMap) geocoding provider.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};

use crate::error::{GeocodeError, GeocodeResult};
use crate::traits::geocoder::GeocodeProvider;
use crate::types::geo::{PrecisionTier, ProviderMatch};

pub const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";

pub const DEFAULT_USER_AGENT: &str = "IncidentHarvester/1.0 (geocoding)";

/// Nominatim API response item
#[derive(Debug, Deserialize)]
struct NominatimResponse {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    addresstype: Option<String>,
    #[serde(default)]
    place_rank: Option<u8>,
    #[serde(default, rename = "type")]
    place_type: Option<String>,
    #[serde(default)]
    address: NominatimAddress,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    state: Option<String>,
    region: Option<String>,
    county: Option<String>,
    city_district: Option<String>,
    municipality: Option<String>,
    city: Option<String>,
}

impl NominatimResponse {
    fn into_match(self) -> GeocodeResult<ProviderMatch> {
        let lat: f64 = self
            .lat
            .parse()
            .map_err(|e| GeocodeError::InvalidResponse(format!("invalid latitude: {}", e)))?;
        let lon: f64 = self
            .lon
            .parse()
            .map_err(|e| GeocodeError::InvalidResponse(format!("invalid longitude: {}", e)))?;

        // addresstype, then place_rank, then the OSM type.
        let precision = self
            .addresstype
            .as_deref()
            .map(PrecisionTier::from_place_type)
            .into_iter()
            .chain(self.place_rank.map(PrecisionTier::from_place_rank))
            .chain(self.place_type.as_deref().map(PrecisionTier::from_place_type))
            .find(|tier| *tier != PrecisionTier::Unknown)
            .unwrap_or(PrecisionTier::Unknown);

        let address = self.address;
        let admin1 = address.state.or(address.region);
        let admin2 = address
            .county
            .or(address.city_district)
            .or(address.municipality)
            .or(address.city);

        Ok(ProviderMatch {
            lat,
            lon,
            precision,
            admin1,
            admin2,
            display_name: self.display_name,
        })
    }
}

/// Geocoding provider backed by a Nominatim search endpoint.
///
/// Pacing is not handled here; callers go through the rate limiter.
pub struct NominatimProvider {
    client: reqwest::Client,
    endpoint: String,
    user_agent: String,
}

impl NominatimProvider {
    pub fn new(user_agent: impl Into<String>) -> GeocodeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| GeocodeError::Http(Box::new(e)))?;

        Ok(Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_agent: user_agent.into(),
        })
    }

    /// Point at a different Nominatim instance.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn search_url(&self, query: &str) -> String {
        format!(
            "{}?q={}&format=jsonv2&limit=1&addressdetails=1",
            self.endpoint,
            urlencoding::encode(query)
        )
    }
}

#[async_trait]
impl GeocodeProvider for NominatimProvider {
    async fn lookup(&self, query: &str) -> GeocodeResult<Option<ProviderMatch>> {
        debug!(query = %query, "Nominatim lookup");

        let response = self
            .client
            .get(self.search_url(query))
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, query = %query, "Geocoding API request failed");
                GeocodeError::Http(Box::new(e))
            })?;

        let status = response.status().as_u16();
        match status {
            429 | 503 => return Err(GeocodeError::Throttled { status }),
            s if !(200..300).contains(&s) => return Err(GeocodeError::Status { status }),
            _ => {}
        }

        let items: Vec<NominatimResponse> = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse geocoding response");
            GeocodeError::InvalidResponse(e.to_string())
        })?;

        items.into_iter().next().map(NominatimResponse::into_match).transpose()
    }

    fn name(&self) -> &str {
        "nominatim"
    }
}
