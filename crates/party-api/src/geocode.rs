use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

const GOOGLE_GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

/// A resolved address.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geocoded {
    pub formatted_address: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("address is empty")]
    Empty,
    #[error("no match for address")]
    NoMatch,
    #[error("geocoder returned status {0}")]
    Status(String),
    #[error("geocoder unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

pub enum Geocoder {
    Google(GoogleGeocoder),
    Static(StaticGeocoder),
}

impl Geocoder {
    pub async fn geocode(&self, address: &str) -> Result<Geocoded, GeocodeError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(GeocodeError::Empty);
        }

        let result = match self {
            Geocoder::Google(g) => g.geocode(address).await,
            Geocoder::Static(s) => s.geocode(address),
        };

        match &result {
            Ok(found) => debug!("Geocoded '{}' -> '{}'", address, found.formatted_address),
            Err(e) => warn!("Geocoding '{}' failed: {}", address, e),
        }
        result
    }
}

/// Google Geocoding API backend.
pub struct GoogleGeocoder {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

#[derive(Deserialize)]
struct GoogleResponse {
    status: String,
    #[serde(default)]
    results: Vec<GoogleResult>,
}

#[derive(Deserialize)]
struct GoogleResult {
    formatted_address: String,
    geometry: GoogleGeometry,
}

#[derive(Deserialize)]
struct GoogleGeometry {
    location: GoogleLocation,
}

#[derive(Deserialize)]
struct GoogleLocation {
    lat: f64,
    lng: f64,
}

impl GoogleGeocoder {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self::with_endpoint(http, api_key, GOOGLE_GEOCODE_URL.to_string())
    }

    pub fn with_endpoint(http: reqwest::Client, api_key: String, endpoint: String) -> Self {
        Self { http, api_key, endpoint }
    }

    async fn geocode(&self, address: &str) -> Result<Geocoded, GeocodeError> {
        let resp: GoogleResponse = self
            .http
            .get(&self.endpoint)
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match resp.status.as_str() {
            "OK" => {}
            "ZERO_RESULTS" => return Err(GeocodeError::NoMatch),
            other => return Err(GeocodeError::Status(other.to_string())),
        }

        let first = resp.results.into_iter().next().ok_or(GeocodeError::NoMatch)?;
        Ok(Geocoded {
            formatted_address: first.formatted_address,
            latitude: first.geometry.location.lat,
            longitude: first.geometry.location.lng,
        })
    }
}

/// Fixed lookup table, for offline deployments and tests. Lookups ignore case,
/// repeated whitespace and a trailing period. Every canonical address also
/// resolves to itself.
#[derive(Debug, Default)]
pub struct StaticGeocoder {
    entries: HashMap<String, Geocoded>,
}

impl StaticGeocoder {
    pub fn new(entries: impl IntoIterator<Item = (String, Geocoded)>) -> Self {
        let mut table = HashMap::new();
        for (address, geocoded) in entries {
            table.insert(normalize(&geocoded.formatted_address), geocoded.clone());
            table.insert(normalize(&address), geocoded);
        }
        Self { entries: table }
    }

    /// Load a JSON object mapping addresses to `{formattedAddress, latitude, longitude}`.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let entries: HashMap<String, Geocoded> = serde_json::from_str(&raw)?;
        Ok(Self::new(entries))
    }

    fn geocode(&self, address: &str) -> Result<Geocoded, GeocodeError> {
        self.entries
            .get(&normalize(address))
            .cloned()
            .ok_or(GeocodeError::NoMatch)
    }
}

fn normalize(address: &str) -> String {
    address
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches('.')
        .to_lowercase()
}
