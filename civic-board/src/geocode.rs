//! Place-name lookups
//!
//! Geocoding is best-effort: every failure (network, HTTP status, parse,
//! empty result) degrades to `None` with a warning. The incident lifecycle
//! decides whether a missing answer matters.
//!
//! # API Reference
//! - Reverse: `GET {base}/reverse?lat=..&lon=..&format=json`
//! - Forward: `GET {base}/search?q=..&format=json&limit=1`
//! - Nominatim usage policy requires an identifying User-Agent

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GeocodingConfig;

/// Result of a forward lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodedPlace {
    pub latitude: f64,
    pub longitude: f64,
    pub display_name: String,
}

/// External lookup service; implementations must never fail loudly
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Coordinates → human-readable place name
    async fn reverse(&self, latitude: f64, longitude: f64) -> Option<String>;

    /// Place name → coordinates and canonical name
    async fn forward(&self, place_name: &str) -> Option<GeocodedPlace>;
}

/// Geocoder used when lookups are disabled (offline mode)
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGeocoder;

#[async_trait]
impl Geocoder for DisabledGeocoder {
    async fn reverse(&self, _latitude: f64, _longitude: f64) -> Option<String> {
        None
    }

    async fn forward(&self, _place_name: &str) -> Option<GeocodedPlace> {
        None
    }
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    road: Option<String>,
    suburb: Option<String>,
    neighbourhood: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimReverse {
    display_name: Option<String>,
    #[serde(default)]
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimSearchHit {
    lat: String,
    lon: String,
    display_name: String,
}

fn address_label(address: &NominatimAddress) -> Option<String> {
    let locality = address
        .road
        .as_ref()
        .or(address.suburb.as_ref())
        .or(address.neighbourhood.as_ref());
    let settlement = address
        .city
        .as_ref()
        .or(address.town.as_ref())
        .or(address.village.as_ref());

    let parts: Vec<&str> = [locality, settlement, address.state.as_ref()]
        .into_iter()
        .flatten()
        .map(|s| s.as_str())
        .filter(|s| !s.trim().is_empty())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

/// OpenStreetMap Nominatim client
pub struct NominatimGeocoder {
    http_client: Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocodingConfig) -> Result<Self, reqwest::Error> {
        let mut headers = header::HeaderMap::new();
        if let Ok(agent) = header::HeaderValue::from_str(&config.user_agent) {
            headers.insert(header::USER_AGENT, agent);
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Option<T> {
        let url = format!("{}/{}", self.base_url, path);
        let response = match self.http_client.get(&url).query(query).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(path, error = %e, "Geocoding request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(path, status = %response.status(), "Geocoding returned error status");
            return None;
        }

        match response.json::<T>().await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!(path, error = %e, "Geocoding response could not be parsed");
                None
            }
        }
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Option<String> {
        let body: NominatimReverse = self
            .get_json(
                "reverse",
                &[
                    ("lat", latitude.to_string()),
                    ("lon", longitude.to_string()),
                    ("format", "json".to_string()),
                ],
            )
            .await?;

        let label = body
            .display_name
            .filter(|name| !name.trim().is_empty())
            .or_else(|| body.address.as_ref().and_then(address_label));
        debug!(latitude, longitude, found = label.is_some(), "Reverse geocode");
        label
    }

    async fn forward(&self, place_name: &str) -> Option<GeocodedPlace> {
        let hits: Vec<NominatimSearchHit> = self
            .get_json(
                "search",
                &[
                    ("q", place_name.to_string()),
                    ("format", "json".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;

        let hit = hits.into_iter().next()?;
        let latitude = hit.lat.trim().parse::<f64>().ok()?;
        let longitude = hit.lon.trim().parse::<f64>().ok()?;
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }

        debug!(place_name, latitude, longitude, "Forward geocode");
        Some(GeocodedPlace {
            latitude,
            longitude,
            display_name: hit.display_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_label_prefers_road_and_city() {
        let address = NominatimAddress {
            road: Some("Janpath".into()),
            suburb: Some("Connaught Place".into()),
            city: Some("New Delhi".into()),
            state: Some("Delhi".into()),
            ..Default::default()
        };
        assert_eq!(address_label(&address).as_deref(), Some("Janpath, New Delhi, Delhi"));
    }

    #[test]
    fn test_address_label_falls_back_through_components() {
        let address = NominatimAddress {
            neighbourhood: Some("Old Town".into()),
            village: Some("Hillside".into()),
            ..Default::default()
        };
        assert_eq!(address_label(&address).as_deref(), Some("Old Town, Hillside"));
        assert!(address_label(&NominatimAddress::default()).is_none());
    }

    #[test]
    fn test_reverse_payload_parses() {
        let body: NominatimReverse = serde_json::from_str(
            r#"{"display_name":"Janpath, New Delhi","address":{"road":"Janpath"},"lat":"28.6"}"#,
        )
        .unwrap();
        assert_eq!(body.display_name.as_deref(), Some("Janpath, New Delhi"));
    }

    #[tokio::test]
    async fn test_disabled_geocoder_returns_nothing() {
        let geocoder = DisabledGeocoder;
        assert!(geocoder.reverse(28.6, 77.2).await.is_none());
        assert!(geocoder.forward("India Gate").await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_service_degrades_to_none() {
        let config = GeocodingConfig {
            enabled: true,
            base_url: "http://127.0.0.1:9".to_string(),
            user_agent: "civic-board-test/0.1".to_string(),
            timeout_secs: 2,
        };
        let geocoder = NominatimGeocoder::new(&config).unwrap();
        assert!(geocoder.reverse(28.6, 77.2).await.is_none());
        assert!(geocoder.forward("India Gate").await.is_none());
    }
}
