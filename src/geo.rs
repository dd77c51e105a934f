//! Geometry, pricing and geocoding.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::app::{Coordinate, Place};
use crate::config::GeoConfig;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Flat fare added to every trip.
pub const BASE_FARE: u64 = 4_000;

/// Fare per kilometre.
pub const PER_KM_FARE: f64 = 1_200.0;

/// Great-circle distance between two points, in kilometres.
pub fn distance_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Trip price for a distance, rounded up to the next 100.
pub fn price(distance_km: f64) -> u64 {
    let raw = BASE_FARE as f64 + PER_KM_FARE * distance_km.max(0.0);
    ((raw / 100.0).ceil() as u64) * 100
}

/// Address lookup (dyn-compatible).
pub trait Geocoder: Send + Sync {
    /// Resolve a free-text place description.
    fn geocode<'a>(
        &'a self,
        hint: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Place>> + Send + 'a>>;

    /// Human-readable address for a coordinate.
    fn reverse_geocode(
        &self,
        coord: Coordinate,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>>;
}

/// Nominatim (OpenStreetMap) search and reverse lookup.
pub struct NominatimGeocoder {
    endpoint: String,
    country_code: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct ReverseHit {
    display_name: Option<String>,
}

impl NominatimGeocoder {
    pub fn new(config: &GeoConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .user_agent(concat!("ride-voice/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            endpoint: config.geocoder_endpoint.trim_end_matches('/').to_string(),
            country_code: config.country_code.clone(),
            client,
        })
    }

    async fn search(&self, hint: &str) -> anyhow::Result<Place> {
        if hint.trim().is_empty() {
            anyhow::bail!("Empty destination");
        }
        debug!(hint = %hint, "Geocoding destination");
        let resp = self
            .client
            .get(format!("{}/search", self.endpoint))
            .query(&[
                ("q", hint),
                ("format", "json"),
                ("limit", "1"),
                ("countrycodes", self.country_code.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Geocoder error {}: {}", status, body);
        }

        let hits: Vec<SearchHit> = resp.json().await?;
        let hit = hits
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No place found for \"{}\"", hint))?;
        Ok(Place {
            coord: Coordinate::new(hit.lat.parse()?, hit.lon.parse()?),
            address: hit.display_name,
        })
    }

    async fn reverse(&self, coord: Coordinate) -> anyhow::Result<String> {
        let resp = self
            .client
            .get(format!("{}/reverse", self.endpoint))
            .query(&[
                ("lat", coord.lat.to_string()),
                ("lon", coord.lng.to_string()),
                ("format", "json".to_string()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("Reverse geocoder error {}", resp.status());
        }

        let hit: ReverseHit = resp.json().await?;
        hit.display_name
            .ok_or_else(|| anyhow::anyhow!("No address for {}", coord))
    }
}

impl Geocoder for NominatimGeocoder {
    fn geocode<'a>(
        &'a self,
        hint: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Place>> + Send + 'a>> {
        Box::pin(self.search(hint))
    }

    fn reverse_geocode(
        &self,
        coord: Coordinate,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        Box::pin(self.reverse(coord))
    }
}
