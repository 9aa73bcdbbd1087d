//! OpenStreetMap Nominatim lookups

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{fetch_json, http_client};
use super::weather::check_coordinates;
use crate::types::{IrrigationError, Result};

pub const MAX_RESULTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub display_name: String,
    pub lat: f64,
    pub lon: f64,
}

/// Nominatim sends coordinates as strings
#[derive(Debug, Deserialize)]
struct RawPlace {
    display_name: Option<String>,
    lat: Option<String>,
    lon: Option<String>,
}

impl RawPlace {
    fn into_place(self) -> Option<Place> {
        Some(Place {
            display_name: self.display_name?,
            lat: self.lat?.parse().ok()?,
            lon: self.lon?.parse().ok()?,
        })
    }
}

pub struct Geocoder {
    base_url: String,
    country_code: String,
    http_client: reqwest::Client,
}

impl Geocoder {
    pub fn new(base_url: &str, country_code: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            country_code: country_code.to_lowercase(),
            http_client: http_client(timeout),
        }
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Place>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(IrrigationError::InvalidInput("q must not be empty".into()));
        }

        let query = with_country(query, &self.country_code);
        let limit = limit.clamp(1, MAX_RESULTS).to_string();
        debug!(query = %query, "Geocoding search");

        let request = self
            .http_client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("format", "json"),
                ("q", query.as_str()),
                ("countrycodes", self.country_code.as_str()),
                ("limit", limit.as_str()),
            ]);
        let raw: Vec<RawPlace> = fetch_json(request, "Geocoder").await?;
        Ok(raw.into_iter().filter_map(RawPlace::into_place).collect())
    }

    /// Nearest named place; an empty list when the point is unmapped
    pub async fn reverse(&self, lat: f64, lon: f64) -> Result<Vec<Place>> {
        check_coordinates(lat, lon)?;
        debug!(lat, lon, "Geocoding reverse");

        let request = self
            .http_client
            .get(format!("{}/reverse", self.base_url))
            .query(&[
                ("format", "json".to_string()),
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
            ]);
        let raw: RawPlace = fetch_json(request, "Geocoder").await?;
        Ok(raw.into_place().into_iter().collect())
    }
}

fn country_name(code: &str) -> Option<&'static str> {
    match code {
        "in" => Some("India"),
        "us" => Some("United States"),
        "gb" => Some("United Kingdom"),
        "np" => Some("Nepal"),
        "bd" => Some("Bangladesh"),
        "pk" => Some("Pakistan"),
        "lk" => Some("Sri Lanka"),
        _ => None,
    }
}

/// Append ", <country>" unless the query already names it
fn with_country(query: &str, country_code: &str) -> String {
    match country_name(country_code) {
        Some(name) if !query.to_lowercase().contains(&name.to_lowercase()) => {
            format!("{}, {}", query, name)
        }
        _ => query.to_string(),
    }
}

/// Parse "lat,lon"
pub fn parse_coordinates(raw: &str) -> Result<(f64, f64)> {
    let invalid = || IrrigationError::InvalidInput(format!("Invalid coordinates: {raw:?}"));

    let (lat, lon) = raw.split_once(',').ok_or_else(invalid)?;
    let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
    let lon: f64 = lon.trim().parse().map_err(|_| invalid())?;
    check_coordinates(lat, lon)?;
    Ok((lat, lon))
}
