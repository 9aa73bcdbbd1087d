//! Open-Meteo hourly forecast

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{fetch_json, http_client};
use crate::types::{IrrigationError, Result};

const HOURLY_FIELDS: &str = "temperature_2m,wind_speed_10m,precipitation_probability";

/// One forecast hour as served to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyForecast {
    pub time: String,
    pub temperature: Option<f64>,
    pub wind_speed: Option<f64>,
    pub precipitation_probability: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    hourly: Option<HourlySeries>,
}

#[derive(Debug, Default, Deserialize)]
struct HourlySeries {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    wind_speed_10m: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability: Vec<Option<f64>>,
}

pub struct WeatherClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl WeatherClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.to_string(),
            http_client: http_client(timeout),
        }
    }

    pub async fn hourly(&self, lat: f64, lon: f64) -> Result<Vec<HourlyForecast>> {
        check_coordinates(lat, lon)?;
        debug!(lat, lon, "Fetching hourly forecast");

        let request = self.http_client.get(&self.base_url).query(&[
            ("latitude", lat.to_string()),
            ("longitude", lon.to_string()),
            ("hourly", HOURLY_FIELDS.to_string()),
        ]);
        let response: ForecastResponse = fetch_json(request, "Weather service").await?;
        Ok(map_hourly(response.hourly.unwrap_or_default()))
    }
}

/// Reject coordinates outside the WGS84 range
pub fn check_coordinates(lat: f64, lon: f64) -> Result<()> {
    if !(lat.is_finite() && (-90.0..=90.0).contains(&lat)) {
        return Err(IrrigationError::InvalidInput(
            "lat must be between -90 and 90".into(),
        ));
    }
    if !(lon.is_finite() && (-180.0..=180.0).contains(&lon)) {
        return Err(IrrigationError::InvalidInput(
            "lon must be between -180 and 180".into(),
        ));
    }
    Ok(())
}

fn map_hourly(series: HourlySeries) -> Vec<HourlyForecast> {
    let at = |values: &[Option<f64>], i: usize| values.get(i).copied().flatten();

    series
        .time
        .iter()
        .enumerate()
        .map(|(i, time)| HourlyForecast {
            time: time.clone(),
            temperature: at(&series.temperature_2m, i),
            wind_speed: at(&series.wind_speed_10m, i),
            precipitation_probability: at(&series.precipitation_probability, i),
        })
        .collect()
}
