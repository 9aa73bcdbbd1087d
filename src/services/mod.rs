//! Clients for the external services the node proxies
//!
//! ## Services
//!
//! - **Weather**: Open-Meteo hourly forecast
//! - **News**: agriculture headlines from NewsAPI
//! - **Plant**: plant-disease image classifier and its prediction counters
//! - **Geocode**: OpenStreetMap Nominatim search and reverse lookup
//! - **Insights**: Gemini-written agronomy summary of recent sensor data

pub mod geocode;
pub mod insights;
pub mod news;
pub mod plant;
pub mod weather;

use std::time::Duration;

use crate::types::{IrrigationError, Result};

pub use geocode::{parse_coordinates, Geocoder, Place};
pub use insights::{safety_check, InsightEngine, Validation};
pub use news::{NewsArticle, NewsClient, NewsFeed};
pub use plant::{record_prediction, DiseaseStats, PlantClassifier, Prediction, STATS_PATH};
pub use weather::{HourlyForecast, WeatherClient};

/// Shared outbound client with the request timeout and our user agent
pub fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("irrigation-node/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

/// Send a request and decode a JSON body, mapping failures to upstream errors
///
/// URLs are stripped from transport errors since several upstreams take
/// their API key in the query string.
pub(crate) async fn fetch_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
    service: &str,
) -> Result<T> {
    let response = request.send().await.map_err(|e| {
        IrrigationError::Upstream(format!("{} request failed: {}", service, e.without_url()))
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(IrrigationError::Upstream(format!(
            "{} returned {}",
            service, status
        )));
    }

    response.json::<T>().await.map_err(|e| {
        IrrigationError::Upstream(format!("{} sent an invalid response: {}", service, e.without_url()))
    })
}
