//! Proxied third-party data under /api
//!
//! - GET /api/news               - agriculture headlines
//! - GET /api/weather?lat&lon    - hourly forecast
//! - GET /api/geocode?q=&limit=  - place search
//! - GET /api/geocode?lat&lon    - reverse lookup (or `?q=lat,lon`)

use bytes::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;

use super::{cors_preflight, fail, method_not_allowed, not_found, parse_query, reply, BoxBody};
use crate::server::AppState;
use crate::services::geocode::MAX_RESULTS;
use crate::services::parse_coordinates;
use crate::types::{IrrigationError, Result};

const DEFAULT_SEARCH_RESULTS: usize = 5;

#[derive(Debug, Default, Deserialize)]
struct CoordinateParams {
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct GeocodeParams {
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    limit: Option<usize>,
}

/// GET /api/news
async fn handle_news(state: &AppState) -> Result<Response<BoxBody>> {
    let feed = state.news.agriculture().await?;
    Ok(reply(StatusCode::OK, &feed))
}

/// GET /api/weather
async fn handle_weather(req: &Request<Bytes>, state: &AppState) -> Result<Response<BoxBody>> {
    let params: CoordinateParams = parse_query(req)?;
    let (Some(lat), Some(lon)) = (params.lat, params.lon) else {
        return Err(IrrigationError::InvalidInput(
            "Missing required parameters: lat, lon".into(),
        ));
    };

    let forecast = state.weather.hourly(lat, lon).await?;
    Ok(reply(StatusCode::OK, &forecast))
}

/// GET /api/geocode
async fn handle_geocode(req: &Request<Bytes>, state: &AppState) -> Result<Response<BoxBody>> {
    let params: GeocodeParams = parse_query(req)?;

    let places = match (params.lat, params.lon, params.q.as_deref().map(str::trim)) {
        (Some(lat), Some(lon), _) => state.geocoder.reverse(lat, lon).await?,
        (_, _, Some(q)) if !q.is_empty() => match parse_coordinates(q) {
            Ok((lat, lon)) => state.geocoder.reverse(lat, lon).await?,
            Err(_) => {
                let limit = params.limit.unwrap_or(DEFAULT_SEARCH_RESULTS).min(MAX_RESULTS);
                state.geocoder.search(q, limit).await?
            }
        },
        _ => {
            return Err(IrrigationError::InvalidInput(
                "Provide q, or lat and lon".into(),
            ))
        }
    };

    Ok(reply(StatusCode::OK, &places))
}

/// Handle /api requests.
///
/// Returns Some(response) if request was handled, None if not an api route.
pub async fn handle_api_request(req: &Request<Bytes>, state: &AppState) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    if !path.starts_with("/api/") {
        return None;
    }

    let result = match (req.method(), path.trim_end_matches('/')) {
        (&Method::OPTIONS, _) => Ok(cors_preflight()),
        (&Method::GET, "/api/news") => handle_news(state).await,
        (&Method::GET, "/api/weather") => handle_weather(req, state).await,
        (&Method::GET, "/api/geocode") => handle_geocode(req, state).await,
        (_, "/api/news") | (_, "/api/weather") | (_, "/api/geocode") => Ok(method_not_allowed()),
        _ => Ok(not_found(path)),
    };

    Some(result.unwrap_or_else(|e| fail(&e)))
}
