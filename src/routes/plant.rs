//! Plant-disease routes under /PlantPrediction

use bytes::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use tracing::warn;

use super::{cors_preflight, fail, method_not_allowed, not_found, reply, BoxBody};
use crate::server::AppState;
use crate::services::{record_prediction, DiseaseStats};
use crate::types::Result;

/// GET /PlantPrediction/getDiseaseStats
async fn handle_disease_stats(state: &AppState) -> Result<Response<BoxBody>> {
    let stats = DiseaseStats::load(state.realtime.as_ref()).await?;
    Ok(reply(StatusCode::OK, &stats))
}

/// POST /PlantPrediction/predict
///
/// The multipart upload is forwarded untouched; the prediction is counted
/// before it is returned.
async fn handle_predict(req: Request<Bytes>, state: &AppState) -> Result<Response<BoxBody>> {
    let content_type = req
        .headers()
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let prediction = state.plant.predict(&content_type, req.into_body()).await?;

    // A lost count should not cost the user their diagnosis
    if let Err(e) = record_prediction(state.realtime.as_ref(), &prediction).await {
        warn!("Failed to record plant prediction: {}", e);
    }

    Ok(reply(StatusCode::OK, &prediction))
}

/// Handle /PlantPrediction requests.
///
/// Returns Some(response) if request was handled, None if not a plant route.
pub async fn handle_plant_request(req: Request<Bytes>, state: &AppState) -> Option<Response<BoxBody>> {
    let path = req.uri().path().to_string();
    if !path.starts_with("/PlantPrediction") {
        return None;
    }

    let method = req.method().clone();
    let result = match (&method, path.trim_end_matches('/')) {
        (&Method::OPTIONS, _) => Ok(cors_preflight()),
        (&Method::GET, "/PlantPrediction/getDiseaseStats") => handle_disease_stats(state).await,
        (&Method::POST, "/PlantPrediction/predict") => handle_predict(req, state).await,
        (_, "/PlantPrediction/getDiseaseStats") | (_, "/PlantPrediction/predict") => {
            Ok(method_not_allowed())
        }
        _ => Ok(not_found(&path)),
    };

    Some(result.unwrap_or_else(|e| fail(&e)))
}
