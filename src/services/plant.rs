//! Plant-disease classifier and prediction counters

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use super::{fetch_json, http_client};
use crate::realtime::StateStore;
use crate::types::{IrrigationError, Result};

/// Counters shared with the mobile stats screen
pub const STATS_PATH: &str = "plant-disease-prediction_stats";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub predicted_disease: String,
    #[serde(default)]
    pub cure: Option<String>,
}

impl Prediction {
    /// Classifier labels healthy leaves as e.g. "Apple___healthy"
    pub fn is_healthy(&self) -> bool {
        let label = self.predicted_disease.to_lowercase();
        label.contains("healthy") && !label.contains("unhealthy")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiseaseStats {
    #[serde(default)]
    pub healthy_count: u64,
    #[serde(default)]
    pub unhealthy_count: u64,
    #[serde(default)]
    pub total_count: u64,
}

impl DiseaseStats {
    /// Read the counters, zeros when nothing was recorded yet
    pub async fn load(store: &dyn StateStore) -> Result<Self> {
        match store.get(STATS_PATH).await? {
            None => Ok(Self::default()),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| IrrigationError::Internal(format!("Malformed disease stats: {}", e))),
        }
    }
}

pub struct PlantClassifier {
    predict_url: String,
    http_client: reqwest::Client,
}

impl PlantClassifier {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            predict_url: format!("{}/predict/", base_url.trim_end_matches('/')),
            http_client: http_client(timeout),
        }
    }

    /// Forward an image upload as-is; `content_type` carries the multipart boundary
    pub async fn predict(&self, content_type: &str, body: Bytes) -> Result<Prediction> {
        if !content_type.starts_with("multipart/form-data") {
            return Err(IrrigationError::InvalidInput(
                "Expected a multipart/form-data image upload".into(),
            ));
        }
        if body.is_empty() {
            return Err(IrrigationError::InvalidInput("Image file is required".into()));
        }

        debug!(bytes = body.len(), "Forwarding image to classifier");
        let request = self
            .http_client
            .post(&self.predict_url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);

        let raw: Value = fetch_json(request, "Plant classifier").await?;
        parse_prediction(raw)
    }
}

fn parse_prediction(raw: Value) -> Result<Prediction> {
    if let Some(error) = raw.get("error").and_then(Value::as_str) {
        return Err(IrrigationError::Upstream(format!("Plant classifier error: {}", error)));
    }
    serde_json::from_value(raw)
        .map_err(|e| IrrigationError::Upstream(format!("Plant classifier sent an invalid response: {}", e)))
}

/// Count a prediction in the shared stats
pub async fn record_prediction(store: &dyn StateStore, prediction: &Prediction) -> Result<()> {
    let bucket = if prediction.is_healthy() {
        "healthy_count"
    } else {
        "unhealthy_count"
    };

    store.increment(STATS_PATH, bucket, 1).await?;
    store.increment(STATS_PATH, "total_count", 1).await?;

    info!(disease = %prediction.predicted_disease, bucket, "Recorded plant prediction");
    Ok(())
}
