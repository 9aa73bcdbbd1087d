//! Agronomy insights written by Gemini from monthly sensor summaries

use regex::RegexSet;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

use super::{fetch_json, http_client};
use crate::analytics::MonthlySummary;
use crate::types::{IrrigationError, Result};

/// Phrases that flag an answer for a human agronomist
const RED_FLAGS: [&str; 4] = [
    r"(?i)over *water",
    r"(?i)drought conditions",
    r"(?i)extreme (heat|cold)",
    r"(?i)immediate danger",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    pub contains_warnings: bool,
    pub requires_human_review: bool,
}

fn red_flags() -> &'static RegexSet {
    static SET: OnceLock<RegexSet> = OnceLock::new();
    SET.get_or_init(|| RegexSet::new(RED_FLAGS).unwrap_or_else(|_| RegexSet::empty()))
}

pub fn safety_check(text: &str) -> Validation {
    let flagged = red_flags().is_match(text);
    Validation {
        contains_warnings: flagged,
        requires_human_review: flagged,
    }
}

fn build_prompt(temperature: &[MonthlySummary], moisture: &[MonthlySummary]) -> Result<String> {
    let encode = |rows: &[MonthlySummary]| {
        serde_json::to_string_pretty(rows)
            .map_err(|e| IrrigationError::Internal(format!("Failed to encode summary: {}", e)))
    };
    let temperature = encode(temperature)?;
    let moisture = encode(moisture)?;

    Ok(format!(
        "You are an agricultural AI assistant. Strict rules:
1. Base responses ONLY on provided data
2. Never invent data points
3. Categorize recommendations by risk level

Provided Data:
- Temperature (monthly): {temperature}
- Soil Moisture (monthly): {moisture}

Analysis Requirements:
🟢 Safe Range: 10-25°C temp, 30-60% moisture
🟡 Caution: <10°C or >25°C temp, <30% or >60% moisture
🔴 Danger: <0°C or >35°C temp, <15% or >80% moisture

Format response with:
1. Current Status (with emoji alerts)
2. Immediate Recommendations
3. Risk Assessment Matrix
4. Data Limitations Disclaimer"
    ))
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

fn response_text(response: GenerateResponse) -> Result<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(IrrigationError::Upstream("Gemini returned no text".into()));
    }
    Ok(text)
}

pub struct InsightEngine {
    base_url: String,
    model: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl InsightEngine {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            http_client: http_client(timeout),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn generate(
        &self,
        temperature: &[MonthlySummary],
        moisture: &[MonthlySummary],
    ) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| IrrigationError::Config("Insights are not configured".into()))?;

        let prompt = build_prompt(temperature, moisture)?;
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": 1,
                "topP": 0.95,
                "topK": 40,
                "maxOutputTokens": 8192,
            }
        });

        debug!(model = %self.model, months = temperature.len(), "Requesting insights");
        let request = self
            .http_client
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .header("x-goog-api-key", api_key)
            .json(&body);

        let text = response_text(fetch_json(request, "Gemini").await?)?;
        info!(chars = text.len(), "Insights generated");
        Ok(text)
    }
}
