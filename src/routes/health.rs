//! Health check endpoints
//!
//! - / - plain-text greeting
//! - /health, /healthz - Liveness probe
//! - /version - Build information for deployment verification

use hyper::{Response, StatusCode};
use serde::Serialize;

use super::{json_response, text_response, BoxBody};
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    /// Seconds since the server started
    pub uptime: u64,
    pub timestamp: String,
    /// "development" or "production"
    pub mode: &'static str,
    /// "mongodb" or "memory"
    pub storage: &'static str,
    /// "firebase" or "memory"
    pub realtime: &'static str,
    #[serde(rename = "insightsEnabled")]
    pub insights_enabled: bool,
}

#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    pub commit: &'static str,
    #[serde(rename = "commitFull")]
    pub commit_full: &'static str,
    #[serde(rename = "buildTime")]
    pub build_time: &'static str,
    pub service: &'static str,
}

pub fn root_greeting() -> Response<BoxBody> {
    text_response(StatusCode::OK, "Hello from Irrigation Node Backend!")
}

/// Handle liveness probe (/health, /healthz)
///
/// Always 200 while the process serves requests; degraded backends show up
/// in the body only.
pub fn health_check(state: &AppState) -> Response<BoxBody> {
    let response = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        storage: state.storage,
        realtime: if state.args.firebase_url.is_some() {
            "firebase"
        } else {
            "memory"
        },
        insights_enabled: state.insights.is_configured(),
    };

    json_response(StatusCode::OK, &response)
}

/// Version info (/version)
pub fn version_info() -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        &VersionResponse {
            version: env!("CARGO_PKG_VERSION"),
            commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
            commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
            build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
            service: "irrigation-node",
        },
    )
}
