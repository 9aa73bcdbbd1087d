//! Configuration for the irrigation node
//!
//! CLI arguments and environment variable handling using clap.

use chrono::FixedOffset;
use clap::Parser;
use std::net::SocketAddr;

use crate::auth::jwt::MIN_SECRET_LEN;

/// Backend for the smart irrigation node
#[derive(Parser, Debug, Clone)]
#[command(name = "irrigation-node")]
#[command(about = "Sensor time series, switch state and farm data proxies for smart irrigation")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory stores, dev JWT secret)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "irrigation")]
    pub mongodb_db: String,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "86400")]
    pub jwt_expiry_seconds: u64,

    /// Firebase Realtime Database base URL (switch state, disease stats)
    #[arg(long, env = "FIREBASE_URL")]
    pub firebase_url: Option<String>,

    /// Firebase database secret or ID token, sent as the `auth` query parameter
    #[arg(long, env = "FIREBASE_AUTH")]
    pub firebase_auth: Option<String>,

    /// UTC offset used to cut day/month/year analytics buckets (e.g. "+05:30")
    #[arg(long, env = "REPORT_UTC_OFFSET", default_value = "+05:30")]
    pub report_utc_offset: String,

    /// Pump flow rate in litres per minute, used to derive water usage
    #[arg(long, env = "PUMP_FLOW_LPM", default_value = "2.0")]
    pub pump_flow_lpm: f64,

    /// Open-Meteo forecast endpoint
    #[arg(long, env = "WEATHER_URL", default_value = "https://api.open-meteo.com/v1/forecast")]
    pub weather_url: String,

    /// NewsAPI "everything" endpoint
    #[arg(long, env = "NEWS_URL", default_value = "https://newsapi.org/v2/everything")]
    pub news_url: String,

    /// NewsAPI key (news endpoint disabled when unset)
    #[arg(long, env = "NEWS_API_KEY")]
    pub news_api_key: Option<String>,

    /// Search term for the news feed
    #[arg(long, env = "NEWS_QUERY", default_value = "agriculture")]
    pub news_query: String,

    /// Plant disease classifier base URL (expects POST {base}/predict/)
    #[arg(
        long,
        env = "PLANT_CLASSIFIER_URL",
        default_value = "https://shivang24-plant-disease-app.hf.space"
    )]
    pub plant_classifier_url: String,

    /// Nominatim geocoder base URL
    #[arg(long, env = "GEOCODER_URL", default_value = "https://nominatim.openstreetmap.org")]
    pub geocoder_url: String,

    /// ISO country code used to bias forward geocoding
    #[arg(long, env = "GEOCODER_COUNTRY", default_value = "in")]
    pub geocoder_country: String,

    /// Gemini API key (insights disabled when unset)
    #[arg(long, env = "GEMINI_API_KEY")]
    pub gemini_api_key: Option<String>,

    /// Gemini model used for insights
    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-1.5-flash-8b")]
    pub gemini_model: String,

    /// Gemini REST base URL
    #[arg(
        long,
        env = "GEMINI_URL",
        default_value = "https://generativelanguage.googleapis.com/v1beta"
    )]
    pub gemini_url: String,

    /// Outbound request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit JSON log lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

impl Args {
    /// Offset used for analytics bucket boundaries
    pub fn report_offset(&self) -> Result<FixedOffset, String> {
        parse_utc_offset(&self.report_utc_offset)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            if self.jwt_secret.is_none() {
                return Err("JWT_SECRET is required in production mode".to_string());
            }
            if self.firebase_url.is_none() {
                return Err("FIREBASE_URL is required in production mode".to_string());
            }
        }

        if let Some(secret) = &self.jwt_secret {
            if secret.len() < MIN_SECRET_LEN {
                return Err(format!("JWT_SECRET must be at least {MIN_SECRET_LEN} characters"));
            }
        }

        self.report_offset()?;

        if !(self.pump_flow_lpm.is_finite() && self.pump_flow_lpm > 0.0) {
            return Err("PUMP_FLOW_LPM must be a positive number".to_string());
        }

        if self.jwt_expiry_seconds == 0 {
            return Err("JWT_EXPIRY_SECONDS must be greater than zero".to_string());
        }

        Ok(())
    }
}

/// Parse "+HH:MM" / "-HH:MM" (or "Z") into a fixed offset
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset, String> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw == "+00:00" || raw == "-00:00" {
        return FixedOffset::east_opt(0).ok_or_else(|| "invalid offset".to_string());
    }

    let (sign, rest) = match raw.chars().next() {
        Some('+') => (1, &raw[1..]),
        Some('-') => (-1, &raw[1..]),
        _ => return Err(format!("UTC offset must start with + or -: {raw}")),
    };

    let (hours, minutes) = rest
        .split_once(':')
        .ok_or_else(|| format!("UTC offset must look like +HH:MM: {raw}"))?;
    let hours = offset_part(hours).ok_or_else(|| format!("Invalid hours in UTC offset: {raw}"))?;
    let minutes =
        offset_part(minutes).ok_or_else(|| format!("Invalid minutes in UTC offset: {raw}"))?;
    if hours > 14 || minutes >= 60 {
        return Err(format!("UTC offset out of range: {raw}"));
    }

    let seconds = i32::try_from(hours * 3600 + minutes * 60)
        .map_err(|_| format!("UTC offset out of range: {raw}"))?;
    FixedOffset::east_opt(sign * seconds).ok_or_else(|| format!("UTC offset out of range: {raw}"))
}

/// Plain digits only; `u32::from_str` would also take a leading `+`
fn offset_part(part: &str) -> Option<u32> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-at-least-32-characters-long";

    fn dev_args() -> Args {
        Args::parse_from(["irrigation-node", "--dev-mode"])
    }

    #[test]
    fn test_defaults() {
        let args = dev_args();
        assert_eq!(args.listen.port(), 3000);
        assert_eq!(args.jwt_expiry_seconds, 86_400);
        assert_eq!(args.mongodb_db, "irrigation");
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_production_requires_secrets() {
        let args = Args::parse_from(["irrigation-node"]);
        assert!(args.validate().unwrap_err().contains("JWT_SECRET"));

        let args = Args::parse_from(["irrigation-node", "--jwt-secret", SECRET]);
        assert!(args.validate().unwrap_err().contains("FIREBASE_URL"));

        let args = Args::parse_from([
            "irrigation-node",
            "--jwt-secret",
            SECRET,
            "--firebase-url",
            "https://example.firebaseio.com",
        ]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        let args = Args::parse_from(["irrigation-node", "--dev-mode", "--jwt-secret", "s3cret"]);
        assert!(args.validate().unwrap_err().contains("at least"));
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("+05:30").unwrap().local_minus_utc(), 19_800);
        assert_eq!(parse_utc_offset("-03:00").unwrap().local_minus_utc(), -10_800);
        assert_eq!(parse_utc_offset("Z").unwrap().local_minus_utc(), 0);
        assert!(parse_utc_offset("05:30").is_err());
        assert!(parse_utc_offset("+5").is_err());
        assert!(parse_utc_offset("+25:00").is_err());
        assert!(parse_utc_offset("+-05:00").is_err());
        assert!(parse_utc_offset("+05:-30").is_err());
        assert!(parse_utc_offset("++05:00").is_err());
        assert!(parse_utc_offset("+05:").is_err());
    }

    #[test]
    fn test_rejects_bad_flow_rate() {
        let args = Args::parse_from(["irrigation-node", "--dev-mode", "--pump-flow-lpm", "0"]);
        assert!(args.validate().is_err());
    }
}
