//! GET /report?month=N - combined farm report
//!
//! Analytics and water usage come straight from the stores; the insight text
//! and disease counters are best effort and degrade to fallbacks.

use bytes::Bytes;
use chrono::Utc;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::general::generate_insights;
use super::{cors_preflight, fail, method_not_allowed, parse_query, reply, BoxBody};
use crate::analytics::{AnalyticsBucket, AnalyticsQuery, DateRange, Interval};
use crate::sensors::ReadingKind;
use crate::server::AppState;
use crate::services::DiseaseStats;
use crate::store::MonthlyUsage;
use crate::types::Result;

pub const INSIGHTS_FALLBACK: &str = "Couldn't generate the Insights Sorry :(";
const MAX_REPORT_MONTHS: u32 = 24;

#[derive(Debug, Default, Deserialize)]
struct ReportParams {
    #[serde(default)]
    month: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    report: ReportBody,
    insights: String,
    water_usage: Vec<MonthlyUsage>,
    plant_health: PlantHealth,
    meta: ReportMeta,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportBody {
    date_range: StampRange,
    temperature: Analytics,
    humidity: Analytics,
}

#[derive(Serialize)]
struct StampRange {
    start: String,
    end: String,
}

#[derive(Serialize)]
struct Analytics {
    analytics: Vec<AnalyticsBucket>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlantHealth {
    disease_stats: DiseaseStats,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportMeta {
    generated_at: String,
    report_period: String,
    data_points: DataPoints,
}

#[derive(Serialize)]
struct DataPoints {
    temperature: usize,
    humidity: usize,
}

/// Leading integer of `month`, one when absent or not positive, capped at
/// `MAX_REPORT_MONTHS` (including values too large to parse)
fn report_months(raw: Option<&str>) -> u32 {
    let digits: String = raw
        .unwrap_or("")
        .trim()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();

    if digits.is_empty() {
        return 1;
    }
    match digits.parse::<u32>() {
        Ok(0) => 1,
        Ok(n) => n.min(MAX_REPORT_MONTHS),
        Err(_) => MAX_REPORT_MONTHS,
    }
}

async fn build_report(req: &Request<Bytes>, state: &AppState) -> Result<Response<BoxBody>> {
    let params: ReportParams = parse_query(req)?;
    let months = report_months(params.month.as_deref());
    let offset = state.report_offset;
    let range = DateRange::last_months(Utc::now(), months, offset)?;

    let query = AnalyticsQuery {
        sensor_number: None,
        range,
        interval: Interval::Month,
    };
    let temperature = state
        .stores
        .readings
        .analytics(ReadingKind::Temperature, &query)
        .await?;
    let humidity = state
        .stores
        .readings
        .analytics(ReadingKind::Humidity, &query)
        .await?;
    let water_usage = state.stores.water.monthly_totals(&range).await?;

    let insights = generate_insights(state).await.unwrap_or_else(|e| {
        warn!("Report insights unavailable: {}", e);
        INSIGHTS_FALLBACK.to_string()
    });

    let disease_stats = DiseaseStats::load(state.realtime.as_ref())
        .await
        .unwrap_or_else(|e| {
            warn!("Report disease stats unavailable: {}", e);
            DiseaseStats::default()
        });

    let report = Report {
        meta: ReportMeta {
            generated_at: Utc::now().to_rfc3339(),
            report_period: format!("{} month(s)", months),
            data_points: DataPoints {
                temperature: temperature.len(),
                humidity: humidity.len(),
            },
        },
        report: ReportBody {
            date_range: StampRange {
                start: range.start_stamp(offset),
                end: range.end_stamp(offset),
            },
            temperature: Analytics { analytics: temperature },
            humidity: Analytics { analytics: humidity },
        },
        insights,
        water_usage,
        plant_health: PlantHealth { disease_stats },
    };

    Ok(reply(StatusCode::OK, &report))
}

pub async fn handle_report(req: &Request<Bytes>, state: &AppState) -> Response<BoxBody> {
    let result = match *req.method() {
        Method::OPTIONS => Ok(cors_preflight()),
        Method::GET => build_report(req, state).await,
        _ => Ok(method_not_allowed()),
    };
    result.unwrap_or_else(|e| fail(&e))
}
