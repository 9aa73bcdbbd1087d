//! Sensor readings, switch state and pump water usage under /SensorData
//!
//! Per-family routes live here; the cross-family ones (latest readings,
//! sensor lists, insights) are in `general`.

use bytes::Bytes;
use chrono::Utc;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::{
    cors_preflight, fail, general, method_not_allowed, not_found, parse_json_body, parse_query,
    path_segments, reply, BoxBody,
};
use crate::analytics::{AnalyticsQuery, DateRange, Interval};
use crate::realtime::ChangeOutcome;
use crate::sensors::{NewReading, ReadingKind, SensorKind, SwitchState};
use crate::server::AppState;
use crate::store::WaterUsageRecord;
use crate::types::{IrrigationError, Result};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyticsParams {
    #[serde(default)]
    start_stamp: Option<String>,
    #[serde(default)]
    end_stamp: Option<String>,
    #[serde(default)]
    interval: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StateBody {
    #[serde(default)]
    state: Option<String>,
}

/// Pump run bounds in epoch milliseconds
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageRange {
    #[serde(default)]
    start_timestamp: Option<i64>,
    #[serde(default)]
    end_timestamp: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WaterUsageSummary {
    relay_number: String,
    total_liters: f64,
    total_minutes: f64,
    records: Vec<WaterUsageRecord>,
}

fn reading_kind(name: &str) -> Result<ReadingKind> {
    let kind: SensorKind = name.parse()?;
    kind.reading_kind().ok_or_else(|| {
        IrrigationError::InvalidInput(format!("{} sensors do not record readings", kind))
    })
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// POST /SensorData/{temperature,humidity}/upload
async fn handle_upload(req: Request<Bytes>, state: &AppState, kind: ReadingKind) -> Result<Response<BoxBody>> {
    let body: NewReading = parse_json_body(req.body())?;
    let reading = body.into_reading(kind, Utc::now())?;

    info!(kind = %kind, sensor = %reading.sensor_number, value = reading.value, "Reading uploaded");
    state.stores.readings.insert(kind, reading).await?;

    Ok(reply(
        StatusCode::CREATED,
        &format!("{} data uploaded successfully", kind.label()),
    ))
}

/// GET /SensorData/{temperature,humidity}/getAnalytics[/:sensorNumber]
async fn handle_analytics(
    req: Request<Bytes>,
    state: &AppState,
    kind: ReadingKind,
    sensor_number: Option<&str>,
) -> Result<Response<BoxBody>> {
    let params: AnalyticsParams = parse_query(&req)?;

    let (Some(start), Some(end), Some(interval)) = (
        present(params.start_stamp),
        present(params.end_stamp),
        present(params.interval),
    ) else {
        return Err(IrrigationError::InvalidInput(
            "Missing required parameters: startStamp, endStamp, or interval".into(),
        ));
    };

    let interval: Interval = interval.parse()?;
    let query = AnalyticsQuery {
        sensor_number: sensor_number.map(str::to_string),
        range: DateRange::from_stamps(&start, &end, state.report_offset)?,
        interval,
    };

    let buckets = state.stores.readings.analytics(kind, &query).await?;
    Ok(reply(StatusCode::OK, &buckets))
}

/// POST /SensorData/{family}/changeState/:sensorNumber
async fn handle_change_state(
    req: Request<Bytes>,
    state: &AppState,
    kind: SensorKind,
    sensor: &str,
) -> Result<Response<BoxBody>> {
    let body: StateBody = parse_json_body(req.body())?;
    let switch: SwitchState = body.state.unwrap_or_default().parse()?;

    let message = match state.switchboard.change_state(kind, sensor, switch).await? {
        ChangeOutcome::Created => format!("Sensor {} created with state {}", sensor, switch),
        ChangeOutcome::Changed => format!("Sensor {} changed to state {}", sensor, switch),
    };
    Ok(reply(StatusCode::OK, &message))
}

/// GET /SensorData/{family}/getState
async fn handle_get_state(state: &AppState, kind: SensorKind) -> Result<Response<BoxBody>> {
    match state.switchboard.states(kind).await? {
        Some(states) => Ok(reply(StatusCode::OK, &json!({ "states": states }))),
        None => Err(IrrigationError::InvalidInput("Sensors does not exist".into())),
    }
}

/// POST /SensorData/relay/toggle/:sensorNumber
async fn handle_toggle(state: &AppState, sensor: &str) -> Result<Response<BoxBody>> {
    let next = state.switchboard.toggle(SensorKind::Relay, sensor).await?;
    Ok(reply(
        StatusCode::OK,
        &json!({ "sensorNumber": sensor, "state": next }),
    ))
}

/// POST /SensorData/relay/recordUsage/:relayNumber
async fn handle_record_usage(req: Request<Bytes>, state: &AppState, relay: &str) -> Result<Response<BoxBody>> {
    let body: UsageRange = parse_json_body(req.body())?;
    let (Some(start), Some(end)) = (body.start_timestamp, body.end_timestamp) else {
        return Err(IrrigationError::InvalidInput(
            "startTimestamp and endTimestamp are required".into(),
        ));
    };

    let record = WaterUsageRecord::from_run(relay, start, end, state.args.pump_flow_lpm, Utc::now())?;
    info!(
        relay,
        minutes = record.duration_minutes,
        liters = record.water_usage_liters,
        "Recorded pump run"
    );
    state.stores.water.record(record.clone()).await?;

    Ok(reply(StatusCode::CREATED, &record))
}

/// POST /SensorData/relay/getWaterUsage/:relayNumber
async fn handle_water_usage(req: Request<Bytes>, state: &AppState, relay: &str) -> Result<Response<BoxBody>> {
    let body: UsageRange = parse_json_body(req.body())?;
    let range = match (body.start_timestamp, body.end_timestamp) {
        (Some(from), Some(to)) if from <= to => Some((from, to)),
        (None, None) => None,
        _ => {
            return Err(IrrigationError::InvalidInput(
                "Provide both startTimestamp and endTimestamp, in order".into(),
            ))
        }
    };

    let records = state.stores.water.for_relay(relay, range).await?;
    let summary = WaterUsageSummary {
        relay_number: relay.to_string(),
        total_liters: records.iter().map(|r| r.water_usage_liters).sum(),
        total_minutes: records.iter().map(|r| r.duration_minutes).sum(),
        records,
    };
    Ok(reply(StatusCode::OK, &summary))
}

async fn route(req: Request<Bytes>, state: &AppState, path: &str) -> Result<Response<BoxBody>> {
    let method = req.method().clone();
    let decoded = path_segments(path);
    let segments: Vec<&str> = decoded.iter().map(String::as_str).collect();

    match (&method, segments.as_slice()) {
        (&Method::POST, ["SensorData", kind @ ("temperature" | "humidity"), "upload"]) => {
            handle_upload(req, state, reading_kind(kind)?).await
        }
        (&Method::GET, ["SensorData", kind @ ("temperature" | "humidity"), "getAnalytics"]) => {
            handle_analytics(req, state, reading_kind(kind)?, None).await
        }
        (&Method::GET, ["SensorData", kind @ ("temperature" | "humidity"), "getAnalytics", sensor]) => {
            handle_analytics(req, state, reading_kind(kind)?, Some(*sensor)).await
        }
        (&Method::POST, ["SensorData", kind @ ("temperature" | "humidity" | "relay"), "changeState", sensor]) => {
            handle_change_state(req, state, kind.parse()?, sensor).await
        }
        (&Method::GET, ["SensorData", kind @ ("temperature" | "humidity" | "relay"), "getState"]) => {
            handle_get_state(state, kind.parse()?).await
        }
        (&Method::POST, ["SensorData", "relay", "toggle", sensor]) => handle_toggle(state, sensor).await,
        (&Method::POST, ["SensorData", "relay", "recordUsage", relay]) => {
            handle_record_usage(req, state, relay).await
        }
        (&Method::POST, ["SensorData", "relay", "getWaterUsage", relay]) => {
            handle_water_usage(req, state, relay).await
        }

        (&Method::GET, ["SensorData", "getLatest"]) => general::handle_latest(state).await,
        (&Method::POST, ["SensorData", "addSensor", sensor_type]) => {
            general::handle_add_sensor(req, state, sensor_type).await
        }
        (&Method::GET, ["SensorData", "getSensor", sensor_type]) => {
            general::handle_sensor_list(state, sensor_type).await
        }
        (&Method::GET, ["SensorData", "getSensorState"]) => general::handle_sensor_states(state).await,
        (&Method::GET, ["SensorData", "getInsights"]) => general::handle_insights(state).await,

        (_, ["SensorData", "temperature" | "humidity", "upload"])
        | (_, ["SensorData", "temperature" | "humidity", "getAnalytics", ..])
        | (_, ["SensorData", "temperature" | "humidity" | "relay", "changeState", _])
        | (_, ["SensorData", "temperature" | "humidity" | "relay", "getState"])
        | (_, ["SensorData", "relay", "toggle" | "recordUsage" | "getWaterUsage", _])
        | (_, ["SensorData", "getLatest" | "getSensorState" | "getInsights"])
        | (_, ["SensorData", "addSensor" | "getSensor", _]) => Ok(method_not_allowed()),

        _ => Ok(not_found(path)),
    }
}

/// Handle /SensorData requests.
///
/// Returns Some(response) if request was handled, None if not a sensor route.
pub async fn handle_sensor_data_request(
    req: Request<Bytes>,
    state: &AppState,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path().to_string();
    if !path.starts_with("/SensorData") {
        return None;
    }
    if req.method() == Method::OPTIONS {
        return Some(cors_preflight());
    }

    Some(route(req, state, &path).await.unwrap_or_else(|e| fail(&e)))
}
