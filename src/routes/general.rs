//! Cross-family /SensorData routes

use bytes::Bytes;
use chrono::Utc;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{json_response, parse_json_body, reply, BoxBody};
use crate::analytics::DateRange;
use crate::sensors::{ReadingKind, ReadingView, SensorKind};
use crate::server::AppState;
use crate::services::{safety_check, Validation};
use crate::store::AddOutcome;
use crate::types::{IrrigationError, Result};

/// Months of history the insight prompt covers
pub const INSIGHT_MONTHS: u32 = 6;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddSensorBody {
    #[serde(default)]
    sensor_number: Option<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Latest<'a> {
    result_temp: Option<ReadingView<'a>>,
    result_humi: Option<ReadingView<'a>>,
}

#[derive(Serialize)]
struct SensorList<'a> {
    sensortype: &'a str,
    sensors: Vec<String>,
}

#[derive(Serialize)]
struct InsightsResponse {
    success: bool,
    message: String,
    validation: Validation,
}

/// Sensor names arrive as strings or bare numbers
fn sensor_name(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// GET /SensorData/getLatest
pub async fn handle_latest(state: &AppState) -> Result<Response<BoxBody>> {
    let temperature = state.stores.readings.latest(ReadingKind::Temperature).await?;
    let humidity = state.stores.readings.latest(ReadingKind::Humidity).await?;

    Ok(reply(
        StatusCode::OK,
        &Latest {
            result_temp: temperature.as_ref().map(|r| r.view(ReadingKind::Temperature)),
            result_humi: humidity.as_ref().map(|r| r.view(ReadingKind::Humidity)),
        },
    ))
}

/// POST /SensorData/addSensor/:sensorType
pub async fn handle_add_sensor(
    req: Request<Bytes>,
    state: &AppState,
    sensor_type: &str,
) -> Result<Response<BoxBody>> {
    let kind: SensorKind = sensor_type.parse()?;
    let body: AddSensorBody = parse_json_body(req.body())?;
    let sensor = sensor_name(body.sensor_number)
        .ok_or_else(|| IrrigationError::InvalidInput("sensorNumber is required".into()))?;

    let outcome = state.stores.sensors.add(kind, &sensor).await?;
    info!(kind = %kind, sensor = %sensor, ?outcome, "Sensor registration");

    Ok(match outcome {
        AddOutcome::Created => reply(
            StatusCode::CREATED,
            &format!("Created {} list with sensor {}", kind, sensor),
        ),
        AddOutcome::Added => reply(
            StatusCode::OK,
            &format!("Added sensor {} to {} list", sensor, kind),
        ),
        AddOutcome::AlreadyPresent => reply(
            StatusCode::BAD_REQUEST,
            &format!("Sensor {} already exists in {} list", sensor, kind),
        ),
    })
}

/// GET /SensorData/getSensor/:sensorType
///
/// Unknown families have no sensors; they get an empty list.
pub async fn handle_sensor_list(state: &AppState, sensor_type: &str) -> Result<Response<BoxBody>> {
    let sensors = state.stores.sensors.list(sensor_type).await?;
    Ok(reply(
        StatusCode::OK,
        &SensorList {
            sensortype: sensor_type,
            sensors,
        },
    ))
}

/// GET /SensorData/getSensorState
pub async fn handle_sensor_states(state: &AppState) -> Result<Response<BoxBody>> {
    let states = state.switchboard.all_states().await?;
    Ok(reply(StatusCode::OK, &states))
}

/// Insight text over the last few months of readings
pub async fn generate_insights(state: &AppState) -> Result<String> {
    let range = DateRange::last_months(Utc::now(), INSIGHT_MONTHS, state.report_offset)?;
    let temperature = state
        .stores
        .readings
        .monthly_summary(ReadingKind::Temperature, &range)
        .await?;
    let moisture = state
        .stores
        .readings
        .monthly_summary(ReadingKind::Humidity, &range)
        .await?;

    state.insights.generate(&temperature, &moisture).await
}

/// GET /SensorData/getInsights
pub async fn handle_insights(state: &AppState) -> Result<Response<BoxBody>> {
    let text = generate_insights(state).await?;
    let validation = safety_check(&text);

    Ok(json_response(
        StatusCode::OK,
        &InsightsResponse {
            success: true,
            message: text,
            validation,
        },
    ))
}
