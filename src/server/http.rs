//! HTTP server implementation
//!
//! Raw hyper 1.x accept loop. Bodies are collected up front (bounded by
//! route) so every handler sees a `Request<Bytes>`.

use bytes::Bytes;
use chrono::FixedOffset;
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::JwtValidator;
use crate::config::Args;
use crate::realtime::{StateStore, SwitchBoard};
use crate::routes::{
    self, cors_preflight, fail, method_not_allowed, not_found, BoxBody, BoxError,
    IMAGE_BODY_LIMIT, JSON_BODY_LIMIT,
};
use crate::services::{Geocoder, InsightEngine, NewsClient, PlantClassifier, WeatherClient};
use crate::store::Stores;
use crate::types::{IrrigationError, Result};

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Readings, sensor lists, accounts and water usage
    pub stores: Stores,
    /// Realtime tree holding switch states and disease counters
    pub realtime: Arc<dyn StateStore>,
    pub switchboard: SwitchBoard,
    pub jwt: JwtValidator,
    pub weather: WeatherClient,
    pub news: NewsClient,
    pub plant: PlantClassifier,
    pub geocoder: Geocoder,
    pub insights: InsightEngine,
    /// Offset analytics buckets are cut in
    pub report_offset: FixedOffset,
    /// "mongodb" or "memory"
    pub storage: &'static str,
    pub started_at: Instant,
}

impl AppState {
    /// Wire up upstream clients around already-connected stores
    pub fn new(
        args: Args,
        stores: Stores,
        realtime: Arc<dyn StateStore>,
        storage: &'static str,
    ) -> Result<Self> {
        let report_offset = args.report_offset().map_err(IrrigationError::Config)?;

        let jwt = match &args.jwt_secret {
            None if args.dev_mode => {
                warn!("Using dev JWT secret - do not use in production");
                JwtValidator::new_dev(args.jwt_expiry_seconds)
            }
            secret => JwtValidator::new(secret.clone().unwrap_or_default(), args.jwt_expiry_seconds)?,
        };

        let timeout = Duration::from_millis(args.request_timeout_ms);

        Ok(Self {
            switchboard: SwitchBoard::new(Arc::clone(&realtime)),
            realtime,
            jwt,
            weather: WeatherClient::new(&args.weather_url, timeout),
            news: NewsClient::new(
                &args.news_url,
                args.news_api_key.clone(),
                &args.news_query,
                timeout,
            ),
            plant: PlantClassifier::new(&args.plant_classifier_url, timeout),
            geocoder: Geocoder::new(&args.geocoder_url, &args.geocoder_country, timeout),
            insights: InsightEngine::new(
                &args.gemini_url,
                &args.gemini_model,
                args.gemini_api_key.clone(),
                timeout,
            ),
            report_offset,
            storage,
            started_at: Instant::now(),
            stores,
            args,
        })
    }
}

/// Start the HTTP server, returning once a shutdown signal arrives
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Irrigation node listening on {}", state.args.listen);

    if state.args.dev_mode {
        warn!("Development mode enabled - dev JWT secret and in-memory fallbacks allowed");
    }
    if !state.insights.is_configured() {
        info!("GEMINI_API_KEY not set - insights disabled");
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Stopped accepting connections");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = service_fn(move |req| {
                            let state = Arc::clone(&state);
                            async move { handle_request(state, addr, req).await }
                        });

                        if let Err(err) = http1::Builder::new()
                            .serve_connection(io, service)
                            .await
                        {
                            error!("Error serving connection from {}: {:?}", addr, err);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {:?}", e);
                }
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Route incoming HTTP requests
pub async fn handle_request<B>(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<B>,
) -> std::result::Result<Response<BoxBody>, hyper::Error>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    let limit = if path.trim_end_matches('/') == "/PlantPrediction/predict" {
        IMAGE_BODY_LIMIT
    } else {
        JSON_BODY_LIMIT
    };

    let (parts, body) = req.into_parts();
    let bytes = match routes::read_body(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => return Ok(fail(&e)),
    };

    Ok(dispatch(Request::from_parts(parts, bytes), &state).await)
}

async fn dispatch(req: Request<Bytes>, state: &AppState) -> Response<BoxBody> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let route = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    let response = match (&method, route) {
        (&Method::OPTIONS, _) => Some(cors_preflight()),

        (&Method::GET, "/") => Some(routes::root_greeting()),
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => Some(routes::health_check(state)),
        (&Method::GET, "/version") => Some(routes::version_info()),
        (_, "/" | "/health" | "/healthz" | "/version") => Some(method_not_allowed()),

        (_, "/report") => Some(routes::handle_report(&req, state).await),

        _ if route.starts_with("/auth") => routes::handle_auth_request(req, state).await,
        _ if route.starts_with("/SensorData") => routes::handle_sensor_data_request(req, state).await,
        _ if route.starts_with("/PlantPrediction") => routes::handle_plant_request(req, state).await,
        _ => routes::handle_api_request(&req, state).await,
    };

    response.unwrap_or_else(|| not_found(&path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{Claims, DEV_JWT_SECRET};
    use crate::realtime::MemoryStateStore;
    use clap::Parser;
    use http_body_util::{BodyExt, Full};
    use hyper::StatusCode;
    use serde_json::{json, Value};

    fn test_state() -> Arc<AppState> {
        let args = Args::parse_from(["irrigation-node", "--dev-mode", "--report-utc-offset", "Z"]);
        let offset = FixedOffset::east_opt(0).unwrap();
        let state = AppState::new(
            args,
            Stores::memory(offset),
            Arc::new(MemoryStateStore::new()),
            "memory",
        )
        .unwrap();
        Arc::new(state)
    }

    fn test_addr() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    async fn send(
        state: &Arc<AppState>,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let body = body.map(|b| b.to_string()).unwrap_or_default();
        let req = builder.body(Full::new(Bytes::from(body))).unwrap();

        let resp = handle_request(Arc::clone(state), test_addr(), req)
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_upload_then_daily_average() {
        let state = test_state();
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();

        for temperature in [20.0, 30.0] {
            let (status, body) = send(
                &state,
                Method::POST,
                "/SensorData/temperature/upload",
                Some(json!({ "sensorNumber": 1, "temperature": temperature })),
                None,
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
            assert_eq!(body["success"], true);
        }

        let uri = format!(
            "/SensorData/temperature/getAnalytics/1?startStamp={0}&endStamp={0}&interval=day",
            today
        );
        let (status, body) = send(&state, Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"][0]["_id"], today);
        assert_eq!(body["message"][0]["totalDocuments"], 2);
        assert_eq!(body["message"][0]["avgTemperature"], 25.0);
    }

    #[tokio::test]
    async fn test_analytics_requires_params() {
        let state = test_state();
        let (status, body) = send(
            &state,
            Method::GET,
            "/SensorData/humidity/getAnalytics?interval=day",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_state() {
        let state = test_state();

        let (status, body) = send(&state, Method::POST, "/SensorData/relay/toggle/1", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"]["state"], "on");

        let (_, body) = send(&state, Method::POST, "/SensorData/relay/toggle/1", None, None).await;
        assert_eq!(body["message"]["state"], "off");

        let (_, body) = send(&state, Method::POST, "/SensorData/relay/toggle/1", None, None).await;
        assert_eq!(body["message"]["state"], "on");
    }

    #[tokio::test]
    async fn test_change_state_then_get_state() {
        let state = test_state();

        let (status, _) = send(&state, Method::GET, "/SensorData/relay/getState", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &state,
            Method::POST,
            "/SensorData/relay/changeState/2",
            Some(json!({ "state": "on" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Sensor 2 created with state on");

        let (status, body) = send(&state, Method::GET, "/SensorData/relay/getState", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"]["states"][0]["sensorNumber"], "2");
    }

    #[tokio::test]
    async fn test_unknown_sensor_type_lists_nothing() {
        let state = test_state();
        let (status, body) = send(&state, Method::GET, "/SensorData/getSensor/windmill", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"]["sensortype"], "windmill");
        assert_eq!(body["message"]["sensors"], json!([]));
    }

    #[tokio::test]
    async fn test_sign_up_login_check_token() {
        let state = test_state();
        let account = json!({
            "fullName": "Asha Patel",
            "email": "asha@farm.test",
            "password": "monsoon-2024"
        });

        let (status, _) = send(&state, Method::POST, "/auth/signUp", Some(account.clone()), None).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&state, Method::POST, "/auth/signUp", Some(account), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, body) = send(
            &state,
            Method::POST,
            "/auth/login",
            Some(json!({ "email": "asha@farm.test", "password": "wrong" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid password");

        let (status, body) = send(
            &state,
            Method::POST,
            "/auth/login",
            Some(json!({ "email": "asha@farm.test", "password": "monsoon-2024" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["fullName"], "Asha Patel");
        let token = body["token"].as_str().unwrap().to_string();

        let (status, body) = send(&state, Method::GET, "/auth/checkToken", None, Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Valid token found");
    }

    #[tokio::test]
    async fn test_check_token_rejects_bad_tokens() {
        let state = test_state();

        let (status, _) = send(&state, Method::GET, "/auth/checkToken", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // "Authorization: Bearer " carries no token at all
        let (status, body) = send(&state, Method::GET, "/auth/checkToken", None, Some("")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, body) = send(&state, Method::GET, "/auth/checkToken", None, Some("not-a-jwt")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let now = chrono::Utc::now().timestamp() as u64;
        let expired = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &Claims {
                sub: "65f000000000000000000000".into(),
                email: "gone@farm.test".into(),
                iat: now - 7200,
                exp: now - 3600,
            },
            &jsonwebtoken::EncodingKey::from_secret(DEV_JWT_SECRET.as_bytes()),
        )
        .unwrap();
        let (status, _) = send(&state, Method::GET, "/auth/checkToken", None, Some(&expired)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_route_and_preflight() {
        let state = test_state();

        let (status, body) = send(&state, Method::GET, "/irrigate/now", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Route /irrigate/now not found");

        let (status, _) = send(&state, Method::GET, "/SensorData/nothing", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&state, Method::OPTIONS, "/SensorData/getLatest", None, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&state, Method::POST, "/health", None, None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_oversized_json_body_rejected() {
        let state = test_state();
        let padding = "x".repeat(JSON_BODY_LIMIT + 1);
        let (status, body) = send(
            &state,
            Method::POST,
            "/auth/login",
            Some(json!({ "email": padding })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Request body too large");
    }

    #[tokio::test]
    async fn test_report_without_upstreams() {
        let state = test_state();
        let (status, body) = send(&state, Method::GET, "/report?month=2", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"]["insights"], routes::report::INSIGHTS_FALLBACK);
        assert_eq!(body["message"]["meta"]["reportPeriod"], "2 month(s)");
        assert_eq!(body["message"]["plantHealth"]["diseaseStats"]["total_count"], 0);
    }

    #[tokio::test]
    async fn test_record_then_sum_water_usage() {
        let state = test_state();
        let start = 1_700_000_000_000_i64;

        let (status, body) = send(
            &state,
            Method::POST,
            "/SensorData/relay/recordUsage/1",
            Some(json!({ "startTimestamp": start, "endTimestamp": start + 600_000 })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"]["relayNumber"], "1");
        assert_eq!(body["message"]["durationMinutes"], 10.0);
        assert_eq!(body["message"]["waterUsageLiters"], 20.0);

        let later = start + 3_600_000;
        let (status, _) = send(
            &state,
            Method::POST,
            "/SensorData/relay/recordUsage/1",
            Some(json!({ "startTimestamp": later, "endTimestamp": later + 300_000 })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(
            &state,
            Method::POST,
            "/SensorData/relay/recordUsage/1",
            Some(json!({ "startTimestamp": start })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "startTimestamp and endTimestamp are required");

        let (status, body) = send(&state, Method::POST, "/SensorData/relay/getWaterUsage/1", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"]["relayNumber"], "1");
        assert_eq!(body["message"]["totalLiters"], 30.0);
        assert_eq!(body["message"]["totalMinutes"], 15.0);
        assert_eq!(body["message"]["records"].as_array().unwrap().len(), 2);

        let (status, body) = send(
            &state,
            Method::POST,
            "/SensorData/relay/getWaterUsage/1",
            Some(json!({ "startTimestamp": start, "endTimestamp": start + 1_000 })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"]["totalLiters"], 20.0);

        let (status, body) = send(
            &state,
            Method::POST,
            "/SensorData/relay/getWaterUsage/2",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"]["totalLiters"], 0.0);
        assert_eq!(body["message"]["records"], json!([]));
    }

    #[tokio::test]
    async fn test_water_usage_rejects_half_open_range() {
        let state = test_state();
        for range in [json!({ "startTimestamp": 1_000 }), json!({ "endTimestamp": 1_000 })] {
            let (status, body) = send(
                &state,
                Method::POST,
                "/SensorData/relay/getWaterUsage/1",
                Some(range),
                None,
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["message"], "Provide both startTimestamp and endTimestamp, in order");
        }
    }

    #[tokio::test]
    async fn test_add_sensor_outcomes() {
        let state = test_state();
        let add = |n: u32| Some(json!({ "sensorNumber": n }));

        let (status, body) = send(&state, Method::POST, "/SensorData/addSensor/relay", add(1), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Created relay list with sensor 1");

        let (status, body) = send(&state, Method::POST, "/SensorData/addSensor/relay", add(2), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Added sensor 2 to relay list");

        let (status, body) = send(&state, Method::POST, "/SensorData/addSensor/relay", add(1), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Sensor 1 already exists in relay list");

        let (status, body) = send(&state, Method::POST, "/SensorData/addSensor/windmill", add(1), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (_, body) = send(&state, Method::GET, "/SensorData/getSensor/relay", None, None).await;
        assert_eq!(body["message"]["sensors"], json!(["1", "2"]));
    }

    #[tokio::test]
    async fn test_latest_reading_per_family() {
        let state = test_state();

        let (status, body) = send(&state, Method::GET, "/SensorData/getLatest", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"]["resultTemp"], Value::Null);
        assert_eq!(body["message"]["resultHumi"], Value::Null);

        send(
            &state,
            Method::POST,
            "/SensorData/temperature/upload",
            Some(json!({ "sensorNumber": 4, "temperature": 31.5 })),
            None,
        )
        .await;

        let (_, body) = send(&state, Method::GET, "/SensorData/getLatest", None, None).await;
        assert_eq!(body["message"]["resultTemp"]["temperature"], 31.5);
        assert_eq!(body["message"]["resultTemp"]["metadata"]["sensorNumber"], "4");
        assert_eq!(body["message"]["resultHumi"], Value::Null);
    }

    #[tokio::test]
    async fn test_sensor_state_lists_every_family() {
        let state = test_state();

        let (status, body) = send(&state, Method::GET, "/SensorData/getSensorState", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["message"],
            json!({ "temperatureStates": [], "humidityStates": [], "relayStates": [] })
        );

        send(
            &state,
            Method::POST,
            "/SensorData/relay/changeState/3",
            Some(json!({ "state": "on" })),
            None,
        )
        .await;

        let (_, body) = send(&state, Method::GET, "/SensorData/getSensorState", None, None).await;
        assert_eq!(
            body["message"]["relayStates"],
            json!([{ "sensorNumber": "3", "state": "on" }])
        );
        assert_eq!(body["message"]["humidityStates"], json!([]));
    }

    #[tokio::test]
    async fn test_disease_stats_default_to_zero() {
        let state = test_state();
        let (status, body) = send(&state, Method::GET, "/PlantPrediction/getDiseaseStats", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(
            body["message"],
            json!({ "healthy_count": 0, "unhealthy_count": 0, "total_count": 0 })
        );
    }
}
