//! HTTP routes for the irrigation node
//!
//! Every JSON response uses the `{ "success": bool, "message": ... }`
//! envelope the mobile and web clients expect, and carries CORS headers.

pub mod api;
pub mod auth_routes;
pub mod general;
pub mod health;
pub mod plant;
pub mod report;
pub mod sensor_data;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, warn};

use crate::types::{IrrigationError, Result};

pub use api::handle_api_request;
pub use auth_routes::handle_auth_request;
pub use health::{health_check, root_greeting, version_info};
pub use plant::handle_plant_request;
pub use report::handle_report;
pub use sensor_data::handle_sensor_data_request;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Limit for JSON request bodies
pub const JSON_BODY_LIMIT: usize = 10 * 1024;

/// Limit for plant image uploads
pub const IMAGE_BODY_LIMIT: usize = 8 * 1024 * 1024;

const ALLOW_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization";

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", ALLOW_METHODS)
        .header("Access-Control-Allow-Headers", ALLOW_HEADERS)
        .body(full_body(json))
        .unwrap()
}

pub fn text_response(status: StatusCode, text: &'static str) -> Response<BoxBody> {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain; charset=utf-8")
        .header("Access-Control-Allow-Origin", "*")
        .body(full_body(text))
        .unwrap()
}

pub fn cors_preflight() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", ALLOW_METHODS)
        .header("Access-Control-Allow-Headers", ALLOW_HEADERS)
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap()
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize + ?Sized> {
    success: bool,
    message: &'a T,
}

/// `{ success, message }` with success derived from the status
pub fn reply<T: Serialize + ?Sized>(status: StatusCode, message: &T) -> Response<BoxBody> {
    json_response(
        status,
        &Envelope {
            success: status.as_u16() < 400,
            message,
        },
    )
}

/// Convert an error into its envelope, logging what the client does not see
pub fn fail(err: &IrrigationError) -> Response<BoxBody> {
    let status = err.status();
    if status.is_server_error() {
        error!(status = status.as_u16(), "Request failed: {}", err);
    } else {
        warn!(status = status.as_u16(), "Request rejected: {}", err);
    }
    reply(status, &err.public_message())
}

pub fn method_not_allowed() -> Response<BoxBody> {
    reply(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

pub fn not_found(path: &str) -> Response<BoxBody> {
    reply(StatusCode::NOT_FOUND, &format!("Route {} not found", path))
}

/// Collect a request body, refusing anything over `limit` bytes
pub async fn read_body<B>(body: B, limit: usize) -> Result<Bytes>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(IrrigationError::Http("Request body too large".into()))
        }
        Err(e) => Err(IrrigationError::Http(format!("Failed to read body: {}", e))),
    }
}

/// Decode a JSON body; an empty body reads as `{}`
pub fn parse_json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    let bytes: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        body
    };

    serde_json::from_slice(bytes).map_err(|e| IrrigationError::Http(format!("Invalid JSON: {}", e)))
}

pub fn parse_query<T: DeserializeOwned>(req: &Request<Bytes>) -> Result<T> {
    serde_urlencoded::from_str(req.uri().query().unwrap_or(""))
        .map_err(|e| IrrigationError::InvalidInput(format!("Invalid query string: {}", e)))
}

pub fn get_auth_header(req: &Request<Bytes>) -> Option<&str> {
    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Percent-decoded, non-empty path segments
pub fn path_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| s.to_string())
        })
        .collect()
}
