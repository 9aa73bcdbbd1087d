//! HTTP Routes for Authentication
//!
//! - POST   /auth/signUp     - Create an account
//! - POST   /auth/login      - Verify credentials and issue a JWT
//! - GET    /auth/checkToken - Validate a bearer token
//! - DELETE /auth/logout     - Client-side logout acknowledgement

use bytes::Bytes;
use chrono::{DateTime, Utc};
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{
    cors_preflight, fail, get_auth_header, json_response, method_not_allowed, not_found,
    parse_json_body, reply, BoxBody,
};
use crate::auth::password::check_credentials;
use crate::auth::{extract_token_from_header, hash_password};
use crate::server::AppState;
use crate::store::NewUser;
use crate::types::{IrrigationError, Result};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub message: &'static str,
    pub expires_at: String,
    pub user: UserSummary,
    pub token: String,
}

/// Trimmed, non-empty field
fn required(field: Option<String>) -> Option<String> {
    field
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// POST /auth/signUp
async fn handle_sign_up(req: Request<Bytes>, state: &AppState) -> Result<Response<BoxBody>> {
    let body: SignUpRequest = parse_json_body(req.body())?;

    let (Some(full_name), Some(email), Some(password)) = (
        required(body.full_name),
        required(body.email),
        body.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(IrrigationError::InvalidInput(
            "All fields are required: fullName, email, password".into(),
        ));
    };

    if state.stores.users.find_by_email(&email).await?.is_some() {
        return Err(IrrigationError::InvalidInput(
            crate::store::DUPLICATE_EMAIL.into(),
        ));
    }

    let password_hash = hash_password(&password)?;
    let id = state
        .stores
        .users
        .insert(NewUser {
            full_name,
            email: email.clone(),
            password_hash,
        })
        .await?;

    info!(user_id = %id, "Registered user {}", email);
    Ok(reply(StatusCode::CREATED, "User registered successfully"))
}

/// POST /auth/login
async fn handle_login(req: Request<Bytes>, state: &AppState) -> Result<Response<BoxBody>> {
    let body: LoginRequest = parse_json_body(req.body())?;

    let (Some(email), Some(password)) = (
        required(body.email),
        body.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(IrrigationError::InvalidInput(
            "Email and password are required".into(),
        ));
    };

    let Some(user) = state.stores.users.find_by_email(&email).await? else {
        warn!("Login failed - user not found: {}", email);
        return Err(IrrigationError::NotFound("User not found".into()));
    };

    if let Err(e) = check_credentials(&password, &user.password_hash) {
        warn!("Login failed - invalid password: {}", email);
        return Err(e);
    }

    let (token, expires_at) = state.jwt.generate_token(&user.id, &user.email)?;
    let expires_at = DateTime::<Utc>::from_timestamp(expires_at as i64, 0)
        .map(|at| at.to_rfc3339())
        .unwrap_or_default();

    info!("Login successful: {}", email);
    Ok(json_response(
        StatusCode::OK,
        &LoginResponse {
            success: true,
            message: "Login successful",
            expires_at,
            user: UserSummary {
                id: user.id,
                full_name: user.full_name,
                email: user.email,
            },
            token,
        },
    ))
}

/// GET /auth/checkToken
async fn handle_check_token(req: Request<Bytes>, state: &AppState) -> Result<Response<BoxBody>> {
    let Some(token) = extract_token_from_header(get_auth_header(&req)) else {
        return Err(IrrigationError::InvalidInput(
            "Authentication token not found".into(),
        ));
    };

    let result = state.jwt.verify_token(token);
    let claims = match (result.valid, result.claims) {
        (true, Some(claims)) => claims,
        _ => {
            let reason = result.error.unwrap_or_else(|| "Invalid Token".into());
            return Err(IrrigationError::Auth(reason));
        }
    };

    if state.stores.users.find_by_id(&claims.sub).await?.is_none() {
        warn!(user_id = %claims.sub, "Token for unknown user");
        return Err(IrrigationError::Auth("Invalid Token".into()));
    }

    Ok(reply(StatusCode::OK, "Valid token found"))
}

/// DELETE /auth/logout
///
/// Tokens are stateless; the client drops its copy.
fn handle_logout() -> Response<BoxBody> {
    reply(StatusCode::OK, "Logged out successfully")
}

/// Handle auth-related HTTP requests.
///
/// Returns Some(response) if request was handled, None if not an auth route.
pub async fn handle_auth_request(req: Request<Bytes>, state: &AppState) -> Option<Response<BoxBody>> {
    let path = req.uri().path().to_string();
    if !path.starts_with("/auth") {
        return None;
    }

    let method = req.method().clone();
    if method == Method::OPTIONS {
        return Some(cors_preflight());
    }

    let result = match (&method, path.trim_end_matches('/')) {
        (&Method::POST, "/auth/signUp") => handle_sign_up(req, state).await,
        (&Method::POST, "/auth/login") => handle_login(req, state).await,
        (&Method::GET, "/auth/checkToken") => handle_check_token(req, state).await,
        (&Method::DELETE, "/auth/logout") => Ok(handle_logout()),

        (_, "/auth/signUp") | (_, "/auth/login") | (_, "/auth/checkToken") | (_, "/auth/logout") => {
            Ok(method_not_allowed())
        }

        _ => Ok(not_found(&path)),
    };

    Some(result.unwrap_or_else(|e| fail(&e)))
}
