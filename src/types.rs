//! Shared error type for the irrigation node
//!
//! Every request boundary converts these into the `{ success, message }`
//! envelope. `status()` decides the HTTP code.

use hyper::StatusCode;
use thiserror::Error;

/// Errors surfaced by stores, upstream clients and route handlers
#[derive(Error, Debug)]
pub enum IrrigationError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IrrigationError {
    /// HTTP status used when this error reaches a client
    pub fn status(&self) -> StatusCode {
        match self {
            IrrigationError::InvalidInput(_) | IrrigationError::Http(_) => StatusCode::BAD_REQUEST,
            IrrigationError::Auth(_) => StatusCode::UNAUTHORIZED,
            IrrigationError::NotFound(_) => StatusCode::NOT_FOUND,
            IrrigationError::Upstream(_) => StatusCode::BAD_GATEWAY,
            IrrigationError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            IrrigationError::Database(_)
            | IrrigationError::Internal(_)
            | IrrigationError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message placed in the response envelope
    ///
    /// Server-side details stay in the logs; upstream errors may carry URLs.
    pub fn public_message(&self) -> String {
        match self {
            IrrigationError::InvalidInput(m)
            | IrrigationError::Http(m)
            | IrrigationError::Auth(m)
            | IrrigationError::NotFound(m)
            | IrrigationError::Config(m) => m.clone(),
            IrrigationError::Upstream(_) => "Upstream service unavailable".to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

impl From<mongodb::error::Error> for IrrigationError {
    fn from(e: mongodb::error::Error) -> Self {
        IrrigationError::Database(e.to_string())
    }
}

impl From<reqwest::Error> for IrrigationError {
    fn from(e: reqwest::Error) -> Self {
        IrrigationError::Upstream(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IrrigationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            IrrigationError::InvalidInput("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            IrrigationError::Auth("nope".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            IrrigationError::Upstream("down".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            IrrigationError::Database("gone".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_public_message_hides_internals() {
        assert_eq!(
            IrrigationError::Auth("Invalid password".into()).public_message(),
            "Invalid password"
        );
        assert_eq!(
            IrrigationError::Database("connection reset".into()).public_message(),
            "Internal server error"
        );
        assert_eq!(
            IrrigationError::Upstream("https://x?apiKey=k".into()).public_message(),
            "Upstream service unavailable"
        );
    }
}
