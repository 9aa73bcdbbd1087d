//! HTTP server and shared request state

pub mod http;

pub use http::{handle_request, run, AppState};
