//! Irrigation Node - backend for a smart irrigation system
//!
//! Field sensors upload temperature and soil-humidity readings; the mobile
//! and web clients read analytics, flip pump relays and pull farm data.
//!
//! ## Services
//!
//! - **Sensor data**: Time-series readings with day/month/year analytics
//! - **Switch state**: Relay and sensor on/off flags in a realtime tree
//! - **Accounts**: Sign-up, login and JWT checks
//! - **Proxies**: Weather, news, geocoding and plant-disease prediction
//! - **Reports**: Monthly summaries with generated agronomy insights

pub mod analytics;
pub mod auth;
pub mod config;
pub mod db;
pub mod logging;
pub mod realtime;
pub mod routes;
pub mod sensors;
pub mod server;
pub mod services;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{IrrigationError, Result};
