//! Database layer
//!
//! MongoDB storage for accounts, sensor lists, water usage and the reading
//! time-series.

pub mod mongo;
pub mod schemas;

pub use mongo::{IntoIndexes, MongoClient, MongoCollection};
pub use schemas::{SensorListDoc, UserDoc, WaterUsageDoc};
