//! Database schemas
//!
//! Document structures for accounts, sensor lists, water usage and readings.

mod reading;
mod sensor_list;
mod user;
mod water_usage;

pub use reading::{document_to_reading, reading_to_document, META_FIELD, TIME_FIELD};
pub use sensor_list::{SensorListDoc, SENSOR_LIST_COLLECTION};
pub use user::{UserDoc, USER_COLLECTION};
pub use water_usage::{WaterUsageDoc, WATER_USAGE_COLLECTION};
