//! Pump run records
//!
//! Each record is one relay on/off cycle reported by the IoT node. Litres are
//! derived from the run time and the configured pump flow rate.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for water usage
pub const WATER_USAGE_COLLECTION: &str = "waterusagedata";

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WaterUsageDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub relay_number: String,

    /// Pump start, epoch milliseconds
    pub start_timestamp: i64,

    /// Pump stop, epoch milliseconds
    pub end_timestamp: i64,

    pub duration_minutes: f64,

    pub water_usage_liters: f64,

    pub recorded_at: DateTime,
}

impl IntoIndexes for WaterUsageDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "relayNumber": 1 },
                Some(
                    IndexOptions::builder()
                        .name("relay_number_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "recordedAt": 1 },
                Some(
                    IndexOptions::builder()
                        .name("recorded_at_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
