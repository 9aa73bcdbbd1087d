//! Registered sensor names per sensor family

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for sensor lists
pub const SENSOR_LIST_COLLECTION: &str = "sensorlists";

/// One document per sensor family (`temperature`, `humidity`, `relay`)
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SensorListDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub sensortype: String,

    #[serde(default)]
    pub sensors: Vec<String>,
}

impl IntoIndexes for SensorListDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "sensortype": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("sensortype_unique".to_string())
                    .build(),
            ),
        )]
    }
}
