//! Reading documents in the `temperaturedatas` / `humiditydatas` time-series
//!
//! The value field is named after the kind, so readings are mapped by hand
//! rather than through a serde struct.

use bson::{doc, Document};

use crate::sensors::{Reading, ReadingKind};
use crate::types::IrrigationError;

/// Time field of the reading time-series collections
pub const TIME_FIELD: &str = "timestamp";

/// Meta field of the reading time-series collections
pub const META_FIELD: &str = "metadata";

pub fn reading_to_document(kind: ReadingKind, reading: &Reading) -> Document {
    let mut document = doc! {
        "timestamp": bson::DateTime::from_chrono(reading.timestamp),
        "metadata": {
            "sensorNumber": reading.sensor_number.as_str(),
            "units": reading.units.as_str(),
        },
    };
    document.insert(kind.field(), reading.value);
    document
}

pub fn document_to_reading(kind: ReadingKind, document: &Document) -> Result<Reading, IrrigationError> {
    let timestamp = document
        .get_datetime(TIME_FIELD)
        .map_err(|e| IrrigationError::Database(format!("Reading without timestamp: {e}")))?
        .to_chrono();

    let metadata = document
        .get_document(META_FIELD)
        .map_err(|e| IrrigationError::Database(format!("Reading without metadata: {e}")))?;

    let value = match document.get(kind.field()) {
        Some(bson::Bson::Double(v)) => *v,
        Some(bson::Bson::Int32(v)) => *v as f64,
        Some(bson::Bson::Int64(v)) => *v as f64,
        _ => {
            return Err(IrrigationError::Database(format!(
                "Reading without numeric {}",
                kind.field()
            )))
        }
    };

    Ok(Reading {
        timestamp,
        sensor_number: metadata.get_str("sensorNumber").unwrap_or_default().to_string(),
        units: metadata.get_str("units").unwrap_or_default().to_string(),
        value,
    })
}
