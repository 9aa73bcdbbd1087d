//! Sensor kinds, switch states and readings
//!
//! Three sensor families exist: temperature and humidity probes that upload
//! time-series readings, and relays (pumps) that only carry on/off state.
//! Every family also has an on/off switch in the realtime store.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::types::IrrigationError;

/// Sensor family as it appears in URL paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Temperature,
    Humidity,
    Relay,
}

impl SensorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
            SensorKind::Relay => "relay",
        }
    }

    /// Group under which switch states live in the realtime store
    pub fn state_group(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature-sensors",
            SensorKind::Humidity => "humidity-sensors",
            SensorKind::Relay => "relay-sensors",
        }
    }

    /// The time-series kind, if this family uploads readings
    pub fn reading_kind(&self) -> Option<ReadingKind> {
        match self {
            SensorKind::Temperature => Some(ReadingKind::Temperature),
            SensorKind::Humidity => Some(ReadingKind::Humidity),
            SensorKind::Relay => None,
        }
    }
}

impl FromStr for SensorKind {
    type Err = IrrigationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temperature" => Ok(SensorKind::Temperature),
            "humidity" => Ok(SensorKind::Humidity),
            "relay" => Ok(SensorKind::Relay),
            _ => Err(IrrigationError::InvalidInput(
                "Invalid sensor type. Must be temperature, humidity, or relay".into(),
            )),
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-series reading family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadingKind {
    Temperature,
    Humidity,
}

impl ReadingKind {
    pub fn collection(&self) -> &'static str {
        match self {
            ReadingKind::Temperature => "temperaturedatas",
            ReadingKind::Humidity => "humiditydatas",
        }
    }

    /// Document and payload field holding the measured value
    pub fn field(&self) -> &'static str {
        match self {
            ReadingKind::Temperature => "temperature",
            ReadingKind::Humidity => "humidity",
        }
    }

    /// Capitalised field name used in aggregate keys (`avgTemperature`)
    pub fn label(&self) -> &'static str {
        match self {
            ReadingKind::Temperature => "Temperature",
            ReadingKind::Humidity => "Humidity",
        }
    }

    pub fn default_units(&self) -> &'static str {
        match self {
            ReadingKind::Temperature => "celsius",
            ReadingKind::Humidity => "percent",
        }
    }
}

impl fmt::Display for ReadingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

/// On/off switch value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    pub fn toggled(self) -> Self {
        match self {
            SwitchState::On => SwitchState::Off,
            SwitchState::Off => SwitchState::On,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchState::On => "on",
            SwitchState::Off => "off",
        }
    }
}

impl FromStr for SwitchState {
    type Err = IrrigationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(SwitchState::On),
            "off" => Ok(SwitchState::Off),
            _ => Err(IrrigationError::InvalidInput(
                "State must be either \"on\" or \"off\"".into(),
            )),
        }
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored time-series reading
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub sensor_number: String,
    pub units: String,
    pub value: f64,
}

impl Reading {
    /// Serialize with the value under the kind's field name
    pub fn view(&self, kind: ReadingKind) -> ReadingView<'_> {
        ReadingView { kind, reading: self }
    }
}

/// Serializer for a reading in the wire shape clients expect:
/// `{ timestamp, metadata: { sensorNumber, units }, temperature }`
pub struct ReadingView<'a> {
    kind: ReadingKind,
    reading: &'a Reading,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadingMetadata<'a> {
    sensor_number: &'a str,
    units: &'a str,
}

impl Serialize for ReadingView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("timestamp", &self.reading.timestamp.to_rfc3339())?;
        map.serialize_entry(
            "metadata",
            &ReadingMetadata {
                sensor_number: &self.reading.sensor_number,
                units: &self.reading.units,
            },
        )?;
        map.serialize_entry(self.kind.field(), &self.reading.value)?;
        map.end()
    }
}

/// Upload payload posted by the IoT node
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReading {
    #[serde(default)]
    pub sensor_number: Option<serde_json::Value>,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub value: Option<f64>,
}

impl NewReading {
    /// Validate and stamp the upload as a reading taken now
    pub fn into_reading(self, kind: ReadingKind, now: DateTime<Utc>) -> Result<Reading, IrrigationError> {
        // Firmware sends the sensor number as either a string or an integer
        let sensor_number = match self.sensor_number {
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        if sensor_number.is_empty() {
            return Err(IrrigationError::InvalidInput("sensorNumber is required".into()));
        }

        let value = match kind {
            ReadingKind::Temperature => self.temperature,
            ReadingKind::Humidity => self.humidity,
        }
        .or(self.value)
        .ok_or_else(|| IrrigationError::InvalidInput(format!("{} value is required", kind.field())))?;

        if !value.is_finite() {
            return Err(IrrigationError::InvalidInput(format!(
                "{} must be a finite number",
                kind.field()
            )));
        }

        let units = self
            .units
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| kind.default_units().to_string());

        Ok(Reading {
            timestamp: now,
            sensor_number,
            units,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sensor_kind_parse() {
        assert_eq!("relay".parse::<SensorKind>().unwrap(), SensorKind::Relay);
        assert_eq!(SensorKind::Humidity.state_group(), "humidity-sensors");
        assert!("pressure".parse::<SensorKind>().is_err());
        assert!("Relay".parse::<SensorKind>().is_err());
        assert_eq!(SensorKind::Relay.reading_kind(), None);
    }

    #[test]
    fn test_switch_state() {
        assert_eq!(" ON ".parse::<SwitchState>().unwrap(), SwitchState::On);
        assert_eq!("off".parse::<SwitchState>().unwrap(), SwitchState::Off);
        assert!("maybe".parse::<SwitchState>().is_err());
        assert_eq!(SwitchState::On.toggled().toggled(), SwitchState::On);
        assert_eq!(serde_json::to_value(SwitchState::Off).unwrap(), "off");
    }

    #[test]
    fn test_new_reading_defaults_units() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();
        let upload: NewReading =
            serde_json::from_str(r#"{"sensorNumber": 3, "humidity": 41.5}"#).unwrap();

        let reading = upload.into_reading(ReadingKind::Humidity, now).unwrap();
        assert_eq!(reading.sensor_number, "3");
        assert_eq!(reading.units, "percent");
        assert_eq!(reading.value, 41.5);
        assert_eq!(reading.timestamp, now);
    }

    #[test]
    fn test_new_reading_rejects_missing_fields() {
        let now = Utc::now();

        let upload: NewReading = serde_json::from_str(r#"{"temperature": 20.0}"#).unwrap();
        assert!(upload.into_reading(ReadingKind::Temperature, now).is_err());

        let upload: NewReading = serde_json::from_str(r#"{"sensorNumber": "1"}"#).unwrap();
        assert!(upload.into_reading(ReadingKind::Temperature, now).is_err());

        // Humidity field is not accepted for a temperature upload
        let upload: NewReading =
            serde_json::from_str(r#"{"sensorNumber": "1", "humidity": 50}"#).unwrap();
        assert!(upload.into_reading(ReadingKind::Temperature, now).is_err());
    }

    #[test]
    fn test_reading_view_shape() {
        let reading = Reading {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap(),
            sensor_number: "2".into(),
            units: "celsius".into(),
            value: 27.25,
        };

        let json = serde_json::to_value(reading.view(ReadingKind::Temperature)).unwrap();
        assert_eq!(json["temperature"], 27.25);
        assert_eq!(json["metadata"]["sensorNumber"], "2");
        assert_eq!(json["metadata"]["units"], "celsius");
        assert_eq!(json["timestamp"], "2024-05-01T06:00:00+00:00");
    }
}
