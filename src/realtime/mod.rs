//! Realtime state tree
//!
//! Switch states and plant-disease counters live in a JSON tree addressed by
//! slash-separated paths, mirroring the Firebase Realtime Database layout the
//! mobile app and IoT node read directly.

pub mod firebase;
pub mod memory;

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;

use crate::sensors::{SensorKind, SwitchState};
use crate::types::{IrrigationError, Result};

pub use firebase::FirebaseStateStore;
pub use memory::MemoryStateStore;

/// JSON tree keyed by slash paths
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    /// Value at `path`; `None` when nothing is stored there
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    /// Replace the value at `path`
    async fn set(&self, path: &str, value: Value) -> Result<()>;

    /// Merge `fields` into the object at `path`
    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<()>;

    /// Add `by` to the numeric child `field` of `path` (missing counts as zero)
    async fn increment(&self, path: &str, field: &str, by: i64) -> Result<()>;
}

/// Split a path into non-empty segments
pub(crate) fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Reject names Firebase does not allow as keys, plus `?` and control characters
pub fn validate_key(key: &str) -> Result<()> {
    let forbidden = |c: char| matches!(c, '.' | '#' | '$' | '[' | ']' | '/' | '?') || c.is_control();
    if key.is_empty() || key.chars().any(forbidden) {
        return Err(IrrigationError::InvalidInput(format!(
            "Invalid sensor number {key:?}"
        )));
    }
    Ok(())
}

/// Whether `change_state` created the switch or changed an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    Created,
    Changed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorState {
    pub sensor_number: String,
    pub state: Value,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllStates {
    pub temperature_states: Vec<SensorState>,
    pub humidity_states: Vec<SensorState>,
    pub relay_states: Vec<SensorState>,
}

/// On/off switches for every sensor family
#[derive(Clone)]
pub struct SwitchBoard {
    store: Arc<dyn StateStore>,
}

impl SwitchBoard {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    fn sensor_path(kind: SensorKind, sensor: &str) -> String {
        format!("{}/{}", kind.state_group(), sensor)
    }

    pub async fn change_state(
        &self,
        kind: SensorKind,
        sensor: &str,
        state: SwitchState,
    ) -> Result<ChangeOutcome> {
        validate_key(sensor)?;
        let path = Self::sensor_path(kind, sensor);

        let outcome = match self.store.get(&path).await? {
            None => {
                self.store.set(&path, json!({ "state": state })).await?;
                ChangeOutcome::Created
            }
            Some(_) => {
                let mut fields = Map::new();
                fields.insert("state".into(), json!(state));
                self.store.update(&path, fields).await?;
                ChangeOutcome::Changed
            }
        };

        info!(kind = %kind, sensor, state = %state, ?outcome, "Switch state changed");
        Ok(outcome)
    }

    /// States of one family; `None` when the family has no switches at all
    pub async fn states(&self, kind: SensorKind) -> Result<Option<Vec<SensorState>>> {
        Ok(self
            .store
            .get(kind.state_group())
            .await?
            .and_then(|group| group_states(&group)))
    }

    /// States of every family, missing families as empty lists
    pub async fn all_states(&self) -> Result<AllStates> {
        Ok(AllStates {
            temperature_states: self.states(SensorKind::Temperature).await?.unwrap_or_default(),
            humidity_states: self.states(SensorKind::Humidity).await?.unwrap_or_default(),
            relay_states: self.states(SensorKind::Relay).await?.unwrap_or_default(),
        })
    }

    /// Current state of one switch, if it is set to a recognised value
    pub async fn state(&self, kind: SensorKind, sensor: &str) -> Result<Option<SwitchState>> {
        validate_key(sensor)?;
        let path = format!("{}/state", Self::sensor_path(kind, sensor));
        Ok(self
            .store
            .get(&path)
            .await?
            .and_then(|v| v.as_str().and_then(|s| s.parse().ok())))
    }

    /// Flip a switch; a switch that does not exist yet is turned on
    ///
    /// Not atomic: the state is read and then written, so two concurrent
    /// toggles of the same switch can both read `off` and one flip is lost.
    pub async fn toggle(&self, kind: SensorKind, sensor: &str) -> Result<SwitchState> {
        let next = self
            .state(kind, sensor)
            .await?
            .unwrap_or(SwitchState::Off)
            .toggled();
        self.change_state(kind, sensor, next).await?;
        Ok(next)
    }
}

fn group_states(group: &Value) -> Option<Vec<SensorState>> {
    let sensors = group.as_object()?;
    Some(
        sensors
            .iter()
            .map(|(sensor, entry)| SensorState {
                sensor_number: sensor.clone(),
                state: entry.get("state").cloned().unwrap_or(Value::Null),
            })
            .collect(),
    )
}
