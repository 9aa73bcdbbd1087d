//! Persistence seams
//!
//! Route handlers talk to these traits only. The Mongo stores back them in
//! production; the in-memory versions serve dev mode without MongoDB and the
//! route tests.

pub mod memory;
pub mod mongo;

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::analytics::{AnalyticsBucket, AnalyticsQuery, DateRange, MonthlySummary};
use crate::db::MongoClient;
use crate::sensors::{Reading, ReadingKind, SensorKind};
use crate::types::{IrrigationError, Result};

pub use memory::{MemoryReadingStore, MemorySensorRegistry, MemoryUserStore, MemoryWaterUsageStore};
pub use mongo::{MongoReadingStore, MongoSensorRegistry, MongoUserStore, MongoWaterUsageStore};

/// Time-series readings for temperature and humidity probes
#[async_trait::async_trait]
pub trait ReadingStore: Send + Sync {
    async fn insert(&self, kind: ReadingKind, reading: Reading) -> Result<()>;

    /// Most recent reading across all sensors of the kind
    async fn latest(&self, kind: ReadingKind) -> Result<Option<Reading>>;

    async fn analytics(&self, kind: ReadingKind, query: &AnalyticsQuery) -> Result<Vec<AnalyticsBucket>>;

    /// Per-month statistics across all sensors of the kind
    async fn monthly_summary(&self, kind: ReadingKind, range: &DateRange) -> Result<Vec<MonthlySummary>>;
}

/// Result of registering a sensor name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// First sensor of this family; the list was created
    Created,
    Added,
    AlreadyPresent,
}

/// Named sensors per family
#[async_trait::async_trait]
pub trait SensorRegistry: Send + Sync {
    async fn add(&self, kind: SensorKind, sensor: &str) -> Result<AddOutcome>;

    /// Registered sensors for a family name; unknown names yield an empty list
    async fn list(&self, sensor_type: &str) -> Result<Vec<String>>;
}

/// A stored account
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Account to create; the password is already hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
}

/// Message used whenever an email collides with an existing account
pub const DUPLICATE_EMAIL: &str = "Email already registered";

#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;

    /// Insert and return the new id; duplicate emails are `InvalidInput`
    async fn insert(&self, user: NewUser) -> Result<String>;
}

/// One pump run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterUsageRecord {
    pub relay_number: String,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub duration_minutes: f64,
    pub water_usage_liters: f64,
    pub recorded_at: DateTime<Utc>,
}

impl WaterUsageRecord {
    /// Derive minutes and litres for a pump run given in epoch milliseconds
    pub fn from_run(
        relay_number: &str,
        start_ms: i64,
        end_ms: i64,
        flow_lpm: f64,
        recorded_at: DateTime<Utc>,
    ) -> Result<Self> {
        if start_ms < 0 || end_ms <= start_ms {
            return Err(IrrigationError::InvalidInput(
                "endTimestamp must be after startTimestamp".into(),
            ));
        }

        let duration_minutes = (end_ms - start_ms) as f64 / 60_000.0;

        Ok(Self {
            relay_number: relay_number.to_string(),
            start_timestamp: start_ms,
            end_timestamp: end_ms,
            duration_minutes,
            water_usage_liters: duration_minutes * flow_lpm,
            recorded_at,
        })
    }
}

/// Litres pumped in one calendar month (`YYYY-MM`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyUsage {
    pub month: String,
    #[serde(rename = "value")]
    pub liters: f64,
}

#[async_trait::async_trait]
pub trait WaterUsageStore: Send + Sync {
    async fn record(&self, record: WaterUsageRecord) -> Result<()>;

    /// Runs for one relay, optionally limited to starts within `[from, to]` ms
    async fn for_relay(&self, relay_number: &str, range_ms: Option<(i64, i64)>) -> Result<Vec<WaterUsageRecord>>;

    /// Litres per month for runs starting inside `range`, ascending
    async fn monthly_totals(&self, range: &DateRange) -> Result<Vec<MonthlyUsage>>;
}

/// Every persistence seam the routes need
#[derive(Clone)]
pub struct Stores {
    pub readings: Arc<dyn ReadingStore>,
    pub sensors: Arc<dyn SensorRegistry>,
    pub users: Arc<dyn UserStore>,
    pub water: Arc<dyn WaterUsageStore>,
}

impl Stores {
    /// In-process stores; nothing survives a restart
    pub fn memory(offset: FixedOffset) -> Self {
        Self {
            readings: Arc::new(MemoryReadingStore::new(offset)),
            sensors: Arc::new(MemorySensorRegistry::default()),
            users: Arc::new(MemoryUserStore::default()),
            water: Arc::new(MemoryWaterUsageStore::new(offset)),
        }
    }

    /// MongoDB-backed stores; creates the reading time-series if missing
    pub async fn mongo(client: &MongoClient, offset: FixedOffset) -> Result<Self> {
        for kind in [ReadingKind::Temperature, ReadingKind::Humidity] {
            client
                .ensure_timeseries(
                    kind.collection(),
                    crate::db::schemas::TIME_FIELD,
                    crate::db::schemas::META_FIELD,
                )
                .await?;
        }

        Ok(Self {
            readings: Arc::new(MongoReadingStore::new(client.clone(), offset)),
            sensors: Arc::new(MongoSensorRegistry::new(client).await?),
            users: Arc::new(MongoUserStore::new(client).await?),
            water: Arc::new(MongoWaterUsageStore::new(client, offset).await?),
        })
    }
}
