//! In-memory stores
//!
//! Same semantics as the MongoDB stores, kept behind `tokio::sync::RwLock`.

use bson::oid::ObjectId;
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{
    AddOutcome, MonthlyUsage, NewUser, ReadingStore, SensorRegistry, User, UserStore,
    WaterUsageRecord, WaterUsageStore, DUPLICATE_EMAIL,
};
use crate::analytics::{
    bucketize, summarize_monthly, AnalyticsBucket, AnalyticsQuery, DateRange, Interval,
    MonthlySummary,
};
use crate::sensors::{Reading, ReadingKind, SensorKind};
use crate::types::{IrrigationError, Result};

pub struct MemoryReadingStore {
    offset: FixedOffset,
    readings: RwLock<HashMap<ReadingKind, Vec<Reading>>>,
}

impl MemoryReadingStore {
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            offset,
            readings: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl ReadingStore for MemoryReadingStore {
    async fn insert(&self, kind: ReadingKind, reading: Reading) -> Result<()> {
        self.readings.write().await.entry(kind).or_default().push(reading);
        Ok(())
    }

    async fn latest(&self, kind: ReadingKind) -> Result<Option<Reading>> {
        let readings = self.readings.read().await;
        // max_by_key keeps the last maximum, so later inserts win ties
        Ok(readings
            .get(&kind)
            .and_then(|list| list.iter().max_by_key(|r| r.timestamp).cloned()))
    }

    async fn analytics(&self, kind: ReadingKind, query: &AnalyticsQuery) -> Result<Vec<AnalyticsBucket>> {
        let readings = self.readings.read().await;
        let Some(list) = readings.get(&kind) else {
            return Ok(Vec::new());
        };

        let matching = list.iter().filter(|r| {
            query.range.contains(r.timestamp)
                && query
                    .sensor_number
                    .as_ref()
                    .map_or(true, |n| *n == r.sensor_number)
        });

        Ok(bucketize(kind, matching, query.interval, self.offset))
    }

    async fn monthly_summary(&self, kind: ReadingKind, range: &DateRange) -> Result<Vec<MonthlySummary>> {
        let readings = self.readings.read().await;
        let Some(list) = readings.get(&kind) else {
            return Ok(Vec::new());
        };

        let matching = list.iter().filter(|r| range.contains(r.timestamp));
        Ok(summarize_monthly(kind, matching, self.offset))
    }
}

#[derive(Default)]
pub struct MemorySensorRegistry {
    lists: RwLock<HashMap<String, Vec<String>>>,
}

#[async_trait::async_trait]
impl SensorRegistry for MemorySensorRegistry {
    async fn add(&self, kind: SensorKind, sensor: &str) -> Result<AddOutcome> {
        let mut lists = self.lists.write().await;
        match lists.get_mut(kind.as_str()) {
            Some(list) if list.iter().any(|s| s == sensor) => Ok(AddOutcome::AlreadyPresent),
            Some(list) => {
                list.push(sensor.to_string());
                Ok(AddOutcome::Added)
            }
            None => {
                lists.insert(kind.as_str().to_string(), vec![sensor.to_string()]);
                Ok(AddOutcome::Created)
            }
        }
    }

    async fn list(&self, sensor_type: &str) -> Result<Vec<String>> {
        Ok(self
            .lists
            .read()
            .await
            .get(sensor_type)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<User>>,
}

#[async_trait::async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<String> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email == user.email) {
            return Err(IrrigationError::InvalidInput(DUPLICATE_EMAIL.into()));
        }

        let id = ObjectId::new().to_hex();
        users.push(User {
            id: id.clone(),
            full_name: user.full_name,
            email: user.email,
            password_hash: user.password_hash,
            created_at: Utc::now(),
        });
        Ok(id)
    }
}

pub struct MemoryWaterUsageStore {
    offset: FixedOffset,
    records: RwLock<Vec<WaterUsageRecord>>,
}

impl MemoryWaterUsageStore {
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            offset,
            records: RwLock::new(Vec::new()),
        }
    }
}

fn start_of(record: &WaterUsageRecord) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(record.start_timestamp)
}

#[async_trait::async_trait]
impl WaterUsageStore for MemoryWaterUsageStore {
    async fn record(&self, record: WaterUsageRecord) -> Result<()> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn for_relay(&self, relay_number: &str, range_ms: Option<(i64, i64)>) -> Result<Vec<WaterUsageRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<WaterUsageRecord> = records
            .iter()
            .filter(|r| r.relay_number == relay_number)
            .filter(|r| {
                range_ms.map_or(true, |(from, to)| {
                    r.start_timestamp >= from && r.start_timestamp <= to
                })
            })
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.start_timestamp);
        Ok(matching)
    }

    async fn monthly_totals(&self, range: &DateRange) -> Result<Vec<MonthlyUsage>> {
        let records = self.records.read().await;
        let mut months: BTreeMap<String, f64> = BTreeMap::new();

        for record in records.iter() {
            let Some(start) = start_of(record) else {
                continue;
            };
            if range.contains(start) {
                *months
                    .entry(Interval::Month.bucket_key(start, self.offset))
                    .or_default() += record.water_usage_liters;
            }
        }

        Ok(months
            .into_iter()
            .map(|(month, liters)| MonthlyUsage { month, liters })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn reading(sensor: &str, ts: DateTime<Utc>, value: f64) -> Reading {
        Reading {
            timestamp: ts,
            sensor_number: sensor.into(),
            units: "celsius".into(),
            value,
        }
    }

    #[tokio::test]
    async fn test_readings_filter_by_sensor_and_range() {
        let store = MemoryReadingStore::new(utc());
        let day = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

        store.insert(ReadingKind::Temperature, reading("1", day, 20.0)).await.unwrap();
        store.insert(ReadingKind::Temperature, reading("1", day, 30.0)).await.unwrap();
        store.insert(ReadingKind::Temperature, reading("2", day, 90.0)).await.unwrap();
        store
            .insert(ReadingKind::Temperature, reading("1", day + Duration::days(5), 99.0))
            .await
            .unwrap();

        let query = AnalyticsQuery {
            sensor_number: Some("1".into()),
            range: DateRange::from_stamps("2024-05-01", "2024-05-01", utc()).unwrap(),
            interval: Interval::Day,
        };
        let buckets = store.analytics(ReadingKind::Temperature, &query).await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].avg, 25.0);
        assert_eq!(buckets[0].total_documents, 2);

        // Other kind is empty
        let buckets = store.analytics(ReadingKind::Humidity, &query).await.unwrap();
        assert!(buckets.is_empty());
    }

    #[tokio::test]
    async fn test_latest_reading() {
        let store = MemoryReadingStore::new(utc());
        assert!(store.latest(ReadingKind::Humidity).await.unwrap().is_none());

        let t = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        store.insert(ReadingKind::Humidity, reading("1", t + Duration::hours(1), 50.0)).await.unwrap();
        store.insert(ReadingKind::Humidity, reading("2", t, 40.0)).await.unwrap();

        let latest = store.latest(ReadingKind::Humidity).await.unwrap().unwrap();
        assert_eq!(latest.value, 50.0);
    }

    #[tokio::test]
    async fn test_sensor_registry_outcomes() {
        let registry = MemorySensorRegistry::default();

        assert_eq!(registry.add(SensorKind::Relay, "pump-1").await.unwrap(), AddOutcome::Created);
        assert_eq!(registry.add(SensorKind::Relay, "pump-2").await.unwrap(), AddOutcome::Added);
        assert_eq!(
            registry.add(SensorKind::Relay, "pump-1").await.unwrap(),
            AddOutcome::AlreadyPresent
        );

        assert_eq!(registry.list("relay").await.unwrap(), vec!["pump-1", "pump-2"]);
        assert!(registry.list("humidity").await.unwrap().is_empty());
        assert!(registry.list("barometer").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_user_store_rejects_duplicate_email() {
        let store = MemoryUserStore::default();
        let new_user = || NewUser {
            full_name: "Ravi".into(),
            email: "ravi@example.com".into(),
            password_hash: "hash".into(),
        };

        let id = store.insert(new_user()).await.unwrap();
        assert_eq!(id.len(), 24);
        assert_eq!(store.find_by_id(&id).await.unwrap().unwrap().email, "ravi@example.com");

        let err = store.insert(new_user()).await.unwrap_err();
        assert_eq!(err.to_string(), DUPLICATE_EMAIL);
    }

    #[tokio::test]
    async fn test_water_usage_monthly_totals() {
        let store = MemoryWaterUsageStore::new(utc());
        let now = Utc::now();
        let may = Utc.with_ymd_and_hms(2024, 5, 3, 6, 0, 0).unwrap().timestamp_millis();
        let june = Utc.with_ymd_and_hms(2024, 6, 3, 6, 0, 0).unwrap().timestamp_millis();

        for (relay, start) in [("1", may), ("2", may), ("1", june)] {
            let record = WaterUsageRecord::from_run(relay, start, start + 10 * 60_000, 2.0, now).unwrap();
            store.record(record).await.unwrap();
        }

        let range = DateRange::from_stamps("2024-05-01", "2024-06-30", utc()).unwrap();
        let totals = store.monthly_totals(&range).await.unwrap();
        assert_eq!(
            totals,
            vec![
                MonthlyUsage { month: "2024-05".into(), liters: 40.0 },
                MonthlyUsage { month: "2024-06".into(), liters: 20.0 },
            ]
        );

        let relay_one = store.for_relay("1", Some((june, june))).await.unwrap();
        assert_eq!(relay_one.len(), 1);
        assert_eq!(store.for_relay("1", None).await.unwrap().len(), 2);
    }
}
