//! MongoDB-backed stores

use bson::{doc, oid::ObjectId, Document};
use chrono::FixedOffset;
use mongodb::error::{ErrorKind, WriteFailure};
use tracing::{debug, warn};

use super::{
    AddOutcome, MonthlyUsage, NewUser, ReadingStore, SensorRegistry, User, UserStore,
    WaterUsageRecord, WaterUsageStore, DUPLICATE_EMAIL,
};
use crate::analytics::{
    analytics_pipeline, summary_pipeline, AnalyticsBucket, AnalyticsQuery, DateRange, Interval,
    MonthlySummary,
};
use crate::db::mongo::aggregate;
use crate::db::schemas::{
    document_to_reading, reading_to_document, SENSOR_LIST_COLLECTION, USER_COLLECTION,
    WATER_USAGE_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection, SensorListDoc, UserDoc, WaterUsageDoc};
use crate::sensors::{Reading, ReadingKind, SensorKind};
use crate::types::{IrrigationError, Result};

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == 11000
    )
}

pub struct MongoReadingStore {
    mongo: MongoClient,
    offset: FixedOffset,
}

impl MongoReadingStore {
    pub fn new(mongo: MongoClient, offset: FixedOffset) -> Self {
        Self { mongo, offset }
    }
}

#[async_trait::async_trait]
impl ReadingStore for MongoReadingStore {
    async fn insert(&self, kind: ReadingKind, reading: Reading) -> Result<()> {
        self.mongo
            .raw_collection(kind.collection())
            .insert_one(reading_to_document(kind, &reading))
            .await?;
        Ok(())
    }

    async fn latest(&self, kind: ReadingKind) -> Result<Option<Reading>> {
        let found = self
            .mongo
            .raw_collection(kind.collection())
            .find_one(doc! {})
            .sort(doc! { "timestamp": -1 })
            .await?;

        found
            .as_ref()
            .map(|document| document_to_reading(kind, document))
            .transpose()
    }

    async fn analytics(&self, kind: ReadingKind, query: &AnalyticsQuery) -> Result<Vec<AnalyticsBucket>> {
        let pipeline = analytics_pipeline(kind, query, self.offset);
        debug!(collection = kind.collection(), ?pipeline, "Running analytics pipeline");

        let rows = aggregate(&self.mongo.raw_collection(kind.collection()), pipeline).await?;
        rows.iter()
            .map(|row| AnalyticsBucket::from_document(kind, row))
            .collect()
    }

    async fn monthly_summary(&self, kind: ReadingKind, range: &DateRange) -> Result<Vec<MonthlySummary>> {
        let pipeline = summary_pipeline(kind, range, self.offset);
        let rows = aggregate(&self.mongo.raw_collection(kind.collection()), pipeline).await?;
        rows.iter()
            .map(|row| MonthlySummary::from_document(kind, row))
            .collect()
    }
}

pub struct MongoSensorRegistry {
    collection: MongoCollection<SensorListDoc>,
}

impl MongoSensorRegistry {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        Ok(Self {
            collection: mongo.collection(SENSOR_LIST_COLLECTION).await?,
        })
    }
}

#[async_trait::async_trait]
impl SensorRegistry for MongoSensorRegistry {
    async fn add(&self, kind: SensorKind, sensor: &str) -> Result<AddOutcome> {
        let result = self
            .collection
            .update_one(
                doc! { "sensortype": kind.as_str() },
                doc! { "$addToSet": { "sensors": sensor } },
                true,
            )
            .await?;

        Ok(if result.upserted_id.is_some() {
            AddOutcome::Created
        } else if result.modified_count == 0 {
            AddOutcome::AlreadyPresent
        } else {
            AddOutcome::Added
        })
    }

    async fn list(&self, sensor_type: &str) -> Result<Vec<String>> {
        Ok(self
            .collection
            .find_one(doc! { "sensortype": sensor_type })
            .await?
            .map(|list| list.sensors)
            .unwrap_or_default())
    }
}

pub struct MongoUserStore {
    collection: MongoCollection<UserDoc>,
}

impl MongoUserStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        Ok(Self {
            collection: mongo.collection(USER_COLLECTION).await?,
        })
    }
}

fn user_from_doc(user: UserDoc) -> User {
    User {
        id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
        full_name: user.full_name,
        email: user.email,
        password_hash: user.password,
        created_at: user.created_at.to_chrono(),
    }
}

#[async_trait::async_trait]
impl UserStore for MongoUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .collection
            .find_one(doc! { "email": email })
            .await?
            .map(user_from_doc))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        // Ids that are not ObjectIds cannot match any account
        let Ok(oid) = ObjectId::parse_str(id) else {
            return Ok(None);
        };

        Ok(self
            .collection
            .find_one(doc! { "_id": oid })
            .await?
            .map(user_from_doc))
    }

    async fn insert(&self, user: NewUser) -> Result<String> {
        let document = UserDoc::new(user.full_name, user.email, user.password_hash);

        match self.collection.inner().insert_one(document).await {
            Ok(result) => result
                .inserted_id
                .as_object_id()
                .map(|oid| oid.to_hex())
                .ok_or_else(|| IrrigationError::Database("Inserted user without ObjectId".into())),
            Err(e) if is_duplicate_key(&e) => {
                Err(IrrigationError::InvalidInput(DUPLICATE_EMAIL.into()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

pub struct MongoWaterUsageStore {
    collection: MongoCollection<WaterUsageDoc>,
    offset: FixedOffset,
}

impl MongoWaterUsageStore {
    pub async fn new(mongo: &MongoClient, offset: FixedOffset) -> Result<Self> {
        Ok(Self {
            collection: mongo.collection(WATER_USAGE_COLLECTION).await?,
            offset,
        })
    }
}

#[async_trait::async_trait]
impl WaterUsageStore for MongoWaterUsageStore {
    async fn record(&self, record: WaterUsageRecord) -> Result<()> {
        self.collection
            .insert_one(WaterUsageDoc {
                id: None,
                relay_number: record.relay_number,
                start_timestamp: record.start_timestamp,
                end_timestamp: record.end_timestamp,
                duration_minutes: record.duration_minutes,
                water_usage_liters: record.water_usage_liters,
                recorded_at: bson::DateTime::from_chrono(record.recorded_at),
            })
            .await?;
        Ok(())
    }

    async fn for_relay(&self, relay_number: &str, range_ms: Option<(i64, i64)>) -> Result<Vec<WaterUsageRecord>> {
        let mut filter = doc! { "relayNumber": relay_number };
        if let Some((from, to)) = range_ms {
            filter.insert("startTimestamp", doc! { "$gte": from, "$lte": to });
        }

        let docs = self
            .collection
            .find_many(filter, Some(doc! { "startTimestamp": 1 }))
            .await?;

        Ok(docs
            .into_iter()
            .map(|d| WaterUsageRecord {
                relay_number: d.relay_number,
                start_timestamp: d.start_timestamp,
                end_timestamp: d.end_timestamp,
                duration_minutes: d.duration_minutes,
                water_usage_liters: d.water_usage_liters,
                recorded_at: d.recorded_at.to_chrono(),
            })
            .collect())
    }

    async fn monthly_totals(&self, range: &DateRange) -> Result<Vec<MonthlyUsage>> {
        let pipeline = water_usage_pipeline(range, self.offset);
        let rows = self.collection.aggregate(pipeline).await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let month = row.get_str("_id").ok()?.to_string();
                let liters = row.get_f64("liters").unwrap_or_else(|e| {
                    warn!(month = %month, "Water usage total was not a double: {}", e);
                    0.0
                });
                Some(MonthlyUsage { month, liters })
            })
            .collect())
    }
}

fn water_usage_pipeline(range: &DateRange, offset: FixedOffset) -> Vec<Document> {
    vec![
        doc! {
            "$match": {
                "startTimestamp": {
                    "$gte": range.start.timestamp_millis(),
                    "$lt": range.end.timestamp_millis(),
                }
            }
        },
        doc! {
            "$group": {
                "_id": {
                    "$dateToString": {
                        "format": Interval::Month.date_format(),
                        "date": { "$toDate": "$startTimestamp" },
                        "timezone": offset.to_string(),
                    }
                },
                "liters": { "$sum": "$waterUsageLiters" },
            }
        },
        doc! { "$sort": { "_id": 1 } },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_water_usage_pipeline_matches_epoch_millis() {
        let offset = FixedOffset::east_opt(19_800).unwrap();
        let range = DateRange::from_stamps("2024-05-01", "2024-05-31", offset).unwrap();
        let pipeline = water_usage_pipeline(&range, offset);

        let matched = pipeline[0]
            .get_document("$match")
            .unwrap()
            .get_document("startTimestamp")
            .unwrap();
        assert_eq!(matched.get_i64("$gte").unwrap(), range.start.timestamp_millis());

        let group = pipeline[1].get_document("$group").unwrap();
        assert_eq!(
            group.get_document("liters").unwrap().get_str("$sum").unwrap(),
            "$waterUsageLiters"
        );
    }
}
