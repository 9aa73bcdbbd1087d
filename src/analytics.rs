//! Time-series bucketing for sensor readings
//!
//! Readings are grouped by a calendar key (day, month or year) cut in the
//! configured report offset, then reduced to count/avg/min/max. The same
//! grouping is expressed both as an in-memory fold and as a MongoDB pipeline
//! so the memory and Mongo stores agree.

use bson::{doc, Bson, Document};
use chrono::{DateTime, Duration, FixedOffset, Months, NaiveDate, TimeZone, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::sensors::{Reading, ReadingKind};
use crate::types::IrrigationError;

/// Bucket width for analytics queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    Day,
    Month,
    Year,
}

impl Interval {
    /// strftime pattern, valid for both chrono and `$dateToString`
    pub fn date_format(&self) -> &'static str {
        match self {
            Interval::Day => "%Y-%m-%d",
            Interval::Month => "%Y-%m",
            Interval::Year => "%Y",
        }
    }

    pub fn bucket_key(&self, timestamp: DateTime<Utc>, offset: FixedOffset) -> String {
        timestamp
            .with_timezone(&offset)
            .format(self.date_format())
            .to_string()
    }
}

impl FromStr for Interval {
    type Err = IrrigationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Interval::Day),
            "month" => Ok(Interval::Month),
            "year" => Ok(Interval::Year),
            _ => Err(IrrigationError::InvalidInput(
                "Interval should be year, month, or day".into(),
            )),
        }
    }
}

/// Parse a `YYYY-MM-DD` query stamp
pub fn parse_date_stamp(stamp: &str) -> Result<NaiveDate, IrrigationError> {
    NaiveDate::parse_from_str(stamp.trim(), "%Y-%m-%d").map_err(|_| {
        IrrigationError::InvalidInput(format!("Invalid date {stamp:?}, expected YYYY-MM-DD"))
    })
}

/// Half-open instant range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Whole calendar days from `start` through `end` inclusive, in `offset`
    pub fn from_days(
        start: NaiveDate,
        end: NaiveDate,
        offset: FixedOffset,
    ) -> Result<Self, IrrigationError> {
        if start > end {
            return Err(IrrigationError::InvalidInput(
                "startStamp must not be after endStamp".into(),
            ));
        }

        let next_day = end
            .succ_opt()
            .ok_or_else(|| IrrigationError::InvalidInput("endStamp out of range".into()))?;

        Ok(Self {
            start: start_of_day(start, offset)?,
            end: start_of_day(next_day, offset)?,
        })
    }

    /// Parse query stamps into a range
    pub fn from_stamps(
        start: &str,
        end: &str,
        offset: FixedOffset,
    ) -> Result<Self, IrrigationError> {
        Self::from_days(parse_date_stamp(start)?, parse_date_stamp(end)?, offset)
    }

    /// The `months` calendar months up to and including today
    pub fn last_months(
        now: DateTime<Utc>,
        months: u32,
        offset: FixedOffset,
    ) -> Result<Self, IrrigationError> {
        let today = now.with_timezone(&offset).date_naive();
        let start = today
            .checked_sub_months(Months::new(months))
            .ok_or_else(|| IrrigationError::InvalidInput("Report period out of range".into()))?;
        Self::from_days(start, today, offset)
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start <= timestamp && timestamp < self.end
    }

    /// First day of the range as `YYYY-MM-DD` in `offset`
    pub fn start_stamp(&self, offset: FixedOffset) -> String {
        self.start.with_timezone(&offset).format("%Y-%m-%d").to_string()
    }

    /// Last day of the range as `YYYY-MM-DD` in `offset`
    pub fn end_stamp(&self, offset: FixedOffset) -> String {
        (self.end - Duration::milliseconds(1))
            .with_timezone(&offset)
            .format("%Y-%m-%d")
            .to_string()
    }

    /// `$match` clause on the `timestamp` field
    pub fn to_match(&self) -> Document {
        doc! {
            "timestamp": {
                "$gte": bson::DateTime::from_chrono(self.start),
                "$lt": bson::DateTime::from_chrono(self.end),
            }
        }
    }
}

fn start_of_day(day: NaiveDate, offset: FixedOffset) -> Result<DateTime<Utc>, IrrigationError> {
    let midnight = day
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| IrrigationError::Internal("invalid midnight".into()))?;
    offset
        .from_local_datetime(&midnight)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| IrrigationError::InvalidInput(format!("Date out of range: {day}")))
}

/// Parameters of a `getAnalytics` call
#[derive(Debug, Clone)]
pub struct AnalyticsQuery {
    /// Restrict to one sensor; `None` aggregates every sensor of the kind
    pub sensor_number: Option<String>,
    pub range: DateRange,
    pub interval: Interval,
}

/// One aggregate row, serialized with kind-specific keys
/// (`_id`, `totalDocuments`, `avgTemperature`, `minTemperature`, `maxTemperature`)
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsBucket {
    pub kind: ReadingKind,
    pub id: String,
    pub total_documents: u64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

impl Serialize for AnalyticsBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let label = self.kind.label();
        let mut map = serializer.serialize_map(Some(5))?;
        map.serialize_entry("_id", &self.id)?;
        map.serialize_entry("totalDocuments", &self.total_documents)?;
        map.serialize_entry(&format!("avg{label}"), &self.avg)?;
        map.serialize_entry(&format!("min{label}"), &self.min)?;
        map.serialize_entry(&format!("max{label}"), &self.max)?;
        map.end()
    }
}

impl AnalyticsBucket {
    /// Decode a `$group` output document
    pub fn from_document(kind: ReadingKind, doc: &Document) -> Result<Self, IrrigationError> {
        let label = kind.label();
        let id = doc
            .get_str("_id")
            .map_err(|e| IrrigationError::Database(format!("Bucket without _id: {e}")))?
            .to_string();

        Ok(Self {
            kind,
            id,
            total_documents: number(doc, "totalDocuments").unwrap_or(0.0) as u64,
            avg: number(doc, &format!("avg{label}")).unwrap_or(0.0),
            min: number(doc, &format!("min{label}")).unwrap_or(0.0),
            max: number(doc, &format!("max{label}")).unwrap_or(0.0),
        })
    }
}

/// Read a numeric field regardless of its BSON width
fn number(doc: &Document, key: &str) -> Option<f64> {
    match doc.get(key)? {
        Bson::Double(v) => Some(*v),
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Array(values) => values.first().and_then(|v| match v {
            Bson::Double(v) => Some(*v),
            Bson::Int32(v) => Some(*v as f64),
            Bson::Int64(v) => Some(*v as f64),
            _ => None,
        }),
        _ => None,
    }
}

#[derive(Default)]
struct Accumulator {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }
}

/// Group readings into buckets sorted ascending by key
///
/// Callers filter by range and sensor first; every reading passed in is counted.
pub fn bucketize<'a>(
    kind: ReadingKind,
    readings: impl IntoIterator<Item = &'a Reading>,
    interval: Interval,
    offset: FixedOffset,
) -> Vec<AnalyticsBucket> {
    let mut groups: BTreeMap<String, Accumulator> = BTreeMap::new();
    for reading in readings {
        groups
            .entry(interval.bucket_key(reading.timestamp, offset))
            .or_default()
            .push(reading.value);
    }

    groups
        .into_iter()
        .map(|(id, acc)| AnalyticsBucket {
            kind,
            id,
            total_documents: acc.count,
            avg: acc.sum / acc.count as f64,
            min: acc.min,
            max: acc.max,
        })
        .collect()
}

fn date_key(interval: Interval, offset: FixedOffset) -> Document {
    doc! {
        "$dateToString": {
            "format": interval.date_format(),
            "date": "$timestamp",
            "timezone": offset.to_string(),
        }
    }
}

/// MongoDB equivalent of [`bucketize`] over a time-series collection
pub fn analytics_pipeline(
    kind: ReadingKind,
    query: &AnalyticsQuery,
    offset: FixedOffset,
) -> Vec<Document> {
    let mut filter = query.range.to_match();
    if let Some(sensor) = &query.sensor_number {
        filter.insert("metadata.sensorNumber", sensor.clone());
    }

    let field = format!("${}", kind.field());
    let label = kind.label();

    let mut group = doc! {
        "_id": date_key(query.interval, offset),
        "totalDocuments": { "$sum": 1 },
    };
    group.insert(format!("avg{label}"), doc! { "$avg": field.as_str() });
    group.insert(format!("min{label}"), doc! { "$min": field.as_str() });
    group.insert(format!("max{label}"), doc! { "$max": field.as_str() });

    vec![
        doc! { "$match": filter },
        doc! { "$group": group },
        doc! { "$sort": { "_id": 1 } },
    ]
}

/// Monthly statistics fed to the insight prompt
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySummary {
    pub kind: ReadingKind,
    pub id: String,
    pub average: f64,
    /// Sample standard deviation; absent with fewer than two readings
    pub std_deviation: Option<f64>,
    pub median: Option<f64>,
}

impl MonthlySummary {
    /// Humidity probes sit in the soil, so summaries call it soil moisture
    fn label(kind: ReadingKind) -> &'static str {
        match kind {
            ReadingKind::Temperature => "Temperature",
            ReadingKind::Humidity => "SoilMoisture",
        }
    }

    pub fn from_document(kind: ReadingKind, doc: &Document) -> Result<Self, IrrigationError> {
        let label = Self::label(kind);
        let id = doc
            .get_str("_id")
            .map_err(|e| IrrigationError::Database(format!("Summary without _id: {e}")))?
            .to_string();

        Ok(Self {
            kind,
            id,
            average: number(doc, &format!("average{label}")).unwrap_or(0.0),
            std_deviation: number(doc, &format!("stdDeviation{label}")),
            median: number(doc, &format!("median{label}")),
        })
    }
}

impl Serialize for MonthlySummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let label = Self::label(self.kind);
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry("_id", &self.id)?;
        map.serialize_entry(&format!("average{label}"), &self.average)?;
        map.serialize_entry(&format!("stdDeviation{label}"), &self.std_deviation)?;
        map.serialize_entry(&format!("median{label}"), &self.median)?;
        map.end()
    }
}

fn sample_std_deviation(values: &[f64], mean: f64) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Per-month average, sample standard deviation and median
pub fn summarize_monthly<'a>(
    kind: ReadingKind,
    readings: impl IntoIterator<Item = &'a Reading>,
    offset: FixedOffset,
) -> Vec<MonthlySummary> {
    let mut months: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for reading in readings {
        months
            .entry(Interval::Month.bucket_key(reading.timestamp, offset))
            .or_default()
            .push(reading.value);
    }

    months
        .into_iter()
        .map(|(id, mut values)| {
            let average = values.iter().sum::<f64>() / values.len() as f64;
            MonthlySummary {
                kind,
                id,
                average,
                std_deviation: sample_std_deviation(&values, average),
                median: median(&mut values),
            }
        })
        .collect()
}

/// MongoDB equivalent of [`summarize_monthly`]; the median is approximate
pub fn summary_pipeline(kind: ReadingKind, range: &DateRange, offset: FixedOffset) -> Vec<Document> {
    let field = format!("${}", kind.field());
    let label = MonthlySummary::label(kind);

    let mut group = doc! { "_id": date_key(Interval::Month, offset) };
    group.insert(format!("average{label}"), doc! { "$avg": field.as_str() });
    group.insert(format!("stdDeviation{label}"), doc! { "$stdDevSamp": field.as_str() });
    group.insert(
        format!("median{label}"),
        doc! {
            "$percentile": {
                "input": field.as_str(),
                "p": [0.5],
                "method": "approximate",
            }
        },
    );

    vec![
        doc! { "$match": range.to_match() },
        doc! { "$group": group },
        doc! { "$sort": { "_id": 1 } },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap()
    }

    fn reading(ts: DateTime<Utc>, value: f64) -> Reading {
        Reading {
            timestamp: ts,
            sensor_number: "1".into(),
            units: "celsius".into(),
            value,
        }
    }

    #[test]
    fn test_interval_parse() {
        assert_eq!("month".parse::<Interval>().unwrap(), Interval::Month);
        let err = "week".parse::<Interval>().unwrap_err();
        assert_eq!(err.to_string(), "Interval should be year, month, or day");
    }

    #[test]
    fn test_bucket_key_uses_offset() {
        // 20:00 UTC on Apr 30 is already May 1 in IST
        let ts = Utc.with_ymd_and_hms(2024, 4, 30, 20, 0, 0).unwrap();
        assert_eq!(Interval::Day.bucket_key(ts, ist()), "2024-05-01");
        assert_eq!(Interval::Month.bucket_key(ts, ist()), "2024-05");
        assert_eq!(
            Interval::Day.bucket_key(ts, FixedOffset::east_opt(0).unwrap()),
            "2024-04-30"
        );
    }

    #[test]
    fn test_range_covers_whole_end_day() {
        let range = DateRange::from_stamps("2024-05-01", "2024-05-01", ist()).unwrap();

        let first = Utc.with_ymd_and_hms(2024, 4, 30, 18, 30, 0).unwrap();
        let last = Utc.with_ymd_and_hms(2024, 5, 1, 18, 29, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 5, 1, 18, 30, 0).unwrap();

        assert!(range.contains(first));
        assert!(range.contains(last));
        assert!(!range.contains(after));
        assert!(!range.contains(first - Duration::seconds(1)));

        assert_eq!(range.start_stamp(ist()), "2024-05-01");
        assert_eq!(range.end_stamp(ist()), "2024-05-01");
    }

    #[test]
    fn test_range_rejects_reversed_and_malformed() {
        assert!(DateRange::from_stamps("2024-05-02", "2024-05-01", ist()).is_err());
        assert!(DateRange::from_stamps("2024/05/01", "2024-05-01", ist()).is_err());
        assert!(DateRange::from_stamps("2024-02-30", "2024-03-01", ist()).is_err());
    }

    #[test]
    fn test_last_months() {
        let now = Utc.with_ymd_and_hms(2024, 7, 15, 10, 0, 0).unwrap();
        let range = DateRange::last_months(now, 6, ist()).unwrap();
        assert_eq!(range.start_stamp(ist()), "2024-01-15");
        assert_eq!(range.end_stamp(ist()), "2024-07-15");
        assert!(range.contains(now));
    }

    #[test]
    fn test_bucketize_averages() {
        let day = Utc.with_ymd_and_hms(2024, 5, 1, 4, 0, 0).unwrap();
        let readings = vec![
            reading(day, 20.0),
            reading(day + Duration::hours(1), 25.0),
            reading(day + Duration::hours(2), 30.0),
            reading(day + Duration::days(1), 10.0),
        ];

        let buckets = bucketize(ReadingKind::Temperature, &readings, Interval::Day, ist());
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].id, "2024-05-01");
        assert_eq!(buckets[0].total_documents, 3);
        assert_eq!(buckets[0].avg, 25.0);
        assert_eq!(buckets[0].min, 20.0);
        assert_eq!(buckets[0].max, 30.0);
        assert_eq!(buckets[1].id, "2024-05-02");

        let monthly = bucketize(ReadingKind::Temperature, &readings, Interval::Month, ist());
        assert_eq!(monthly.len(), 1);
        assert_eq!(monthly[0].avg, 21.25);
    }

    #[test]
    fn test_bucket_serialization() {
        let bucket = AnalyticsBucket {
            kind: ReadingKind::Humidity,
            id: "2024-05".into(),
            total_documents: 2,
            avg: 40.0,
            min: 35.0,
            max: 45.0,
        };
        let json = serde_json::to_value(&bucket).unwrap();
        assert_eq!(json["_id"], "2024-05");
        assert_eq!(json["totalDocuments"], 2);
        assert_eq!(json["avgHumidity"], 40.0);
        assert_eq!(json["minHumidity"], 35.0);
        assert_eq!(json["maxHumidity"], 45.0);
    }

    #[test]
    fn test_bucket_from_document() {
        let doc = doc! {
            "_id": "2024-05-01",
            "totalDocuments": 4_i32,
            "avgTemperature": 22.5,
            "minTemperature": 18_i32,
            "maxTemperature": 27.0,
        };
        let bucket = AnalyticsBucket::from_document(ReadingKind::Temperature, &doc).unwrap();
        assert_eq!(bucket.total_documents, 4);
        assert_eq!(bucket.min, 18.0);
        assert_eq!(bucket.avg, 22.5);
    }

    #[test]
    fn test_analytics_pipeline_shape() {
        let query = AnalyticsQuery {
            sensor_number: Some("7".into()),
            range: DateRange::from_stamps("2024-05-01", "2024-05-31", ist()).unwrap(),
            interval: Interval::Day,
        };
        let pipeline = analytics_pipeline(ReadingKind::Humidity, &query, ist());
        assert_eq!(pipeline.len(), 3);

        let matched = pipeline[0].get_document("$match").unwrap();
        assert_eq!(matched.get_str("metadata.sensorNumber").unwrap(), "7");
        assert!(matched.get_document("timestamp").unwrap().contains_key("$lt"));

        let group = pipeline[1].get_document("$group").unwrap();
        let key = group.get_document("_id").unwrap().get_document("$dateToString").unwrap();
        assert_eq!(key.get_str("format").unwrap(), "%Y-%m-%d");
        assert_eq!(key.get_str("timezone").unwrap(), "+05:30");
        assert_eq!(
            group.get_document("avgHumidity").unwrap().get_str("$avg").unwrap(),
            "$humidity"
        );
    }

    #[test]
    fn test_summarize_monthly() {
        let may = Utc.with_ymd_and_hms(2024, 5, 10, 6, 0, 0).unwrap();
        let june = Utc.with_ymd_and_hms(2024, 6, 10, 6, 0, 0).unwrap();
        let readings = vec![
            reading(may, 2.0),
            reading(may, 4.0),
            reading(may, 4.0),
            reading(may, 4.0),
            reading(may, 5.0),
            reading(may, 5.0),
            reading(may, 7.0),
            reading(may, 9.0),
            reading(june, 30.0),
        ];

        let summary = summarize_monthly(ReadingKind::Temperature, &readings, ist());
        assert_eq!(summary.len(), 2);

        let may = &summary[0];
        assert_eq!(may.id, "2024-05");
        assert_eq!(may.average, 5.0);
        assert_eq!(may.median, Some(4.5));
        let sd = may.std_deviation.unwrap();
        assert!((sd - (32.0_f64 / 7.0).sqrt()).abs() < 1e-9);

        let june = &summary[1];
        assert_eq!(june.std_deviation, None);
        assert_eq!(june.median, Some(30.0));

        let json = serde_json::to_value(&summary[0]).unwrap();
        assert_eq!(json["averageTemperature"], 5.0);
    }

    #[test]
    fn test_summary_pipeline_and_decode() {
        let range = DateRange::from_stamps("2024-01-01", "2024-06-30", ist()).unwrap();
        let pipeline = summary_pipeline(ReadingKind::Humidity, &range, ist());
        let group = pipeline[1].get_document("$group").unwrap();
        assert!(group.contains_key("stdDeviationSoilMoisture"));
        assert!(group
            .get_document("medianSoilMoisture")
            .unwrap()
            .contains_key("$percentile"));

        let doc = doc! {
            "_id": "2024-03",
            "averageSoilMoisture": 41.0,
            "stdDeviationSoilMoisture": Bson::Null,
            "medianSoilMoisture": [40.0],
        };
        let summary = MonthlySummary::from_document(ReadingKind::Humidity, &doc).unwrap();
        assert_eq!(summary.median, Some(40.0));
        assert_eq!(summary.std_deviation, None);
    }
}
