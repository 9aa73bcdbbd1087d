//! MongoDB client and collection wrapper
//!
//! Typed collections apply their schema indexes on first use. Sensor readings
//! live in time-series collections and are accessed untyped.

use bson::{doc, Bson, Document};
use mongodb::{
    options::{FindOptions, IndexOptions, UpdateModifications},
    results::UpdateResult,
    Client, Collection, IndexModel,
};
use futures_util::{TryStream, TryStreamExt};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use crate::types::IrrigationError;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and ping, failing fast when the server is unreachable
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, IrrigationError> {
        info!("Connecting to MongoDB at {}", uri);

        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| IrrigationError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| IrrigationError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection with its indexes applied
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, IrrigationError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    /// Untyped collection, used for time-series readings
    pub fn raw_collection(&self, name: &str) -> Collection<Document> {
        self.client.database(&self.db_name).collection::<Document>(name)
    }

    /// Create `name` as a time-series collection unless it already exists
    pub async fn ensure_timeseries(
        &self,
        name: &str,
        time_field: &str,
        meta_field: &str,
    ) -> Result<(), IrrigationError> {
        let db = self.client.database(&self.db_name);
        let existing = db.list_collection_names().await?;
        if existing.iter().any(|c| c == name) {
            debug!("Time-series collection '{}' already present", name);
            return Ok(());
        }

        db.run_command(doc! {
            "create": name,
            "timeseries": {
                "timeField": time_field,
                "metaField": meta_field,
                "granularity": "seconds",
            }
        })
        .await
        .map_err(|e| {
            IrrigationError::Database(format!("Failed to create time-series '{}': {}", name, e))
        })?;

        info!("Created time-series collection '{}'", name);
        Ok(())
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes,
{
    /// Create a new collection and apply indexes
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, IrrigationError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    async fn apply_indexes(&self) -> Result<(), IrrigationError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| IrrigationError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document, returning its id
    pub async fn insert_one(&self, item: T) -> Result<Bson, IrrigationError> {
        let result = self
            .inner
            .insert_one(item)
            .await
            .map_err(|e| IrrigationError::Database(format!("Insert failed: {}", e)))?;

        Ok(result.inserted_id)
    }

    /// Find one document by filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, IrrigationError> {
        self.inner
            .find_one(filter)
            .await
            .map_err(|e| IrrigationError::Database(format!("Find failed: {}", e)))
    }

    /// Find documents by filter, optionally sorted
    pub async fn find_many(
        &self,
        filter: Document,
        sort: Option<Document>,
    ) -> Result<Vec<T>, IrrigationError> {
        let options = FindOptions::builder().sort(sort).build();
        let cursor = self
            .inner
            .find(filter)
            .with_options(options)
            .await
            .map_err(|e| IrrigationError::Database(format!("Find failed: {}", e)))?;

        collect_all(cursor, "Find cursor failed").await
    }

    /// Update one document, optionally inserting it when missing
    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
        upsert: bool,
    ) -> Result<UpdateResult, IrrigationError> {
        self.inner
            .update_one(filter, update)
            .upsert(upsert)
            .await
            .map_err(|e| IrrigationError::Database(format!("Update failed: {}", e)))
    }

    /// Get the underlying collection for operations that need the raw driver error
    pub fn inner(&self) -> &Collection<T> {
        &self.inner
    }

    /// Run an aggregation pipeline
    pub async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>, IrrigationError> {
        aggregate(&self.inner.clone_with_type::<Document>(), pipeline).await
    }
}

/// Run a pipeline and collect every output document
pub async fn aggregate(
    collection: &Collection<Document>,
    pipeline: Vec<Document>,
) -> Result<Vec<Document>, IrrigationError> {
    let cursor = collection
        .aggregate(pipeline)
        .await
        .map_err(|e| IrrigationError::Database(format!("Aggregate failed: {}", e)))?;

    collect_all(cursor, "Aggregate cursor failed").await
}

/// Drain a cursor; one undecodable document fails the whole read
async fn collect_all<S, T, E>(cursor: S, context: &str) -> Result<Vec<T>, IrrigationError>
where
    S: TryStream<Ok = T, Error = E>,
    E: std::fmt::Display,
{
    cursor
        .try_collect()
        .await
        .map_err(|e| IrrigationError::Database(format!("{}: {}", context, e)))
}
