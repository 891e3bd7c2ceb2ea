//! MongoDB client and collection wrapper
//!
//! `MongoCollection<T>` is the production `Repository<T>`: it applies the
//! schema-declared indexes on creation, hides soft-deleted documents from
//! every read and guards replacements with the record version.

use async_trait::async_trait;
use bson::{doc, Document};
use chrono::Utc;
use mongodb::{options::IndexOptions, Client, Collection, IndexModel};
use tracing::{error, info};

use crate::db::repository::{Record, Repository};
use crate::db::schemas::Metadata;
use crate::types::{IbError, Result};

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Create a new MongoDB client
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", redact_uri(uri));

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}/?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri.trim_end_matches('/'))
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| IbError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| IbError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection
    pub async fn collection<T: Record>(&self) -> Result<MongoCollection<T>> {
        MongoCollection::new(&self.client, &self.db_name, T::COLLECTION).await
    }

    /// Cheap liveness check used by the readiness probe
    pub async fn ping(&self) -> bool {
        self.client
            .database(&self.db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .is_ok()
    }

    /// Get the database name
    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Strip credentials from a connection string before logging it
fn redact_uri(uri: &str) -> String {
    match (uri.find("://"), uri.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &uri[..scheme_end], &uri[at..])
        }
        _ => uri.to_string(),
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Record,
{
    inner: Collection<T>,
}

impl<T: Record> MongoCollection<T> {
    /// Create a new collection and apply indexes
    pub async fn new(client: &Client, db_name: &str, collection_name: &str) -> Result<Self> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    /// Apply schema-defined indexes plus the unique business id
    async fn apply_indexes(&self) -> Result<()> {
        let mut schema_indices = T::into_indices();
        schema_indices.push((
            doc! { "id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("id_unique".to_string())
                    .build(),
            ),
        ));

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| IbError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    fn live(filter: Document) -> Document {
        let mut full_filter = filter;
        full_filter.insert("metadata.is_deleted", doc! { "$ne": true });
        full_filter
    }
}

#[async_trait]
impl<T: Record> Repository<T> for MongoCollection<T> {
    async fn insert(&self, mut item: T) -> Result<T> {
        let now = Utc::now();
        let metadata = item.mut_metadata();
        metadata.is_deleted = false;
        metadata.created_at = Some(now);
        metadata.updated_at = Some(now);
        metadata.version = 1;

        self.inner.insert_one(&item).await.map_err(|e| {
            if is_duplicate_key(&e) {
                IbError::Conflict(format!("{} already exists", T::KIND))
            } else {
                IbError::Database(format!("Insert failed: {}", e))
            }
        })?;

        Ok(item)
    }

    async fn find_one(&self, filter: Document) -> Result<Option<T>> {
        self.inner
            .find_one(Self::live(filter))
            .await
            .map_err(|e| IbError::Database(format!("Find failed: {}", e)))
    }

    async fn find_many(&self, filter: Document) -> Result<Vec<T>> {
        use futures_util::StreamExt;

        let cursor = self
            .inner
            .find(Self::live(filter))
            .sort(doc! { "metadata.created_at": -1 })
            .await
            .map_err(|e| IbError::Database(format!("Find failed: {}", e)))?;

        let results: Vec<T> = cursor
            .filter_map(|doc| async {
                match doc {
                    Ok(d) => Some(d),
                    Err(e) => {
                        error!("Error reading {} document: {}", T::KIND, e);
                        None
                    }
                }
            })
            .collect()
            .await;

        Ok(results)
    }

    async fn count(&self, filter: Document) -> Result<u64> {
        self.inner
            .count_documents(Self::live(filter))
            .await
            .map_err(|e| IbError::Database(format!("Count failed: {}", e)))
    }

    async fn update(&self, mut item: T) -> Result<T> {
        let expected = item.metadata().version;
        let id = item.id().to_string();
        {
            let metadata = item.mut_metadata();
            metadata.version = expected + 1;
            metadata.updated_at = Some(Utc::now());
        }

        let filter = Self::live(doc! { "id": &id, "metadata.version": expected });
        let result = self
            .inner
            .replace_one(filter, &item)
            .await
            .map_err(|e| IbError::Database(format!("Replace failed: {}", e)))?;

        if result.matched_count == 0 {
            let exists = self.count(doc! { "id": &id }).await? > 0;
            return Err(if exists {
                IbError::VersionConflict(format!(
                    "{} '{}' was modified concurrently",
                    T::KIND,
                    id
                ))
            } else {
                IbError::not_found(T::KIND, &id)
            });
        }

        Ok(item)
    }

    async fn soft_delete(&self, filter: Document) -> Result<u64> {
        let now = bson::to_bson(&Utc::now())?;
        let update = doc! {
            "$set": {
                "metadata.is_deleted": true,
                "metadata.deleted_at": now.clone(),
                "metadata.updated_at": now,
            },
            "$inc": { "metadata.version": 1_i64 },
        };

        let result = self
            .inner
            .update_many(Self::live(filter), update)
            .await
            .map_err(|e| IbError::Database(format!("Soft delete failed: {}", e)))?;

        Ok(result.modified_count)
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};

    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        _ => false,
    }
}
