//! Repository seam between services and storage
//!
//! Services only see `Repository<T>`. MongoDB backs it in production; the
//! in-memory implementation backs dev mode and the test suite and evaluates
//! the same filter subset (equality, dotted paths, array membership, `$ne`,
//! `$in`).

use async_trait::async_trait;
use bson::{Bson, Document};
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use tokio::sync::RwLock;
use tracing::debug;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::types::{IbError, Result};

/// A persisted document with a business id and versioned metadata
pub trait Record:
    Serialize + DeserializeOwned + Clone + Unpin + Send + Sync + IntoIndexes + MutMetadata + 'static
{
    /// Collection the record lives in
    const COLLECTION: &'static str;
    /// Human-readable kind used in error messages
    const KIND: &'static str;

    fn id(&self) -> &str;
    fn metadata(&self) -> &Metadata;
}

/// Storage operations every collection supports
#[async_trait]
pub trait Repository<T: Record>: Send + Sync {
    /// Insert a new record; stamps metadata and sets version 1
    async fn insert(&self, item: T) -> Result<T>;

    /// First live record matching the filter
    async fn find_one(&self, filter: Document) -> Result<Option<T>>;

    /// All live records matching the filter, newest first
    async fn find_many(&self, filter: Document) -> Result<Vec<T>>;

    /// Number of live records matching the filter
    async fn count(&self, filter: Document) -> Result<u64>;

    /// Replace a record if nobody wrote it since it was read.
    ///
    /// Fails with `VersionConflict` when the stored version differs from
    /// `item.metadata().version`; on success the returned record carries the
    /// bumped version.
    async fn update(&self, item: T) -> Result<T>;

    /// Soft-delete every matching record; returns how many were deleted
    async fn soft_delete(&self, filter: Document) -> Result<u64>;
}

/// Tenant-scoped lookup by business id
pub async fn get_scoped<T: Record>(
    repo: &dyn Repository<T>,
    org_id: &str,
    id: &str,
) -> Result<T> {
    repo.find_one(bson::doc! { "org_id": org_id, "id": id })
        .await?
        .ok_or_else(|| IbError::not_found(T::KIND, id))
}

/// Re-run a read-modify-write closure when it loses an optimistic race.
///
/// The closure must re-read its record on every attempt so validation runs
/// against the latest state.
pub async fn retry_on_conflict<T, F, Fut>(max_attempts: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(IbError::VersionConflict(msg)) if attempt < max_attempts => {
                debug!("Version conflict (attempt {}/{}): {}", attempt, max_attempts, msg);
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Attempts a state transition gets before a version conflict is surfaced
pub const MAX_WRITE_ATTEMPTS: u32 = 5;

/// Read a tenant's record, apply `apply`, and write it back under the
/// version check. A lost race re-reads and re-runs `apply`, so validation
/// inside it always sees the latest state.
pub async fn modify_scoped<T, F>(
    repo: &dyn Repository<T>,
    org_id: &str,
    id: &str,
    apply: F,
) -> Result<T>
where
    T: Record,
    F: Fn(&mut T) -> Result<()> + Sync,
{
    let apply = &apply;
    retry_on_conflict(MAX_WRITE_ATTEMPTS, move || async move {
        let mut item = get_scoped(repo, org_id, id).await?;
        apply(&mut item)?;
        repo.update(item).await
    })
    .await
}

// =============================================================================
// In-memory implementation
// =============================================================================

/// In-memory repository for dev mode and tests
pub struct MemoryRepository<T: Record> {
    items: RwLock<Vec<T>>,
}

impl<T: Record> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> MemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
        }
    }

    fn is_live(item: &T) -> bool {
        !item.metadata().is_deleted
    }

    fn matches(item: &T, filter: &Document) -> Result<bool> {
        let doc = bson::to_document(item)?;
        Ok(document_matches(&doc, filter))
    }
}

#[async_trait]
impl<T: Record> Repository<T> for MemoryRepository<T> {
    async fn insert(&self, mut item: T) -> Result<T> {
        let mut items = self.items.write().await;
        if items.iter().any(|existing| existing.id() == item.id()) {
            return Err(IbError::Conflict(format!("{} already exists", T::KIND)));
        }

        let now = Utc::now();
        let metadata = item.mut_metadata();
        metadata.is_deleted = false;
        metadata.created_at = Some(now);
        metadata.updated_at = Some(now);
        metadata.version = 1;

        items.push(item.clone());
        Ok(item)
    }

    async fn find_one(&self, filter: Document) -> Result<Option<T>> {
        let items = self.items.read().await;
        for item in items.iter().filter(|i| Self::is_live(i)) {
            if Self::matches(item, &filter)? {
                return Ok(Some(item.clone()));
            }
        }
        Ok(None)
    }

    async fn find_many(&self, filter: Document) -> Result<Vec<T>> {
        let items = self.items.read().await;
        let mut found = Vec::new();
        for item in items.iter().rev().filter(|i| Self::is_live(i)) {
            if Self::matches(item, &filter)? {
                found.push(item.clone());
            }
        }
        Ok(found)
    }

    async fn count(&self, filter: Document) -> Result<u64> {
        Ok(self.find_many(filter).await?.len() as u64)
    }

    async fn update(&self, mut item: T) -> Result<T> {
        let mut items = self.items.write().await;
        let slot = items
            .iter_mut()
            .find(|existing| existing.id() == item.id() && Self::is_live(existing))
            .ok_or_else(|| IbError::not_found(T::KIND, item.id()))?;

        let expected = item.metadata().version;
        if slot.metadata().version != expected {
            return Err(IbError::VersionConflict(format!(
                "{} '{}' was modified concurrently",
                T::KIND,
                item.id()
            )));
        }

        let metadata = item.mut_metadata();
        metadata.version = expected + 1;
        metadata.updated_at = Some(Utc::now());
        *slot = item.clone();
        Ok(item)
    }

    async fn soft_delete(&self, filter: Document) -> Result<u64> {
        let mut items = self.items.write().await;
        let now = Utc::now();
        let mut deleted = 0;
        for item in items.iter_mut() {
            if Self::is_live(item) && Self::matches(item, &filter)? {
                let metadata = item.mut_metadata();
                metadata.is_deleted = true;
                metadata.deleted_at = Some(now);
                metadata.updated_at = Some(now);
                metadata.version += 1;
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

// =============================================================================
// Filter evaluation
// =============================================================================

/// Evaluate a MongoDB-style filter against a document
pub fn document_matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, condition)| {
        let value = lookup_path(doc, key);
        match condition {
            Bson::Document(ops) if ops.keys().next().is_some_and(|k| k.starts_with('$')) => {
                ops.iter().all(|(op, arg)| apply_operator(value, op, arg))
            }
            expected => value_matches(value, expected),
        }
    })
}

fn lookup_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = doc.get(first)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

fn apply_operator(value: Option<&Bson>, op: &str, arg: &Bson) -> bool {
    match op {
        "$ne" => !value_matches(value, arg),
        "$in" => match arg {
            Bson::Array(options) => options.iter().any(|o| value_matches(value, o)),
            _ => false,
        },
        "$exists" => {
            let wanted = matches!(arg, Bson::Boolean(true));
            value.is_some_and(|v| !matches!(v, Bson::Null)) == wanted
        }
        _ => false,
    }
}

fn value_matches(value: Option<&Bson>, expected: &Bson) -> bool {
    match (value, expected) {
        (None, Bson::Null) | (Some(Bson::Null), Bson::Null) => true,
        (None, _) => false,
        (Some(Bson::Array(items)), expected) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| bson_eq(item, expected))
        }
        (Some(actual), expected) => bson_eq(actual, expected),
    }
}

fn bson_eq(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use mongodb::options::IndexOptions;
    use serde::Deserialize;

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct Widget {
        id: String,
        org_id: String,
        tags: Vec<String>,
        qty: i64,
        #[serde(default)]
        metadata: Metadata,
    }

    impl IntoIndexes for Widget {
        fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
            vec![]
        }
    }

    impl MutMetadata for Widget {
        fn mut_metadata(&mut self) -> &mut Metadata {
            &mut self.metadata
        }
    }

    impl Record for Widget {
        const COLLECTION: &'static str = "widgets";
        const KIND: &'static str = "widget";

        fn id(&self) -> &str {
            &self.id
        }

        fn metadata(&self) -> &Metadata {
            &self.metadata
        }
    }

    fn widget(id: &str, org: &str, tags: &[&str], qty: i64) -> Widget {
        Widget {
            id: id.into(),
            org_id: org.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            qty,
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_scoped_get() {
        let repo = MemoryRepository::<Widget>::new();
        repo.insert(widget("w1", "org-a", &[], 1)).await.unwrap();

        assert!(get_scoped(&repo, "org-a", "w1").await.is_ok());
        let err = get_scoped(&repo, "org-b", "w1").await.unwrap_err();
        assert!(matches!(err, IbError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let repo = MemoryRepository::<Widget>::new();
        repo.insert(widget("w1", "org-a", &[], 1)).await.unwrap();
        let err = repo.insert(widget("w1", "org-a", &[], 2)).await.unwrap_err();
        assert!(matches!(err, IbError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_stale_update_rejected() {
        let repo = MemoryRepository::<Widget>::new();
        let stored = repo.insert(widget("w1", "org-a", &[], 1)).await.unwrap();
        assert_eq!(stored.metadata.version, 1);

        let mut first = stored.clone();
        let mut second = stored;
        first.qty = 10;
        second.qty = 20;

        let first = repo.update(first).await.unwrap();
        assert_eq!(first.metadata.version, 2);

        let err = repo.update(second).await.unwrap_err();
        assert!(matches!(err, IbError::VersionConflict(_)));

        let current = get_scoped(&repo, "org-a", "w1").await.unwrap();
        assert_eq!(current.qty, 10);
    }

    #[tokio::test]
    async fn test_soft_delete_hides_records() {
        let repo = MemoryRepository::<Widget>::new();
        repo.insert(widget("w1", "org-a", &[], 1)).await.unwrap();
        repo.insert(widget("w2", "org-a", &[], 1)).await.unwrap();

        assert_eq!(repo.soft_delete(doc! { "id": "w1" }).await.unwrap(), 1);
        assert_eq!(repo.count(doc! { "org_id": "org-a" }).await.unwrap(), 1);
        assert!(repo.find_one(doc! { "id": "w1" }).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retry_on_conflict_rereads() {
        let repo = MemoryRepository::<Widget>::new();
        let stored = repo.insert(widget("w1", "org-a", &[], 0)).await.unwrap();

        // Another writer bumps the version first
        let mut racer = stored.clone();
        racer.qty = 5;
        repo.update(racer).await.unwrap();

        let mut stale = Some(stored);
        let result = retry_on_conflict(3, || {
            let candidate = stale.take();
            let repo = &repo;
            async move {
                let mut item = match candidate {
                    Some(item) => item,
                    None => get_scoped(repo, "org-a", "w1").await?,
                };
                item.qty += 1;
                repo.update(item).await
            }
        })
        .await
        .unwrap();

        assert_eq!(result.qty, 6);
        assert_eq!(result.metadata.version, 3);
    }

    #[tokio::test]
    async fn test_modify_scoped_validates_and_stays_in_tenant() {
        let repo = MemoryRepository::<Widget>::new();
        repo.insert(widget("w1", "org-a", &[], 1)).await.unwrap();

        let updated = modify_scoped(&repo, "org-a", "w1", |w| {
            w.qty *= 7;
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(updated.qty, 7);
        assert_eq!(updated.metadata.version, 2);

        let err = modify_scoped(&repo, "org-b", "w1", |_| Ok(())).await.unwrap_err();
        assert!(matches!(err, IbError::NotFound(_)));

        let err = modify_scoped(&repo, "org-a", "w1", |_| {
            Err(IbError::Gate("nope".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, IbError::Gate(_)));
        assert_eq!(get_scoped(&repo, "org-a", "w1").await.unwrap().metadata.version, 2);
    }

    #[test]
    fn test_filter_semantics() {
        let doc = doc! {
            "status": "open",
            "tags": ["a", "b"],
            "qty": 5_i64,
            "nested": { "role": "ceo" },
        };

        assert!(document_matches(&doc, &doc! { "status": "open" }));
        assert!(document_matches(&doc, &doc! { "tags": "b" }));
        assert!(document_matches(&doc, &doc! { "qty": 5 }));
        assert!(document_matches(&doc, &doc! { "nested.role": "ceo" }));
        assert!(document_matches(&doc, &doc! { "status": { "$in": ["open", "paid"] } }));
        assert!(document_matches(&doc, &doc! { "status": { "$ne": "paid" } }));
        assert!(document_matches(&doc, &doc! { "missing": null }));
        assert!(!document_matches(&doc, &doc! { "status": "paid" }));
        assert!(!document_matches(&doc, &doc! { "tags": "z" }));
        assert!(!document_matches(&doc, &doc! { "missing": { "$exists": true } }));
    }
}
