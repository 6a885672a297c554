use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::DomainResult;
use crate::error::DomainError;
use crate::ports::BoxFuture;
use crate::ports::db::{DbAdapter, DbError};
use crate::ports::store::{
    Document, DocumentQuery, DocumentStore, StoredDocument, TransactionCommit, TransactionFn,
    merge_into,
};

type Collections = HashMap<String, BTreeMap<String, Document>>;

/// Process-local document store. Transactions hold the write lock across
/// read-compute-write, so concurrent transactions on the same document run
/// one after the other.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<Collections>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get(&self, collection: &str, id: &str) -> BoxFuture<'_, DomainResult<Option<Document>>> {
        let collection = collection.to_string();
        let id = id.to_string();
        let collections = self.collections.clone();
        Box::pin(async move {
            let collections = collections.read().await;
            Ok(collections
                .get(&collection)
                .and_then(|documents| documents.get(&id))
                .cloned())
        })
    }

    fn set(&self, collection: &str, id: &str, data: Document) -> BoxFuture<'_, DomainResult<()>> {
        let collection = collection.to_string();
        let id = id.to_string();
        let collections = self.collections.clone();
        Box::pin(async move {
            let mut collections = collections.write().await;
            collections.entry(collection).or_default().insert(id, data);
            Ok(())
        })
    }

    fn update(
        &self,
        collection: &str,
        id: &str,
        changes: Document,
    ) -> BoxFuture<'_, DomainResult<()>> {
        let collection = collection.to_string();
        let id = id.to_string();
        let collections = self.collections.clone();
        Box::pin(async move {
            let mut collections = collections.write().await;
            let document = collections
                .get_mut(&collection)
                .and_then(|documents| documents.get_mut(&id))
                .ok_or(DomainError::NotFound)?;
            merge_into(document, &changes);
            Ok(())
        })
    }

    fn delete(&self, collection: &str, id: &str) -> BoxFuture<'_, DomainResult<()>> {
        let collection = collection.to_string();
        let id = id.to_string();
        let collections = self.collections.clone();
        Box::pin(async move {
            let mut collections = collections.write().await;
            if let Some(documents) = collections.get_mut(&collection) {
                documents.remove(&id);
            }
            Ok(())
        })
    }

    fn query(
        &self,
        collection: &str,
        query: &DocumentQuery,
    ) -> BoxFuture<'_, DomainResult<Vec<StoredDocument>>> {
        let collection = collection.to_string();
        let query = query.clone();
        let collections = self.collections.clone();
        Box::pin(async move {
            let collections = collections.read().await;
            let Some(documents) = collections.get(&collection) else {
                return Ok(Vec::new());
            };
            let limit = query.limit.unwrap_or(usize::MAX);
            Ok(documents
                .iter()
                .filter(|(id, data)| query.matches(id, data))
                .take(limit)
                .map(|(id, data)| StoredDocument {
                    id: id.clone(),
                    data: data.clone(),
                })
                .collect())
        })
    }

    fn batch_update(
        &self,
        collection: &str,
        updates: Vec<(String, Document)>,
    ) -> BoxFuture<'_, DomainResult<()>> {
        let collection = collection.to_string();
        let collections = self.collections.clone();
        Box::pin(async move {
            let mut collections = collections.write().await;
            let Some(documents) = collections.get_mut(&collection) else {
                return Ok(());
            };
            for (id, changes) in updates {
                if let Some(document) = documents.get_mut(&id) {
                    merge_into(document, &changes);
                }
            }
            Ok(())
        })
    }

    fn transact(
        &self,
        collection: &str,
        id: &str,
        apply: TransactionFn,
    ) -> BoxFuture<'_, DomainResult<TransactionCommit>> {
        let collection = collection.to_string();
        let id = id.to_string();
        let collections = self.collections.clone();
        Box::pin(async move {
            let mut collections = collections.write().await;
            let document = collections
                .get_mut(&collection)
                .and_then(|documents| documents.get_mut(&id))
                .ok_or(DomainError::NotFound)?;
            let snapshot = document.clone();
            let written = apply(&snapshot);
            if let Some(changes) = written.as_ref() {
                merge_into(document, changes);
            }
            Ok(TransactionCommit { snapshot, written })
        })
    }
}

/// Health probe for the in-memory backend; always reachable.
#[derive(Clone, Copy, Debug, Default)]
pub struct InMemoryHealth;

impl DbAdapter for InMemoryHealth {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn health_check(&self) -> BoxFuture<'_, Result<(), DbError>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::store::FieldFilter;
    use serde_json::{Value, json};

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    fn no_write() -> TransactionFn {
        Arc::new(|_: &Document| -> Option<Document> { None })
    }

    async fn seeded() -> InMemoryDocumentStore {
        let store = InMemoryDocumentStore::new();
        for (id, sport) in [("c", "tennis"), ("a", "tennis"), ("b", "golf")] {
            store
                .set("activities", id, doc(json!({"sport": sport})))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn query_returns_ids_in_ascending_order() {
        let store = seeded().await;
        let ids: Vec<_> = store
            .query("activities", &DocumentQuery::new())
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn query_applies_filters_cursor_and_limit() {
        let store = seeded().await;
        let query = DocumentQuery::new()
            .filter(FieldFilter::eq("sport", "tennis"))
            .start_after(Some("a".into()))
            .limit(5);
        let page = store.query("activities", &query).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "c");

        let limited = store
            .query("activities", &DocumentQuery::new().limit(2))
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn update_merges_fields_and_rejects_missing_documents() {
        let store = seeded().await;
        store
            .update("activities", "a", doc(json!({"status": "cancelled"})))
            .await
            .unwrap();
        let stored = store.get("activities", "a").await.unwrap().unwrap();
        assert_eq!(stored.get("sport"), Some(&json!("tennis")));
        assert_eq!(stored.get("status"), Some(&json!("cancelled")));

        let missing = store
            .update("activities", "zzz", doc(json!({"status": "cancelled"})))
            .await;
        assert_eq!(missing, Err(DomainError::NotFound));
    }

    #[tokio::test]
    async fn batch_update_skips_vanished_documents() {
        let store = seeded().await;
        store
            .batch_update(
                "activities",
                vec![
                    ("a".into(), doc(json!({"status": "expired"}))),
                    ("gone".into(), doc(json!({"status": "expired"}))),
                ],
            )
            .await
            .unwrap();
        assert_eq!(store.count("activities").await, 3);
        let stored = store.get("activities", "a").await.unwrap().unwrap();
        assert_eq!(stored.get("status"), Some(&json!("expired")));
    }

    #[tokio::test]
    async fn transact_writes_only_when_function_returns_changes() {
        let store = seeded().await;
        let commit = store
            .transact("activities", "b", no_write())
            .await
            .unwrap();
        assert!(commit.written.is_none());
        assert_eq!(commit.snapshot.get("sport"), Some(&json!("golf")));

        let commit = store
            .transact(
                "activities",
                "b",
                Arc::new(|_: &Document| Some(doc(json!({"sport": "padel"})))),
            )
            .await
            .unwrap();
        assert_eq!(commit.snapshot.get("sport"), Some(&json!("golf")));
        let stored = store.get("activities", "b").await.unwrap().unwrap();
        assert_eq!(stored.get("sport"), Some(&json!("padel")));
    }

    #[tokio::test]
    async fn transact_on_missing_document_is_not_found() {
        let store = InMemoryDocumentStore::new();
        let result = store
            .transact("activities", "nope", no_write())
            .await;
        assert_eq!(result, Err(DomainError::NotFound));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = seeded().await;
        store.delete("activities", "a").await.unwrap();
        store.delete("activities", "a").await.unwrap();
        assert!(store.get("activities", "a").await.unwrap().is_none());
    }
}
