//! Collection-oriented document storage.
//!
//! Documents are flat JSON objects keyed by a string id. Queries return
//! documents in ascending id order, which is what cursor pagination
//! (`start_after`) relies on.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::DomainResult;

pub type Document = Map<String, Value>;

/// Pure function evaluated against the latest snapshot inside a transaction.
/// `None` means "nothing to write". Stores may call it more than once when a
/// conditional write loses a race, so it must not have side effects.
pub type TransactionFn = Arc<dyn Fn(&Document) -> Option<Document> + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gte,
    Lte,
    Lt,
    ArrayContains,
    NotEmpty,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl FieldFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Eq, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Gte, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Lte, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Lt, value.into())
    }

    pub fn array_contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::ArrayContains, value.into())
    }

    pub fn not_empty(field: impl Into<String>) -> Self {
        Self::new(field, FilterOp::NotEmpty, Value::Null)
    }

    fn new(field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    pub fn matches(&self, document: &Document) -> bool {
        let Some(actual) = document.get(&self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => actual == &self.value,
            FilterOp::Gte => compare(actual, &self.value).is_some_and(|ord| ord.is_ge()),
            FilterOp::Lte => compare(actual, &self.value).is_some_and(|ord| ord.is_le()),
            FilterOp::Lt => compare(actual, &self.value).is_some_and(|ord| ord.is_lt()),
            FilterOp::ArrayContains => actual
                .as_array()
                .is_some_and(|items| items.contains(&self.value)),
            FilterOp::NotEmpty => actual.as_array().is_some_and(|items| !items.is_empty()),
        }
    }
}

fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocumentQuery {
    pub filters: Vec<FieldFilter>,
    pub start_after: Option<String>,
    pub limit: Option<usize>,
}

impl DocumentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: FieldFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn start_after(mut self, cursor: Option<String>) -> Self {
        self.start_after = cursor;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, id: &str, document: &Document) -> bool {
        if let Some(cursor) = self.start_after.as_deref() {
            if id <= cursor {
                return false;
            }
        }
        self.filters.iter().all(|filter| filter.matches(document))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub data: Document,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransactionCommit {
    /// Snapshot read inside the transaction, before any write.
    pub snapshot: Document,
    /// Fields written back, if the transaction function asked for a write.
    pub written: Option<Document>,
}

pub trait DocumentStore: Send + Sync {
    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Option<Document>>>;

    /// Creates or replaces the whole document.
    fn set(
        &self,
        collection: &str,
        id: &str,
        data: Document,
    ) -> crate::ports::BoxFuture<'_, DomainResult<()>>;

    /// Merges `changes` into an existing document. Missing documents are `NotFound`.
    fn update(
        &self,
        collection: &str,
        id: &str,
        changes: Document,
    ) -> crate::ports::BoxFuture<'_, DomainResult<()>>;

    fn delete(&self, collection: &str, id: &str) -> crate::ports::BoxFuture<'_, DomainResult<()>>;

    fn query(
        &self,
        collection: &str,
        query: &DocumentQuery,
    ) -> crate::ports::BoxFuture<'_, DomainResult<Vec<StoredDocument>>>;

    /// Applies several merges. Not atomic as a whole; documents that vanished
    /// in the meantime are skipped.
    fn batch_update(
        &self,
        collection: &str,
        updates: Vec<(String, Document)>,
    ) -> crate::ports::BoxFuture<'_, DomainResult<()>>;

    /// Single-document read-compute-write. No partial write on failure.
    fn transact(
        &self,
        collection: &str,
        id: &str,
        apply: TransactionFn,
    ) -> crate::ports::BoxFuture<'_, DomainResult<TransactionCommit>>;
}

pub fn merge_into(target: &mut Document, changes: &Document) {
    for (key, value) in changes {
        target.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn range_filters_compare_numbers_and_strings() {
        let document = doc(json!({"dateTime": 1_000, "sport": "tennis"}));
        assert!(FieldFilter::gte("dateTime", 1_000).matches(&document));
        assert!(FieldFilter::lte("dateTime", 1_000).matches(&document));
        assert!(!FieldFilter::lt("dateTime", 1_000).matches(&document));
        assert!(FieldFilter::gte("sport", "badminton").matches(&document));
        assert!(!FieldFilter::gte("sport", 3).matches(&document));
    }

    #[test]
    fn array_filters_inspect_members() {
        let document = doc(json!({"participants": ["u1"], "joinRequests": []}));
        assert!(FieldFilter::array_contains("participants", "u1").matches(&document));
        assert!(!FieldFilter::array_contains("participants", "u2").matches(&document));
        assert!(FieldFilter::not_empty("participants").matches(&document));
        assert!(!FieldFilter::not_empty("joinRequests").matches(&document));
    }

    #[test]
    fn missing_field_never_matches() {
        let document = doc(json!({}));
        assert!(!FieldFilter::eq("status", "available").matches(&document));
    }

    #[test]
    fn query_cursor_is_exclusive() {
        let query = DocumentQuery::new().start_after(Some("b".into()));
        assert!(!query.matches("a", &Document::new()));
        assert!(!query.matches("b", &Document::new()));
        assert!(query.matches("c", &Document::new()));
    }
}
