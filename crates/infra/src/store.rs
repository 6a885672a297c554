use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use sportsbuddies_domain::DomainResult;
use sportsbuddies_domain::activity_repository::ACTIVITIES;
use sportsbuddies_domain::error::DomainError;
use sportsbuddies_domain::ports::BoxFuture;
use sportsbuddies_domain::ports::store::{
    Document, DocumentQuery, DocumentStore, FilterOp, StoredDocument, TransactionCommit,
    TransactionFn, merge_into,
};
use sportsbuddies_domain::util::{format_ms_rfc3339, parse_rfc3339_ms};
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;

use crate::db::DbConfig;

const MAX_TRANSACTION_ATTEMPTS: u32 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NativeKind {
    /// Epoch milliseconds in the document, `datetime` in the record.
    Timestamp,
    /// `{latitude, longitude}` in the document, `geometry<point>` in the record.
    Point,
}

/// Document fields persisted as native SurrealDB values under `native`
/// rather than as JSON inside `data`.
const NATIVE_FIELDS: &[(&str, &str, NativeKind)] = &[
    (ACTIVITIES, "dateTime", NativeKind::Timestamp),
    (ACTIVITIES, "location", NativeKind::Point),
];

fn native_fields(collection: &str) -> impl Iterator<Item = (&'static str, NativeKind)> + '_ {
    NATIVE_FIELDS
        .iter()
        .filter(move |(table, _, _)| *table == collection)
        .map(|(_, field, kind)| (*field, *kind))
}

fn native_kind(collection: &str, field: &str) -> Option<NativeKind> {
    native_fields(collection)
        .find(|(name, _)| *name == field)
        .map(|(_, kind)| kind)
}

/// Document store over SurrealDB. Each collection is a table; each document
/// is a record `{ doc_id, _rev, data, native }` whose record id equals
/// `doc_id`. Transactions are optimistic: read the revision, compute, then
/// write only if the revision is unchanged.
#[derive(Clone)]
pub struct SurrealDocumentStore {
    client: Arc<Surreal<Client>>,
}

#[derive(Debug, Deserialize)]
struct SurrealDocumentRow {
    doc_id: String,
    #[serde(rename = "_rev", default)]
    rev: i64,
    #[serde(default)]
    data: Document,
}

impl SurrealDocumentStore {
    pub async fn connect(db_config: &DbConfig) -> anyhow::Result<Self> {
        let db = Surreal::<Client>::init();
        db.connect::<Ws>(&db_config.endpoint).await?;
        db.signin(Root {
            username: &db_config.username,
            password: &db_config.password,
        })
        .await?;
        db.use_ns(&db_config.namespace)
            .use_db(&db_config.database)
            .await?;
        tracing::info!(
            endpoint = %db_config.endpoint,
            namespace = %db_config.namespace,
            database = %db_config.database,
            "connected to surrealdb"
        );
        Ok(Self {
            client: Arc::new(db),
        })
    }

    async fn read_row(
        client: &Surreal<Client>,
        collection: &str,
        id: &str,
    ) -> DomainResult<Option<SurrealDocumentRow>> {
        let sql = format!("SELECT {} FROM type::thing($tb, $id)", projection(collection));
        let mut response = client
            .query(sql)
            .bind(("tb", collection.to_string()))
            .bind(("id", id.to_string()))
            .await
            .map_err(map_surreal_error)?;
        let rows: Vec<Value> = response.take(0).map_err(map_surreal_error)?;
        decode_rows(collection, rows).map(|rows| rows.into_iter().next())
    }

    async fn transact_with(
        client: &Surreal<Client>,
        collection: &str,
        id: &str,
        apply: TransactionFn,
    ) -> DomainResult<TransactionCommit> {
        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            let row = Self::read_row(client, collection, id)
                .await?
                .ok_or(DomainError::NotFound)?;
            let Some(changes) = apply(&row.data) else {
                return Ok(TransactionCommit {
                    snapshot: row.data,
                    written: None,
                });
            };

            let mut next = row.data.clone();
            merge_into(&mut next, &changes);
            let record = split_native(collection, next)?;
            let sql = format!(
                "UPDATE type::thing($tb, $id) \
                 SET data = $data, native = {}, _rev = $next_rev \
                 WHERE _rev = $rev \
                 RETURN doc_id",
                record.native_object()
            );
            let mut request = client
                .query(sql)
                .bind(("tb", collection.to_string()))
                .bind(("id", id.to_string()))
                .bind(("data", Value::Object(record.data)))
                .bind(("rev", row.rev))
                .bind(("next_rev", row.rev + 1));
            for (name, value) in record.bindings {
                request = request.bind((name, value));
            }
            let mut response = request.await.map_err(map_surreal_error)?;
            let written: Vec<Value> = response.take(0).map_err(map_surreal_error)?;
            if !written.is_empty() {
                return Ok(TransactionCommit {
                    snapshot: row.data,
                    written: Some(changes),
                });
            }
            tracing::debug!(
                collection,
                id,
                attempt,
                "document revision moved, retrying transaction"
            );
        }
        Err(DomainError::Store(format!(
            "transaction on {collection}:{id} lost {MAX_TRANSACTION_ATTEMPTS} races"
        )))
    }
}

impl DocumentStore for SurrealDocumentStore {
    fn get(&self, collection: &str, id: &str) -> BoxFuture<'_, DomainResult<Option<Document>>> {
        let collection = collection.to_string();
        let id = id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let row = Self::read_row(&client, &collection, &id).await?;
            Ok(row.map(|row| row.data))
        })
    }

    fn set(&self, collection: &str, id: &str, data: Document) -> BoxFuture<'_, DomainResult<()>> {
        let collection = collection.to_string();
        let id = id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let record = split_native(&collection, data)?;
            let sql = format!(
                "UPSERT type::thing($tb, $id) \
                 SET doc_id = $id, data = $data, native = {}, _rev = (_rev OR 0) + 1",
                record.native_object()
            );
            let mut request = client
                .query(sql)
                .bind(("tb", collection))
                .bind(("id", id))
                .bind(("data", Value::Object(record.data)));
            for (name, value) in record.bindings {
                request = request.bind((name, value));
            }
            let response = request.await.map_err(map_surreal_error)?;
            response.check().map_err(map_surreal_error)?;
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
        let client = self.client.clone();
        Box::pin(async move {
            let apply: TransactionFn = Arc::new(move |_: &Document| Some(changes.clone()));
            Self::transact_with(&client, &collection, &id, apply).await?;
            Ok(())
        })
    }

    fn delete(&self, collection: &str, id: &str) -> BoxFuture<'_, DomainResult<()>> {
        let collection = collection.to_string();
        let id = id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let response = client
                .query("DELETE type::thing($tb, $id)")
                .bind(("tb", collection))
                .bind(("id", id))
                .await
                .map_err(map_surreal_error)?;
            response.check().map_err(map_surreal_error)?;
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
        let client = self.client.clone();
        Box::pin(async move {
            let (sql, bindings) = build_select(&collection, &query)?;
            let mut request = client.query(sql).bind(("tb", collection.clone()));
            for (name, value) in bindings {
                request = request.bind((name, value));
            }
            let mut response = request.await.map_err(map_surreal_error)?;
            let rows: Vec<Value> = response.take(0).map_err(map_surreal_error)?;
            Ok(decode_rows(&collection, rows)?
                .into_iter()
                .map(|row| StoredDocument {
                    id: row.doc_id,
                    data: row.data,
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
        let client = self.client.clone();
        Box::pin(async move {
            if updates.is_empty() {
                return Ok(());
            }
            let (sql, bindings) = build_batch_update(&collection, &updates)?;
            let mut request = client.query(sql).bind(("tb", collection.clone()));
            for (name, value) in bindings {
                request = request.bind((name, value));
            }
            let response = request.await.map_err(map_surreal_error)?;
            response.check().map_err(map_surreal_error)?;
            tracing::debug!(
                collection = %collection,
                documents = updates.len(),
                "batch update committed"
            );
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
        let client = self.client.clone();
        Box::pin(async move { Self::transact_with(&client, &collection, &id, apply).await })
    }
}

/// Native values in one document, ready to splice into a SET clause.
#[derive(Debug, Default)]
struct NativeRecord {
    data: Document,
    /// `(field, expression)` pairs; expressions reference the bindings.
    fields: Vec<(String, String)>,
    bindings: Vec<(String, Value)>,
}

impl NativeRecord {
    fn native_object(&self) -> String {
        let entries: Vec<String> = self
            .fields
            .iter()
            .map(|(field, expr)| format!("{field}: {expr}"))
            .collect();
        format!("{{ {} }}", entries.join(", "))
    }
}

/// Moves the collection's native fields out of `data`.
fn split_native(collection: &str, mut data: Document) -> DomainResult<NativeRecord> {
    let mut record = NativeRecord::default();
    for (index, (field, kind)) in native_fields(collection).enumerate() {
        let Some(value) = data.remove(field) else {
            continue;
        };
        let param = format!("n{index}");
        let (expr, binding) = native_expr(kind, field, &param, &value)?;
        record.fields.push((field.to_string(), expr));
        if let Some(binding) = binding {
            record.bindings.push((param, binding));
        }
    }
    record.data = data;
    Ok(record)
}

/// SurrealQL expression that turns a bound document value into its native
/// form. Null clears the field.
fn native_expr(
    kind: NativeKind,
    field: &str,
    param: &str,
    value: &Value,
) -> DomainResult<(String, Option<Value>)> {
    if value.is_null() {
        return Ok(("NONE".to_string(), None));
    }
    match kind {
        NativeKind::Timestamp => {
            let millis = value.as_i64().ok_or_else(|| {
                DomainError::Validation(format!("{field} must be epoch milliseconds"))
            })?;
            Ok((
                format!("type::datetime(${param})"),
                Some(Value::String(format_ms_rfc3339(millis))),
            ))
        }
        NativeKind::Point => {
            let latitude = value.get("latitude").and_then(Value::as_f64);
            let longitude = value.get("longitude").and_then(Value::as_f64);
            let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
                return Err(DomainError::Validation(format!(
                    "{field} must carry latitude and longitude"
                )));
            };
            Ok((
                format!("type::point(${param})"),
                Some(json!([longitude, latitude])),
            ))
        }
    }
}

/// Columns for a SELECT: native fields come back as text so they can be
/// turned into document values again in [`decode_rows`].
fn projection(collection: &str) -> String {
    let mut columns = vec!["doc_id".to_string(), "_rev".to_string(), "data".to_string()];
    for (field, _) in native_fields(collection) {
        columns.push(format!(
            "(IF native.{field} != NONE THEN <string> native.{field} END) AS native_{field}"
        ));
    }
    columns.join(", ")
}

fn native_filter_value(kind: NativeKind, field: &str, value: &Value) -> DomainResult<Value> {
    match (kind, value.as_i64()) {
        (NativeKind::Timestamp, Some(millis)) => Ok(Value::String(format_ms_rfc3339(millis))),
        (NativeKind::Timestamp, None) => Err(DomainError::Validation(format!(
            "{field} filter must be epoch milliseconds"
        ))),
        (NativeKind::Point, _) => Err(DomainError::Validation(format!(
            "{field} cannot be filtered in the store"
        ))),
    }
}

/// Builds the SELECT for a query. Field names are spliced into the statement,
/// so only plain identifiers are accepted; values are always bound.
fn build_select(
    collection: &str,
    query: &DocumentQuery,
) -> DomainResult<(String, Vec<(String, Value)>)> {
    let mut clauses = Vec::new();
    let mut bindings = Vec::new();

    if let Some(cursor) = query.start_after.as_ref() {
        clauses.push("doc_id > $cursor".to_string());
        bindings.push(("cursor".to_string(), Value::String(cursor.clone())));
    }
    for (index, filter) in query.filters.iter().enumerate() {
        ensure_identifier(&filter.field)?;
        let param = format!("f{index}");
        let (field, operand, value) = match native_kind(collection, &filter.field) {
            Some(kind) => (
                format!("native.{}", filter.field),
                format!("type::datetime(${param})"),
                native_filter_value(kind, &filter.field, &filter.value)?,
            ),
            None => (
                format!("data.{}", filter.field),
                format!("${param}"),
                filter.value.clone(),
            ),
        };
        let clause = match filter.op {
            FilterOp::Eq => format!("{field} = {operand}"),
            FilterOp::Gte => format!("{field} >= {operand}"),
            FilterOp::Lte => format!("{field} <= {operand}"),
            FilterOp::Lt => format!("{field} < {operand}"),
            FilterOp::ArrayContains => format!("{field} CONTAINS {operand}"),
            FilterOp::NotEmpty => format!("array::len({field} ?? []) > 0"),
        };
        clauses.push(clause);
        if filter.op != FilterOp::NotEmpty {
            bindings.push((param, value));
        }
    }

    let mut sql = format!(
        "SELECT {} FROM type::table($tb)",
        projection(collection)
    );
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY doc_id ASC");
    if let Some(limit) = query.limit {
        sql.push_str(" LIMIT $limit");
        bindings.push(("limit".to_string(), Value::from(limit)));
    }
    Ok((sql, bindings))
}

/// One request for a whole batch. Documents sharing the same changes are
/// updated by a single statement; ids that no longer exist match nothing.
fn build_batch_update(
    collection: &str,
    updates: &[(String, Document)],
) -> DomainResult<(String, Vec<(String, Value)>)> {
    let mut groups: Vec<(&Document, Vec<String>)> = Vec::new();
    for (id, changes) in updates {
        match groups.iter_mut().find(|(group, _)| *group == changes) {
            Some((_, ids)) => ids.push(id.clone()),
            None => groups.push((changes, vec![id.clone()])),
        }
    }

    let mut statements = vec!["BEGIN TRANSACTION".to_string()];
    let mut bindings = Vec::new();
    for (group, (changes, ids)) in groups.into_iter().enumerate() {
        let mut assignments = Vec::new();
        for (index, (field, value)) in changes.iter().enumerate() {
            ensure_identifier(field)?;
            let param = format!("g{group}_{index}");
            match native_kind(collection, field) {
                Some(kind) => {
                    let (expr, binding) = native_expr(kind, field, &param, value)?;
                    assignments.push(format!("native.{field} = {expr}"));
                    if let Some(binding) = binding {
                        bindings.push((param, binding));
                    }
                }
                None => {
                    assignments.push(format!("data.{field} = ${param}"));
                    bindings.push((param, value.clone()));
                }
            }
        }
        assignments.push("_rev += 1".to_string());
        let ids_param = format!("g{group}_ids");
        statements.push(format!(
            "UPDATE type::table($tb) SET {} WHERE doc_id IN ${ids_param}",
            assignments.join(", ")
        ));
        bindings.push((ids_param, json!(ids)));
    }
    statements.push("COMMIT TRANSACTION".to_string());
    Ok((format!("{};", statements.join("; ")), bindings))
}

fn ensure_identifier(field: &str) -> DomainResult<()> {
    let valid = !field.is_empty()
        && field
            .chars()
            .next()
            .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(DomainError::Validation(format!(
            "invalid document field name '{field}'"
        )))
    }
}

fn decode_rows(collection: &str, rows: Vec<Value>) -> DomainResult<Vec<SurrealDocumentRow>> {
    rows.into_iter()
        .map(|row| {
            let mut natives = Vec::new();
            for (field, kind) in native_fields(collection) {
                if let Some(text) = row.get(format!("native_{field}")).and_then(Value::as_str) {
                    natives.push((field, native_to_json(kind, field, text)?));
                }
            }
            let mut decoded = serde_json::from_value::<SurrealDocumentRow>(row)
                .map_err(|err| DomainError::Store(format!("invalid document row: {err}")))?;
            for (field, value) in natives {
                decoded.data.insert(field.to_string(), value);
            }
            Ok(decoded)
        })
        .collect()
}

fn native_to_json(kind: NativeKind, field: &str, text: &str) -> DomainResult<Value> {
    let invalid = || DomainError::Store(format!("invalid native {field} value '{text}'"));
    match kind {
        NativeKind::Timestamp => parse_rfc3339_ms(text).map(Value::from).ok_or_else(invalid),
        NativeKind::Point => {
            let (longitude, latitude) = parse_point(text).ok_or_else(invalid)?;
            Ok(json!({ "latitude": latitude, "longitude": longitude }))
        }
    }
}

/// Parses the `(x, y)` text form of a point; floats may carry an `f` suffix.
fn parse_point(text: &str) -> Option<(f64, f64)> {
    let inner = text.trim().strip_prefix('(')?.strip_suffix(')')?;
    let mut parts = inner.split(',').map(|part| {
        part.trim()
            .trim_end_matches("dec")
            .trim_end_matches('f')
            .parse::<f64>()
    });
    let x = parts.next()?.ok()?;
    let y = parts.next()?.ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((x, y))
}

fn map_surreal_error(err: surrealdb::Error) -> DomainError {
    let message = err.to_string().to_lowercase();
    if message.contains("already exists")
        || message.contains("duplicate")
        || message.contains("unique")
    {
        return DomainError::Conflict;
    }
    DomainError::Store(format!("surreal query failed: {message}"))
}
