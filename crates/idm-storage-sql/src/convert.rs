//! Conversion between column values and field values.

use chrono::{DateTime, SecondsFormat, Utc};
use idm_storage::{FieldKind, FieldValue, StorageError, StorageResult};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

use crate::error::from_sqlx_error;

/// A query under construction.
pub type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Formats a timestamp so that text order equals time order.
#[must_use]
pub fn timestamp_to_text(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Binds a field value to the next placeholder.
#[must_use]
pub fn bind_value<'q>(query: SqliteQuery<'q>, value: &FieldValue) -> SqliteQuery<'q> {
    match value {
        FieldValue::Null => query.bind(Option::<String>::None),
        FieldValue::Bool(b) => query.bind(*b),
        FieldValue::Integer(i) => query.bind(*i),
        FieldValue::Text(text) => query.bind(text.clone()),
        FieldValue::Timestamp(t) => query.bind(timestamp_to_text(t)),
        FieldValue::Id(id) => query.bind(id.to_string()),
        FieldValue::Json(json) => query.bind(json.to_string()),
    }
}

/// Reads a column as a field value of `kind`.
///
/// ## Errors
///
/// Returns a mapping error if the column is missing or its content does not
/// parse as `kind`.
pub fn decode_column(row: &SqliteRow, column: &str, kind: FieldKind) -> StorageResult<FieldValue> {
    let value = match kind {
        FieldKind::Bool => row
            .try_get::<Option<bool>, _>(column)
            .map_err(from_sqlx_error)?
            .map(FieldValue::Bool),
        FieldKind::Integer => row
            .try_get::<Option<i64>, _>(column)
            .map_err(from_sqlx_error)?
            .map(FieldValue::Integer),
        FieldKind::Text => text(row, column)?.map(FieldValue::Text),
        FieldKind::Timestamp => match text(row, column)? {
            Some(raw) => Some(FieldValue::Timestamp(
                DateTime::parse_from_rfc3339(&raw)
                    .map_err(|e| malformed(column, &raw, &e))?
                    .with_timezone(&Utc),
            )),
            None => None,
        },
        FieldKind::Id => match text(row, column)? {
            Some(raw) => Some(FieldValue::Id(
                Uuid::parse_str(&raw).map_err(|e| malformed(column, &raw, &e))?,
            )),
            None => None,
        },
        FieldKind::Json => match text(row, column)? {
            Some(raw) => Some(FieldValue::Json(
                serde_json::from_str(&raw).map_err(|e| malformed(column, &raw, &e))?,
            )),
            None => None,
        },
    };
    Ok(value.unwrap_or(FieldValue::Null))
}

fn text(row: &SqliteRow, column: &str) -> StorageResult<Option<String>> {
    row.try_get::<Option<String>, _>(column)
        .map_err(from_sqlx_error)
}

fn malformed(column: &str, raw: &str, err: &dyn std::fmt::Display) -> StorageError {
    StorageError::mapping(format!("column '{column}' holds '{raw}': {err}"))
}
