//! Table definitions derived from the mapping registry.

use idm_storage::mapping::{is_valid_identifier, UnitSchema};
use idm_storage::{FieldKind, MappingRegistry, StorageError, StorageResult};
use sqlx::SqlitePool;

use crate::error::from_sqlx_error;

/// Backend-owned column on root tables recording the region's partition.
pub const PARTITION_SCOPE: &str = "partition_scope";

/// Returns the `SQLite` column type storing a field kind.
#[must_use]
pub const fn sql_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Bool | FieldKind::Integer => "INTEGER",
        FieldKind::Text | FieldKind::Timestamp | FieldKind::Id | FieldKind::Json => "TEXT",
    }
}

/// Quotes a validated identifier.
///
/// ## Errors
///
/// Returns a mapping error for a name the registry would have rejected.
pub fn quote(name: &str) -> StorageResult<String> {
    if is_valid_identifier(name) {
        Ok(format!("\"{name}\""))
    } else {
        Err(StorageError::mapping(format!("'{name}' is not a valid identifier")))
    }
}

/// Builds the DDL statements for one unit.
///
/// ## Errors
///
/// Returns a mapping error for an invalid identifier.
pub fn unit_ddl(unit: &UnitSchema) -> StorageResult<Vec<String>> {
    let table = quote(&unit.name)?;
    let mut columns = Vec::with_capacity(unit.columns.len() + 1);
    for column in &unit.columns {
        let mut definition = format!("{} {}", quote(&column.name)?, sql_type(column.kind));
        if unit.root && column.name == unit.key_column {
            definition.push_str(" PRIMARY KEY");
        }
        columns.push(definition);
    }
    let mut statements = Vec::with_capacity(2);
    if unit.root {
        columns.push(format!("{PARTITION_SCOPE} TEXT"));
        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {table} ({})",
            columns.join(", ")
        ));
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS \"idx_{}_scope\" ON {table} ({PARTITION_SCOPE})",
            unit.name
        ));
    } else {
        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {table} ({})",
            columns.join(", ")
        ));
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS \"idx_{}_{}\" ON {table} ({})",
            unit.name,
            unit.key_column,
            quote(&unit.key_column)?
        ));
    }
    Ok(statements)
}

/// Builds every DDL statement the registry needs.
///
/// ## Errors
///
/// Returns a mapping error if the registry's units are inconsistent.
pub fn ddl(registry: &MappingRegistry) -> StorageResult<Vec<String>> {
    let mut statements = Vec::new();
    for unit in registry.unit_schemas()? {
        statements.extend(unit_ddl(&unit)?);
    }
    Ok(statements)
}

/// Creates missing tables and indexes.
///
/// ## Errors
///
/// Returns a mapping error for an inconsistent registry or a driver error.
pub async fn create_schema(pool: &SqlitePool, registry: &MappingRegistry) -> StorageResult<()> {
    let statements = ddl(registry)?;
    for statement in &statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(from_sqlx_error)?;
    }
    tracing::debug!(statements = statements.len(), "schema ensured");
    Ok(())
}
