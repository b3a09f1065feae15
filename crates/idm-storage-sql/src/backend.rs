//! Relational backend.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use idm_storage::mapping::{EntityMapping, TypeMapping, UnitSchema};
use idm_storage::{
    Backend, EntityRecord, FieldKind, FieldValue, MappingRegistry, PhysicalRecord, Region,
    StorageError, StorageResult, StoreSnapshot, WriteBatch, WriteOp,
};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Sqlite, Transaction};
use tokio::sync::{OwnedRwLockReadGuard, RwLock};
use uuid::Uuid;

use crate::convert::{bind_value, decode_column};
use crate::error::{from_sqlx_error, transaction_error};
use crate::pool::{create_pool, PoolConfig};
use crate::schema::{create_schema, quote, PARTITION_SCOPE};

/// Backend storing each mapped unit as a table.
///
/// Root tables carry a `partition_scope` column naming the partition of the
/// region a record was written to (null for global regions); a region load
/// selects root rows by scope and joins their child rows.
///
/// Snapshots hold a read side of `commit_gate`; commits take the write
/// side, so no commit of this backend lands while a snapshot is alive.
#[derive(Debug, Clone)]
pub struct SqlBackend {
    pool: SqlitePool,
    registry: Arc<MappingRegistry>,
    units: Arc<HashMap<String, UnitSchema>>,
    commit_gate: Arc<RwLock<()>>,
}

/// Committed state pinned by [`SqlBackend::snapshot`].
struct SqlSnapshot {
    backend: SqlBackend,
    _pinned: OwnedRwLockReadGuard<()>,
}

#[async_trait]
impl StoreSnapshot for SqlSnapshot {
    async fn load(&self, region: Region) -> StorageResult<Vec<EntityRecord>> {
        self.backend.load_region(region).await
    }
}

impl SqlBackend {
    /// Connects and ensures the schema exists.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Connection` if the database is unreachable,
    /// or a driver error if the schema cannot be created.
    pub async fn connect(config: &PoolConfig, registry: Arc<MappingRegistry>) -> StorageResult<Self> {
        let pool = create_pool(config).await?;
        Self::with_pool(pool, registry).await
    }

    /// Uses an existing pool and ensures the schema exists.
    ///
    /// ## Errors
    ///
    /// Returns a driver error if the schema cannot be created.
    pub async fn with_pool(pool: SqlitePool, registry: Arc<MappingRegistry>) -> StorageResult<Self> {
        create_schema(&pool, &registry).await?;
        let units = registry
            .unit_schemas()?
            .into_iter()
            .map(|u| (u.name.clone(), u))
            .collect();
        tracing::info!("sql store opened");
        Ok(Self {
            pool,
            registry,
            units: Arc::new(units),
            commit_gate: Arc::new(RwLock::new(())),
        })
    }

    /// Returns the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_region(&self, region: Region) -> StorageResult<Vec<EntityRecord>> {
        let mut records = Vec::new();
        for (root_unit, mappings) in self.roots(region) {
            records.extend(self.load_root(region, &root_unit, &mappings).await?);
        }
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    fn unit(&self, name: &str) -> StorageResult<&UnitSchema> {
        self.units
            .get(name)
            .ok_or_else(|| StorageError::mapping(format!("unit '{name}' has no table")))
    }

    /// Mappings of a region grouped by root unit.
    fn roots(&self, region: Region) -> BTreeMap<String, Vec<&TypeMapping>> {
        let mut roots: BTreeMap<String, Vec<&TypeMapping>> = BTreeMap::new();
        for mapping in self.registry.mappings_for(region) {
            roots
                .entry(mapping.root().unit.clone())
                .or_default()
                .push(mapping);
        }
        roots
    }

    async fn load_root(
        &self,
        region: Region,
        root_unit: &str,
        mappings: &[&TypeMapping],
    ) -> StorageResult<Vec<EntityRecord>> {
        let root = self.unit(root_unit)?;
        let table = quote(&root.name)?;
        let key = quote(&root.key_column)?;
        let scope = region.partition().map(|p| p.to_string());

        let discriminator = mappings[0].root().discriminator.clone();
        let mut sql = format!("SELECT * FROM {table} WHERE {PARTITION_SCOPE} IS ?");
        if let Some(column) = &discriminator {
            let placeholders = vec!["?"; mappings.len()].join(", ");
            sql.push_str(&format!(" AND {} IN ({placeholders})", quote(column)?));
        }
        sql.push_str(&format!(" ORDER BY {key}"));

        let mut query = sqlx::query(&sql).bind(scope.clone());
        if discriminator.is_some() {
            for mapping in mappings {
                query = query.bind(mapping.key.discriminator());
            }
        }
        let root_rows = query.fetch_all(&self.pool).await.map_err(from_sqlx_error)?;
        if root_rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut dependent_units: BTreeSet<&str> = BTreeSet::new();
        for mapping in mappings {
            dependent_units.extend(mapping.mappings()[1..].iter().map(|m| m.unit.as_str()));
            dependent_units.extend(mapping.collections().map(|c| c.unit.as_str()));
        }
        let mut dependents: HashMap<&str, HashMap<Uuid, Vec<SqliteRow>>> = HashMap::new();
        for unit in dependent_units {
            let rows = self.load_dependents(root, unit, scope.as_deref()).await?;
            dependents.insert(unit, rows);
        }

        let mut records = Vec::with_capacity(root_rows.len());
        for row in &root_rows {
            let mapping = match &discriminator {
                Some(column) => {
                    let value = decode_column(row, column, FieldKind::Text)?;
                    let name = value.as_text().unwrap_or_default();
                    mappings
                        .iter()
                        .find(|m| m.key.discriminator() == name)
                        .ok_or_else(|| {
                            StorageError::mapping(format!(
                                "row of '{root_unit}' has unknown discriminator '{name}'"
                            ))
                        })?
                }
                None => &mappings[0],
            };
            records.push(assemble(mapping, row, &dependents)?);
        }
        Ok(records)
    }

    async fn load_dependents(
        &self,
        root: &UnitSchema,
        unit: &str,
        scope: Option<&str>,
    ) -> StorageResult<HashMap<Uuid, Vec<SqliteRow>>> {
        let child = self.unit(unit)?;
        let owner = quote(&child.key_column)?;
        let order = child
            .columns
            .iter()
            .find(|c| c.name != child.key_column && c.kind == FieldKind::Text)
            .map(|c| quote(&c.name))
            .transpose()?;
        let mut sql = format!(
            "SELECT c.* FROM {} c JOIN {} r ON c.{owner} = r.{} WHERE r.{PARTITION_SCOPE} IS ? ORDER BY c.{owner}",
            quote(&child.name)?,
            quote(&root.name)?,
            quote(&root.key_column)?,
        );
        if let Some(order) = order {
            sql.push_str(&format!(", c.{order}"));
        }
        let rows = sqlx::query(&sql)
            .bind(scope)
            .fetch_all(&self.pool)
            .await
            .map_err(from_sqlx_error)?;

        let mut grouped: HashMap<Uuid, Vec<SqliteRow>> = HashMap::new();
        for row in rows {
            let id = decode_column(&row, &child.key_column, FieldKind::Id)?
                .as_id()
                .ok_or_else(|| {
                    StorageError::mapping(format!("'{unit}' row has no owner id"))
                })?;
            grouped.entry(id).or_default().push(row);
        }
        Ok(grouped)
    }

    /// Units a region's records may occupy, dependents before roots.
    fn region_units(&self, region: Region) -> (BTreeSet<String>, BTreeSet<String>) {
        let mut roots = BTreeSet::new();
        let mut dependents = BTreeSet::new();
        for mapping in self.registry.mappings_for(region) {
            roots.insert(mapping.root().unit.clone());
            for unit in &mapping.mappings()[1..] {
                dependents.insert(unit.unit.clone());
            }
            for collection in mapping.collections() {
                dependents.insert(collection.unit.clone());
            }
        }
        (dependents, roots)
    }

    async fn delete_entity(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        region: Region,
        id: Uuid,
    ) -> StorageResult<()> {
        let (dependents, roots) = self.region_units(region);
        for name in dependents.iter().chain(roots.iter()) {
            let unit = self.unit(name)?;
            let sql = format!(
                "DELETE FROM {} WHERE {} = ?",
                quote(&unit.name)?,
                quote(&unit.key_column)?
            );
            sqlx::query(&sql)
                .bind(id.to_string())
                .execute(&mut **tx)
                .await
                .map_err(from_sqlx_error)?;
        }
        Ok(())
    }

    async fn put_entity(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        region: Region,
        record: &EntityRecord,
    ) -> StorageResult<()> {
        self.registry.type_of(record, region.type_keys())?;
        self.delete_entity(tx, region, record.id).await?;
        let scope = region.partition().map(|p| p.to_string());

        for (index, row) in record.records.iter().enumerate() {
            let unit = self.unit(&row.unit)?;
            let mut columns = Vec::with_capacity(row.fields.len() + 1);
            for column in row.fields.keys() {
                if !unit.columns.iter().any(|c| &c.name == column) {
                    return Err(StorageError::mapping(format!(
                        "table '{}' has no column '{column}'",
                        unit.name
                    )));
                }
                columns.push(quote(column)?);
            }
            let scoped = index == 0 && unit.root;
            if scoped {
                columns.push(PARTITION_SCOPE.to_string());
            }
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote(&unit.name)?,
                columns.join(", "),
                vec!["?"; columns.len()].join(", ")
            );
            let mut query = sqlx::query(&sql);
            for value in row.fields.values() {
                query = bind_value(query, value);
            }
            if scoped {
                query = query.bind(scope.clone());
            }
            query.execute(&mut **tx).await.map_err(from_sqlx_error)?;
        }
        Ok(())
    }

    async fn drop_partition(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        partition: Uuid,
    ) -> StorageResult<()> {
        let scope = partition.to_string();
        let mut statements = BTreeSet::new();
        let mut root_statements = BTreeSet::new();
        for region in Region::partition_regions(partition) {
            for mapping in self.registry.mappings_for(region) {
                let root = self.unit(&mapping.root().unit)?;
                let select_ids = format!(
                    "SELECT {} FROM {} WHERE {PARTITION_SCOPE} = ?",
                    quote(&root.key_column)?,
                    quote(&root.name)?
                );
                let dependents = mapping.mappings()[1..]
                    .iter()
                    .map(|m| m.unit.as_str())
                    .chain(mapping.collections().map(|c| c.unit.as_str()));
                for name in dependents {
                    let unit = self.unit(name)?;
                    statements.insert(format!(
                        "DELETE FROM {} WHERE {} IN ({select_ids})",
                        quote(&unit.name)?,
                        quote(&unit.key_column)?
                    ));
                }
                root_statements.insert(format!(
                    "DELETE FROM {} WHERE {PARTITION_SCOPE} = ?",
                    quote(&root.name)?
                ));
            }
        }
        for sql in statements.iter().chain(root_statements.iter()) {
            sqlx::query(sql)
                .bind(scope.as_str())
                .execute(&mut **tx)
                .await
                .map_err(from_sqlx_error)?;
        }
        Ok(())
    }
}

fn decode_unit(mapping: &EntityMapping, row: &SqliteRow) -> StorageResult<PhysicalRecord> {
    let mut record = PhysicalRecord::new(mapping.unit.clone());
    if let Some(column) = &mapping.discriminator {
        record.set(column.clone(), decode_column(row, column, FieldKind::Text)?);
    }
    for field in &mapping.fields {
        record.set(field.column.clone(), decode_column(row, &field.column, field.kind)?);
    }
    Ok(record)
}

fn rows_for<'a>(
    dependents: &'a HashMap<&str, HashMap<Uuid, Vec<SqliteRow>>>,
    unit: &str,
    id: Uuid,
) -> &'a [SqliteRow] {
    dependents
        .get(unit)
        .and_then(|by_owner| by_owner.get(&id))
        .map_or(&[], Vec::as_slice)
}

fn assemble(
    mapping: &TypeMapping,
    root_row: &SqliteRow,
    dependents: &HashMap<&str, HashMap<Uuid, Vec<SqliteRow>>>,
) -> StorageResult<EntityRecord> {
    let root = decode_unit(mapping.root(), root_row)?;
    let id = root
        .get(mapping.root().key_column())
        .and_then(FieldValue::as_id)
        .ok_or_else(|| StorageError::mapping(format!("'{}' row has no id", root.unit)))?;
    let mut records = vec![root];
    for unit in &mapping.mappings()[1..] {
        if let Some(row) = rows_for(dependents, &unit.unit, id).first() {
            records.push(decode_unit(unit, row)?);
        }
    }
    for collection in mapping.collections() {
        for row in rows_for(dependents, &collection.unit, id) {
            records.push(
                PhysicalRecord::new(collection.unit.clone())
                    .with(
                        collection.owner_column.clone(),
                        decode_column(row, &collection.owner_column, FieldKind::Id)?,
                    )
                    .with(
                        collection.key_column.clone(),
                        decode_column(row, &collection.key_column, FieldKind::Text)?,
                    )
                    .with(
                        collection.value_column.clone(),
                        decode_column(row, &collection.value_column, collection.value_kind)?,
                    ),
            );
        }
    }
    Ok(EntityRecord::new(id, records))
}

#[async_trait]
impl Backend for SqlBackend {
    fn name(&self) -> &'static str {
        "sql"
    }

    async fn load(&self, region: Region) -> StorageResult<Vec<EntityRecord>> {
        let _pinned = self.commit_gate.read().await;
        self.load_region(region).await
    }

    async fn snapshot(&self) -> StorageResult<Arc<dyn StoreSnapshot>> {
        let pinned = Arc::clone(&self.commit_gate).read_owned().await;
        Ok(Arc::new(SqlSnapshot {
            backend: self.clone(),
            _pinned: pinned,
        }))
    }

    async fn commit(&self, batch: WriteBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let _gate = self.commit_gate.write().await;
        let mut tx = self.pool.begin().await.map_err(transaction_error)?;
        for op in batch.ops() {
            match op {
                WriteOp::Put { region, record } => self.put_entity(&mut tx, *region, record).await?,
                WriteOp::Delete { region, id } => self.delete_entity(&mut tx, *region, *id).await?,
                WriteOp::InitPartition(_) => {}
                WriteOp::DropPartition(partition) => self.drop_partition(&mut tx, *partition).await?,
            }
        }
        tx.commit().await.map_err(transaction_error)?;
        tracing::debug!(ops = batch.len(), "sql store commit");
        Ok(())
    }
}
