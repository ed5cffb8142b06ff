//! Generic data-access facade over one mapped type.
//!
//! # Responsibility
//! - Expose select/insert/update/delete primitives and their batch forms.
//! - Acquire one connection per call and release it on every path.
//! - Tag every failure with the operation that raised it.
//!
//! # Invariants
//! - Argument, template and metadata checks run before a connection is
//!   acquired.
//! - Empty batch inputs are no-ops and touch no storage.
//! - Batch insert never binds the key column.

use crate::config::{current_context, DaoContext};
use crate::db::guard::{with_connection, with_statement};
use crate::error::{DaoError, DaoResult, MapResult, MapperError};
use crate::meta::registry::{metadata_for, Attribute, Metadata};
use crate::model::entity::Entity;
use crate::model::value::FieldValue;
use crate::query::sql::{self, WritePlan};
use crate::query::template::expand_template;
use crate::repo::batch::{BatchSummary, BatchWriter, GeneratedKeys};
use crate::repo::binder::{bind_row, storage_value};
use crate::repo::mapper::{read_entities, retrieve_value};
use log::info;
use rusqlite::types::Value;
use rusqlite::Connection;
use std::sync::Arc;

pub const OP_METADATA: &str = "metadata";
pub const OP_SELECT: &str = "select";
pub const OP_INSERT_SINGLE: &str = "insert - single";
pub const OP_INSERT_BATCH: &str = "insert - batch";
pub const OP_UPDATE_SINGLE: &str = "update - single";
pub const OP_UPDATE_BATCH: &str = "update - batch";
pub const OP_DELETE_SINGLE: &str = "delete - single";
pub const OP_DELETE_LIST: &str = "delete - list";

/// Data-access object for mapped type `E`.
pub struct Dao<E: Entity> {
    metadata: Arc<Metadata<E>>,
    context: Option<DaoContext>,
}

impl<E: Entity> Dao<E> {
    /// DAO reading the global provider and batch size on every call.
    pub fn new() -> DaoResult<Self> {
        Ok(Self {
            metadata: load_metadata::<E>()?,
            context: None,
        })
    }

    /// DAO pinned to an explicit provider and batch size.
    pub fn with_context(context: DaoContext) -> DaoResult<Self> {
        Ok(Self {
            metadata: load_metadata::<E>()?,
            context: Some(context),
        })
    }

    pub fn metadata(&self) -> &Metadata<E> {
        &self.metadata
    }

    /// Runs a hand-written SQL template; list arguments expand into
    /// placeholder groups.
    pub fn select(&self, template: &str, args: Vec<FieldValue>) -> DaoResult<Vec<E>> {
        let query = expand_template(template, args).map_err(tag(OP_SELECT))?;
        self.query(OP_SELECT, &query.sql, query.args)
    }

    pub fn get_all(&self) -> DaoResult<Vec<E>> {
        self.query(OP_SELECT, &sql::select_all(self.metadata()), Vec::new())
    }

    /// Instance whose key equals `key`; `None` unless exactly one row matches.
    pub fn get_by_key(&self, key: impl Into<FieldValue>) -> DaoResult<Option<E>> {
        let key = self.check_raw_key(key.into()).map_err(tag(OP_SELECT))?;
        let context = self.context(OP_SELECT)?;
        let metadata: &Metadata<E> = &self.metadata;

        let mut found = with_connection(context.provider(), OP_SELECT, |conn| {
            let bound = bind_key(conn, metadata.key_attribute(), key)?;
            with_statement(conn, &sql::select_by_key(metadata), |stmt| {
                bind_row(stmt, &[bound])?;
                read_entities(metadata, stmt)
            })
        })?;

        if found.len() == 1 {
            Ok(found.pop())
        } else {
            Ok(None)
        }
    }

    /// Inserts one instance and returns its key.
    ///
    /// An absent key is generated by the store and written back onto
    /// `entity`; a supplied key is bound as-is. Types without a key
    /// attribute bind every column and return `FieldValue::Null`.
    pub fn insert(&self, entity: &mut E) -> DaoResult<FieldValue> {
        let context = self.context(OP_INSERT_SINGLE)?;
        let metadata: &Metadata<E> = &self.metadata;

        let supplied = match metadata.key_attribute() {
            None => None,
            Some(attribute) => Some(attribute.read(entity)).filter(|key| !key.is_null()),
        };

        let Some(attribute) = metadata.key_attribute().filter(|_| supplied.is_none()) else {
            let plan = sql::insert(metadata, true);
            with_connection(context.provider(), OP_INSERT_SINGLE, |conn| {
                let row = plan_row(conn, metadata, &plan, entity)?;
                with_statement(conn, &plan.sql, |stmt| {
                    bind_row(stmt, &row)?;
                    stmt.raw_execute()?;
                    Ok(())
                })
            })?;
            return Ok(supplied.unwrap_or(FieldValue::Null));
        };

        let plan = sql::insert_returning_key(metadata);
        with_connection(context.provider(), OP_INSERT_SINGLE, |conn| {
            let row = plan_row(conn, metadata, &plan, entity)?;
            let keys = with_statement(conn, &plan.sql, |stmt| {
                bind_row(stmt, &row)?;
                GeneratedKeys::read(stmt)
            })?;
            let Some(raw) = keys.key_value(metadata.primary_key_column())? else {
                return Ok(FieldValue::Null);
            };
            let key = retrieve_value(attribute, raw)?;
            attribute
                .write(entity, key.clone())
                .map_err(|source| MapperError::Decode {
                    attribute: attribute.name().to_string(),
                    source,
                })?;
            Ok(key)
        })
    }

    /// Inserts every instance in chunks; keys are left to the store.
    pub fn insert_batch(&self, entities: &[E]) -> DaoResult<BatchSummary> {
        if entities.is_empty() {
            return Ok(BatchSummary::default());
        }
        let plan = sql::insert(self.metadata(), false);
        self.write_batch(OP_INSERT_BATCH, &plan, entities)
    }

    /// Updates every non-key column; returns rows affected.
    pub fn update(&self, entity: &E) -> DaoResult<usize> {
        let plan = sql::update(self.metadata()).map_err(tag(OP_UPDATE_SINGLE))?;
        let context = self.context(OP_UPDATE_SINGLE)?;
        let metadata: &Metadata<E> = &self.metadata;

        with_connection(context.provider(), OP_UPDATE_SINGLE, |conn| {
            let row = plan_row(conn, metadata, &plan, entity)?;
            with_statement(conn, &plan.sql, |stmt| {
                bind_row(stmt, &row)?;
                Ok(stmt.raw_execute()?)
            })
        })
    }

    pub fn update_batch(&self, entities: &[E]) -> DaoResult<BatchSummary> {
        if entities.is_empty() {
            return Ok(BatchSummary::default());
        }
        let plan = sql::update(self.metadata()).map_err(tag(OP_UPDATE_BATCH))?;
        self.write_batch(OP_UPDATE_BATCH, &plan, entities)
    }

    /// Deletes the row matching the key of `entity`; returns rows affected.
    pub fn delete(&self, entity: &E) -> DaoResult<usize> {
        let attribute = self.required_key().map_err(tag(OP_DELETE_SINGLE))?;
        let key = attribute.read(entity);
        if key.is_null() {
            return Err(DaoError::new(
                OP_DELETE_SINGLE,
                MapperError::usage("primary key value must not be null"),
            ));
        }
        self.delete_key(Some(attribute), key)
    }

    /// Deletes every instance with one `IN (...)` statement.
    pub fn delete_batch(&self, entities: &[E]) -> DaoResult<usize> {
        if entities.is_empty() {
            return Ok(0);
        }
        let attribute = self.required_key().map_err(tag(OP_DELETE_LIST))?;
        let context = self.context(OP_DELETE_LIST)?;
        let metadata: &Metadata<E> = &self.metadata;

        with_connection(context.provider(), OP_DELETE_LIST, |conn| {
            let keys = entities
                .iter()
                .map(|entity| bind_key(conn, Some(attribute), attribute.read(entity)))
                .collect::<MapResult<Vec<_>>>()?;
            with_statement(conn, &sql::delete_by_keys(metadata, keys.len()), |stmt| {
                bind_row(stmt, &keys)?;
                Ok(stmt.raw_execute()?)
            })
        })
    }

    /// Deletes by raw key after checking it against the key attribute.
    pub fn delete_by_key(&self, key: impl Into<FieldValue>) -> DaoResult<usize> {
        let key = self
            .check_raw_key(key.into())
            .map_err(tag(OP_DELETE_SINGLE))?;
        self.delete_key(self.metadata.key_attribute(), key)
    }

    fn delete_key(&self, attribute: Option<&Attribute<E>>, key: FieldValue) -> DaoResult<usize> {
        let context = self.context(OP_DELETE_SINGLE)?;
        let metadata: &Metadata<E> = &self.metadata;

        with_connection(context.provider(), OP_DELETE_SINGLE, |conn| {
            let bound = bind_key(conn, attribute, key)?;
            with_statement(conn, &sql::delete_by_key(metadata), |stmt| {
                bind_row(stmt, &[bound])?;
                Ok(stmt.raw_execute()?)
            })
        })
    }

    fn query(&self, operation: &'static str, text: &str, args: Vec<FieldValue>) -> DaoResult<Vec<E>> {
        let context = self.context(operation)?;
        let metadata: &Metadata<E> = &self.metadata;

        with_connection(context.provider(), operation, |conn| {
            let values = args
                .into_iter()
                .map(|arg| storage_value(conn, arg, None))
                .collect::<MapResult<Vec<_>>>()?;
            with_statement(conn, text, |stmt| {
                bind_row(stmt, &values).map_err(placeholder_mismatch)?;
                read_entities(metadata, stmt)
            })
        })
    }

    fn write_batch(
        &self,
        operation: &'static str,
        plan: &WritePlan,
        entities: &[E],
    ) -> DaoResult<BatchSummary> {
        let context = self.context(operation)?;
        let metadata: &Metadata<E> = &self.metadata;

        let summary = with_connection(context.provider(), operation, |conn| {
            with_statement(conn, &plan.sql, |stmt| {
                let mut writer = BatchWriter::new(conn, stmt, context.batch_size())?;
                for entity in entities {
                    writer.add(plan_row(conn, metadata, plan, entity)?)?;
                }
                writer.finish()
            })
        })?;

        info!(
            "event=batch_write module=repo op=\"{}\" table={} rows={} flushes={}",
            operation,
            metadata.table_name(),
            summary.rows,
            summary.flushes.len()
        );
        Ok(summary)
    }

    fn context(&self, operation: &'static str) -> DaoResult<DaoContext> {
        match &self.context {
            Some(context) => Ok(context.clone()),
            None => current_context()
                .map_err(|err| DaoError::new(operation, MapperError::usage(err.to_string()))),
        }
    }

    fn required_key(&self) -> MapResult<&Attribute<E>> {
        self.metadata.key_attribute().ok_or_else(|| {
            MapperError::mapping(format!(
                "`{}` has no primary key attribute to identify instances by",
                self.metadata.table_name()
            ))
        })
    }

    /// Rejects a null key and, when a key attribute is declared, a key of the
    /// wrong runtime shape.
    fn check_raw_key(&self, key: FieldValue) -> MapResult<FieldValue> {
        if key.is_null() {
            return Err(MapperError::usage("primary key value must not be null"));
        }
        match self.metadata.key_attribute() {
            Some(attribute) if !attribute.kind().accepts(&key) => {
                Err(MapperError::usage(format!(
                    "unexpected primary key type. Expected: {} but passed is: {}",
                    attribute.kind().name(),
                    key.shape()
                )))
            }
            _ => Ok(key),
        }
    }
}

fn load_metadata<E: Entity>() -> DaoResult<Arc<Metadata<E>>> {
    metadata_for::<E>().map_err(tag(OP_METADATA))
}

fn tag(operation: &'static str) -> impl Fn(MapperError) -> DaoError {
    move |err| DaoError::new(operation, err)
}

/// Placeholders left without an argument in a caller-written query are a
/// usage error.
fn placeholder_mismatch(err: MapperError) -> MapperError {
    match err {
        MapperError::Storage(rusqlite::Error::InvalidParameterCount(given, expected)) => {
            MapperError::usage(format!(
                "supplied query and replaceable arguments don't match: \
                 {expected} placeholders but {given} arguments"
            ))
        }
        other => other,
    }
}

fn bind_key<E>(
    conn: &Connection,
    attribute: Option<&Attribute<E>>,
    key: FieldValue,
) -> MapResult<Value> {
    storage_value(conn, key, attribute.and_then(Attribute::store_converter))
}

/// Storage values of `entity` in the plan's bind order.
fn plan_row<E>(
    conn: &Connection,
    metadata: &Metadata<E>,
    plan: &WritePlan,
    entity: &E,
) -> MapResult<Vec<Value>> {
    plan.attributes
        .iter()
        .map(|index| {
            let attribute = &metadata.attributes()[*index];
            storage_value(conn, attribute.read(entity), attribute.store_converter())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{Dao, OP_DELETE_LIST, OP_DELETE_SINGLE, OP_SELECT};
    use crate::config::DaoContext;
    use crate::db::ConnectionProvider;
    use crate::error::ErrorKind;
    use crate::model::entity::{AttributeDef, Entity, EntityMapping};
    use crate::model::value::{FieldValue, ValueKind};
    use rusqlite::Connection;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct NeverOpened {
        acquired: AtomicUsize,
    }

    impl ConnectionProvider for NeverOpened {
        fn acquire(&self) -> rusqlite::Result<Connection> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Connection::open_in_memory()
        }
    }

    #[derive(Debug, Default)]
    struct Badge {
        id: Option<i64>,
        holder: String,
    }

    impl Entity for Badge {
        fn mapping() -> EntityMapping<Self> {
            EntityMapping::<Self>::new()
                .attribute(
                    AttributeDef::new("id", ValueKind::Integer).primary_key(),
                    |badge| badge.id.into(),
                    |badge, value| value.decode_into(&mut badge.id),
                )
                .attribute(
                    AttributeDef::new("holder", ValueKind::Text),
                    |badge| badge.holder.clone().into(),
                    |badge, value| value.decode_into(&mut badge.holder),
                )
        }
    }

    #[derive(Debug, Default)]
    struct Stamp {
        mark: String,
    }

    impl Entity for Stamp {
        fn mapping() -> EntityMapping<Self> {
            EntityMapping::<Self>::new().attribute(
                AttributeDef::new("mark", ValueKind::Text),
                |stamp| stamp.mark.clone().into(),
                |stamp, value| value.decode_into(&mut stamp.mark),
            )
        }
    }

    fn dao<E: Entity>(provider: &Arc<NeverOpened>) -> Dao<E> {
        Dao::with_context(DaoContext::new(provider.clone())).unwrap()
    }

    #[test]
    fn empty_batches_do_not_touch_storage() {
        let provider = Arc::new(NeverOpened::default());
        let badges = dao::<Badge>(&provider);

        assert!(badges.insert_batch(&[]).unwrap().flushes.is_empty());
        assert_eq!(badges.update_batch(&[]).unwrap().rows, 0);
        assert_eq!(badges.delete_batch(&[]).unwrap(), 0);
        assert_eq!(provider.acquired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn raw_key_checks_run_before_acquire() {
        let provider = Arc::new(NeverOpened::default());
        let badges = dao::<Badge>(&provider);

        let err = badges.delete_by_key("seven").unwrap_err();
        assert_eq!(err.operation(), OP_DELETE_SINGLE);
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err
            .to_string()
            .contains("Expected: integer but passed is: text"));

        let err = badges.get_by_key(FieldValue::Null).unwrap_err();
        assert_eq!(err.operation(), OP_SELECT);
        assert_eq!(provider.acquired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn template_mismatch_runs_before_acquire() {
        let provider = Arc::new(NeverOpened::default());
        let badges = dao::<Badge>(&provider);

        let err = badges
            .select("SELECT * FROM Badge", vec![FieldValue::Integer(1)])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(provider.acquired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn identity_operations_need_a_key_attribute() {
        let provider = Arc::new(NeverOpened::default());
        let stamps = dao::<Stamp>(&provider);
        let stamp = Stamp { mark: "x".into() };

        assert_eq!(stamps.update(&stamp).unwrap_err().kind(), ErrorKind::Mapping);
        assert_eq!(stamps.delete(&stamp).unwrap_err().kind(), ErrorKind::Mapping);
        let err = stamps.delete_batch(&[stamp]).unwrap_err();
        assert_eq!(err.operation(), OP_DELETE_LIST);
        assert_eq!(err.kind(), ErrorKind::Mapping);
        assert_eq!(provider.acquired.load(Ordering::SeqCst), 0);
    }
}
