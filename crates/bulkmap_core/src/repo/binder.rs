//! Parameter binding.
//!
//! # Responsibility
//! - Turn a domain value into a driver-settable storage value.
//! - Bind a row of storage values onto a prepared statement.
//!
//! # Invariants
//! - Dispatch order: entity reference, temporal, enumeration, then
//!   converter or passthrough.
//! - A store converter only ever sees the raw attribute value.
//! - A row must cover every statement parameter exactly.

use crate::error::{MapResult, MapperError};
use crate::meta::converter::StoreConverter;
use crate::model::value::FieldValue;
use rusqlite::types::{ToSql, ToSqlOutput, Value};
use rusqlite::{Connection, Statement};

/// Storage value bound for `value`, optionally through a store converter.
pub fn storage_value(
    conn: &Connection,
    value: FieldValue,
    store: Option<&dyn StoreConverter>,
) -> MapResult<Value> {
    match value {
        FieldValue::Reference(key) => storage_value(conn, *key, None),
        FieldValue::Date(date) => temporal(&date),
        FieldValue::DateTime(moment) => temporal(&moment),
        FieldValue::Timestamp(moment) => temporal(&moment),
        FieldValue::Enum(name) => Ok(Value::Text(name.into_owned())),
        other => match store {
            Some(converter) => Ok(converter.store(conn, other)?),
            None => passthrough(other),
        },
    }
}

fn temporal(value: &dyn ToSql) -> MapResult<Value> {
    match value.to_sql()? {
        ToSqlOutput::Owned(value) => Ok(value),
        ToSqlOutput::Borrowed(value) => Ok(Value::from(value)),
        #[allow(unreachable_patterns)]
        _ => Err(MapperError::usage(
            "driver produced an unsupported temporal representation",
        )),
    }
}

fn passthrough(value: FieldValue) -> MapResult<Value> {
    match value {
        FieldValue::Null => Ok(Value::Null),
        FieldValue::Bool(flag) => Ok(Value::Integer(i64::from(flag))),
        FieldValue::Integer(number) => Ok(Value::Integer(number)),
        FieldValue::Real(number) => Ok(Value::Real(number)),
        FieldValue::Text(text) => Ok(Value::Text(text)),
        FieldValue::Blob(bytes) => Ok(Value::Blob(bytes)),
        FieldValue::Uuid(id) => Ok(Value::Text(id.to_string())),
        FieldValue::List(_) => Err(MapperError::usage(
            "list values bind only through template expansion or a store converter",
        )),
        FieldValue::Reference(_)
        | FieldValue::Date(_)
        | FieldValue::DateTime(_)
        | FieldValue::Timestamp(_)
        | FieldValue::Enum(_) => Err(MapperError::usage(format!(
            "{} value reached passthrough binding",
            value.shape()
        ))),
    }
}

/// Binds `values` to parameters `1..=values.len()`.
pub fn bind_row(stmt: &mut Statement<'_>, values: &[Value]) -> MapResult<()> {
    let expected = stmt.parameter_count();
    if values.len() != expected {
        return Err(MapperError::Storage(rusqlite::Error::InvalidParameterCount(
            values.len(),
            expected,
        )));
    }
    for (position, value) in values.iter().enumerate() {
        bind(stmt, position + 1, value)?;
    }
    Ok(())
}

/// Binds one storage value at a 1-based parameter index.
pub fn bind(stmt: &mut Statement<'_>, index: usize, value: &Value) -> MapResult<()> {
    stmt.raw_bind_parameter(index, value)?;
    Ok(())
}
