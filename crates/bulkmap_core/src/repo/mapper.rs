//! Result mapping from cursor rows to fresh instances.
//!
//! # Invariants
//! - Result columns are resolved once, on the first row.
//! - A column that maps to no attribute is a mapping error.
//! - Enumeration columns are decoded by name and never pass a converter.

use crate::error::{MapResult, MapperError};
use crate::meta::converter::{IdentityConverter, RetrieveConverter};
use crate::meta::registry::{Attribute, Metadata};
use crate::model::entity::Entity;
use crate::model::value::{FieldValue, ValueKind};
use once_cell::unsync::OnceCell;
use rusqlite::types::Value;
use rusqlite::Statement;

/// Runs an already bound query and builds one `E` per row.
pub fn read_entities<E: Entity>(
    metadata: &Metadata<E>,
    stmt: &mut Statement<'_>,
) -> MapResult<Vec<E>> {
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let positions = OnceCell::new();
    let mut entities = Vec::new();

    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        let positions = positions.get_or_try_init(|| resolve_columns(metadata, &columns))?;
        let mut entity = E::default();
        for (index, position) in positions.iter().enumerate() {
            let attribute = &metadata.attributes()[*position];
            let raw = row.get::<_, Value>(index)?;
            assign(attribute, &mut entity, raw)?;
        }
        entities.push(entity);
    }
    Ok(entities)
}

fn resolve_columns<E>(metadata: &Metadata<E>, columns: &[String]) -> MapResult<Vec<usize>> {
    columns
        .iter()
        .map(|column| {
            metadata.attribute_position(column).ok_or_else(|| {
                MapperError::mapping(format!(
                    "result column `{column}` matches no attribute of `{}`",
                    metadata.table_name()
                ))
            })
        })
        .collect()
}

/// Decodes `raw` for `attribute` and stores it on `entity`.
pub fn assign<E>(attribute: &Attribute<E>, entity: &mut E, raw: Value) -> MapResult<()> {
    let value = retrieve_value(attribute, raw)?;
    attribute
        .write(entity, value)
        .map_err(|source| MapperError::Decode {
            attribute: attribute.name().to_string(),
            source,
        })
}

/// Domain value of a storage value: enum by name, converter, or declared kind.
/// Custom attributes without a converter receive the raw scalar.
pub fn retrieve_value<E>(attribute: &Attribute<E>, raw: Value) -> MapResult<FieldValue> {
    match (attribute.kind(), attribute.retrieve_converter()) {
        (ValueKind::Enum, _) => decode(attribute, ValueKind::Enum, raw),
        (_, Some(converter)) => Ok(converter.retrieve(raw)?),
        (ValueKind::Custom, None) => Ok(IdentityConverter.retrieve(raw)?),
        (kind, None) => decode(attribute, kind, raw),
    }
}

fn decode<E>(attribute: &Attribute<E>, kind: ValueKind, raw: Value) -> MapResult<FieldValue> {
    FieldValue::from_storage(kind, raw).map_err(|source| MapperError::Decode {
        attribute: attribute.name().to_string(),
        source,
    })
}
