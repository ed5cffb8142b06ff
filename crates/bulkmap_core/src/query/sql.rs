//! Canonical SQL text for the CRUD primitives.
//!
//! # Responsibility
//! - Assemble select/insert/update/delete statements from metadata.
//! - Report which attributes feed which placeholders, in bind order.
//!
//! # Invariants
//! - Column order follows attribute declaration order.
//! - Only `?` parameter markers are emitted.

use crate::error::{MapResult, MapperError};
use crate::meta::registry::Metadata;

/// SQL text plus the attribute indexes bound to its placeholders, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePlan {
    pub sql: String,
    pub attributes: Vec<usize>,
}

/// `(?,?,...,?)` with `count` markers; `()` for zero.
pub fn placeholder_group(count: usize) -> String {
    let mut group = String::with_capacity(count * 2 + 2);
    group.push('(');
    for index in 0..count {
        if index > 0 {
            group.push(',');
        }
        group.push('?');
    }
    group.push(')');
    group
}

pub fn select_all<E>(metadata: &Metadata<E>) -> String {
    format!("SELECT * FROM {}", metadata.table_name())
}

pub fn select_by_key<E>(metadata: &Metadata<E>) -> String {
    format!(
        "SELECT * FROM {} WHERE {}=?",
        metadata.table_name(),
        metadata.primary_key_column()
    )
}

/// INSERT over every attribute, with the key column only when `include_key`.
///
/// Types without a marked key bind every attribute.
pub fn insert<E>(metadata: &Metadata<E>, include_key: bool) -> WritePlan {
    let attributes: Vec<usize> = (0..metadata.attributes().len())
        .filter(|index| include_key || !metadata.is_key(*index))
        .collect();

    if attributes.is_empty() {
        return WritePlan {
            sql: format!("INSERT INTO {} DEFAULT VALUES", metadata.table_name()),
            attributes,
        };
    }

    let columns = attributes
        .iter()
        .map(|index| metadata.attributes()[*index].column())
        .collect::<Vec<_>>()
        .join(",");

    WritePlan {
        sql: format!(
            "INSERT INTO {} ({columns}) VALUES {}",
            metadata.table_name(),
            placeholder_group(attributes.len())
        ),
        attributes,
    }
}

/// INSERT without the key column that hands the generated key back.
pub fn insert_returning_key<E>(metadata: &Metadata<E>) -> WritePlan {
    let mut plan = insert(metadata, false);
    plan.sql.push_str(" RETURNING ");
    plan.sql.push_str(metadata.primary_key_column());
    plan
}

/// UPDATE setting every non-key column, filtered by key equality.
pub fn update<E>(metadata: &Metadata<E>) -> MapResult<WritePlan> {
    let Some(key_index) = metadata.key_index() else {
        return Err(MapperError::mapping(format!(
            "`{}` has no primary key attribute to match rows on",
            metadata.table_name()
        )));
    };

    let mut attributes: Vec<usize> = (0..metadata.attributes().len())
        .filter(|index| !metadata.is_key(*index))
        .collect();
    if attributes.is_empty() {
        return Err(MapperError::mapping(format!(
            "`{}` has no columns besides its primary key to update",
            metadata.table_name()
        )));
    }

    let assignments = attributes
        .iter()
        .map(|index| format!("{}=?", metadata.attributes()[*index].column()))
        .collect::<Vec<_>>()
        .join(",");

    attributes.push(key_index);

    Ok(WritePlan {
        sql: format!(
            "UPDATE {} SET {assignments} WHERE {}=?",
            metadata.table_name(),
            metadata.primary_key_column()
        ),
        attributes,
    })
}

pub fn delete_by_key<E>(metadata: &Metadata<E>) -> String {
    format!(
        "DELETE FROM {} WHERE {}=?",
        metadata.table_name(),
        metadata.primary_key_column()
    )
}

/// DELETE matching `count` keys in one `IN` list.
pub fn delete_by_keys<E>(metadata: &Metadata<E>, count: usize) -> String {
    format!(
        "DELETE FROM {} WHERE {} IN {}",
        metadata.table_name(),
        metadata.primary_key_column(),
        placeholder_group(count)
    )
}

#[cfg(test)]
mod tests {
    use super::{delete_by_keys, insert, insert_returning_key, placeholder_group, select_by_key, update};
    use crate::meta::registry::metadata_for;
    use crate::model::entity::{AttributeDef, Entity, EntityMapping};
    use crate::model::value::ValueKind;

    #[derive(Debug, Default)]
    struct Parcel {
        id: Option<i64>,
        weight: f64,
        label: String,
    }

    impl Entity for Parcel {
        fn mapping() -> EntityMapping<Self> {
            EntityMapping::<Self>::new()
                .table("parcels")
                .attribute(
                    AttributeDef::new("weight", ValueKind::Real),
                    |parcel| parcel.weight.into(),
                    |parcel, value| value.decode_into(&mut parcel.weight),
                )
                .attribute(
                    AttributeDef::new("id", ValueKind::Integer)
                        .column("parcel_id")
                        .primary_key(),
                    |parcel| parcel.id.into(),
                    |parcel, value| value.decode_into(&mut parcel.id),
                )
                .attribute(
                    AttributeDef::new("label", ValueKind::Text),
                    |parcel| parcel.label.clone().into(),
                    |parcel, value| value.decode_into(&mut parcel.label),
                )
        }
    }

    #[derive(Debug, Default)]
    struct Tally {
        hits: i64,
    }

    impl Entity for Tally {
        fn mapping() -> EntityMapping<Self> {
            EntityMapping::<Self>::new().attribute(
                AttributeDef::new("hits", ValueKind::Integer),
                |tally| tally.hits.into(),
                |tally, value| value.decode_into(&mut tally.hits),
            )
        }
    }

    #[test]
    fn placeholder_group_handles_empty_and_many() {
        assert_eq!(placeholder_group(0), "()");
        assert_eq!(placeholder_group(3), "(?,?,?)");
    }

    #[test]
    fn insert_excludes_key_unless_requested() {
        let metadata = metadata_for::<Parcel>().unwrap();

        let generated = insert(&metadata, false);
        assert_eq!(generated.sql, "INSERT INTO parcels (weight,label) VALUES (?,?)");
        assert_eq!(generated.attributes, vec![0, 2]);

        let supplied = insert(&metadata, true);
        assert_eq!(
            supplied.sql,
            "INSERT INTO parcels (weight,parcel_id,label) VALUES (?,?,?)"
        );
        assert_eq!(supplied.attributes, vec![0, 1, 2]);
    }

    #[test]
    fn insert_returning_requests_key_column() {
        let metadata = metadata_for::<Parcel>().unwrap();
        assert_eq!(
            insert_returning_key(&metadata).sql,
            "INSERT INTO parcels (weight,label) VALUES (?,?) RETURNING parcel_id"
        );
    }

    #[test]
    fn update_sets_non_key_columns_then_binds_key() {
        let metadata = metadata_for::<Parcel>().unwrap();
        let plan = update(&metadata).unwrap();
        assert_eq!(plan.sql, "UPDATE parcels SET weight=?,label=? WHERE parcel_id=?");
        assert_eq!(plan.attributes, vec![0, 2, 1]);
    }

    #[test]
    fn update_without_marked_key_is_rejected() {
        let metadata = metadata_for::<Tally>().unwrap();
        assert!(update(&metadata).is_err());
        assert_eq!(
            insert(&metadata, false).sql,
            "INSERT INTO Tally (hits) VALUES (?)"
        );
    }

    #[test]
    fn key_statements_use_key_column() {
        let metadata = metadata_for::<Parcel>().unwrap();
        assert_eq!(select_by_key(&metadata), "SELECT * FROM parcels WHERE parcel_id=?");
        assert_eq!(
            delete_by_keys(&metadata, 2),
            "DELETE FROM parcels WHERE parcel_id IN (?,?)"
        );
    }
}
