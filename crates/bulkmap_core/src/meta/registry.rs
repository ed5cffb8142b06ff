//! Type-keyed metadata registry.
//!
//! # Responsibility
//! - Turn an `EntityMapping` into immutable `Metadata` exactly once per type.
//! - Hand out the shared instance to every caller afterwards.
//!
//! # Invariants
//! - Metadata is never mutated after construction.
//! - Concurrent first use of one type yields a single cached instance.
//! - At most one attribute is the primary key.

use crate::error::{MapResult, MapperError};
use crate::meta::converter::{RetrieveConverter, StoreConverter};
use crate::model::entity::{simple_type_name, Entity, EntityMapping, Getter, Setter};
use crate::model::value::{FieldValue, ValueError, ValueKind};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

type RegistryMap = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

static REGISTRY: Lazy<RwLock<RegistryMap>> = Lazy::new(|| RwLock::new(HashMap::new()));
static COLUMN_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid column name regex"));
static TABLE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("valid table name regex")
});

/// One resolved attribute of a mapped type.
pub struct Attribute<E> {
    name: String,
    column: String,
    kind: ValueKind,
    store: Option<Arc<dyn StoreConverter>>,
    retrieve: Option<Arc<dyn RetrieveConverter>>,
    get: Getter<E>,
    set: Setter<E>,
}

impl<E> Attribute<E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn store_converter(&self) -> Option<&dyn StoreConverter> {
        self.store.as_deref()
    }

    pub fn retrieve_converter(&self) -> Option<&dyn RetrieveConverter> {
        self.retrieve.as_deref()
    }

    /// Raw attribute value, before any conversion.
    pub fn read(&self, entity: &E) -> FieldValue {
        (self.get)(entity)
    }

    pub fn write(&self, entity: &mut E, value: FieldValue) -> Result<(), ValueError> {
        (self.set)(entity, value)
    }
}

/// Immutable mapping table of one type.
pub struct Metadata<E> {
    table_name: String,
    primary_key_column: String,
    key_index: Option<usize>,
    attributes: Vec<Attribute<E>>,
    column_to_attribute: HashMap<String, usize>,
}

impl<E> Metadata<E> {
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Key column used in SQL text; `<table>_id` when no attribute is marked.
    pub fn primary_key_column(&self) -> &str {
        &self.primary_key_column
    }

    /// Attribute explicitly marked as primary key, if any.
    pub fn key_attribute(&self) -> Option<&Attribute<E>> {
        self.key_index.map(|index| &self.attributes[index])
    }

    /// Position of the key attribute in declaration order.
    pub fn key_index(&self) -> Option<usize> {
        self.key_index
    }

    pub fn is_key(&self, index: usize) -> bool {
        self.key_index == Some(index)
    }

    /// Attributes in declaration order.
    pub fn attributes(&self) -> &[Attribute<E>] {
        &self.attributes
    }

    /// Resolves a result column to an attribute; unmapped names fall back to
    /// the attribute of the same name.
    pub fn attribute_for_column(&self, column: &str) -> Option<&Attribute<E>> {
        self.attribute_position(column)
            .map(|index| &self.attributes[index])
    }

    /// Declaration position of the attribute a result column resolves to.
    pub fn attribute_position(&self, column: &str) -> Option<usize> {
        match self.column_to_attribute.get(column) {
            Some(index) => Some(*index),
            None => self
                .attributes
                .iter()
                .position(|attribute| attribute.name == column),
        }
    }
}

/// Returns the shared metadata of `E`, building it on first use.
pub fn metadata_for<E: Entity>() -> MapResult<Arc<Metadata<E>>> {
    let type_id = TypeId::of::<E>();

    if let Some(cached) = lookup::<E>(type_id) {
        return Ok(cached);
    }

    // Built without the lock held: a mapping may resolve other types' metadata.
    let built: Arc<dyn Any + Send + Sync> = Arc::new(build_metadata(E::mapping())?);

    let entry = {
        let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
        registry.entry(type_id).or_insert(built).clone()
    };
    let metadata = downcast::<E>(entry)?;
    debug!(
        "event=metadata_build module=meta status=ok type={} table={} attributes={}",
        simple_type_name::<E>(),
        metadata.table_name,
        metadata.attributes.len()
    );
    Ok(metadata)
}

fn lookup<E: Entity>(type_id: TypeId) -> Option<Arc<Metadata<E>>> {
    let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    registry
        .get(&type_id)
        .cloned()
        .and_then(|entry| entry.downcast::<Metadata<E>>().ok())
}

fn downcast<E: Entity>(entry: Arc<dyn Any + Send + Sync>) -> MapResult<Arc<Metadata<E>>> {
    entry.downcast::<Metadata<E>>().map_err(|_| {
        MapperError::mapping(format!(
            "registry entry for `{}` holds foreign metadata",
            simple_type_name::<E>()
        ))
    })
}

fn build_metadata<E: Entity>(mapping: EntityMapping<E>) -> MapResult<Metadata<E>> {
    let type_name = simple_type_name::<E>();
    let table_name = mapping
        .table
        .map(|name| name.trim().to_string())
        .unwrap_or_else(|| type_name.to_string());
    if !TABLE_NAME_RE.is_match(&table_name) {
        return Err(MapperError::mapping(format!(
            "`{type_name}` maps to invalid table name `{table_name}`"
        )));
    }
    if mapping.attributes.is_empty() {
        return Err(MapperError::mapping(format!(
            "`{type_name}` declares no attributes"
        )));
    }

    let mut attributes = Vec::with_capacity(mapping.attributes.len());
    let mut column_to_attribute = HashMap::new();
    let mut key_index = None;

    for (index, (def, get, set)) in mapping.attributes.into_iter().enumerate() {
        if attributes.iter().any(|known: &Attribute<E>| known.name == def.name) {
            return Err(MapperError::mapping(format!(
                "`{type_name}` declares attribute `{}` twice",
                def.name
            )));
        }

        let column = def.column.clone().unwrap_or_else(|| def.name.clone());
        if !COLUMN_NAME_RE.is_match(&column) {
            return Err(MapperError::mapping(format!(
                "`{type_name}.{}` maps to invalid column name `{column}`",
                def.name
            )));
        }
        if attributes.iter().any(|known: &Attribute<E>| known.column == column) {
            return Err(MapperError::mapping(format!(
                "`{type_name}` maps column `{column}` more than once"
            )));
        }

        if def.primary_key {
            if let Some(previous) = key_index {
                let previous: &Attribute<E> = &attributes[previous];
                return Err(MapperError::mapping(format!(
                    "`{type_name}` marks both `{}` and `{}` as primary key",
                    previous.name, def.name
                )));
            }
            key_index = Some(index);
        }

        if def.column.is_some() {
            column_to_attribute.insert(column.clone(), index);
        }

        attributes.push(Attribute {
            name: def.name,
            column,
            kind: def.kind,
            store: def.store,
            retrieve: def.retrieve,
            get,
            set,
        });
    }

    let primary_key_column = match key_index {
        Some(index) => attributes[index].column.clone(),
        None => format!("{table_name}_id"),
    };

    Ok(Metadata {
        table_name,
        primary_key_column,
        key_index,
        attributes,
        column_to_attribute,
    })
}
