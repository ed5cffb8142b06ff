//! Mapping declarations for plain data-holder types.
//!
//! A mapped type implements [`Entity`] and describes its table layout once
//! through [`EntityMapping`]. The description is configuration-as-data: the
//! registry turns it into immutable metadata on first use.

use crate::meta::converter::{RetrieveConverter, StoreConverter};
use crate::meta::registry::metadata_for;
use crate::model::value::{FieldValue, ValueError, ValueKind};
use std::sync::Arc;

/// Reads one attribute out of an instance.
pub type Getter<E> = fn(&E) -> FieldValue;
/// Assigns one attribute of an instance.
pub type Setter<E> = fn(&mut E, FieldValue) -> Result<(), ValueError>;

/// A data-holder type associated with exactly one table.
pub trait Entity: Default + Send + Sync + 'static {
    /// Declares table name, attributes, key and converters.
    fn mapping() -> EntityMapping<Self>;

    /// Identifier bound in place of this entity when it is referenced from
    /// another entity's attribute.
    ///
    /// Returns `FieldValue::Null` when the type declares no key attribute.
    fn key(&self) -> FieldValue {
        match metadata_for::<Self>() {
            Ok(metadata) => metadata
                .key_attribute()
                .map_or(FieldValue::Null, |attribute| attribute.read(self)),
            Err(_) => FieldValue::Null,
        }
    }
}

/// Declarative description of one attribute.
#[derive(Clone)]
pub struct AttributeDef {
    pub(crate) name: String,
    pub(crate) column: Option<String>,
    pub(crate) kind: ValueKind,
    pub(crate) primary_key: bool,
    pub(crate) store: Option<Arc<dyn StoreConverter>>,
    pub(crate) retrieve: Option<Arc<dyn RetrieveConverter>>,
}

impl AttributeDef {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            column: None,
            kind,
            primary_key: false,
            store: None,
            retrieve: None,
        }
    }

    /// Overrides the storage column name; defaults to the attribute name.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn store_with(mut self, converter: Arc<dyn StoreConverter>) -> Self {
        self.store = Some(converter);
        self
    }

    pub fn retrieve_with(mut self, converter: Arc<dyn RetrieveConverter>) -> Self {
        self.retrieve = Some(converter);
        self
    }

    /// Installs one converter for both directions.
    pub fn converter<C>(self, converter: Arc<C>) -> Self
    where
        C: StoreConverter + RetrieveConverter + 'static,
    {
        let store: Arc<dyn StoreConverter> = converter.clone();
        let retrieve: Arc<dyn RetrieveConverter> = converter;
        self.store_with(store).retrieve_with(retrieve)
    }
}

/// Builder collecting a type's table name and attribute list.
pub struct EntityMapping<E> {
    pub(crate) table: Option<String>,
    pub(crate) attributes: Vec<(AttributeDef, Getter<E>, Setter<E>)>,
}

impl<E: Entity> EntityMapping<E> {
    pub fn new() -> Self {
        Self {
            table: None,
            attributes: Vec::new(),
        }
    }

    /// Explicit table name; the simple type name is used otherwise.
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = Some(name.into());
        self
    }

    /// Appends an attribute. Declaration order drives SQL column order.
    pub fn attribute(mut self, def: AttributeDef, get: Getter<E>, set: Setter<E>) -> Self {
        self.attributes.push((def, get, set));
        self
    }
}

impl<E: Entity> Default for EntityMapping<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Last path segment of a type name, without generic arguments.
pub(crate) fn simple_type_name<E>() -> &'static str {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
