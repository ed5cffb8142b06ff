//! Domain value model shared by getters, setters, binder and result mapper.
//!
//! # Responsibility
//! - Represent one attribute value as a tagged variant (`FieldValue`).
//! - Declare the value type of an attribute (`ValueKind`).
//! - Decode storage values back into domain values when no converter is set.
//!
//! # Invariants
//! - `Null` is accepted for every kind on the retrieve path.
//! - Enumerations travel by symbolic name, never by ordinal.

use crate::model::entity::Entity;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::{FromSql, Value, ValueRef};
use std::borrow::Cow;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// One attribute value in domain representation.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Timestamp(DateTime<Utc>),
    /// Symbolic name of an enumeration constant.
    Enum(Cow<'static, str>),
    /// Identifier of a referenced mapped entity.
    Reference(Box<FieldValue>),
    /// Ordered sequence; expanded into a placeholder group in templates.
    List(Vec<FieldValue>),
}

/// Declared value type of a mapped attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Integer,
    Real,
    Text,
    Blob,
    Uuid,
    Date,
    DateTime,
    Timestamp,
    Enum,
    Reference,
    /// Opaque type handled by converters; accepts any shape.
    Custom,
}

/// Enumeration persisted by its symbolic constant name.
pub trait MappedEnum: Sized {
    fn name(&self) -> &'static str;
    fn from_name(name: &str) -> Option<Self>;
}

/// Decoding failure for a single value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    UnexpectedShape {
        expected: &'static str,
        found: &'static str,
    },
    UnknownVariant(String),
    OutOfRange {
        target: &'static str,
        value: i64,
    },
    Invalid(String),
}

impl Display for ValueError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedShape { expected, found } => {
                write!(f, "expected {expected} value, found {found}")
            }
            Self::UnknownVariant(name) => write!(f, "unknown enumeration constant `{name}`"),
            Self::OutOfRange { target, value } => {
                write!(f, "value {value} does not fit into {target}")
            }
            Self::Invalid(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ValueError {}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Text => "text",
            Self::Blob => "blob",
            Self::Uuid => "uuid",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Timestamp => "timestamp",
            Self::Enum => "enum",
            Self::Reference => "reference",
            Self::Custom => "custom",
        }
    }

    /// Returns whether a non-null raw value has the runtime shape of this kind.
    pub fn accepts(self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (Self::Custom, _)
                | (Self::Bool, FieldValue::Bool(_))
                | (Self::Integer, FieldValue::Integer(_))
                | (Self::Real, FieldValue::Real(_))
                | (Self::Text, FieldValue::Text(_))
                | (Self::Blob, FieldValue::Blob(_))
                | (Self::Uuid, FieldValue::Uuid(_))
                | (Self::Date, FieldValue::Date(_))
                | (Self::DateTime, FieldValue::DateTime(_))
                | (Self::Timestamp, FieldValue::Timestamp(_))
                | (Self::Enum, FieldValue::Enum(_))
                | (Self::Reference, FieldValue::Reference(_))
        )
    }
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Variant name used in diagnostics.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::Uuid(_) => "uuid",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
            Self::Timestamp(_) => "timestamp",
            Self::Enum(_) => "enum",
            Self::Reference(_) => "reference",
            Self::List(_) => "list",
        }
    }

    pub fn list<T: Into<FieldValue>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    pub fn enumeration<T: MappedEnum>(value: &T) -> Self {
        Self::Enum(Cow::Borrowed(value.name()))
    }

    pub fn optional_enumeration<T: MappedEnum>(value: Option<&T>) -> Self {
        value.map_or(Self::Null, Self::enumeration)
    }

    /// Wraps the identifier of another mapped entity.
    pub fn reference<R: Entity>(entity: &R) -> Self {
        Self::Reference(Box::new(entity.key()))
    }

    pub fn optional_reference<R: Entity>(entity: Option<&R>) -> Self {
        entity.map_or(Self::Null, Self::reference)
    }

    pub fn decode<T: FromFieldValue>(self) -> Result<T, ValueError> {
        T::from_field(self)
    }

    /// Decodes into an existing slot; convenient inside setters.
    pub fn decode_into<T: FromFieldValue>(self, slot: &mut T) -> Result<(), ValueError> {
        *slot = T::from_field(self)?;
        Ok(())
    }

    pub fn decode_enum<T: MappedEnum>(self) -> Result<T, ValueError> {
        match self {
            Self::Enum(name) => T::from_name(&name).ok_or(ValueError::UnknownVariant(name.into_owned())),
            Self::Text(name) => T::from_name(&name).ok_or(ValueError::UnknownVariant(name)),
            other => Err(ValueError::UnexpectedShape {
                expected: "enum",
                found: other.shape(),
            }),
        }
    }

    pub fn decode_optional_enum<T: MappedEnum>(self) -> Result<Option<T>, ValueError> {
        match self {
            Self::Null => Ok(None),
            other => other.decode_enum().map(Some),
        }
    }

    /// Unwraps a reference to the key it carries; plain scalars pass as-is.
    pub fn into_reference_key(self) -> Self {
        match self {
            Self::Reference(key) => *key,
            other => other,
        }
    }

    /// Decodes a storage value according to the declared attribute kind.
    pub fn from_storage(kind: ValueKind, value: Value) -> Result<Self, ValueError> {
        if matches!(value, Value::Null) {
            return Ok(Self::Null);
        }

        match kind {
            ValueKind::Bool => match value {
                Value::Integer(number) => Ok(Self::Bool(number != 0)),
                other => Err(storage_shape("bool", &other)),
            },
            ValueKind::Integer => match value {
                Value::Integer(number) => Ok(Self::Integer(number)),
                other => Err(storage_shape("integer", &other)),
            },
            ValueKind::Real => match value {
                Value::Real(number) => Ok(Self::Real(number)),
                Value::Integer(number) => Ok(Self::Real(number as f64)),
                other => Err(storage_shape("real", &other)),
            },
            ValueKind::Text => match value {
                Value::Text(text) => Ok(Self::Text(text)),
                other => Err(storage_shape("text", &other)),
            },
            ValueKind::Blob => match value {
                Value::Blob(bytes) => Ok(Self::Blob(bytes)),
                other => Err(storage_shape("blob", &other)),
            },
            ValueKind::Uuid => match value {
                Value::Text(text) => Uuid::parse_str(&text)
                    .map(Self::Uuid)
                    .map_err(|_| ValueError::Invalid(format!("invalid uuid value `{text}`"))),
                Value::Blob(bytes) => Uuid::from_slice(&bytes)
                    .map(Self::Uuid)
                    .map_err(|err| ValueError::Invalid(err.to_string())),
                other => Err(storage_shape("uuid", &other)),
            },
            ValueKind::Date => NaiveDate::column_result(ValueRef::from(&value))
                .map(Self::Date)
                .map_err(|err| ValueError::Invalid(err.to_string())),
            ValueKind::DateTime => NaiveDateTime::column_result(ValueRef::from(&value))
                .map(Self::DateTime)
                .map_err(|err| ValueError::Invalid(err.to_string())),
            ValueKind::Timestamp => DateTime::<Utc>::column_result(ValueRef::from(&value))
                .map(Self::Timestamp)
                .map_err(|err| ValueError::Invalid(err.to_string())),
            ValueKind::Enum => match value {
                Value::Text(name) => Ok(Self::Enum(Cow::Owned(name))),
                other => Err(storage_shape("enum", &other)),
            },
            ValueKind::Reference => Ok(Self::Reference(Box::new(Self::from(value)))),
            ValueKind::Custom => Ok(Self::from(value)),
        }
    }
}

fn storage_shape(expected: &'static str, value: &Value) -> ValueError {
    let found = match value {
        Value::Null => "null",
        Value::Integer(_) => "integer",
        Value::Real(_) => "real",
        Value::Text(_) => "text",
        Value::Blob(_) => "blob",
    };
    ValueError::UnexpectedShape { expected, found }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Integer(number) => Self::Integer(number),
            Value::Real(number) => Self::Real(number),
            Value::Text(text) => Self::Text(text),
            Value::Blob(bytes) => Self::Blob(bytes),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveDateTime> for FieldValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(value: Vec<T>) -> Self {
        Self::list(value)
    }
}

/// Conversion from a domain value into a concrete Rust type.
pub trait FromFieldValue: Sized {
    fn from_field(value: FieldValue) -> Result<Self, ValueError>;
}

fn unexpected<T>(expected: &'static str, value: &FieldValue) -> Result<T, ValueError> {
    Err(ValueError::UnexpectedShape {
        expected,
        found: value.shape(),
    })
}

impl FromFieldValue for FieldValue {
    fn from_field(value: FieldValue) -> Result<Self, ValueError> {
        Ok(value)
    }
}

impl FromFieldValue for bool {
    fn from_field(value: FieldValue) -> Result<Self, ValueError> {
        match value {
            FieldValue::Bool(flag) => Ok(flag),
            FieldValue::Integer(number) => Ok(number != 0),
            other => unexpected("bool", &other),
        }
    }
}

impl FromFieldValue for i64 {
    fn from_field(value: FieldValue) -> Result<Self, ValueError> {
        match value {
            FieldValue::Integer(number) => Ok(number),
            other => unexpected("integer", &other),
        }
    }
}

impl FromFieldValue for i32 {
    fn from_field(value: FieldValue) -> Result<Self, ValueError> {
        let number = i64::from_field(value)?;
        i32::try_from(number).map_err(|_| ValueError::OutOfRange {
            target: "i32",
            value: number,
        })
    }
}

impl FromFieldValue for f64 {
    fn from_field(value: FieldValue) -> Result<Self, ValueError> {
        match value {
            FieldValue::Real(number) => Ok(number),
            FieldValue::Integer(number) => Ok(number as f64),
            other => unexpected("real", &other),
        }
    }
}

impl FromFieldValue for String {
    fn from_field(value: FieldValue) -> Result<Self, ValueError> {
        match value {
            FieldValue::Text(text) => Ok(text),
            other => unexpected("text", &other),
        }
    }
}

impl FromFieldValue for Vec<u8> {
    fn from_field(value: FieldValue) -> Result<Self, ValueError> {
        match value {
            FieldValue::Blob(bytes) => Ok(bytes),
            other => unexpected("blob", &other),
        }
    }
}

impl FromFieldValue for Uuid {
    fn from_field(value: FieldValue) -> Result<Self, ValueError> {
        match value {
            FieldValue::Uuid(id) => Ok(id),
            FieldValue::Text(text) => Uuid::parse_str(&text)
                .map_err(|_| ValueError::Invalid(format!("invalid uuid value `{text}`"))),
            other => unexpected("uuid", &other),
        }
    }
}

impl FromFieldValue for NaiveDate {
    fn from_field(value: FieldValue) -> Result<Self, ValueError> {
        match value {
            FieldValue::Date(date) => Ok(date),
            other => unexpected("date", &other),
        }
    }
}

impl FromFieldValue for NaiveDateTime {
    fn from_field(value: FieldValue) -> Result<Self, ValueError> {
        match value {
            FieldValue::DateTime(moment) => Ok(moment),
            other => unexpected("datetime", &other),
        }
    }
}

impl FromFieldValue for DateTime<Utc> {
    fn from_field(value: FieldValue) -> Result<Self, ValueError> {
        match value {
            FieldValue::Timestamp(moment) => Ok(moment),
            other => unexpected("timestamp", &other),
        }
    }
}

impl<T: FromFieldValue> FromFieldValue for Option<T> {
    fn from_field(value: FieldValue) -> Result<Self, ValueError> {
        match value {
            FieldValue::Null => Ok(None),
            other => T::from_field(other).map(Some),
        }
    }
}
