//! Converter contracts between domain and storage representations.
//!
//! # Responsibility
//! - Define the store-side and retrieve-side converter contracts.
//! - Provide the identity converter used when nothing else is configured.
//!
//! # Invariants
//! - Store converters receive the raw attribute value, never a value already
//!   special-cased by the binder.
//! - Converter failures surface as the calling operation's failure.

use crate::model::value::FieldValue;
use rusqlite::types::Value;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ConvertResult<T> = Result<T, ConvertError>;

/// Domain value -> storage value. May use the live connection of the call.
pub trait StoreConverter: Send + Sync {
    fn store(&self, connection: &Connection, value: FieldValue) -> ConvertResult<Value>;
}

/// Storage value -> domain value.
pub trait RetrieveConverter: Send + Sync {
    fn retrieve(&self, value: Value) -> ConvertResult<FieldValue>;
}

/// Failure inside a converter.
#[derive(Debug)]
pub struct ConvertError {
    message: String,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl ConvertError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for ConvertError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            Some(source) => write!(f, "conversion failed: {}: {source}", self.message),
            None => write!(f, "conversion failed: {}", self.message),
        }
    }
}

impl Error for ConvertError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn Error + 'static))
    }
}

impl From<rusqlite::Error> for ConvertError {
    fn from(value: rusqlite::Error) -> Self {
        Self::with_source("driver rejected value", value)
    }
}

/// Passes values through unchanged in both directions.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityConverter;

impl StoreConverter for IdentityConverter {
    fn store(&self, _connection: &Connection, value: FieldValue) -> ConvertResult<Value> {
        match value {
            FieldValue::Null => Ok(Value::Null),
            FieldValue::Bool(flag) => Ok(Value::Integer(i64::from(flag))),
            FieldValue::Integer(number) => Ok(Value::Integer(number)),
            FieldValue::Real(number) => Ok(Value::Real(number)),
            FieldValue::Text(text) => Ok(Value::Text(text)),
            FieldValue::Blob(bytes) => Ok(Value::Blob(bytes)),
            other => Err(ConvertError::new(format!(
                "identity converter cannot store a {} value",
                other.shape()
            ))),
        }
    }
}

impl RetrieveConverter for IdentityConverter {
    fn retrieve(&self, value: Value) -> ConvertResult<FieldValue> {
        Ok(FieldValue::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::{ConvertError, IdentityConverter, RetrieveConverter, StoreConverter};
    use crate::model::value::FieldValue;
    use rusqlite::types::Value;
    use rusqlite::Connection;
    use std::error::Error;

    #[test]
    fn identity_round_trips_scalars() {
        let conn = Connection::open_in_memory().unwrap();
        let stored = IdentityConverter
            .store(&conn, FieldValue::Text("abc".into()))
            .unwrap();
        assert_eq!(stored, Value::Text("abc".into()));
        assert_eq!(
            IdentityConverter.retrieve(stored).unwrap(),
            FieldValue::Text("abc".into())
        );
    }

    #[test]
    fn identity_rejects_structured_values() {
        let conn = Connection::open_in_memory().unwrap();
        let err = IdentityConverter
            .store(&conn, FieldValue::List(Vec::new()))
            .unwrap_err();
        assert!(err.message().contains("list"));
    }

    #[test]
    fn convert_error_exposes_source() {
        let err = ConvertError::from(rusqlite::Error::InvalidQuery);
        assert!(err.source().is_some());
    }
}
