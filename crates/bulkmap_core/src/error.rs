//! Error taxonomy for mapping and query execution.
//!
//! # Responsibility
//! - Classify failures raised below the DAO boundary (`MapperError`).
//! - Tag every failure with the high-level operation that raised it (`DaoError`).
//!
//! # Invariants
//! - Every public DAO call surfaces exactly one error category: `DaoError`.
//! - Resource release failures keep their own kind and are never folded into
//!   the primary operation's error.

use crate::meta::converter::ConvertError;
use crate::model::value::ValueError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type MapResult<T> = Result<T, MapperError>;
pub type DaoResult<T> = Result<T, DaoError>;

/// Failure raised while preparing, binding, executing or mapping.
#[derive(Debug)]
pub enum MapperError {
    /// Caller misuse: placeholder/argument mismatch, bad raw key, etc.
    Usage(String),
    /// Ambiguous or unresolved metadata.
    Mapping(String),
    /// Setter rejected a retrieved value.
    Decode {
        attribute: String,
        source: ValueError,
    },
    Storage(rusqlite::Error),
    Converter(ConvertError),
    /// Closing a connection or statement failed.
    Release {
        resource: &'static str,
        source: rusqlite::Error,
    },
}

/// Coarse error category, stable across variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Usage,
    Mapping,
    Storage,
    Converter,
    Release,
}

impl MapperError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Usage(_) => ErrorKind::Usage,
            Self::Mapping(_) | Self::Decode { .. } => ErrorKind::Mapping,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Converter(_) => ErrorKind::Converter,
            Self::Release { .. } => ErrorKind::Release,
        }
    }
}

impl Display for MapperError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Usage(message) => write!(f, "usage error: {message}"),
            Self::Mapping(message) => write!(f, "mapping error: {message}"),
            Self::Decode { attribute, source } => {
                write!(f, "cannot assign attribute `{attribute}`: {source}")
            }
            Self::Storage(err) => write!(f, "{err}"),
            Self::Converter(err) => write!(f, "{err}"),
            Self::Release { resource, source } => write!(f, "can't close {resource}: {source}"),
        }
    }
}

impl Error for MapperError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Usage(_) | Self::Mapping(_) => None,
            Self::Decode { source, .. } => Some(source),
            Self::Storage(err) => Some(err),
            Self::Converter(err) => Some(err),
            Self::Release { source, .. } => Some(source),
        }
    }
}

impl From<rusqlite::Error> for MapperError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value)
    }
}

impl From<ConvertError> for MapperError {
    fn from(value: ConvertError) -> Self {
        Self::Converter(value)
    }
}

/// Operation-tagged failure returned by every DAO entry point.
#[derive(Debug)]
pub struct DaoError {
    operation: &'static str,
    source: MapperError,
}

impl DaoError {
    pub fn new(operation: &'static str, source: MapperError) -> Self {
        Self { operation, source }
    }

    /// Short tag of the failed call, e.g. `insert - batch`.
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    pub fn cause(&self) -> &MapperError {
        &self.source
    }

    pub fn into_cause(self) -> MapperError {
        self.source
    }
}

impl Display for DaoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.operation, self.source)
    }
}

impl Error for DaoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::{DaoError, ErrorKind, MapperError};
    use std::error::Error;

    #[test]
    fn dao_error_prefixes_operation_tag() {
        let err = DaoError::new("insert - batch", MapperError::usage("no rows"));
        assert_eq!(err.to_string(), "insert - batch: usage error: no rows");
        assert_eq!(err.operation(), "insert - batch");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err.source().is_some());
    }

    #[test]
    fn release_failures_keep_their_own_kind() {
        let err = MapperError::Release {
            resource: "statement",
            source: rusqlite::Error::InvalidQuery,
        };
        assert_eq!(err.kind(), ErrorKind::Release);
        assert!(err.to_string().starts_with("can't close statement"));
    }
}
