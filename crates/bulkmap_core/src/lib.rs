//! Bulk-oriented object/row mapping over SQLite.
//! Plain data-holder types declare their table layout once; `Dao<E>` turns
//! that description into parameterized SQL, batched writes and row mapping.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod meta;
pub mod model;
pub mod query;
pub mod repo;

pub use config::{
    batch_size, current_context, set_batch_size, set_connection_provider, ConfigError,
    DaoConfig, DaoContext, DEFAULT_BATCH_SIZE,
};
pub use db::{ConnectionProvider, SqliteProvider};
pub use error::{DaoError, DaoResult, ErrorKind, MapResult, MapperError};
pub use logging::{init_logging, logging_status};
pub use meta::converter::{
    ConvertError, ConvertResult, IdentityConverter, RetrieveConverter, StoreConverter,
};
pub use meta::registry::{metadata_for, Attribute, Metadata};
pub use model::entity::{AttributeDef, Entity, EntityMapping};
pub use model::value::{FieldValue, FromFieldValue, MappedEnum, ValueError, ValueKind};
pub use repo::batch::BatchSummary;
pub use repo::dao::Dao;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
