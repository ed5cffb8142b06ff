//! Data-access layer built on the metadata registry.
//!
//! # Responsibility
//! - Bind domain values, execute statements and map cursor rows.
//! - Expose the `Dao<E>` operation surface.
//!
//! # Invariants
//! - Every public operation returns `DaoError` tagged with its operation name.
//! - Connections, statements and cursors never outlive one call.

pub mod batch;
pub mod binder;
pub mod dao;
pub mod mapper;
