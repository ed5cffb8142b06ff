//! Connection supply and resource lifecycle.
//!
//! # Responsibility
//! - Define the connection provider contract consumed by every DAO call.
//! - Provide a file-backed SQLite provider.
//! - Scope connection and statement handles so they are released on every
//!   exit path.
//!
//! # Invariants
//! - One `acquire` and one `release` per top-level DAO call.
//! - Connections are never pooled or reused across calls by this crate.

pub(crate) mod guard;
mod open;

pub use open::SqliteProvider;

use rusqlite::Connection;

/// Supplies a fresh physical connection per DAO call.
///
/// Pooling, if any, belongs to the implementation.
pub trait ConnectionProvider: Send + Sync {
    fn acquire(&self) -> rusqlite::Result<Connection>;

    /// Hands a connection back once the call is finished.
    ///
    /// The default closes it and reports the close failure.
    fn release(&self, connection: Connection) -> rusqlite::Result<()> {
        connection.close().map_err(|(_, err)| err)
    }
}

impl<F> ConnectionProvider for F
where
    F: Fn() -> rusqlite::Result<Connection> + Send + Sync,
{
    fn acquire(&self) -> rusqlite::Result<Connection> {
        self()
    }
}
