//! Scoped acquisition of connection and statement handles.
//!
//! # Invariants
//! - Handles are released on every exit path, including failures.
//! - A release failure after a successful body is returned as an error.
//! - A release failure after a failed body is logged; the body's error wins.

use crate::db::ConnectionProvider;
use crate::error::{DaoError, DaoResult, MapResult, MapperError};
use crate::logging::compact_sql;
use log::{debug, warn};
use rusqlite::{Connection, Statement};
use std::time::Instant;

const LOGGED_SQL_CHARS: usize = 240;

/// Runs `body` on one freshly acquired connection, tagging failures with
/// `operation`.
pub(crate) fn with_connection<T>(
    provider: &dyn ConnectionProvider,
    operation: &'static str,
    body: impl FnOnce(&Connection) -> MapResult<T>,
) -> DaoResult<T> {
    let started_at = Instant::now();

    let conn = provider
        .acquire()
        .map_err(|err| DaoError::new(operation, MapperError::Storage(err)))?;
    let outcome = body(&conn);
    let released = provider.release(conn);

    match settle(outcome, released, "connection") {
        Ok(value) => {
            debug!(
                "event=dao_call module=repo op=\"{}\" status=ok duration_ms={}",
                operation,
                started_at.elapsed().as_millis()
            );
            Ok(value)
        }
        Err(err) => {
            debug!(
                "event=dao_call module=repo op=\"{}\" status=error duration_ms={} error={}",
                operation,
                started_at.elapsed().as_millis(),
                err
            );
            Err(DaoError::new(operation, err))
        }
    }
}

/// Prepares `sql`, runs `body` on the statement, then finalizes it.
pub(crate) fn with_statement<'conn, T>(
    conn: &'conn Connection,
    sql: &str,
    body: impl FnOnce(&mut Statement<'conn>) -> MapResult<T>,
) -> MapResult<T> {
    debug!(
        "event=sql_prepare module=db sql=\"{}\"",
        compact_sql(sql, LOGGED_SQL_CHARS)
    );
    let mut stmt = conn.prepare(sql)?;
    let outcome = body(&mut stmt);
    let released = stmt.finalize();
    settle(outcome, released, "statement")
}

fn settle<T>(
    outcome: MapResult<T>,
    released: rusqlite::Result<()>,
    resource: &'static str,
) -> MapResult<T> {
    match (outcome, released) {
        (outcome, Ok(())) => outcome,
        (Ok(_), Err(source)) => Err(MapperError::Release { resource, source }),
        (Err(primary), Err(source)) => {
            warn!(
                "event=resource_release module=db status=error resource={} error={}",
                resource, source
            );
            Err(primary)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{with_connection, with_statement};
    use crate::db::ConnectionProvider;
    use crate::error::{ErrorKind, MapperError};
    use rusqlite::Connection;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        acquired: AtomicUsize,
        released: AtomicUsize,
        fail_release: bool,
    }

    impl CountingProvider {
        fn new(fail_release: bool) -> Self {
            Self {
                acquired: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
                fail_release,
            }
        }
    }

    impl ConnectionProvider for CountingProvider {
        fn acquire(&self) -> rusqlite::Result<Connection> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Connection::open_in_memory()
        }

        fn release(&self, connection: Connection) -> rusqlite::Result<()> {
            self.released.fetch_add(1, Ordering::SeqCst);
            drop(connection);
            if self.fail_release {
                Err(rusqlite::Error::InvalidQuery)
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn connection_is_released_after_failure() {
        let provider = CountingProvider::new(false);
        let err = with_connection(&provider, "select", |_| -> Result<(), _> {
            Err(MapperError::usage("boom"))
        })
        .unwrap_err();

        assert_eq!(err.operation(), "select");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(provider.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_failure_surfaces_after_success() {
        let provider = CountingProvider::new(true);
        let err = with_connection(&provider, "update - single", |_| Ok(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Release);
        assert_eq!(err.operation(), "update - single");
    }

    #[test]
    fn primary_failure_wins_over_release_failure() {
        let provider = CountingProvider::new(true);
        let err = with_connection(&provider, "insert - single", |_| -> Result<(), _> {
            Err(MapperError::mapping("bad"))
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Mapping);
    }

    #[test]
    fn statement_errors_propagate_as_storage() {
        let provider = CountingProvider::new(false);
        let err = with_connection(&provider, "select", |conn| {
            with_statement(conn, "SELECT * FROM missing_table", |_| Ok(()))
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }
}
