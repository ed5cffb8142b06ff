//! Chunked execution of write statements and generated-key retrieval.
//!
//! # Responsibility
//! - Queue bound parameter rows for one prepared statement.
//! - Flush every `batch_size` rows and once more for a trailing partial chunk.
//! - Read the generated-keys cursor of a single insert.
//!
//! # Invariants
//! - A chunk is applied atomically; a failed chunk aborts the whole call.
//! - Flushes run synchronously, in queue order.
//! - `batch_size` is never zero.

use crate::error::{MapResult, MapperError};
use crate::repo::binder::bind_row;
use log::{debug, warn};
use rusqlite::types::Value;
use rusqlite::{Connection, Statement};
use std::time::Instant;

const FLUSH_SAVEPOINT: &str = "bulkmap_flush";

/// Outcome of one batched write call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Parameter rows executed.
    pub rows: usize,
    /// Rows reported changed by the store.
    pub rows_affected: usize,
    /// Size of every flushed chunk, in flush order.
    pub flushes: Vec<usize>,
}

/// Queues parameter rows for one statement and flushes them in chunks.
pub struct BatchWriter<'stmt, 'conn> {
    conn: &'conn Connection,
    stmt: &'stmt mut Statement<'conn>,
    batch_size: usize,
    pending: Vec<Vec<Value>>,
    summary: BatchSummary,
}

impl<'stmt, 'conn> BatchWriter<'stmt, 'conn> {
    pub fn new(
        conn: &'conn Connection,
        stmt: &'stmt mut Statement<'conn>,
        batch_size: usize,
    ) -> MapResult<Self> {
        if batch_size == 0 {
            return Err(MapperError::usage("batch size must be greater than zero"));
        }
        Ok(Self {
            conn,
            stmt,
            batch_size,
            pending: Vec::with_capacity(batch_size.min(1024)),
            summary: BatchSummary::default(),
        })
    }

    /// Queues one row; flushes when the chunk is full.
    pub fn add(&mut self, row: Vec<Value>) -> MapResult<()> {
        self.pending.push(row);
        if self.pending.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Executes every queued row inside one savepoint.
    pub fn flush(&mut self) -> MapResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let started_at = Instant::now();
        let rows = std::mem::take(&mut self.pending);
        let count = rows.len();

        self.conn
            .execute_batch(&format!("SAVEPOINT {FLUSH_SAVEPOINT}"))?;
        let affected = match execute_rows(self.stmt, &rows) {
            Ok(affected) => affected,
            Err(err) => {
                rollback(self.conn);
                return Err(err);
            }
        };
        self.conn
            .execute_batch(&format!("RELEASE {FLUSH_SAVEPOINT}"))?;

        self.summary.rows += count;
        self.summary.rows_affected += affected;
        self.summary.flushes.push(count);

        debug!(
            "event=batch_flush module=repo status=ok rows={} affected={} duration_ms={}",
            count,
            affected,
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Flushes the trailing partial chunk and reports the totals.
    pub fn finish(mut self) -> MapResult<BatchSummary> {
        self.flush()?;
        Ok(self.summary)
    }
}

fn execute_rows(stmt: &mut Statement<'_>, rows: &[Vec<Value>]) -> MapResult<usize> {
    let mut affected = 0;
    for row in rows {
        bind_row(stmt, row)?;
        affected += stmt.raw_execute()?;
    }
    Ok(affected)
}

fn rollback(conn: &Connection) {
    let undo = format!("ROLLBACK TO {FLUSH_SAVEPOINT}; RELEASE {FLUSH_SAVEPOINT};");
    if let Err(err) = conn.execute_batch(&undo) {
        warn!(
            "event=batch_flush module=repo status=error stage=rollback error={}",
            err
        );
    }
}

/// First row of a generated-keys cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedKeys {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl GeneratedKeys {
    pub(crate) fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Runs an already bound statement and keeps the first returned row.
    pub fn read(stmt: &mut Statement<'_>) -> MapResult<Self> {
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut rows = stmt.raw_query();
        let Some(row) = rows.next()? else {
            return Ok(Self::new(columns, Vec::new()));
        };
        let values = (0..columns.len())
            .map(|index| row.get::<_, Value>(index))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Self::new(columns, values))
    }

    /// Generated key: none for zero columns or no returned row, the only
    /// value for a single column, otherwise the value of `key_column`.
    pub fn key_value(&self, key_column: &str) -> MapResult<Option<Value>> {
        match self.columns.len() {
            0 => Ok(None),
            1 => Ok(self.values.first().cloned()),
            _ => self
                .columns
                .iter()
                .position(|column| column.eq_ignore_ascii_case(key_column))
                .map(|index| self.values.get(index).cloned())
                .ok_or_else(|| {
                    MapperError::mapping(format!(
                        "generated keys [{}] do not include key column `{key_column}`",
                        self.columns.join(",")
                    ))
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BatchWriter, GeneratedKeys};
    use crate::error::ErrorKind;
    use rusqlite::types::Value;
    use rusqlite::Connection;

    fn ticket_table() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE ticket (ticket_id INTEGER PRIMARY KEY, code TEXT NOT NULL UNIQUE);",
        )
        .unwrap();
        conn
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM ticket", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn writer_flushes_full_chunks_then_remainder() {
        let conn = ticket_table();
        let mut stmt = conn.prepare("INSERT INTO ticket (code) VALUES (?)").unwrap();

        let mut writer = BatchWriter::new(&conn, &mut stmt, 2).unwrap();
        for code in ["a", "b", "c", "d", "e"] {
            writer.add(vec![Value::Text(code.into())]).unwrap();
        }
        let summary = writer.finish().unwrap();
        drop(stmt);

        assert_eq!(summary.flushes, vec![2, 2, 1]);
        assert_eq!(summary.rows, 5);
        assert_eq!(summary.rows_affected, 5);
        assert_eq!(count(&conn), 5);
    }

    #[test]
    fn failed_chunk_is_rolled_back() {
        let conn = ticket_table();
        let mut stmt = conn.prepare("INSERT INTO ticket (code) VALUES (?)").unwrap();

        let mut writer = BatchWriter::new(&conn, &mut stmt, 3).unwrap();
        writer.add(vec![Value::Text("x".into())]).unwrap();
        writer.add(vec![Value::Text("y".into())]).unwrap();
        let err = writer.add(vec![Value::Text("x".into())]).unwrap_err();
        drop(stmt);

        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let conn = ticket_table();
        let mut stmt = conn.prepare("INSERT INTO ticket (code) VALUES (?)").unwrap();
        assert!(BatchWriter::new(&conn, &mut stmt, 0).is_err());
    }

    #[test]
    fn generated_key_arity_rules() {
        assert_eq!(GeneratedKeys::default().key_value("id").unwrap(), None);

        let single = GeneratedKeys::new(vec!["rowid".into()], vec![Value::Integer(9)]);
        assert_eq!(single.key_value("id").unwrap(), Some(Value::Integer(9)));

        let many = GeneratedKeys::new(
            vec!["created".into(), "ID".into()],
            vec![Value::Text("now".into()), Value::Integer(4)],
        );
        assert_eq!(many.key_value("id").unwrap(), Some(Value::Integer(4)));
        assert_eq!(
            many.key_value("ticket_id").unwrap_err().kind(),
            ErrorKind::Mapping
        );
    }

    #[test]
    fn missing_row_values_yield_no_key() {
        let no_row = GeneratedKeys::new(vec!["ticket_id".into()], Vec::new());
        assert_eq!(no_row.key_value("ticket_id").unwrap(), None);

        let short = GeneratedKeys::new(
            vec!["created".into(), "ticket_id".into()],
            vec![Value::Text("now".into())],
        );
        assert_eq!(short.key_value("ticket_id").unwrap(), None);

        let no_columns = GeneratedKeys::new(Vec::new(), vec![Value::Integer(1)]);
        assert_eq!(no_columns.key_value("ticket_id").unwrap(), None);
    }

    #[test]
    fn read_takes_first_returned_row() {
        let conn = ticket_table();
        let mut stmt = conn
            .prepare("INSERT INTO ticket (code) VALUES ('q') RETURNING ticket_id")
            .unwrap();
        let keys = GeneratedKeys::read(&mut stmt).unwrap();
        assert_eq!(keys.key_value("ticket_id").unwrap(), Some(Value::Integer(1)));
    }
}
