use bulkmap_core::{
    AttributeDef, ConnectionProvider, Dao, DaoContext, Entity, EntityMapping, ErrorKind,
    FieldValue, SqliteProvider, ValueKind,
};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Default, Clone, PartialEq)]
struct Session {
    token: Uuid,
    user: String,
}

impl Entity for Session {
    fn mapping() -> EntityMapping<Self> {
        EntityMapping::<Self>::new()
            .table("session")
            .attribute(
                AttributeDef::new("token", ValueKind::Uuid).primary_key(),
                |session| session.token.into(),
                |session, value| value.decode_into(&mut session.token),
            )
            .attribute(
                AttributeDef::new("user", ValueKind::Text).column("user_name"),
                |session| session.user.clone().into(),
                |session, value| value.decode_into(&mut session.user),
            )
    }
}

/// Mapped type without a key attribute; key SQL falls back to `audit_log_id`.
#[derive(Debug, Default, Clone, PartialEq)]
struct AuditLog {
    message: String,
}

impl Entity for AuditLog {
    fn mapping() -> EntityMapping<Self> {
        EntityMapping::<Self>::new().table("audit_log").attribute(
            AttributeDef::new("message", ValueKind::Text),
            |log| log.message.clone().into(),
            |log, value| value.decode_into(&mut log.message),
        )
    }
}

struct CountingProvider {
    inner: SqliteProvider,
    acquired: AtomicUsize,
}

impl ConnectionProvider for CountingProvider {
    fn acquire(&self) -> rusqlite::Result<Connection> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        self.inner.acquire()
    }
}

fn setup(dir: &Path) -> (PathBuf, Arc<CountingProvider>) {
    let path = dir.join("keys.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE session (token TEXT PRIMARY KEY, user_name TEXT NOT NULL);
         CREATE TABLE audit_log (audit_log_id INTEGER PRIMARY KEY, message TEXT NOT NULL);",
    )
    .unwrap();
    conn.close().unwrap();

    let provider = Arc::new(CountingProvider {
        inner: SqliteProvider::file(&path),
        acquired: AtomicUsize::new(0),
    });
    (path, provider)
}

#[test]
fn delete_by_key_removes_matching_row() {
    let dir = tempfile::tempdir().unwrap();
    let (_, provider) = setup(dir.path());
    let sessions = Dao::<Session>::with_context(DaoContext::new(provider)).unwrap();

    let mut session = Session {
        token: Uuid::new_v4(),
        user: "ada".to_string(),
    };
    assert_eq!(
        sessions.insert(&mut session).unwrap(),
        FieldValue::Uuid(session.token)
    );

    assert_eq!(sessions.delete_by_key(session.token).unwrap(), 1);
    assert!(sessions.get_by_key(session.token).unwrap().is_none());
    assert_eq!(sessions.delete_by_key(session.token).unwrap(), 0);
}

#[test]
fn wrong_key_type_is_rejected_before_storage() {
    let dir = tempfile::tempdir().unwrap();
    let (_, provider) = setup(dir.path());
    let sessions = Dao::<Session>::with_context(DaoContext::new(provider.clone())).unwrap();

    let err = sessions.delete_by_key(42_i64).unwrap_err();
    assert_eq!(err.operation(), "delete - single");
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert!(err
        .to_string()
        .contains("Expected: uuid but passed is: integer"));
    assert_eq!(provider.acquired.load(Ordering::SeqCst), 0);
}

#[test]
fn null_key_is_rejected_before_storage() {
    let dir = tempfile::tempdir().unwrap();
    let (_, provider) = setup(dir.path());
    let sessions = Dao::<Session>::with_context(DaoContext::new(provider.clone())).unwrap();

    let err = sessions.delete_by_key(FieldValue::Null).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
    let err = sessions.delete_by_key(None::<Uuid>).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert_eq!(provider.acquired.load(Ordering::SeqCst), 0);
}

#[test]
fn convention_key_column_serves_raw_key_operations() {
    let dir = tempfile::tempdir().unwrap();
    let (path, provider) = setup(dir.path());
    let logs = Dao::<AuditLog>::with_context(DaoContext::new(provider)).unwrap();

    let mut entry = AuditLog {
        message: "started".to_string(),
    };
    assert_eq!(logs.insert(&mut entry).unwrap(), FieldValue::Null);

    let conn = Connection::open(&path).unwrap();
    let id: i64 = conn
        .query_row("SELECT audit_log_id FROM audit_log", [], |row| row.get(0))
        .unwrap();
    drop(conn);

    assert_eq!(logs.delete_by_key(id).unwrap(), 1);
    assert!(logs.get_all().unwrap().is_empty());

    let err = logs.delete(&entry).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Mapping);
}
