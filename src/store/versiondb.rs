use super::{FileVersion, VersionRepository};
use crate::error::{DeltaError, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Version repository persisted in SQLite
///
/// Queries are small but still blocking, so every call runs on the
/// blocking thread pool.
#[derive(Clone)]
pub struct SqliteVersionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVersionRepository {
    /// Database file name inside a repository directory
    pub const DB_FILE: &'static str = "versions.db";

    /// Database schema version
    const SCHEMA_VERSION: i32 = 1;

    /// Open or create the version database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS versions (
                item_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                content_key TEXT NOT NULL,
                size INTEGER NOT NULL,
                checksum TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (item_id, version)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
            params![Self::SCHEMA_VERSION],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| DeltaError::Storage("version database lock poisoned".to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| DeltaError::Io(std::io::Error::other(e.to_string())))?
    }
}

fn row_to_version(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileVersion> {
    Ok(FileVersion {
        item_id: row.get(0)?,
        version: row.get::<_, i64>(1)? as u64,
        content_key: row.get(2)?,
        size: row.get::<_, i64>(3)? as u64,
        checksum: row.get(4)?,
        created_at: row.get(5)?,
    })
}

const SELECT_COLUMNS: &str = "SELECT item_id, version, content_key, size, checksum, created_at FROM versions";

#[async_trait]
impl VersionRepository for SqliteVersionRepository {
    async fn latest(&self, item_id: &str) -> Result<Option<FileVersion>> {
        let item_id = item_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("{} WHERE item_id = ?1 ORDER BY version DESC LIMIT 1", SELECT_COLUMNS);
            Ok(conn
                .query_row(&sql, params![item_id], row_to_version)
                .optional()?)
        })
        .await
    }

    async fn get(&self, item_id: &str, version: u64) -> Result<Option<FileVersion>> {
        let item_id = item_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("{} WHERE item_id = ?1 AND version = ?2", SELECT_COLUMNS);
            Ok(conn
                .query_row(&sql, params![item_id, version as i64], row_to_version)
                .optional()?)
        })
        .await
    }

    async fn record(&self, version: FileVersion) -> Result<()> {
        self.with_conn(move |conn| {
            let current: Option<i64> = conn.query_row(
                "SELECT MAX(version) FROM versions WHERE item_id = ?1",
                params![version.item_id],
                |row| row.get(0),
            )?;
            let expected = current.map_or(1, |v| v as u64 + 1);
            if version.version != expected {
                return Err(DeltaError::Storage(format!(
                    "version conflict for {}: expected {}, got {}",
                    version.item_id, expected, version.version
                )));
            }

            conn.execute(
                "INSERT INTO versions (item_id, version, content_key, size, checksum, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    version.item_id,
                    version.version as i64,
                    version.content_key,
                    version.size as i64,
                    version.checksum,
                    version.created_at,
                ],
            )
            .map_err(|e| match e.sqlite_error_code() {
                Some(ErrorCode::ConstraintViolation) => DeltaError::Storage(format!(
                    "version conflict for {}: version {} already exists",
                    version.item_id, version.version
                )),
                _ => DeltaError::Database(e),
            })?;

            tracing::debug!(
                "Recorded {} version {} ({} bytes)",
                version.item_id,
                version.version,
                version.size
            );
            Ok(())
        })
        .await
    }
}
