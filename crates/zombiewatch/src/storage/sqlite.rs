//! `SQLite`-backed sorted-set backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use super::{migrations, SortedSetBackend};
use crate::error::{Error, Result};

/// Sorted sets persisted in a `SQLite` database.
///
/// The connection is opened once and shared; every call runs on the blocking
/// thread pool so the async runtime is never stalled by disk I/O.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open or create a database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&*conn.lock())).await?
    }
}

#[async_trait]
impl SortedSetBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn add(&self, key: &str, member: &str, score: i64) -> Result<bool> {
        let key = key.to_string();
        let member = member.to_string();
        self.with_conn(move |conn| {
            let affected = conn.execute(
                "INSERT OR IGNORE INTO locations (driver_key, member, score) VALUES (?1, ?2, ?3)",
                params![key, member, score],
            )?;
            Ok(affected > 0)
        })
        .await
    }

    async fn range_by_score(&self, key: &str, min_score: i64) -> Result<Vec<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(
                r"
                SELECT member FROM locations
                WHERE driver_key = ?1 AND score >= ?2
                ORDER BY score ASC, member ASC
                ",
            )?;
            let members = stmt
                .query_map(params![key, min_score], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(members)
        })
        .await
    }

    async fn remove_range_by_rank(&self, key: &str, keep: usize) -> Result<usize> {
        let key = key.to_string();
        let keep_i64 = i64::try_from(keep).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let affected = conn.execute(
                r"
                DELETE FROM locations WHERE driver_key = ?1 AND rowid IN (
                    SELECT rowid FROM locations WHERE driver_key = ?1
                    ORDER BY score DESC, member DESC
                    LIMIT -1 OFFSET ?2
                )
                ",
                params![key, keep_i64],
            )?;
            Ok(affected)
        })
        .await
    }

    async fn cardinality(&self, key: &str) -> Result<usize> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM locations WHERE driver_key = ?1",
                [key],
                |row| row.get(0),
            )?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
        .await
    }
}
