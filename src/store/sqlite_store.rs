//! Embedded SQLite store for poll cursors.
use anyhow::Context;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::{
    path::Path,
    sync::{Arc, Mutex},
};
use tokio::task;

use crate::store::CursorStore;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS cursor (
        key    TEXT PRIMARY KEY,
        height INTEGER NOT NULL
    );
"#;

/// One row per watch key:
///   cursor(key TEXT PRIMARY KEY, height INTEGER NOT NULL)
///
/// Writes keep the larger height, so a cursor never moves backwards.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Creates/initializes the SQLite file at `path`.
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("open sqlite at {}", path.display()))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            "#,
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Private in-memory database (useful for tests).
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> anyhow::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| anyhow::anyhow!("sqlite connection poisoned"))?;
            f(&guard)
        })
        .await?
    }
}

#[async_trait]
impl CursorStore for SqliteStore {
    async fn load_cursor(&self, key: &str) -> anyhow::Result<Option<u64>> {
        let key = key.to_owned();
        self.with_conn(move |conn| {
            let h: Option<i64> = conn
                .query_row(
                    "SELECT height FROM cursor WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            h.map(|h| u64::try_from(h).context("negative cursor height"))
                .transpose()
        })
        .await
    }

    async fn save_cursor(&self, key: &str, height: u64) -> anyhow::Result<()> {
        let key = key.to_owned();
        let height = i64::try_from(height).context("cursor height exceeds i64")?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO cursor(key,height) VALUES(?1,?2)
                 ON CONFLICT(key) DO UPDATE SET height=MAX(height, excluded.height)",
                params![key, height],
            )?;
            Ok(())
        })
        .await
    }
}
