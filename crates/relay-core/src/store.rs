//! Persistent dedup store.
//!
//! One durable key→value namespace ("bucket") per relay: key = prefix + update id,
//! value = text snapshot of the update. Append-only: markers are never updated or
//! deleted, so the store grows monotonically.

use std::{
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use rusqlite::{params, Connection, OptionalExtension};

use crate::{domain::UpdateId, errors::Error, Result};

/// Durable set of processed update ids.
///
/// Implementations must tolerate concurrent `has`/`record` calls. Each id is
/// written at most once by the pipeline, so per-key ordering never matters.
pub trait DedupStore: Send + Sync {
    /// `false` exactly when no marker exists for `id`.
    fn has(&self, id: UpdateId) -> Result<bool>;

    /// Durable before returning. Recording an id twice keeps the first snapshot.
    fn record(&self, id: UpdateId, snapshot: &str) -> Result<()>;

    /// All markers as (key, value), in store order.
    fn entries(&self) -> Result<Vec<(String, String)>>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub bucket: String,
    pub key_prefix: String,
    /// How long to wait for another process holding the store before giving up.
    pub lock_timeout: Duration,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            bucket: "Get".to_string(),
            key_prefix: "key".to_string(),
            lock_timeout: Duration::from_secs(1),
        }
    }
}

/// File-backed store on SQLite.
///
/// The connection runs in exclusive locking mode, so a second process opening the
/// same file fails with `StorageUnavailable` once `lock_timeout` elapses.
pub struct SqliteDedupStore {
    conn: Mutex<Connection>,
    bucket: String,
    key_prefix: String,
}

impl SqliteDedupStore {
    pub fn open(cfg: &StoreConfig) -> Result<Self> {
        if let Some(parent) = cfg.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::StorageUnavailable(format!("{}: {e}", parent.display()))
            })?;
        }

        let conn = Connection::open(&cfg.path).map_err(|e| open_error(&cfg.path, e))?;
        conn.busy_timeout(cfg.lock_timeout)?;
        let mode: String =
            conn.query_row("PRAGMA locking_mode = EXCLUSIVE", [], |row| row.get(0))?;
        tracing::trace!(%mode, "locking mode");
        conn.execute_batch("PRAGMA synchronous = FULL;")?;

        // Takes the file lock now instead of on the first write; held until drop.
        conn.execute_batch(
            "BEGIN EXCLUSIVE;
             CREATE TABLE IF NOT EXISTS markers (
                 bucket TEXT NOT NULL,
                 key    TEXT NOT NULL,
                 value  TEXT NOT NULL,
                 PRIMARY KEY (bucket, key)
             ) WITHOUT ROWID;
             COMMIT;",
        )
        .map_err(|e| open_error(&cfg.path, e))?;

        tracing::debug!(path = %cfg.path.display(), bucket = %cfg.bucket, "dedup store opened");

        Ok(Self {
            conn: Mutex::new(conn),
            bucket: cfg.bucket.clone(),
            key_prefix: cfg.key_prefix.clone(),
        })
    }

    pub fn key_for(&self, id: UpdateId) -> String {
        format!("{}{}", self.key_prefix, id.0)
    }

    /// Snapshot stored for `id`, if any.
    pub fn get(&self, id: UpdateId) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .prepare_cached("SELECT value FROM markers WHERE bucket = ?1 AND key = ?2")?
            .query_row(params![self.bucket, self.key_for(id)], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::StorageUnavailable("store connection poisoned".to_string()))
    }
}

impl DedupStore for SqliteDedupStore {
    fn has(&self, id: UpdateId) -> Result<bool> {
        let conn = self.lock()?;
        let exists = conn
            .prepare_cached("SELECT 1 FROM markers WHERE bucket = ?1 AND key = ?2")?
            .exists(params![self.bucket, self.key_for(id)])?;
        Ok(exists)
    }

    fn record(&self, id: UpdateId, snapshot: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.prepare_cached(
            "INSERT OR IGNORE INTO markers (bucket, key, value) VALUES (?1, ?2, ?3)",
        )?
        .execute(params![self.bucket, self.key_for(id), snapshot])?;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, String)>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare_cached("SELECT key, value FROM markers WHERE bucket = ?1 ORDER BY key")?;
        let rows = stmt
            .query_map(params![self.bucket], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<(String, String)>, _>>()?;
        Ok(rows)
    }
}

fn open_error(path: &Path, e: rusqlite::Error) -> Error {
    Error::StorageUnavailable(format!("cannot open {}: {e}", path.display()))
}
