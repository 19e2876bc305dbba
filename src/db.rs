//! Database handle
//!
//! `DbHandle` owns the embedded SQLite connection for one cache instance.
//! It applies the schema at open, funnels every statement through the
//! connection's prepared-statement cache, and runs each write inside a
//! single transaction together with any hooks the upper layers install.
//!
//! The database file is removed and recreated at open: the cache is always
//! rebuilt from the change feed and is never the source of truth.
//!
//! ## Concurrency
//!
//! `rusqlite::Connection` is not `Sync`, so all access is serialized
//! through a `parking_lot::Mutex`. Writers are thereby single-streamed;
//! callers that multiplex producers must serialize externally.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{Connection, Params, Transaction};
use tracing::{debug, info};

use crate::codec::Codec;
use crate::error::{CacheError, Result};

/// Journal sibling suffixes SQLite may leave behind next to the main file.
const STALE_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

/// Reject identifiers that would break out of a double-quoted SQL name.
///
/// Index and field names end up inside generated DDL and queries; a
/// double quote in them is the one character the quoting cannot contain.
pub(crate) fn guard_name(name: &str) -> Result<()> {
    if name.contains('"') {
        return Err(CacheError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Owner of the SQLite connection backing one cache instance.
///
/// All layers of a cache share one `DbHandle`; closing it invalidates
/// every dependent, whose operations then fail with [`CacheError::Closed`].
pub struct DbHandle {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl DbHandle {
    /// Open (recreating from scratch) the database at `path`.
    ///
    /// `field_columns` declares one extra column on the objects table per
    /// registered field extractor. Columns are declared without a type
    /// affinity; SQLite stores whatever scalar the extractor produces.
    pub fn open(path: impl AsRef<Path>, field_columns: &[String]) -> Result<Self> {
        for name in field_columns {
            guard_name(name)?;
        }

        let path = path.as_ref().to_path_buf();
        remove_stale_files(&path)?;

        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "MEMORY")?;
        conn.pragma_update(None, "synchronous", "OFF")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let mut objects_ddl = String::from(
            "CREATE TABLE objects (\n    key TEXT NOT NULL PRIMARY KEY,\n    object BLOB",
        );
        for name in field_columns {
            objects_ddl.push_str(&format!(",\n    \"{name}\""));
        }
        objects_ddl.push_str("\n)");
        conn.execute_batch(&objects_ddl)?;

        conn.execute_batch(
            "CREATE TABLE indices (\n    \
                 name TEXT NOT NULL,\n    \
                 value TEXT NOT NULL,\n    \
                 key TEXT NOT NULL REFERENCES objects (key) ON DELETE CASCADE,\n    \
                 PRIMARY KEY (name, value, key)\n\
             );\n\
             CREATE INDEX indices_name_value ON indices (name, value);",
        )?;

        info!(
            path = %path.display(),
            fields = field_columns.len(),
            "cache database initialized"
        );

        Ok(Self {
            path,
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Path of the backing database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run DDL or other statements that return no rows.
    ///
    /// Upper layers use this at construction time to install their own
    /// schema (e.g. the history table of the versioned indexer).
    pub fn exec(&self, sql: &str) -> Result<()> {
        self.with_conn(|conn| Ok(conn.execute_batch(sql)?))
    }

    /// Run a closure against the guarded connection.
    pub fn with_conn<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(CacheError::Closed)?;
        f(conn)
    }

    /// Run a closure inside a transaction, committing only on success.
    ///
    /// Hooks execute inside this same transaction; an error from any of
    /// them rolls the whole write back.
    pub fn with_tx<R>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<R>) -> Result<R> {
        let mut guard = self.conn.lock();
        let conn = guard.as_mut().ok_or(CacheError::Closed)?;
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run a cached query whose single column is an encoded object blob,
    /// decoding every row through `codec`.
    pub fn query_objects<T, P: Params>(
        &self,
        sql: &str,
        params: P,
        codec: &dyn Codec<T>,
    ) -> Result<Vec<T>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let mut rows = stmt.query(params)?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let blob: Vec<u8> = row.get(0)?;
                out.push(codec.decode(&blob)?);
            }
            Ok(out)
        })
    }

    /// Run a cached query whose single column is a string.
    pub fn query_strings<P: Params>(&self, sql: &str, params: P) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let mut rows = stmt.query(params)?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(row.get(0)?);
            }
            Ok(out)
        })
    }

    /// Close the connection. Idempotent; later operations on this handle
    /// or any layer sharing it fail with [`CacheError::Closed`].
    pub fn close(&self) -> Result<()> {
        let conn = self.conn.lock().take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| CacheError::Database(e))?;
            debug!(path = %self.path.display(), "cache database closed");
        }
        Ok(())
    }
}

/// Remove the database file and any journal siblings from a previous run.
fn remove_stale_files(path: &Path) -> Result<()> {
    let mut candidates = vec![path.to_path_buf()];
    for suffix in STALE_SUFFIXES {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        candidates.push(PathBuf::from(name));
    }

    for candidate in candidates {
        match std::fs::remove_file(&candidate) {
            Ok(()) => debug!(path = %candidate.display(), "removed stale cache file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
