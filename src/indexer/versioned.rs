//! Versioned indexer: revision history and tombstones
//!
//! Wraps an [`Indexer`] and records every revision of every object in an
//! append-mostly history table, so point queries can be answered at a
//! given revision. Versions are supplied by the caller (a change feed)
//! and are expected to be monotonically non-decreasing per key; they are
//! never compared across keys.
//!
//! History rows are written by hooks running inside the write transaction:
//!
//! - after an upsert, the just-written object row is copied into history
//!   at the object's version; a repeated `(key, version)` write replaces
//!   the blob and clears any tombstone on that row;
//! - after a delete, a tombstone row is appended at `max(version) + 1`,
//!   carrying the last live blob. Appending (rather than flagging the
//!   last live row) keeps that revision's object visible to historical
//!   queries at its own version.

use std::path::Path;
use std::sync::Arc;

use rusqlite::{params, Transaction};
use tracing::debug;

use super::{Indexer, Indexers};
use crate::codec::Codec;
use crate::db::DbHandle;
use crate::error::Result;

/// Extracts the caller-supplied revision of an object.
pub type VersionFunc<T> = Arc<dyn Fn(&T) -> Result<i64> + Send + Sync>;

const HISTORY_VERSION_INDEX_DDL: &str =
    "CREATE INDEX object_history_version ON object_history (version)";
const GET_VERSION_SQL: &str =
    "SELECT object FROM object_history WHERE key = ? AND version = ? AND deleted = 0";
const GET_VERSION_WITH_DELETED_SQL: &str =
    "SELECT object FROM object_history WHERE key = ? AND version = ?";

/// Indexer that additionally retains one history row per `(key, version)`.
pub struct VersionedIndexer<T> {
    inner: Indexer<T>,
}

impl<T: 'static> VersionedIndexer<T> {
    /// Open a versioned indexer at `path`.
    pub fn open<C: Codec<T> + 'static>(
        path: impl AsRef<Path>,
        codec: C,
        version_func: VersionFunc<T>,
        indexers: Indexers<T>,
    ) -> Result<Self> {
        let db = Arc::new(DbHandle::open(path, &[])?);
        let indexer = Indexer::with_handle(db, Arc::new(codec), indexers)?;
        Self::attach(indexer, version_func, &[])
    }

    /// Install the history schema and hooks on an existing indexer.
    ///
    /// `field_columns` mirrors the extra columns of the objects table so
    /// history rows carry the field values as of their revision; callers
    /// must register any hook that populates those columns *before* this
    /// one, or history captures stale values.
    pub(crate) fn attach(
        mut indexer: Indexer<T>,
        version_func: VersionFunc<T>,
        field_columns: &[String],
    ) -> Result<Self> {
        indexer.db().exec(&history_table_ddl(field_columns))?;
        indexer.db().exec(HISTORY_VERSION_INDEX_DDL)?;

        let insert_sql = history_insert_sql(field_columns);
        indexer.register_after_upsert(Box::new(
            move |tx: &Transaction<'_>, key: &str, obj: &T| {
                let version = version_func(obj)?;
                tx.prepare_cached(&insert_sql)?
                    .execute(params![key, version, key])?;
                Ok(())
            },
        ));

        let tombstone_sql = history_tombstone_sql(field_columns);
        indexer.register_after_delete(Box::new(move |tx: &Transaction<'_>, key: &str| {
            tx.prepare_cached(&tombstone_sql)?
                .execute(params![key, key])?;
            Ok(())
        }));

        debug!("revision history enabled");
        Ok(Self { inner: indexer })
    }

    /// Fetch the exact `(key, version)` history row, if one exists.
    ///
    /// Tombstones are treated as not-found unless `include_deleted` is
    /// set, in which case the tombstone's blob (the last live object) is
    /// returned.
    pub fn get_by_key_and_version(
        &self,
        key: &str,
        version: i64,
        include_deleted: bool,
    ) -> Result<Option<T>> {
        let sql = if include_deleted {
            GET_VERSION_WITH_DELETED_SQL
        } else {
            GET_VERSION_SQL
        };
        let mut rows = self.inner.query_objects(sql, params![key, version])?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }

    // ── Delegated base surface ──────────────────────────────────────────

    pub fn upsert(&self, key: &str, obj: &T) -> Result<()> {
        self.inner.upsert(key, obj)
    }

    pub fn delete_by_key(&self, key: &str) -> Result<()> {
        self.inner.delete_by_key(key)
    }

    pub fn get_by_key(&self, key: &str) -> Result<Option<T>> {
        self.inner.get_by_key(key)
    }

    pub fn list(&self) -> Result<Vec<T>> {
        self.inner.list()
    }

    pub fn list_keys(&self) -> Result<Vec<String>> {
        self.inner.list_keys()
    }

    pub fn replace(&self, objects: &std::collections::HashMap<String, T>) -> Result<()> {
        self.inner.replace(objects)
    }

    pub fn index(&self, name: &str, obj: &T) -> Result<Vec<T>> {
        self.inner.index(name, obj)
    }

    pub fn index_keys(&self, name: &str, value: &str) -> Result<Vec<String>> {
        self.inner.index_keys(name, value)
    }

    pub fn by_index(&self, name: &str, value: &str) -> Result<Vec<T>> {
        self.inner.by_index(name, value)
    }

    pub fn list_index_values(&self, name: &str) -> Result<Vec<String>> {
        self.inner.list_index_values(name)
    }

    pub fn add_indexers(&self, new_indexers: Indexers<T>) -> Result<()> {
        self.inner.add_indexers(new_indexers)
    }

    pub fn indexer_names(&self) -> Vec<String> {
        self.inner.indexer_names()
    }

    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }

    pub(crate) fn query_objects<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<T>> {
        self.inner.query_objects(sql, params)
    }
}

fn history_table_ddl(field_columns: &[String]) -> String {
    let mut ddl = String::from(
        "CREATE TABLE object_history (\n    \
             key TEXT NOT NULL,\n    \
             version INTEGER NOT NULL,\n    \
             deleted INTEGER NOT NULL DEFAULT 0,\n    \
             object BLOB NOT NULL",
    );
    for name in field_columns {
        ddl.push_str(&format!(",\n    \"{name}\""));
    }
    ddl.push_str(",\n    PRIMARY KEY (key, version)\n)");
    ddl
}

/// Copy the freshly upserted object row (blob plus field columns) into
/// history at the object's version.
fn history_insert_sql(field_columns: &[String]) -> String {
    let columns: String = field_columns
        .iter()
        .map(|f| format!(", \"{f}\""))
        .collect();
    let conflict_updates: String = field_columns
        .iter()
        .map(|f| format!(", \"{f}\" = excluded.\"{f}\""))
        .collect();
    format!(
        "INSERT INTO object_history (key, version, deleted, object{columns}) \
         SELECT ?, ?, 0, object{columns} FROM objects WHERE key = ? \
         ON CONFLICT (key, version) \
         DO UPDATE SET object = excluded.object, deleted = 0{conflict_updates}"
    )
}

/// Append a tombstone at `max(version) + 1`, copying the last live row.
/// No-op when the newest row is already a tombstone or no history exists.
fn history_tombstone_sql(field_columns: &[String]) -> String {
    let columns: String = field_columns
        .iter()
        .map(|f| format!(", \"{f}\""))
        .collect();
    format!(
        "INSERT INTO object_history (key, version, deleted, object{columns}) \
         SELECT key, version + 1, 1, object{columns} FROM object_history \
         WHERE key = ? AND deleted = 0 \
           AND version = (SELECT MAX(version) FROM object_history WHERE key = ?)"
    )
}
