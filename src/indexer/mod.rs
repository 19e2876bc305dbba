//! Indexer: keyed object storage with secondary indices
//!
//! The base layer of the cache. Objects are stored as encoded blobs under a
//! caller-chosen key; registered index functions derive zero or more string
//! values per object, persisted as `(name, value, key)` rows so lookups by
//! derived value stay cheap.
//!
//! ## Index reconciliation on write
//!
//! A write may remove, add, or multiply index rows, so every upsert deletes
//! the full prior fan-out for the key and re-inserts the fresh one inside
//! the same transaction. One extra statement per write buys a much simpler
//! invariant than computed diffs: after any write, the index rows for a key
//! are exactly the registered functions applied to its latest object.

pub mod listoption;
pub mod versioned;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use rusqlite::{params, Params, ToSql, Transaction};
use tracing::debug;

use crate::codec::Codec;
use crate::db::{guard_name, DbHandle};
use crate::error::{CacheError, Result};

/// Derives the indexed values of an object for one named index.
pub type IndexFunc<T> = Arc<dyn Fn(&T) -> Result<Vec<String>> + Send + Sync>;

/// Named index functions, keyed by index name.
pub type Indexers<T> = HashMap<String, IndexFunc<T>>;

/// Hook executed inside the upsert transaction, after the object row and
/// its index fan-out are written.
pub type UpsertHook<T> = Box<dyn Fn(&Transaction<'_>, &str, &T) -> Result<()> + Send + Sync>;

/// Hook executed inside the delete transaction, after the object row is
/// removed (index rows cascade).
pub type DeleteHook = Box<dyn Fn(&Transaction<'_>, &str) -> Result<()> + Send + Sync>;

const UPSERT_OBJECT_SQL: &str =
    "INSERT INTO objects (key, object) VALUES (?, ?) \
     ON CONFLICT (key) DO UPDATE SET object = excluded.object";
const DELETE_OBJECT_SQL: &str = "DELETE FROM objects WHERE key = ?";
const DELETE_ALL_OBJECTS_SQL: &str = "DELETE FROM objects";
const GET_OBJECT_SQL: &str = "SELECT object FROM objects WHERE key = ?";
const LIST_OBJECTS_SQL: &str = "SELECT object FROM objects";
const LIST_KEYS_SQL: &str = "SELECT key FROM objects";
const DELETE_INDICES_SQL: &str = "DELETE FROM indices WHERE key = ?";
const INSERT_INDEX_SQL: &str = "INSERT INTO indices (name, value, key) VALUES (?, ?, ?)";
const OBJECTS_BY_INDEX_SQL: &str =
    "SELECT object FROM objects \
     WHERE key IN (SELECT key FROM indices WHERE name = ? AND value = ?)";
const KEYS_BY_INDEX_SQL: &str = "SELECT DISTINCT key FROM indices WHERE name = ? AND value = ?";
const INDEX_VALUES_SQL: &str = "SELECT DISTINCT value FROM indices WHERE name = ?";

/// SQLite-backed object store with secondary indices.
pub struct Indexer<T> {
    db: Arc<DbHandle>,
    codec: Arc<dyn Codec<T>>,
    indexers: RwLock<Indexers<T>>,
    after_upsert: Vec<UpsertHook<T>>,
    after_delete: Vec<DeleteHook>,
}

impl<T> Indexer<T> {
    /// Open a standalone indexer at `path` with the given codec and
    /// index functions.
    pub fn open<C: Codec<T> + 'static>(
        path: impl AsRef<Path>,
        codec: C,
        indexers: Indexers<T>,
    ) -> Result<Self> {
        let db = Arc::new(DbHandle::open(path, &[])?);
        Self::with_handle(db, Arc::new(codec), indexers)
    }

    /// Build an indexer over an already-opened handle. Used by the layers
    /// that declare extra schema before wiring themselves in.
    pub(crate) fn with_handle(
        db: Arc<DbHandle>,
        codec: Arc<dyn Codec<T>>,
        indexers: Indexers<T>,
    ) -> Result<Self> {
        for name in indexers.keys() {
            guard_name(name)?;
        }
        Ok(Self {
            db,
            codec,
            indexers: RwLock::new(indexers),
            after_upsert: Vec::new(),
            after_delete: Vec::new(),
        })
    }

    /// Register a hook to run inside every upsert transaction.
    ///
    /// Registration happens at build time, before the indexer is shared;
    /// hooks run in registration order and must not open transactions of
    /// their own.
    pub fn register_after_upsert(&mut self, hook: UpsertHook<T>) {
        self.after_upsert.push(hook);
    }

    /// Register a hook to run inside every delete transaction.
    pub fn register_after_delete(&mut self, hook: DeleteHook) {
        self.after_delete.push(hook);
    }

    /// Insert the object under `key`, replacing any previous object and
    /// reconciling its index rows, all in one transaction.
    pub fn upsert(&self, key: &str, obj: &T) -> Result<()> {
        let blob = self.codec.encode(obj)?;
        self.db
            .with_tx(|tx: &Transaction<'_>| self.upsert_in_tx(tx, key, obj, &blob))
    }

    /// The upsert body, reusable inside a larger transaction (`replace`).
    fn upsert_in_tx(&self, tx: &Transaction<'_>, key: &str, obj: &T, blob: &[u8]) -> Result<()> {
        tx.prepare_cached(UPSERT_OBJECT_SQL)?
            .execute(params![key, blob])?;
        tx.prepare_cached(DELETE_INDICES_SQL)?.execute([key])?;

        for (name, index_func) in self.indexers.read().iter() {
            // The fan-out is a value set; duplicates would trip the
            // (name, value, key) primary key.
            let mut values = index_func(obj)?;
            values.sort();
            values.dedup();
            for value in values {
                tx.prepare_cached(INSERT_INDEX_SQL)?
                    .execute(params![name, value, key])?;
            }
        }

        for hook in &self.after_upsert {
            hook(tx, key, obj)?;
        }
        Ok(())
    }

    /// Delete the object under `key`. Index rows cascade; hooks run in the
    /// same transaction. Deleting an absent key is a no-op.
    pub fn delete_by_key(&self, key: &str) -> Result<()> {
        self.db.with_tx(|tx: &Transaction<'_>| {
            tx.prepare_cached(DELETE_OBJECT_SQL)?.execute([key])?;
            for hook in &self.after_delete {
                hook(tx, key)?;
            }
            Ok(())
        })
    }

    /// Fetch the object under `key`, if present.
    pub fn get_by_key(&self, key: &str) -> Result<Option<T>> {
        let mut rows = self.query_objects(GET_OBJECT_SQL, [key])?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }

    /// All current objects, in unspecified (but per-query stable) order.
    pub fn list(&self) -> Result<Vec<T>> {
        self.query_objects(LIST_OBJECTS_SQL, [])
    }

    /// All current keys.
    pub fn list_keys(&self) -> Result<Vec<String>> {
        self.db.query_strings(LIST_KEYS_SQL, [])
    }

    /// Replace the whole store contents with `objects`, in one transaction.
    ///
    /// Per-key delete hooks do not run for replaced-away keys; upsert hooks
    /// run for every entry.
    pub fn replace(&self, objects: &HashMap<String, T>) -> Result<()> {
        let mut encoded = Vec::with_capacity(objects.len());
        for (key, obj) in objects {
            encoded.push((key, obj, self.codec.encode(obj)?));
        }

        self.db.with_tx(|tx: &Transaction<'_>| {
            tx.prepare_cached(DELETE_ALL_OBJECTS_SQL)?.execute([])?;
            for (key, obj, blob) in &encoded {
                self.upsert_in_tx(tx, key, obj, blob)?;
            }
            Ok(())
        })?;

        debug!(count = objects.len(), "replaced cache contents");
        Ok(())
    }

    /// Objects matching `obj` on the named index: the index function is
    /// applied to `obj` and every object recorded under any of the produced
    /// values is returned.
    pub fn index(&self, name: &str, obj: &T) -> Result<Vec<T>> {
        let values = {
            let indexers = self.indexers.read();
            let index_func = indexers
                .get(name)
                .ok_or_else(|| CacheError::UnknownIndex(name.to_string()))?;
            index_func(obj)?
        };

        match values.len() {
            0 => Ok(Vec::new()),
            1 => self.by_index(name, &values[0]),
            _ => {
                // The SQL text varies by arity, so the statement cache ends
                // up keyed by arity as well.
                let sql = objects_by_index_values_sql(values.len());
                let mut bind: Vec<&dyn ToSql> = vec![&name];
                for value in &values {
                    bind.push(value);
                }
                self.query_objects(&sql, &bind[..])
            }
        }
    }

    /// Distinct keys recorded under `(name, value)`.
    pub fn index_keys(&self, name: &str, value: &str) -> Result<Vec<String>> {
        self.check_index(name)?;
        self.db.query_strings(KEYS_BY_INDEX_SQL, [name, value])
    }

    /// Objects whose key is recorded under `(name, value)`.
    pub fn by_index(&self, name: &str, value: &str) -> Result<Vec<T>> {
        self.check_index(name)?;
        self.query_objects(OBJECTS_BY_INDEX_SQL, [name, value])
    }

    /// Distinct values recorded under `name`. An unregistered name is not
    /// an error here; it simply has no recorded values.
    pub fn list_index_values(&self, name: &str) -> Result<Vec<String>> {
        self.db.query_strings(INDEX_VALUES_SQL, [name])
    }

    /// Merge more index functions into the registered set. Calling this
    /// once data is already stored leaves existing rows unindexed under
    /// the new names; the behavior is undefined by contract.
    pub fn add_indexers(&self, new_indexers: Indexers<T>) -> Result<()> {
        for name in new_indexers.keys() {
            guard_name(name)?;
        }
        self.indexers.write().extend(new_indexers);
        Ok(())
    }

    /// Names of the registered indices, sorted.
    pub fn indexer_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indexers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Close the underlying database; all layers sharing it become invalid.
    pub fn close(&self) -> Result<()> {
        self.db.close()
    }

    fn check_index(&self, name: &str) -> Result<()> {
        if self.indexers.read().contains_key(name) {
            Ok(())
        } else {
            Err(CacheError::UnknownIndex(name.to_string()))
        }
    }

    pub(crate) fn db(&self) -> &Arc<DbHandle> {
        &self.db
    }

    pub(crate) fn query_objects<P: Params>(&self, sql: &str, params: P) -> Result<Vec<T>> {
        self.db.query_objects(sql, params, &*self.codec)
    }
}

/// `IN (?, ?, …)` lookup for multi-valued index matches, built per arity.
fn objects_by_index_values_sql(arity: usize) -> String {
    let mut placeholders = String::from("?");
    for _ in 1..arity {
        placeholders.push_str(", ?");
    }
    format!(
        "SELECT object FROM objects \
         WHERE key IN (SELECT key FROM indices WHERE name = ? AND value IN ({placeholders}))"
    )
}
