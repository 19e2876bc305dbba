//! List-option indexer: field columns and the list query planner
//!
//! The query layer of the cache. At construction the caller registers
//! field extractors, one per filterable/sortable field; each becomes a
//! dedicated column on the objects table (and on the history table, so
//! historical queries see field values as of their revision). On every
//! upsert the extracted scalars are written into those columns inside the
//! write transaction, before the history row is captured.
//!
//! [`ListOptionIndexer::list_by_options`] assembles one parameterized
//! SELECT from a [`ListOptions`] value:
//!
//! 1. source: the objects table, or (when a revision is given) the
//!    greatest non-tombstoned history row per key at or below it;
//! 2. one `LIKE '%…%'` clause per filter (empty match matches all);
//! 3. up to two `ORDER BY` levels;
//! 4. `LIMIT`/`OFFSET` pagination.
//!
//! The assembled SQL goes through the connection's prepared-statement
//! cache, so each distinct query shape is compiled once.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use rusqlite::types::ToSqlOutput;
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::versioned::{VersionFunc, VersionedIndexer};
use super::{Indexer, Indexers};
use crate::codec::Codec;
use crate::db::DbHandle;
use crate::error::{CacheError, Result};

/// Extracts one scalar field of an object for its dedicated column.
pub type FieldFunc<T> = Arc<dyn Fn(&T) -> FieldValue + Send + Sync>;

/// Scalar produced by a [`FieldFunc`], stored in a field column.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Real(f64),
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Text(s) => ToSqlOutput::from(s.as_str()),
            FieldValue::Int(i) => ToSqlOutput::from(*i),
            FieldValue::Real(r) => ToSqlOutput::from(*r),
        })
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Real(value)
    }
}

/// Sort direction for one sort level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Substring filter on one registered field.
///
/// `field` is the dotted path of the field as segments; `contains` is the
/// substring to match. An empty `contains` matches every object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    pub field: Vec<String>,
    pub contains: String,
}

/// Up to two sort levels. The secondary level applies only when a primary
/// field is present; with no primary field the natural order is used
/// (unspecified, but stable within one query).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sort {
    pub primary_field: Vec<String>,
    pub primary_order: SortOrder,
    pub secondary_field: Vec<String>,
    pub secondary_order: SortOrder,
}

/// Page selection. A `page_size` of zero disables pagination; `page`
/// numbers start at 1 and values below 1 are clamped to the first page.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub page_size: u32,
    pub page: u32,
}

/// The full query consumed by [`ListOptionIndexer::list_by_options`].
///
/// An empty `revision` queries the latest objects; a decimal revision
/// string queries the state as of that revision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListOptions {
    pub filters: Vec<Filter>,
    pub sort: Sort,
    pub pagination: Pagination,
    pub revision: String,
}

/// Per-key latest non-tombstoned history row at or below the bound
/// revision. A key whose newest qualifying row is a tombstone is omitted.
const HISTORY_SOURCE_SQL: &str =
    "SELECT object FROM object_history h1 \
     WHERE h1.deleted = 0 AND h1.version <= ? \
       AND h1.version = (SELECT MAX(h2.version) FROM object_history h2 \
                         WHERE h2.key = h1.key AND h2.version <= ?)";

/// Versioned indexer with field columns and list-query planning.
pub struct ListOptionIndexer<T> {
    inner: VersionedIndexer<T>,
    fields: Vec<String>,
}

impl<T: 'static> ListOptionIndexer<T> {
    /// Open a list-option indexer at `path`.
    ///
    /// `field_funcs` maps each declared field name (dotted paths joined
    /// with `.`) to its extractor. Field names become columns and must
    /// pass the schema-injection guard.
    pub fn open<C: Codec<T> + 'static>(
        path: impl AsRef<Path>,
        codec: C,
        version_func: VersionFunc<T>,
        indexers: Indexers<T>,
        field_funcs: HashMap<String, FieldFunc<T>>,
    ) -> Result<Self> {
        let mut funcs: Vec<(String, FieldFunc<T>)> = field_funcs.into_iter().collect();
        funcs.sort_by(|a, b| a.0.cmp(&b.0));
        let fields: Vec<String> = funcs.iter().map(|(name, _)| name.clone()).collect();

        let db = Arc::new(DbHandle::open(path, &fields)?);
        let mut indexer = Indexer::with_handle(db, Arc::new(codec), indexers)?;

        // Field columns must be current before the history hook copies the
        // objects row, so this hook is registered first.
        if !fields.is_empty() {
            let update_sql = field_update_sql(&fields);
            indexer.register_after_upsert(Box::new(
                move |tx: &rusqlite::Transaction<'_>, key: &str, obj: &T| {
                    let values: Vec<FieldValue> = funcs.iter().map(|(_, f)| f(obj)).collect();
                    let mut bind: Vec<&dyn ToSql> =
                        values.iter().map(|v| v as &dyn ToSql).collect();
                    bind.push(&key);
                    tx.prepare_cached(&update_sql)?.execute(&bind[..])?;
                    Ok(())
                },
            ));
        }

        let inner = VersionedIndexer::attach(indexer, version_func, &fields)?;
        debug!(fields = fields.len(), "field columns declared");
        Ok(Self { inner, fields })
    }

    /// Names of the registered fields, sorted.
    pub fn field_names(&self) -> &[String] {
        &self.fields
    }

    /// Execute a filtered, sorted, paginated list query at the latest or
    /// a historical revision.
    pub fn list_by_options(&self, opts: &ListOptions) -> Result<Vec<T>> {
        let mut sql = String::with_capacity(256);
        let mut bind: Vec<Box<dyn ToSql>> = Vec::new();
        let mut has_where;

        if opts.revision.is_empty() {
            sql.push_str("SELECT object FROM objects");
            has_where = false;
        } else {
            let revision: i64 = opts
                .revision
                .parse()
                .map_err(|_| CacheError::InvalidRevision(opts.revision.clone()))?;
            sql.push_str(HISTORY_SOURCE_SQL);
            bind.push(Box::new(revision));
            bind.push(Box::new(revision));
            has_where = true;
        }

        for filter in &opts.filters {
            let column = self.column(&filter.field)?;
            sql.push_str(if has_where { " AND " } else { " WHERE " });
            has_where = true;
            sql.push_str(&format!("\"{column}\" LIKE '%' || ? || '%'"));
            bind.push(Box::new(filter.contains.clone()));
        }

        if !opts.sort.primary_field.is_empty() {
            let column = self.column(&opts.sort.primary_field)?;
            sql.push_str(&format!(
                " ORDER BY \"{column}\" {}",
                opts.sort.primary_order.as_sql()
            ));
            if !opts.sort.secondary_field.is_empty() {
                let column = self.column(&opts.sort.secondary_field)?;
                sql.push_str(&format!(
                    ", \"{column}\" {}",
                    opts.sort.secondary_order.as_sql()
                ));
            }
        }

        if opts.pagination.page_size > 0 {
            let page_size = i64::from(opts.pagination.page_size);
            let page = i64::from(opts.pagination.page.max(1));
            sql.push_str(" LIMIT ? OFFSET ?");
            bind.push(Box::new(page_size));
            bind.push(Box::new(page_size * (page - 1)));
        }

        let params: Vec<&dyn ToSql> = bind.iter().map(|b| b.as_ref()).collect();
        self.inner.query_objects(&sql, &params[..])
    }

    /// Resolve a dotted field path to its registered column name.
    fn column(&self, path: &[String]) -> Result<String> {
        let name = path.join(".");
        if self.fields.iter().any(|f| *f == name) {
            Ok(name)
        } else {
            Err(CacheError::UnknownField(name))
        }
    }

    /// Fetch the exact `(key, version)` history row; see
    /// [`VersionedIndexer::get_by_key_and_version`].
    pub fn get_by_key_and_version(
        &self,
        key: &str,
        version: i64,
        include_deleted: bool,
    ) -> Result<Option<T>> {
        self.inner.get_by_key_and_version(key, version, include_deleted)
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

    pub fn replace(&self, objects: &HashMap<String, T>) -> Result<()> {
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
}

fn field_update_sql(fields: &[String]) -> String {
    let assignments: Vec<String> = fields.iter().map(|f| format!("\"{f}\" = ?")).collect();
    format!(
        "UPDATE objects SET {} WHERE key = ?",
        assignments.join(", ")
    )
}
