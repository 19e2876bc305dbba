//! Collaborator-facing store surfaces
//!
//! The indexer layers work with explicit keys; the change-feed side of the
//! ecosystem works with whole objects and derives keys through an injected
//! function. [`Store`] bridges the two: every operation is fallible, and
//! the key function is the only extra moving part.
//!
//! For drivers whose interface cannot carry errors there is
//! [`threadsafe::ThreadSafeStore`], the crate's single panicking layer.

pub mod threadsafe;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::indexer::listoption::ListOptionIndexer;
use crate::indexer::versioned::VersionedIndexer;
use crate::indexer::Indexer;

/// Derives the storage key of an object.
pub type KeyFunc<T> = Arc<dyn Fn(&T) -> Result<String> + Send + Sync>;

/// The keyed operations every indexer layer provides; the seam the store
/// surfaces are generic over.
pub trait Backend<T>: Send + Sync {
    fn upsert(&self, key: &str, obj: &T) -> Result<()>;
    fn delete_by_key(&self, key: &str) -> Result<()>;
    fn get_by_key(&self, key: &str) -> Result<Option<T>>;
    fn list(&self) -> Result<Vec<T>>;
    fn list_keys(&self) -> Result<Vec<String>>;
    fn replace(&self, objects: &HashMap<String, T>) -> Result<()>;
    fn close(&self) -> Result<()>;
}

impl<T> Backend<T> for Indexer<T> {
    fn upsert(&self, key: &str, obj: &T) -> Result<()> {
        Indexer::upsert(self, key, obj)
    }

    fn delete_by_key(&self, key: &str) -> Result<()> {
        Indexer::delete_by_key(self, key)
    }

    fn get_by_key(&self, key: &str) -> Result<Option<T>> {
        Indexer::get_by_key(self, key)
    }

    fn list(&self) -> Result<Vec<T>> {
        Indexer::list(self)
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        Indexer::list_keys(self)
    }

    fn replace(&self, objects: &HashMap<String, T>) -> Result<()> {
        Indexer::replace(self, objects)
    }

    fn close(&self) -> Result<()> {
        Indexer::close(self)
    }
}

impl<T: 'static> Backend<T> for VersionedIndexer<T> {
    fn upsert(&self, key: &str, obj: &T) -> Result<()> {
        VersionedIndexer::upsert(self, key, obj)
    }

    fn delete_by_key(&self, key: &str) -> Result<()> {
        VersionedIndexer::delete_by_key(self, key)
    }

    fn get_by_key(&self, key: &str) -> Result<Option<T>> {
        VersionedIndexer::get_by_key(self, key)
    }

    fn list(&self) -> Result<Vec<T>> {
        VersionedIndexer::list(self)
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        VersionedIndexer::list_keys(self)
    }

    fn replace(&self, objects: &HashMap<String, T>) -> Result<()> {
        VersionedIndexer::replace(self, objects)
    }

    fn close(&self) -> Result<()> {
        VersionedIndexer::close(self)
    }
}

impl<T: 'static> Backend<T> for ListOptionIndexer<T> {
    fn upsert(&self, key: &str, obj: &T) -> Result<()> {
        ListOptionIndexer::upsert(self, key, obj)
    }

    fn delete_by_key(&self, key: &str) -> Result<()> {
        ListOptionIndexer::delete_by_key(self, key)
    }

    fn get_by_key(&self, key: &str) -> Result<Option<T>> {
        ListOptionIndexer::get_by_key(self, key)
    }

    fn list(&self) -> Result<Vec<T>> {
        ListOptionIndexer::list(self)
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        ListOptionIndexer::list_keys(self)
    }

    fn replace(&self, objects: &HashMap<String, T>) -> Result<()> {
        ListOptionIndexer::replace(self, objects)
    }

    fn close(&self) -> Result<()> {
        ListOptionIndexer::close(self)
    }
}

/// Object-oriented store surface: keys are derived from objects through
/// the injected [`KeyFunc`].
pub struct Store<T, B: Backend<T>> {
    backend: B,
    key_func: KeyFunc<T>,
}

impl<T, B: Backend<T>> Store<T, B> {
    pub fn new(backend: B, key_func: KeyFunc<T>) -> Self {
        Self { backend, key_func }
    }

    /// Insert or update `obj` under its derived key.
    pub fn add(&self, obj: &T) -> Result<()> {
        let key = (self.key_func)(obj)?;
        self.backend.upsert(&key, obj)
    }

    /// Same as [`Store::add`]; both feed the same upsert.
    pub fn update(&self, obj: &T) -> Result<()> {
        self.add(obj)
    }

    /// Delete the object stored under `obj`'s derived key.
    pub fn delete(&self, obj: &T) -> Result<()> {
        let key = (self.key_func)(obj)?;
        self.backend.delete_by_key(&key)
    }

    /// Fetch the stored object sharing `obj`'s derived key.
    pub fn get(&self, obj: &T) -> Result<Option<T>> {
        let key = (self.key_func)(obj)?;
        self.backend.get_by_key(&key)
    }

    pub fn get_by_key(&self, key: &str) -> Result<Option<T>> {
        self.backend.get_by_key(key)
    }

    pub fn list(&self) -> Result<Vec<T>> {
        self.backend.list()
    }

    pub fn list_keys(&self) -> Result<Vec<String>> {
        self.backend.list_keys()
    }

    /// Replace the whole store contents with `objects`, keyed through the
    /// key function, in one transaction.
    pub fn replace(&self, objects: Vec<T>) -> Result<()> {
        let mut keyed = HashMap::with_capacity(objects.len());
        for obj in objects {
            let key = (self.key_func)(&obj)?;
            keyed.insert(key, obj);
        }
        self.backend.replace(&keyed)
    }

    /// No-op, retained for change-feed driver compatibility.
    pub fn resync(&self) -> Result<()> {
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        self.backend.close()
    }

    /// The wrapped backend, for operations beyond the store surface
    /// (index lookups, list queries, historical reads).
    pub fn backend(&self) -> &B {
        &self.backend
    }
}
