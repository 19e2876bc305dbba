//! Error-less store surface for the change-feed driver
//!
//! The driver's interface takes explicit keys and cannot return errors.
//! This wrapper is the crate's single process-termination layer: every
//! method delegates to the fallible backend and panics with the wrapped
//! cause when storage fails. Prefer [`crate::Store`] anywhere the caller
//! can handle a `Result`.

use std::collections::HashMap;
use std::marker::PhantomData;

use super::Backend;
use crate::error::CacheError;

/// Explicit-key store whose contract disallows returning errors.
pub struct ThreadSafeStore<T, B: Backend<T>> {
    backend: B,
    _object: PhantomData<fn() -> T>,
}

impl<T, B: Backend<T>> ThreadSafeStore<T, B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            _object: PhantomData,
        }
    }

    /// Insert or update `obj` under `key`.
    ///
    /// # Panics
    ///
    /// Panics on storage failure; the interface has no error channel.
    pub fn add(&self, key: &str, obj: &T) {
        if let Err(e) = self.backend.upsert(key, obj) {
            fail("add", e);
        }
    }

    /// Same as [`ThreadSafeStore::add`].
    pub fn update(&self, key: &str, obj: &T) {
        self.add(key, obj);
    }

    /// Delete the object under `key`.
    ///
    /// # Panics
    ///
    /// Panics on storage failure.
    pub fn delete(&self, key: &str) {
        if let Err(e) = self.backend.delete_by_key(key) {
            fail("delete", e);
        }
    }

    /// Fetch the object under `key`, if present.
    ///
    /// # Panics
    ///
    /// Panics on storage failure.
    pub fn get(&self, key: &str) -> Option<T> {
        match self.backend.get_by_key(key) {
            Ok(item) => item,
            Err(e) => fail("get", e),
        }
    }

    /// All current objects.
    ///
    /// # Panics
    ///
    /// Panics on storage failure.
    pub fn list(&self) -> Vec<T> {
        match self.backend.list() {
            Ok(items) => items,
            Err(e) => fail("list", e),
        }
    }

    /// All current keys.
    ///
    /// # Panics
    ///
    /// Panics on storage failure.
    pub fn list_keys(&self) -> Vec<String> {
        match self.backend.list_keys() {
            Ok(keys) => keys,
            Err(e) => fail("list_keys", e),
        }
    }

    /// Replace the whole store contents.
    ///
    /// # Panics
    ///
    /// Panics on storage failure.
    pub fn replace(&self, objects: HashMap<String, T>) {
        if let Err(e) = self.backend.replace(&objects) {
            fail("replace", e);
        }
    }

    /// No-op, retained for driver compatibility.
    pub fn resync(&self) {}

    /// The wrapped backend, for fallible access alongside this surface.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

/// The interface disallows surfacing errors, so storage failures are
/// unrecoverable here.
fn fail(operation: &str, err: CacheError) -> ! {
    panic!("unrecoverable cache failure in ThreadSafeStore::{operation}: {err}")
}
