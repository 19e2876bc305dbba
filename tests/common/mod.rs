//! Shared fixtures for the integration tests: the `Car` object shape and
//! the user functions the cache consumes.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use hindsight::{FieldFunc, FieldValue, IndexFunc, Indexers, KeyFunc, VersionFunc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Car {
    pub key: String,
    pub revision: i64,
    pub wheels: i64,
    pub brand: String,
    pub color: String,
}

pub fn car(key: &str, revision: i64, wheels: i64, brand: &str, color: &str) -> Car {
    Car {
        key: key.to_string(),
        revision,
        wheels,
        brand: brand.to_string(),
        color: color.to_string(),
    }
}

pub fn key_func() -> KeyFunc<Car> {
    Arc::new(|c: &Car| Ok(c.key.clone()))
}

pub fn version_func() -> VersionFunc<Car> {
    Arc::new(|c: &Car| Ok(c.revision))
}

pub fn brand_index() -> IndexFunc<Car> {
    Arc::new(|c: &Car| Ok(vec![c.brand.clone()]))
}

pub fn brand_indexers() -> Indexers<Car> {
    let mut indexers: Indexers<Car> = HashMap::new();
    indexers.insert("by-brand".to_string(), brand_index());
    indexers
}

pub fn field_funcs() -> HashMap<String, FieldFunc<Car>> {
    let mut fields: HashMap<String, FieldFunc<Car>> = HashMap::new();
    fields.insert(
        "Brand".to_string(),
        Arc::new(|c: &Car| FieldValue::from(c.brand.as_str())),
    );
    fields.insert(
        "Color".to_string(),
        Arc::new(|c: &Car| FieldValue::from(c.color.as_str())),
    );
    fields.insert(
        "Wheels".to_string(),
        Arc::new(|c: &Car| FieldValue::from(c.wheels)),
    );
    fields
}
