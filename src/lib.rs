#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # Hindsight
//!
//! Hindsight is a durable, disk-backed object cache for controllers that
//! watch a cluster control plane. It replaces an in-memory cache with an
//! embedded SQLite database, trading a little latency for bounded memory
//! and rich queries.
//!
//! ## Features
//!
//! - **Keyed object storage**: opaque objects stored under caller-chosen
//!   string keys through an injected codec
//! - **Secondary indices**: named functions derive string values per
//!   object; lookups by value are index-backed
//! - **Revision history**: every write is retained per `(key, version)`,
//!   with tombstones on delete, so reads can time-travel
//! - **List queries**: field-filtered, sorted, paginated lists at the
//!   latest or a historical revision
//! - **Single-writer discipline**: every write is one transaction; the
//!   cache is rebuildable from its change feed and never authoritative
//!
//! ## Layers
//!
//! - [`Indexer`]: CRUD plus secondary-index maintenance
//! - [`VersionedIndexer`]: adds per-revision history and tombstones
//! - [`ListOptionIndexer`]: adds field columns and the list-query planner
//! - [`Store`] / [`ThreadSafeStore`]: the collaborator surfaces driven by
//!   a change feed
//!
//! ## Example
//!
//! ```no_run
//! use hindsight::{
//!     FieldFunc, FieldValue, Filter, JsonCodec, ListOptionIndexer, ListOptions,
//! };
//! use serde::{Deserialize, Serialize};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Pod {
//!     name: String,
//!     revision: i64,
//!     namespace: String,
//! }
//!
//! fn main() -> hindsight::Result<()> {
//!     let mut fields: HashMap<String, FieldFunc<Pod>> = HashMap::new();
//!     fields.insert(
//!         "Namespace".to_string(),
//!         Arc::new(|p: &Pod| FieldValue::from(p.namespace.as_str())),
//!     );
//!
//!     let cache = ListOptionIndexer::open(
//!         "./pods.sqlite",
//!         JsonCodec::new(),
//!         Arc::new(|p: &Pod| Ok(p.revision)),
//!         HashMap::new(),
//!         fields,
//!     )?;
//!
//!     cache.upsert(
//!         "default/web",
//!         &Pod {
//!             name: "web".to_string(),
//!             revision: 1,
//!             namespace: "default".to_string(),
//!         },
//!     )?;
//!
//!     let pods = cache.list_by_options(&ListOptions {
//!         filters: vec![Filter {
//!             field: vec!["Namespace".to_string()],
//!             contains: "def".to_string(),
//!         }],
//!         ..Default::default()
//!     })?;
//!     assert_eq!(pods.len(), 1);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod db;
pub mod error;
pub mod indexer;
pub mod store;

pub use codec::{BincodeCodec, Codec, JsonCodec};
pub use db::DbHandle;
pub use error::{CacheError, Result};
pub use indexer::listoption::{
    FieldFunc, FieldValue, Filter, ListOptionIndexer, ListOptions, Pagination, Sort, SortOrder,
};
pub use indexer::versioned::{VersionFunc, VersionedIndexer};
pub use indexer::{IndexFunc, Indexer, Indexers};
pub use store::threadsafe::ThreadSafeStore;
pub use store::{Backend, KeyFunc, Store};

/// Current version of Hindsight
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
