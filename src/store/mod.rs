//! External store contract.
//!
//! The engine never owns a wire protocol or file format; everything it
//! persists goes through this trait. Implementations wrap whatever backend
//! actually holds the records.

pub mod memory;

pub use memory::{MemoryStore, StoreStats};

use crate::core::{Result, Value};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Stored shape of a document: field name to value, id under [`ID_FIELD`].
pub type Record = BTreeMap<String, Value>;

/// Record key holding a document's id.
pub const ID_FIELD: &str = "_id";

/// Selects the records an operation applies to.
#[derive(Debug, Clone)]
pub enum Filter {
    All,
    Ids(Vec<Value>),
}

/// Pluggable storage backend.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetches the records with the given ids. Missing ids are simply
    /// absent from the result.
    async fn find_by_ids(&self, collection: &str, ids: &[Value]) -> Result<Vec<Record>>;

    /// Inserts a batch of records (each carrying its id) and returns the
    /// inserted ids in order.
    async fn insert_batch(&self, collection: &str, records: Vec<Record>) -> Result<Vec<Value>>;

    /// Merges `update`'s entries into every matching record; a `Null` entry
    /// unsets the field. Returns the number of records touched.
    async fn update_many(&self, collection: &str, filter: Filter, update: Record) -> Result<u64>;

    /// Deletes every matching record, returning how many were removed.
    async fn delete_many(&self, collection: &str, filter: Filter) -> Result<u64>;

    /// Counts matching records.
    async fn count(&self, collection: &str, filter: Filter) -> Result<u64>;
}
