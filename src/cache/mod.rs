//! Query hints.
//!
//! Documents remember the hashes of the queries that loaded them. When a
//! field or reference outside the loaded projection is accessed, the hint
//! stored under every one of those hashes is widened so future runs of the
//! same query can project wider up front. Hints only ever widen.

pub mod file;
pub mod memory;

pub use file::FilesystemHintCache;
pub use memory::MemoryHintCache;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

lazy_static! {
    // positional segments ("comments.3.body") carry no projection meaning
    static ref POSITIONAL_SEGMENT: Regex = Regex::new(r"\.\d+").unwrap();
}

/// Strips positional path segments from a dotted field path.
pub(crate) fn normalize_field_path(path: &str) -> String {
    POSITIONAL_SEGMENT.replace_all(path, "").into_owned()
}

/// Which fields and references a query has historically needed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryHint {
    pub fields: BTreeSet<String>,
    pub references: BTreeSet<String>,
}

impl QueryHint {
    /// Adds a field, returning whether the hint actually grew.
    pub fn widen_field(&mut self, field: &str) -> bool {
        self.fields.insert(field.to_string())
    }

    /// Adds a reference, returning whether the hint actually grew.
    pub fn widen_reference(&mut self, reference: &str) -> bool {
        self.references.insert(reference.to_string())
    }
}

/// Key/value storage for hints, keyed by query hash.
pub trait HintCache: Send + Sync {
    fn get(&self, hash: &str) -> Option<QueryHint>;
    fn set(&self, hash: &str, hint: QueryHint);
}
