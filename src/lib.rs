// ============================================================================
// RustODM Library
// ============================================================================
//
// The persistence-state engine of a document-mapping layer: dirty-field
// tracking, identity-map deduplication, lazily-materialized relation groups
// with staged add/remove diffing, and deferred unit-of-work commits over a
// pluggable store.
//
// ============================================================================

pub mod cache;
pub mod core;
pub mod document;
pub mod facade;
pub mod group;
pub mod id;
pub mod identity;
pub mod loader;
pub mod metadata;
pub mod repository;
pub mod store;
pub mod unit_of_work;

// Re-export main types for convenience
pub use crate::core::{OdmError, Result, Slot, Value};
pub use cache::{FilesystemHintCache, HintCache, MemoryHintCache, QueryHint};
pub use document::{DocumentHandle, EmbeddedHandle, RootAndPath};
pub use facade::{Mapper, MapperBuilder};
pub use group::{
    EmbeddedGroup, PolymorphicReferenceGroup, ReferenceGroup, ReferenceGroupHandle,
};
pub use id::{IdGenerator, IdGeneratorRegistry, NativeIdGenerator, NoneIdGenerator};
pub use identity::IdentityMap;
pub use loader::DataLoader;
pub use metadata::{
    DocumentMetadata, FieldType, IdStrategy, MetadataRegistry, ReferenceTarget,
};
pub use repository::Repository;
pub use store::{Filter, MemoryStore, Record, Store, StoreStats, ID_FIELD};
pub use unit_of_work::UnitOfWork;
