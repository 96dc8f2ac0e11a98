//! Document-type metadata.
//!
//! The metadata registry is the static description of every mapped type:
//! which fields it persists, which relations it owns and through which
//! stored field, and how ids are assigned. Accessors resolve field and
//! relation definitions through these maps, built once at registration
//! time. The registry is an explicit object owned by the mapper, never
//! process-global state.

use crate::core::{OdmError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Declared storage type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Float,
    Text,
    Boolean,
    Date,
    Binary,
    Array,
    Map,
    /// Any value; used for id-bearing reference fields.
    Raw,
}

/// How ids are assigned to new documents of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IdStrategy {
    /// Generated client-side on first save (uuid v4).
    #[default]
    Native,
    /// Assigned by the caller before save; saving without one is an error.
    None,
}

#[derive(Debug, Clone)]
pub struct ReferenceOneDef {
    /// Stored field holding the referenced id.
    pub field: String,
    /// Referenced document type.
    pub target: String,
}

#[derive(Debug, Clone)]
pub struct ReferenceManyDef {
    /// Stored field holding the id list (or `{id, discriminator}` list).
    pub field: String,
    pub target: ReferenceTarget,
}

#[derive(Debug, Clone)]
pub enum ReferenceTarget {
    /// All members share one document type.
    Type(String),
    /// Member type resolved per entry through a discriminator.
    Polymorphic {
        discriminator_field: String,
        /// Maps discriminator values to type names. When absent the
        /// discriminator value is the type name itself.
        discriminator_map: Option<BTreeMap<String, String>>,
    },
}

#[derive(Debug, Clone)]
pub struct EmbeddedDef {
    /// Embedded document type.
    pub target: String,
}

/// Static description of one mapped document type.
#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    name: String,
    collection: Option<String>,
    id_strategy: IdStrategy,
    fields: BTreeMap<String, FieldType>,
    references_one: BTreeMap<String, ReferenceOneDef>,
    references_many: BTreeMap<String, ReferenceManyDef>,
    embeddeds_one: BTreeMap<String, EmbeddedDef>,
    embeddeds_many: BTreeMap<String, EmbeddedDef>,
}

impl DocumentMetadata {
    /// Metadata for a root document type persisted in `collection`.
    pub fn new(name: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: Some(collection.into()),
            id_strategy: IdStrategy::default(),
            fields: BTreeMap::new(),
            references_one: BTreeMap::new(),
            references_many: BTreeMap::new(),
            embeddeds_one: BTreeMap::new(),
            embeddeds_many: BTreeMap::new(),
        }
    }

    /// Metadata for an embedded document type (no collection, no identity).
    pub fn embedded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: None,
            id_strategy: IdStrategy::None,
            fields: BTreeMap::new(),
            references_one: BTreeMap::new(),
            references_many: BTreeMap::new(),
            embeddeds_one: BTreeMap::new(),
            embeddeds_many: BTreeMap::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(name.into(), field_type);
        self
    }

    pub fn id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    /// Declares a single-valued reference; the id-bearing field is added to
    /// the field set automatically.
    pub fn reference_one(
        mut self,
        name: impl Into<String>,
        field: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        let field = field.into();
        self.fields.insert(field.clone(), FieldType::Raw);
        self.references_one.insert(
            name.into(),
            ReferenceOneDef {
                field,
                target: target.into(),
            },
        );
        self
    }

    /// Declares a collection-valued reference backed by an id-list field.
    pub fn reference_many(
        mut self,
        name: impl Into<String>,
        field: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        let field = field.into();
        self.fields.insert(field.clone(), FieldType::Array);
        self.references_many.insert(
            name.into(),
            ReferenceManyDef {
                field,
                target: ReferenceTarget::Type(target.into()),
            },
        );
        self
    }

    /// Declares a collection-valued reference whose member types are
    /// resolved through a discriminator stored with each id.
    pub fn polymorphic_reference_many(
        mut self,
        name: impl Into<String>,
        field: impl Into<String>,
        discriminator_field: impl Into<String>,
        discriminator_map: Option<BTreeMap<String, String>>,
    ) -> Self {
        let field = field.into();
        self.fields.insert(field.clone(), FieldType::Array);
        self.references_many.insert(
            name.into(),
            ReferenceManyDef {
                field,
                target: ReferenceTarget::Polymorphic {
                    discriminator_field: discriminator_field.into(),
                    discriminator_map,
                },
            },
        );
        self
    }

    pub fn embedded_one(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.embeddeds_one.insert(
            name.into(),
            EmbeddedDef {
                target: target.into(),
            },
        );
        self
    }

    pub fn embedded_many(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.embeddeds_many.insert(
            name.into(),
            EmbeddedDef {
                target: target.into(),
            },
        );
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage collection name; `None` for embedded types.
    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn id_generation(&self) -> IdStrategy {
        self.id_strategy
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldType> {
        &self.fields
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn references_one(&self) -> &BTreeMap<String, ReferenceOneDef> {
        &self.references_one
    }

    pub fn references_many(&self) -> &BTreeMap<String, ReferenceManyDef> {
        &self.references_many
    }

    pub fn embeddeds_one(&self) -> &BTreeMap<String, EmbeddedDef> {
        &self.embeddeds_one
    }

    pub fn embeddeds_many(&self) -> &BTreeMap<String, EmbeddedDef> {
        &self.embeddeds_many
    }
}

/// Registry of every mapped type, built once and handed to the mapper.
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    types: BTreeMap<String, Arc<DocumentMetadata>>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, metadata: DocumentMetadata) {
        self.types
            .insert(metadata.name().to_string(), Arc::new(metadata));
    }

    pub fn get(&self, name: &str) -> Result<Arc<DocumentMetadata>> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| OdmError::UnknownType(name.to_string()))
    }

    pub fn has(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn type_names(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }
}
