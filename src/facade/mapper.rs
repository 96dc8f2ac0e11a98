//! The mapper facade.
//!
//! One `Mapper` owns everything a session needs: the store handle, the
//! metadata registry, the id-generator registry, an optional hint cache,
//! lazily-created per-type repositories and the session's unit of work.
//! It is the explicit container that replaces any process-global lookup
//! state; components reach back to it through non-owning references.
//!
//! # Examples
//!
//! ```
//! use rustodm::{DocumentMetadata, FieldType, Mapper, MemoryStore, Value};
//! use std::sync::Arc;
//!
//! # fn main() -> rustodm::Result<()> {
//! # tokio_test::block_on(async {
//! let mapper = Mapper::builder(Arc::new(MemoryStore::new()))
//!     .register(
//!         DocumentMetadata::new("article", "articles")
//!             .field("title", FieldType::Text),
//!     )
//!     .build();
//!
//! let article = mapper.create("article")?;
//! article.set("title", "Hello")?;
//! mapper.persist(&article);
//! mapper.flush().await?;
//!
//! assert!(!article.is_new());
//! assert_eq!(article.get("title")?, Value::from("Hello"));
//! # Ok(())
//! # })
//! # }
//! ```

use crate::cache::HintCache;
use crate::core::{OdmError, Result};
use crate::document::{DocumentHandle, EmbeddedHandle};
use crate::id::{IdGenerator, IdGeneratorRegistry};
use crate::metadata::{DocumentMetadata, IdStrategy, MetadataRegistry};
use crate::repository::Repository;
use crate::store::Store;
use crate::unit_of_work::UnitOfWork;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

pub struct Mapper {
    store: Arc<dyn Store>,
    metadata: MetadataRegistry,
    id_generators: IdGeneratorRegistry,
    hint_cache: Option<Arc<dyn HintCache>>,
    repositories: Mutex<HashMap<String, Arc<Repository>>>,
    unit_of_work: UnitOfWork,
    self_ref: Weak<Mapper>,
}

impl Mapper {
    pub fn builder(store: Arc<dyn Store>) -> MapperBuilder {
        MapperBuilder {
            store,
            metadata: MetadataRegistry::new(),
            id_generators: IdGeneratorRegistry::new(),
            hint_cache: None,
        }
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub fn metadata(&self) -> &MetadataRegistry {
        &self.metadata
    }

    pub fn hint_cache(&self) -> Option<Arc<dyn HintCache>> {
        self.hint_cache.clone()
    }

    pub(crate) fn id_generators(&self) -> &IdGeneratorRegistry {
        &self.id_generators
    }

    /// The repository for a root document type, created on first access.
    pub fn repository(&self, type_name: &str) -> Result<Arc<Repository>> {
        {
            let repositories = self
                .repositories
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if let Some(repository) = repositories.get(type_name) {
                return Ok(repository.clone());
            }
        }
        let metadata = self.metadata.get(type_name)?;
        let repository = Arc::new(Repository::new(
            metadata,
            self.self_ref.clone(),
            self.store.clone(),
        )?);
        let mut repositories = self
            .repositories
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        Ok(repositories
            .entry(type_name.to_string())
            .or_insert(repository)
            .clone())
    }

    /// Creates a new (unsaved) root document of a registered type.
    pub fn create(&self, type_name: &str) -> Result<DocumentHandle> {
        let metadata = self.metadata.get(type_name)?;
        if metadata.collection().is_none() {
            return Err(OdmError::ExecutionError(format!(
                "'{}' is an embedded type; use create_embedded",
                type_name
            )));
        }
        Ok(DocumentHandle::new(metadata, self.self_ref.clone()))
    }

    /// Creates a new embedded document of a registered embedded type.
    pub fn create_embedded(&self, type_name: &str) -> Result<EmbeddedHandle> {
        let metadata = self.metadata.get(type_name)?;
        Ok(EmbeddedHandle::new(metadata, self.self_ref.clone()))
    }

    pub fn unit_of_work(&self) -> &UnitOfWork {
        &self.unit_of_work
    }

    /// Stages a document for persist in the session's unit of work.
    pub fn persist(&self, document: &DocumentHandle) {
        self.unit_of_work.persist(std::slice::from_ref(document));
    }

    /// Stages a document for removal in the session's unit of work.
    pub fn remove(&self, document: &DocumentHandle) {
        self.unit_of_work.remove(std::slice::from_ref(document));
    }

    /// Commits the session's unit of work.
    pub async fn flush(&self) -> Result<()> {
        self.unit_of_work.commit().await
    }
}

/// Fluent construction for [`Mapper`].
pub struct MapperBuilder {
    store: Arc<dyn Store>,
    metadata: MetadataRegistry,
    id_generators: IdGeneratorRegistry,
    hint_cache: Option<Arc<dyn HintCache>>,
}

impl MapperBuilder {
    pub fn register(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata.register(metadata);
        self
    }

    pub fn hint_cache(mut self, cache: Arc<dyn HintCache>) -> Self {
        self.hint_cache = Some(cache);
        self
    }

    pub fn id_generator(mut self, strategy: IdStrategy, generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generators.set(strategy, generator);
        self
    }

    pub fn build(self) -> Arc<Mapper> {
        Arc::new_cyclic(|self_ref| Mapper {
            store: self.store,
            metadata: self.metadata,
            id_generators: self.id_generators,
            hint_cache: self.hint_cache,
            repositories: Mutex::new(HashMap::new()),
            unit_of_work: UnitOfWork::new(self_ref.clone()),
            self_ref: self_ref.clone(),
        })
    }
}
