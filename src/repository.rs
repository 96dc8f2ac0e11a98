// ============================================================================
// Repository
// ============================================================================
//
// The per-type collaborator between documents and the store. It owns the
// type's identity map, hydrates records into resident instances, and turns
// batched save/delete requests into store calls: one insert batch for new
// documents, one targeted update per modified document, one delete batch
// for removals. Pending reference-group edits are folded back into the
// parent's stored id-list fields before serialization.
//
// ============================================================================

use crate::core::{OdmError, Result, Value};
use crate::document::DocumentHandle;
use crate::group::ReferenceGroupHandle;
use crate::identity::IdentityMap;
use crate::metadata::DocumentMetadata;
use crate::store::{Filter, Record, Store, ID_FIELD};
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

pub struct Repository {
    metadata: Arc<DocumentMetadata>,
    collection: String,
    mapper: Weak<crate::facade::Mapper>,
    store: Arc<dyn Store>,
    identity_map: IdentityMap,
}

impl Repository {
    pub(crate) fn new(
        metadata: Arc<DocumentMetadata>,
        mapper: Weak<crate::facade::Mapper>,
        store: Arc<dyn Store>,
    ) -> Result<Self> {
        let collection = metadata
            .collection()
            .ok_or_else(|| {
                OdmError::ExecutionError(format!(
                    "embedded type '{}' has no repository",
                    metadata.name()
                ))
            })?
            .to_string();
        Ok(Self {
            metadata,
            collection,
            mapper,
            store,
            identity_map: IdentityMap::new(),
        })
    }

    pub fn metadata(&self) -> Arc<DocumentMetadata> {
        self.metadata.clone()
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    pub fn identity_map(&self) -> &IdentityMap {
        &self.identity_map
    }

    fn mapper(&self) -> Result<Arc<crate::facade::Mapper>> {
        self.mapper.upgrade().ok_or_else(|| {
            OdmError::Detached(format!("mapper gone for repository '{}'", self.metadata.name()))
        })
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Turns a stored record into the resident instance for its id: a
    /// document already in the identity map is refreshed and reused, a new
    /// one is created, populated and registered.
    pub(crate) fn hydrate(&self, record: &Record) -> Result<DocumentHandle> {
        let id = record.get(ID_FIELD).cloned().ok_or_else(|| {
            OdmError::StoreError(format!(
                "record from '{}' carries no '{}' field",
                self.collection, ID_FIELD
            ))
        })?;
        let key = id.to_key();
        if let Some(resident) = self.identity_map.get(&key) {
            resident.set_document_data(record, true, None)?;
            return Ok(resident);
        }
        let mapper = self.mapper()?;
        let document = mapper.create(self.metadata.name())?;
        document.set_document_data(record, true, None)?;
        self.identity_map.set(key, document.clone());
        Ok(document)
    }

    /// Bulk load by id. Resident ids are served from the identity map and
    /// only the remainder is fetched; ids that resolve nowhere are absent
    /// from the result. Keys are the string form of the id.
    pub async fn find_by_ids(&self, ids: &[Value]) -> Result<HashMap<String, DocumentHandle>> {
        let mut found = HashMap::new();
        let mut remaining = Vec::new();
        for id in ids {
            let key = id.to_key();
            if found.contains_key(&key) {
                continue;
            }
            match self.identity_map.get(&key) {
                Some(document) => {
                    found.insert(key, document);
                }
                None => remaining.push(id.clone()),
            }
        }
        if remaining.is_empty() {
            return Ok(found);
        }
        debug!(
            "'{}': {} resident, fetching {} id(s)",
            self.metadata.name(),
            found.len(),
            remaining.len()
        );
        let records = self.store.find_by_ids(&self.collection, &remaining).await?;
        for record in &records {
            let document = self.hydrate(record)?;
            if let Some(key) = document.id_key() {
                found.insert(key, document);
            }
        }
        Ok(found)
    }

    pub async fn find_one_by_id(&self, id: &Value) -> Result<Option<DocumentHandle>> {
        let key = id.to_key();
        if let Some(document) = self.identity_map.get(&key) {
            return Ok(Some(document));
        }
        let records = self
            .store
            .find_by_ids(&self.collection, std::slice::from_ref(id))
            .await?;
        match records.first() {
            Some(record) => Ok(Some(self.hydrate(record)?)),
            None => Ok(None),
        }
    }

    /// Raw record fetch, bypassing hydration; used for full reloads.
    pub(crate) async fn fetch_record(&self, id: &Value) -> Result<Option<Record>> {
        let records = self
            .store
            .find_by_ids(&self.collection, std::slice::from_ref(id))
            .await?;
        Ok(records.into_iter().next())
    }

    // ------------------------------------------------------------------
    // Saving
    // ------------------------------------------------------------------

    /// Saves a batch: new documents get ids assigned and go out in one
    /// insert batch; already-persisted documents that report modifications
    /// each get a targeted update. Documents with nothing to write are
    /// skipped. Afterwards every saved document is clean, not new, and
    /// resident in the identity map.
    pub async fn save(&self, documents: &[DocumentHandle]) -> Result<()> {
        let mapper = self.mapper()?;
        let mut inserts: Vec<(DocumentHandle, Record)> = Vec::new();
        let mut updates: Vec<(DocumentHandle, Value, Record)> = Vec::new();

        for document in documents {
            self.check_type(document)?;
            self.sync_reference_fields(document).await?;
            if document.is_new() {
                if document.id().is_none() {
                    match mapper
                        .id_generators()
                        .generate(self.metadata.id_generation(), self.metadata.name())?
                    {
                        Some(id) => document.set_id(id),
                        None => {
                            return Err(OdmError::MissingId(format!(
                                "'{}' uses caller-assigned ids but none was set",
                                self.metadata.name()
                            )))
                        }
                    }
                }
                inserts.push((document.clone(), document.to_record()?));
            } else {
                if !document.is_modified() {
                    continue;
                }
                let id = document.id().ok_or_else(|| {
                    OdmError::MissingId(format!(
                        "persisted '{}' lost its id",
                        self.metadata.name()
                    ))
                })?;
                let update = document.update_record()?;
                if update.is_empty() {
                    continue;
                }
                updates.push((document.clone(), id, update));
            }
        }

        if !inserts.is_empty() {
            debug!(
                "'{}': inserting batch of {}",
                self.metadata.name(),
                inserts.len()
            );
            let records = inserts.iter().map(|(_, record)| record.clone()).collect();
            self.store.insert_batch(&self.collection, records).await?;
            for (document, _) in &inserts {
                document.set_is_new(false);
                document.set_query_fields(None);
                self.finish_save(document);
            }
        }

        for (document, id, update) in updates {
            debug!(
                "'{}': updating id={} ({} field(s))",
                self.metadata.name(),
                id,
                update.len()
            );
            self.store
                .update_many(&self.collection, Filter::Ids(vec![id]), update)
                .await?;
            self.finish_save(&document);
        }
        Ok(())
    }

    fn finish_save(&self, document: &DocumentHandle) {
        document.clear_modified();
        if let Some(key) = document.id_key() {
            self.identity_map.set(key, document.clone());
        }
    }

    /// Folds pending reference-group edits into the parent's stored id-list
    /// fields, so the serialized record reflects the effective membership.
    async fn sync_reference_fields(&self, document: &DocumentHandle) -> Result<()> {
        for (_, group) in document.existing_reference_groups() {
            match group {
                ReferenceGroupHandle::Simple(group) => {
                    if group.has_local_changes() || group.is_saved_initialized() {
                        let ids = group.current_ids().await?;
                        document.set(group.field(), Value::Array(ids))?;
                    }
                }
                ReferenceGroupHandle::Polymorphic(group) => {
                    if group.has_local_changes() || group.is_saved_initialized() {
                        let entries = group.current_entries().await?;
                        document.set(group.field(), Value::Array(entries))?;
                    }
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Deleting
    // ------------------------------------------------------------------

    /// Deletes a batch by id and evicts the instances from the identity
    /// map. Documents without an id cannot be deleted.
    pub async fn delete(&self, documents: &[DocumentHandle]) -> Result<()> {
        let mut ids = Vec::with_capacity(documents.len());
        for document in documents {
            self.check_type(document)?;
            let id = document.id().ok_or_else(|| {
                OdmError::MissingId(format!(
                    "cannot delete unsaved '{}'",
                    self.metadata.name()
                ))
            })?;
            ids.push(id);
        }
        if ids.is_empty() {
            return Ok(());
        }
        debug!("'{}': deleting batch of {}", self.metadata.name(), ids.len());
        self.store
            .delete_many(&self.collection, Filter::Ids(ids.clone()))
            .await?;
        for id in &ids {
            self.identity_map.remove(&id.to_key());
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Passthroughs
    // ------------------------------------------------------------------

    pub async fn count(&self, filter: Filter) -> Result<u64> {
        self.store.count(&self.collection, filter).await
    }

    pub async fn update(&self, filter: Filter, update: Record) -> Result<u64> {
        self.store.update_many(&self.collection, filter, update).await
    }

    pub async fn remove(&self, filter: Filter) -> Result<u64> {
        self.store.delete_many(&self.collection, filter).await
    }

    fn check_type(&self, document: &DocumentHandle) -> Result<()> {
        if document.type_name() != self.metadata.name() {
            return Err(OdmError::ExecutionError(format!(
                "repository '{}' cannot handle a '{}' document",
                self.metadata.name(),
                document.type_name()
            )));
        }
        Ok(())
    }
}
