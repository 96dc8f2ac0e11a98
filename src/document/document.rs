//! Root documents.
//!
//! A `Document` is a top-level persisted entity: identity, field data, the
//! projection that loaded it, dirty-field originals, embedded slots and
//! relation groups. All shared access goes through [`DocumentHandle`].

use crate::core::{OdmError, Result, Slot, Value};
use crate::document::embedded::is_modified_parts;
use crate::document::{ChangeTracker, EmbeddedHandle};
use crate::group::{EmbeddedGroup, PolymorphicReferenceGroup, ReferenceGroup, ReferenceGroupHandle};
use crate::metadata::{DocumentMetadata, ReferenceTarget};
use crate::repository::Repository;
use crate::store::{Record, ID_FIELD};
use log::debug;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

#[derive(Debug)]
pub struct Document {
    metadata: Arc<DocumentMetadata>,
    mapper: Weak<crate::facade::Mapper>,
    id: Option<Value>,
    is_new: bool,
    fields: BTreeMap<String, Value>,
    /// Fields present in the projection that loaded this document.
    /// `Some(empty)` is the sentinel for "all fields present"; `None` means
    /// nothing is known (a constructed, never-loaded document).
    query_fields: Option<HashSet<String>>,
    query_hashes: Slot<Vec<String>>,
    tracker: ChangeTracker,
    embeddeds_one: BTreeMap<String, Option<EmbeddedHandle>>,
    embeddeds_many: BTreeMap<String, Arc<EmbeddedGroup>>,
    references_many: BTreeMap<String, ReferenceGroupHandle>,
}

/// Shared handle to a root document instance.
///
/// Clones share the instance: the same handle that sits in the identity map
/// is the one staged in the unit of work and held by relation groups. Locks
/// are internal, short, and never held across `.await` points.
#[derive(Debug, Clone)]
pub struct DocumentHandle {
    inner: Arc<RwLock<Document>>,
}

impl DocumentHandle {
    pub(crate) fn new(
        metadata: Arc<DocumentMetadata>,
        mapper: Weak<crate::facade::Mapper>,
    ) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Document {
                metadata,
                mapper,
                id: None,
                is_new: true,
                fields: BTreeMap::new(),
                query_fields: None,
                query_hashes: Slot::new(),
                tracker: ChangeTracker::new(),
                embeddeds_one: BTreeMap::new(),
                embeddeds_many: BTreeMap::new(),
                references_many: BTreeMap::new(),
            })),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Document> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Document> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn downgrade(&self) -> Weak<RwLock<Document>> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_weak(weak: &Weak<RwLock<Document>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn type_name(&self) -> String {
        self.read().metadata.name().to_string()
    }

    pub fn metadata(&self) -> Arc<DocumentMetadata> {
        self.read().metadata.clone()
    }

    pub(crate) fn mapper(&self) -> Result<Arc<crate::facade::Mapper>> {
        let doc = self.read();
        doc.mapper
            .upgrade()
            .ok_or_else(|| OdmError::Detached(format!("mapper gone for '{}'", doc.metadata.name())))
    }

    /// The repository responsible for this document's type.
    pub fn repository(&self) -> Result<Arc<Repository>> {
        let mapper = self.mapper()?;
        mapper.repository(&self.type_name())
    }

    /// Stable per-instance key (two clones of one handle share it).
    pub fn instance_key(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    pub fn same_instance(&self, other: &DocumentHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Membership equality: same instance, or same type with equal id and
    /// fields.
    pub fn value_eq(&self, other: &DocumentHandle) -> bool {
        if self.same_instance(other) {
            return true;
        }
        let a = self.read();
        let b = other.read();
        a.metadata.name() == b.metadata.name() && a.id == b.id && a.fields == b.fields
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    pub fn id(&self) -> Option<Value> {
        self.read().id.clone()
    }

    pub fn set_id(&self, id: impl Into<Value>) {
        self.write().id = Some(id.into());
    }

    /// String key form of the id, used by the identity map.
    pub fn id_key(&self) -> Option<String> {
        self.read().id.as_ref().map(|id| id.to_key())
    }

    pub fn is_new(&self) -> bool {
        self.read().is_new
    }

    pub(crate) fn set_is_new(&self, is_new: bool) {
        self.write().is_new = is_new;
    }

    // ------------------------------------------------------------------
    // Fields
    // ------------------------------------------------------------------

    /// Returns the current value of a field (`Null` when unset), widening
    /// the projection hint when the field was not part of the loading query.
    pub fn get(&self, name: &str) -> Result<Value> {
        self.check_field(name)?;
        if !self.is_field_in_query(name) {
            self.widen_field_hint(name);
        }
        Ok(self.get_raw(name).unwrap_or(Value::Null))
    }

    /// Like [`get`](Self::get), but reloads the full document first if the
    /// field was outside the loading projection.
    pub async fn get_or_load(&self, name: &str) -> Result<Value> {
        self.check_field(name)?;
        if !self.is_field_in_query(name) {
            self.widen_field_hint(name);
            self.load_full().await?;
        }
        Ok(self.get_raw(name).unwrap_or(Value::Null))
    }

    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.check_field(name)?;
        let value = value.into();
        let mut doc = self.write();
        let current = doc.fields.get(name).cloned().unwrap_or(Value::Null);
        if current == value {
            return Ok(());
        }
        if doc.tracker.recorded_original(name) == Some(&value) {
            // setting a field back to its original un-marks it
            doc.tracker.unmark_field(name);
        } else {
            doc.tracker.mark_field_dirty(name, current);
        }
        if value.is_null() {
            doc.fields.remove(name);
        } else {
            doc.fields.insert(name.to_string(), value);
        }
        Ok(())
    }

    pub(crate) fn get_raw(&self, name: &str) -> Option<Value> {
        self.read().fields.get(name).cloned()
    }

    fn check_field(&self, name: &str) -> Result<()> {
        let doc = self.read();
        if !doc.metadata.has_field(name) {
            return Err(OdmError::UnknownField(
                name.to_string(),
                doc.metadata.name().to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_field_modified(&self, name: &str) -> bool {
        self.read().tracker.is_field_modified(name)
    }

    /// Recorded original if the field is modified, otherwise the loaded
    /// value, otherwise `Null`.
    pub fn original_field_value(&self, name: &str) -> Value {
        let doc = self.read();
        if let Some(original) = doc.tracker.recorded_original(name) {
            return original.clone();
        }
        doc.fields.get(name).cloned().unwrap_or(Value::Null)
    }

    pub fn fields_modified(&self) -> BTreeMap<String, Value> {
        self.read()
            .tracker
            .fields_modified()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    // ------------------------------------------------------------------
    // Projection bookkeeping
    // ------------------------------------------------------------------

    /// Whether the field was present in the projection that loaded this
    /// document. The empty projection set is the "all fields" sentinel.
    pub fn is_field_in_query(&self, field: &str) -> bool {
        match &self.read().query_fields {
            Some(fields) if fields.is_empty() => true,
            Some(fields) => fields.contains(field),
            None => false,
        }
    }

    /// Records the projection the loading query used; `None` means the
    /// query fetched every field.
    pub fn set_query_fields(&self, fields: Option<Vec<String>>) {
        self.write().query_fields = Some(match fields {
            Some(list) => list.into_iter().collect(),
            None => HashSet::new(),
        });
    }

    /// The recorded projection: `None` when nothing is known, an empty list
    /// when every field was fetched.
    pub fn query_fields(&self) -> Option<Vec<String>> {
        self.read()
            .query_fields
            .as_ref()
            .map(|fields| fields.iter().cloned().collect())
    }

    /// Reloads fields that were left out of the loading projection.
    /// Locally-modified fields are never overwritten.
    pub async fn load_full(&self) -> Result<()> {
        let id = {
            let doc = self.read();
            if doc.is_new {
                return Ok(());
            }
            if matches!(&doc.query_fields, Some(fields) if fields.is_empty()) {
                return Ok(());
            }
            doc.id.clone().ok_or_else(|| {
                OdmError::MissingId(format!("cannot reload '{}' without an id", doc.metadata.name()))
            })?
        };
        let repository = self.repository()?;
        let record = repository.fetch_record(&id).await?.ok_or_else(|| {
            OdmError::StoreError(format!(
                "record '{}' not found in '{}'",
                id,
                repository.collection_name()
            ))
        })?;
        debug!(
            "loading full document '{}' id={}",
            self.type_name(),
            id
        );
        let mut record = record;
        for name in self.fields_modified().keys() {
            record.remove(name);
        }
        self.apply_record(&record, false, false)?;
        self.write().query_fields = Some(HashSet::new());
        Ok(())
    }

    /// Full clean reload from the store. Errors on a new document.
    pub async fn refresh(&self) -> Result<()> {
        let id = {
            let doc = self.read();
            if doc.is_new {
                return Err(OdmError::DocumentIsNew(doc.metadata.name().to_string()));
            }
            doc.id.clone().ok_or_else(|| {
                OdmError::MissingId(format!("cannot refresh '{}' without an id", doc.metadata.name()))
            })?
        };
        let repository = self.repository()?;
        let record = repository.fetch_record(&id).await?.ok_or_else(|| {
            OdmError::StoreError(format!(
                "record '{}' not found in '{}'",
                id,
                repository.collection_name()
            ))
        })?;
        self.set_document_data(&record, true, None)
    }

    // ------------------------------------------------------------------
    // Query hashes and hint widening
    // ------------------------------------------------------------------

    pub fn add_query_hash(&self, hash: &str) {
        self.write()
            .query_hashes
            .get_or_insert_with(Vec::new)
            .push(hash.to_string());
    }

    pub fn query_hashes(&self) -> Vec<String> {
        self.read().query_hashes.get_or_default(Vec::new())
    }

    pub fn remove_query_hash(&self, hash: &str) {
        let mut doc = self.write();
        if let Some(hashes) = doc.query_hashes.get_mut() {
            hashes.retain(|h| h != hash);
        }
    }

    pub fn clear_query_hashes(&self) {
        self.write().query_hashes.clear();
    }

    /// Flags `field` as needed in the hint of every query that loaded this
    /// document. Hints only ever widen.
    pub(crate) fn widen_field_hint(&self, field: &str) {
        let Ok(mapper) = self.mapper() else { return };
        let Some(cache) = mapper.hint_cache() else { return };
        let normalized = crate::cache::normalize_field_path(field);
        for hash in self.query_hashes() {
            let mut hint = cache.get(&hash).unwrap_or_default();
            if hint.widen_field(&normalized) {
                cache.set(&hash, hint);
            }
        }
    }

    /// Flags a reference relation as needed, symmetric to field widening.
    pub(crate) fn widen_reference_hint(&self, reference: &str) {
        let Ok(mapper) = self.mapper() else { return };
        let Some(cache) = mapper.hint_cache() else { return };
        for hash in self.query_hashes() {
            let mut hint = cache.get(&hash).unwrap_or_default();
            if hint.widen_reference(reference) {
                cache.set(&hash, hint);
            }
        }
    }

    // ------------------------------------------------------------------
    // Embedded relations
    // ------------------------------------------------------------------

    pub fn embedded_one(&self, name: &str) -> Result<Option<EmbeddedHandle>> {
        let doc = self.read();
        if !doc.metadata.embeddeds_one().contains_key(name) {
            return Err(OdmError::UnknownRelation(
                name.to_string(),
                doc.metadata.name().to_string(),
            ));
        }
        Ok(doc.embeddeds_one.get(name).cloned().flatten())
    }

    pub fn set_embedded_one(&self, name: &str, value: Option<EmbeddedHandle>) -> Result<()> {
        {
            let mut doc = self.write();
            if !doc.metadata.embeddeds_one().contains_key(name) {
                return Err(OdmError::UnknownRelation(
                    name.to_string(),
                    doc.metadata.name().to_string(),
                ));
            }
            let current = doc.embeddeds_one.get(name).cloned().flatten();
            let unchanged = match (&current, &value) {
                (None, None) => true,
                (Some(a), Some(b)) => a.same_instance(b),
                _ => false,
            };
            if unchanged {
                return Ok(());
            }
            doc.tracker.mark_embedded_one_changed(name, current);
            doc.embeddeds_one.insert(name.to_string(), value.clone());
        }
        if let Some(embedded) = value {
            embedded.set_root_and_path(self, name.to_string());
        }
        Ok(())
    }

    pub fn is_embedded_one_changed(&self, name: &str) -> bool {
        let doc = self.read();
        doc.embeddeds_one.contains_key(name) && doc.tracker.is_embedded_one_changed(name)
    }

    /// The embedded-one value held before the slot was first replaced.
    pub fn original_embedded_one(&self, name: &str) -> Option<EmbeddedHandle> {
        let doc = self.read();
        if let Some(original) = doc.tracker.original_embedded_one(name) {
            return original.clone();
        }
        doc.embeddeds_one.get(name).cloned().flatten()
    }

    pub fn embedded_many(&self, name: &str) -> Result<Arc<EmbeddedGroup>> {
        let group = {
            let mut doc = self.write();
            let def = doc.metadata.embeddeds_many().get(name).cloned().ok_or_else(|| {
                OdmError::UnknownRelation(name.to_string(), doc.metadata.name().to_string())
            })?;
            if let Some(group) = doc.embeddeds_many.get(name) {
                return Ok(group.clone());
            }
            let group = Arc::new(EmbeddedGroup::new(def.target, doc.mapper.clone()));
            doc.embeddeds_many.insert(name.to_string(), group.clone());
            group
        };
        group.set_root_and_path(self, name.to_string());
        Ok(group)
    }

    // ------------------------------------------------------------------
    // Reference relations
    // ------------------------------------------------------------------

    /// Resolves a single-valued reference through the target repository
    /// (identity map consulted before the store).
    pub async fn reference_one(&self, name: &str) -> Result<Option<DocumentHandle>> {
        let def = {
            let doc = self.read();
            doc.metadata.references_one().get(name).cloned().ok_or_else(|| {
                OdmError::UnknownRelation(name.to_string(), doc.metadata.name().to_string())
            })?
        };
        self.widen_reference_hint(name);
        let id = match self.get_raw(&def.field) {
            Some(id) if !id.is_null() => id,
            _ => return Ok(None),
        };
        let mapper = self.mapper()?;
        let repository = mapper.repository(&def.target)?;
        repository.find_one_by_id(&id).await
    }

    /// Points a single-valued reference at `target`, which must be saved.
    pub fn set_reference_one(&self, name: &str, target: Option<&DocumentHandle>) -> Result<()> {
        let def = {
            let doc = self.read();
            doc.metadata.references_one().get(name).cloned().ok_or_else(|| {
                OdmError::UnknownRelation(name.to_string(), doc.metadata.name().to_string())
            })?
        };
        match target {
            Some(doc) => {
                let id = doc.id().ok_or_else(|| {
                    OdmError::MissingId(format!(
                        "referenced '{}' must be saved before it can be referenced",
                        doc.type_name()
                    ))
                })?;
                self.set(&def.field, id)
            }
            None => self.set(&def.field, Value::Null),
        }
    }

    /// Returns the group for a collection-valued reference, creating it on
    /// first access from the type's metadata.
    pub fn reference_many(&self, name: &str) -> Result<ReferenceGroupHandle> {
        let group = {
            let mut doc = self.write();
            let def = doc.metadata.references_many().get(name).cloned().ok_or_else(|| {
                OdmError::UnknownRelation(name.to_string(), doc.metadata.name().to_string())
            })?;
            if let Some(group) = doc.references_many.get(name) {
                group.clone()
            } else {
                let parent = Arc::downgrade(&self.inner);
                let group = match def.target {
                    ReferenceTarget::Type(target) => ReferenceGroupHandle::Simple(Arc::new(
                        ReferenceGroup::new(target, def.field, parent, doc.mapper.clone()),
                    )),
                    ReferenceTarget::Polymorphic {
                        discriminator_field,
                        discriminator_map,
                    } => ReferenceGroupHandle::Polymorphic(Arc::new(
                        PolymorphicReferenceGroup::new(
                            discriminator_field,
                            discriminator_map,
                            def.field,
                            parent,
                            doc.mapper.clone(),
                        ),
                    )),
                };
                doc.references_many.insert(name.to_string(), group.clone());
                group
            }
        };
        self.widen_reference_hint(name);
        Ok(group)
    }

    pub(crate) fn existing_reference_groups(&self) -> Vec<(String, ReferenceGroupHandle)> {
        self.read()
            .references_many
            .iter()
            .map(|(name, group)| (name.clone(), group.clone()))
            .collect()
    }

    // ------------------------------------------------------------------
    // Modification state
    // ------------------------------------------------------------------

    pub fn is_modified(&self) -> bool {
        let (has_dirty_fields, embedded_ones, groups, is_new) = {
            let doc = self.read();
            let embedded_ones: Vec<(Option<EmbeddedHandle>, bool)> = doc
                .embeddeds_one
                .iter()
                .map(|(name, child)| (child.clone(), doc.tracker.is_embedded_one_changed(name)))
                .collect();
            let groups: Vec<Arc<EmbeddedGroup>> = doc.embeddeds_many.values().cloned().collect();
            (
                doc.tracker.has_modified_fields(),
                embedded_ones,
                groups,
                doc.is_new,
            )
        };
        is_modified_parts(has_dirty_fields, &embedded_ones, &groups, is_new)
    }

    /// Clears every modification record: field originals, embedded-one
    /// change markers, and the staged state of every embedded-many group
    /// (their current membership is promoted to the saved baseline).
    pub fn clear_modified(&self) {
        let (children, groups) = {
            let mut doc = self.write();
            doc.tracker.clear();
            let children: Vec<EmbeddedHandle> = doc
                .embeddeds_one
                .values()
                .filter_map(|child| child.clone())
                .collect();
            let groups: Vec<Arc<EmbeddedGroup>> = doc.embeddeds_many.values().cloned().collect();
            (children, groups)
        };
        for child in children {
            child.clear_modified();
        }
        for group in groups {
            if let Err(err) = group.mark_all_saved() {
                debug!("skipping mark_all_saved on a detached group: {}", err);
            }
        }
    }

    // ------------------------------------------------------------------
    // Persistence shortcuts
    // ------------------------------------------------------------------

    /// Saves this document immediately through its repository.
    pub async fn save(&self) -> Result<()> {
        let repository = self.repository()?;
        repository.save(&[self.clone()]).await
    }

    /// Deletes this document immediately through its repository.
    pub async fn delete(&self) -> Result<()> {
        let repository = self.repository()?;
        repository.delete(&[self.clone()]).await
    }

    // ------------------------------------------------------------------
    // Data exchange (hydration / serialization)
    // ------------------------------------------------------------------

    /// Replaces document state with `record`. `clean` resets all tracking;
    /// `projection` is the field set the loading query used (`None` = all).
    /// This is the hydration entry point for query layers.
    pub fn set_document_data(
        &self,
        record: &Record,
        clean: bool,
        projection: Option<Vec<String>>,
    ) -> Result<()> {
        if let Some(id) = record.get(ID_FIELD) {
            self.write().id = Some(id.clone());
        }
        self.apply_record(record, clean, true)?;
        {
            let mut doc = self.write();
            doc.is_new = false;
            doc.query_fields = Some(match projection {
                Some(list) => list.into_iter().collect(),
                None => HashSet::new(),
            });
        }
        Ok(())
    }

    /// Writes `record`'s declared fields and embedded payloads into the
    /// document without touching identity or projection state. `replace`
    /// drops fields absent from the record; a merge keeps them.
    fn apply_record(&self, record: &Record, clean: bool, replace: bool) -> Result<()> {
        let mapper = self.mapper()?;
        let (one_defs, many_defs, mapper_weak) = {
            let mut doc = self.write();
            let field_names: Vec<String> = doc.metadata.fields().keys().cloned().collect();
            if replace {
                doc.fields.clear();
            }
            for name in field_names {
                if let Some(value) = record.get(&name) {
                    if value.is_null() {
                        doc.fields.remove(&name);
                    } else {
                        doc.fields.insert(name, value.clone());
                    }
                }
            }
            if clean {
                doc.tracker.clear();
            }
            (
                doc.metadata.embeddeds_one().clone(),
                doc.metadata.embeddeds_many().clone(),
                doc.mapper.clone(),
            )
        };
        for (name, def) in one_defs {
            let Some(payload) = record.get(&name).and_then(|v| v.as_map()) else {
                continue;
            };
            let child = mapper.create_embedded(&def.target)?;
            child.set_document_data(payload, true)?;
            child.set_root_and_path(self, name.clone());
            self.write().embeddeds_one.insert(name, Some(child));
        }
        for (name, def) in many_defs {
            let Some(items) = record.get(&name).and_then(|v| v.as_array()) else {
                continue;
            };
            let group = Arc::new(EmbeddedGroup::new(def.target, mapper_weak.clone()));
            group.set_saved_data(items.to_vec());
            group.set_root_and_path(self, name.clone());
            self.write().embeddeds_many.insert(name, group);
        }
        Ok(())
    }

    /// Serializes the full document for insertion.
    pub(crate) fn to_record(&self) -> Result<Record> {
        let (mut record, id, embedded_ones, groups) = {
            let doc = self.read();
            let record: Record = doc
                .fields
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let embedded_ones: Vec<(String, EmbeddedHandle)> = doc
                .embeddeds_one
                .iter()
                .filter_map(|(name, child)| child.clone().map(|c| (name.clone(), c)))
                .collect();
            let groups: Vec<(String, Arc<EmbeddedGroup>)> = doc
                .embeddeds_many
                .iter()
                .map(|(name, group)| (name.clone(), group.clone()))
                .collect();
            (record, doc.id.clone(), embedded_ones, groups)
        };
        if let Some(id) = id {
            record.insert(ID_FIELD.to_string(), id);
        }
        for (name, child) in embedded_ones {
            record.insert(name, Value::Map(child.to_record()?));
        }
        for (name, group) in groups {
            if let Some(payload) = group.to_payload()? {
                if !payload.is_empty() {
                    record.insert(name, Value::Array(payload));
                }
            }
        }
        Ok(record)
    }

    /// Serializes only what changed since the last clean state: dirty
    /// fields, replaced or modified embedded-one slots, and embedded-many
    /// groups with staged or member-level changes.
    pub(crate) fn update_record(&self) -> Result<Record> {
        let (dirty_fields, embedded_ones, groups) = {
            let doc = self.read();
            let dirty_fields: Vec<String> =
                doc.tracker.fields_modified().keys().cloned().collect();
            let embedded_ones: Vec<(String, Option<EmbeddedHandle>, bool)> = doc
                .embeddeds_one
                .iter()
                .map(|(name, child)| {
                    (
                        name.clone(),
                        child.clone(),
                        doc.tracker.is_embedded_one_changed(name),
                    )
                })
                .collect();
            let groups: Vec<(String, Arc<EmbeddedGroup>)> = doc
                .embeddeds_many
                .iter()
                .map(|(name, group)| (name.clone(), group.clone()))
                .collect();
            (dirty_fields, embedded_ones, groups)
        };
        let mut update = Record::new();
        for name in dirty_fields {
            update.insert(
                name.clone(),
                self.get_raw(&name).unwrap_or(Value::Null),
            );
        }
        for (name, child, slot_changed) in embedded_ones {
            let child_modified = child.as_ref().map(|c| c.is_modified()).unwrap_or(false);
            if !slot_changed && !child_modified {
                continue;
            }
            match child {
                Some(child) => {
                    update.insert(name, Value::Map(child.to_record()?));
                }
                None => {
                    update.insert(name, Value::Null);
                }
            }
        }
        for (name, group) in groups {
            if group.contributes_modification(false) {
                let members = group.all()?;
                let mut payload = Vec::with_capacity(members.len());
                for member in members {
                    payload.push(Value::Map(member.to_record()?));
                }
                update.insert(name, Value::Array(payload));
            }
        }
        Ok(update)
    }
}
