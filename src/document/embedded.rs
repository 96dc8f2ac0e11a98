//! Embedded documents.
//!
//! An embedded document has the same field and tracking structure as a root
//! document but no identity of its own. It carries a non-owning reference to
//! its root plus a dot-delimited path locating it inside the root's
//! structure (`"address.city"`, or `"tags._add3"` while staged for add).
//! Projection checks and full reloads delegate to the root.

use crate::core::{OdmError, Result, Slot, Value};
use crate::document::document::Document;
use crate::document::{ChangeTracker, DocumentHandle};
use crate::group::EmbeddedGroup;
use crate::metadata::DocumentMetadata;
use log::debug;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

/// Non-owning back-reference from an embedded instance to its root.
#[derive(Debug, Clone)]
pub struct RootAndPath {
    root: Weak<RwLock<Document>>,
    path: String,
}

impl RootAndPath {
    pub(crate) fn new(root: &DocumentHandle, path: impl Into<String>) -> Self {
        Self {
            root: root.downgrade(),
            path: path.into(),
        }
    }

    /// The owning root document, if it is still alive.
    pub fn root(&self) -> Option<DocumentHandle> {
        DocumentHandle::from_weak(&self.root)
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Debug)]
pub struct EmbeddedDocument {
    metadata: Arc<DocumentMetadata>,
    mapper: Weak<crate::facade::Mapper>,
    fields: BTreeMap<String, Value>,
    tracker: ChangeTracker,
    embeddeds_one: BTreeMap<String, Option<EmbeddedHandle>>,
    embeddeds_many: BTreeMap<String, Arc<EmbeddedGroup>>,
    root_and_path: Slot<RootAndPath>,
}

/// Shared handle to an embedded document instance.
///
/// Cloning the handle shares the instance; all state access happens through
/// short internal locks that are never held across `.await` points.
#[derive(Debug, Clone)]
pub struct EmbeddedHandle {
    inner: Arc<RwLock<EmbeddedDocument>>,
}

impl EmbeddedHandle {
    pub(crate) fn new(
        metadata: Arc<DocumentMetadata>,
        mapper: Weak<crate::facade::Mapper>,
    ) -> Self {
        Self {
            inner: Arc::new(RwLock::new(EmbeddedDocument {
                metadata,
                mapper,
                fields: BTreeMap::new(),
                tracker: ChangeTracker::new(),
                embeddeds_one: BTreeMap::new(),
                embeddeds_many: BTreeMap::new(),
                root_and_path: Slot::new(),
            })),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, EmbeddedDocument> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, EmbeddedDocument> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
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

    /// Stable per-instance key (two clones of one handle share it).
    pub fn instance_key(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    pub fn same_instance(&self, other: &EmbeddedHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Membership equality: same instance, or same type with equal fields.
    pub fn value_eq(&self, other: &EmbeddedHandle) -> bool {
        if self.same_instance(other) {
            return true;
        }
        let a = self.read();
        let b = other.read();
        a.metadata.name() == b.metadata.name() && a.fields == b.fields
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

    /// Like [`get`](Self::get), but reloads the full root document first if
    /// the field was outside the loading projection.
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
        let rap = {
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
            doc.root_and_path.get().cloned()
        };
        if let (Some(rap), Some(embedded)) = (rap, value) {
            if let Some(root) = rap.root() {
                embedded.set_root_and_path(&root, format!("{}.{}", rap.path(), name));
            }
        }
        Ok(())
    }

    pub fn is_embedded_one_changed(&self, name: &str) -> bool {
        let doc = self.read();
        doc.embeddeds_one.contains_key(name) && doc.tracker.is_embedded_one_changed(name)
    }

    pub fn embedded_many(&self, name: &str) -> Result<Arc<EmbeddedGroup>> {
        let (group, rap) = {
            let mut doc = self.write();
            let def = doc.metadata.embeddeds_many().get(name).cloned().ok_or_else(|| {
                OdmError::UnknownRelation(name.to_string(), doc.metadata.name().to_string())
            })?;
            if let Some(group) = doc.embeddeds_many.get(name) {
                return Ok(group.clone());
            }
            let group = Arc::new(EmbeddedGroup::new(def.target.clone(), doc.mapper.clone()));
            doc.embeddeds_many.insert(name.to_string(), group.clone());
            (group, doc.root_and_path.get().cloned())
        };
        if let Some(rap) = rap {
            if let Some(root) = rap.root() {
                group.set_root_and_path(&root, format!("{}.{}", rap.path(), name));
            }
        }
        Ok(group)
    }

    // ------------------------------------------------------------------
    // Root and path
    // ------------------------------------------------------------------

    /// Attaches the instance below `root` at `path` and cascades the new
    /// location to nested embedded children and groups.
    pub fn set_root_and_path(&self, root: &DocumentHandle, path: impl Into<String>) {
        let path = path.into();
        let (children, groups) = {
            let mut doc = self.write();
            doc.root_and_path.set(RootAndPath::new(root, path.clone()));
            let children: Vec<(String, EmbeddedHandle)> = doc
                .embeddeds_one
                .iter()
                .filter_map(|(name, child)| child.clone().map(|c| (name.clone(), c)))
                .collect();
            let groups: Vec<(String, Arc<EmbeddedGroup>)> = doc
                .embeddeds_many
                .iter()
                .map(|(name, group)| (name.clone(), group.clone()))
                .collect();
            (children, groups)
        };
        for (name, child) in children {
            child.set_root_and_path(root, format!("{}.{}", path, name));
        }
        for (name, group) in groups {
            group.set_root_and_path(root, format!("{}.{}", path, name));
        }
    }

    pub fn root_and_path(&self) -> Option<RootAndPath> {
        self.read().root_and_path.get().cloned()
    }

    pub fn root(&self) -> Option<DocumentHandle> {
        self.root_and_path().and_then(|rap| rap.root())
    }

    pub fn path(&self) -> Option<String> {
        self.root_and_path().map(|rap| rap.path().to_string())
    }

    /// Whether this instance is currently staged for add in an
    /// embedded-many group (its path carries the staged-add marker).
    pub fn is_embedded_many_new(&self) -> bool {
        self.path().map(|p| p.contains("._add")).unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Projection delegation
    // ------------------------------------------------------------------

    /// Delegates to the root; an unattached instance reports `false`.
    pub fn is_field_in_query(&self, field: &str) -> bool {
        match self.root() {
            Some(root) => root.is_field_in_query(field),
            None => false,
        }
    }

    /// Reloads the full root document; a no-op for unattached instances.
    pub async fn load_full(&self) -> Result<()> {
        match self.root() {
            Some(root) => root.load_full().await,
            None => Ok(()),
        }
    }

    fn widen_field_hint(&self, name: &str) {
        if let Some(rap) = self.root_and_path() {
            if let Some(root) = rap.root() {
                root.widen_field_hint(&format!("{}.{}", rap.path(), name));
            }
        }
    }

    // ------------------------------------------------------------------
    // Modification state
    // ------------------------------------------------------------------

    pub fn is_modified(&self) -> bool {
        let (has_dirty_fields, embedded_ones, groups, root) = {
            let doc = self.read();
            let embedded_ones: Vec<(Option<EmbeddedHandle>, bool)> = doc
                .embeddeds_one
                .iter()
                .map(|(name, child)| (child.clone(), doc.tracker.is_embedded_one_changed(name)))
                .collect();
            let groups: Vec<Arc<EmbeddedGroup>> =
                doc.embeddeds_many.values().cloned().collect();
            (
                doc.tracker.has_modified_fields(),
                embedded_ones,
                groups,
                doc.root_and_path.get().and_then(|rap| rap.root()),
            )
        };
        let root_is_new = root.map(|r| r.is_new()).unwrap_or(true);
        is_modified_parts(has_dirty_fields, &embedded_ones, &groups, root_is_new)
    }

    pub fn clear_modified(&self) {
        let (children, groups) = {
            let mut doc = self.write();
            doc.tracker.clear();
            let children: Vec<EmbeddedHandle> = doc
                .embeddeds_one
                .values()
                .filter_map(|child| child.clone())
                .collect();
            let groups: Vec<Arc<EmbeddedGroup>> =
                doc.embeddeds_many.values().cloned().collect();
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
    // Data exchange (hydration / serialization)
    // ------------------------------------------------------------------

    /// Replaces embedded state with `record`; the hydration entry point
    /// for query layers and group materialization.
    pub fn set_document_data(&self, record: &BTreeMap<String, Value>, clean: bool) -> Result<()> {
        let mapper = self.mapper()?;
        let (one_defs, many_defs) = {
            let mut doc = self.write();
            let field_names: Vec<String> = doc.metadata.fields().keys().cloned().collect();
            doc.fields.clear();
            for name in field_names {
                if let Some(value) = record.get(&name) {
                    if !value.is_null() {
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
            )
        };
        let rap = self.root_and_path();
        for (name, def) in one_defs {
            let Some(payload) = record.get(&name).and_then(|v| v.as_map()) else {
                continue;
            };
            let child = mapper.create_embedded(&def.target)?;
            child.set_document_data(payload, true)?;
            if let Some(rap) = &rap {
                if let Some(root) = rap.root() {
                    child.set_root_and_path(&root, format!("{}.{}", rap.path(), name));
                }
            }
            self.write().embeddeds_one.insert(name, Some(child));
        }
        for (name, def) in many_defs {
            let Some(items) = record.get(&name).and_then(|v| v.as_array()) else {
                continue;
            };
            let group = Arc::new(EmbeddedGroup::new(def.target.clone(), {
                let doc = self.read();
                doc.mapper.clone()
            }));
            group.set_saved_data(items.to_vec());
            if let Some(rap) = &rap {
                if let Some(root) = rap.root() {
                    group.set_root_and_path(&root, format!("{}.{}", rap.path(), name));
                }
            }
            self.write().embeddeds_many.insert(name, group);
        }
        Ok(())
    }

    pub(crate) fn to_record(&self) -> Result<BTreeMap<String, Value>> {
        let (mut record, embedded_ones, groups) = {
            let doc = self.read();
            let record: BTreeMap<String, Value> = doc
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
            (record, embedded_ones, groups)
        };
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
}

/// Shared modification predicate for the embedded sections of a document.
///
/// `root_is_new` suppresses the clauses that only count once the owning
/// root exists in storage (slot replacement, pending removes, clear marker).
pub(crate) fn is_modified_parts(
    has_dirty_fields: bool,
    embedded_ones: &[(Option<EmbeddedHandle>, bool)],
    groups: &[Arc<EmbeddedGroup>],
    root_is_new: bool,
) -> bool {
    if has_dirty_fields {
        return true;
    }
    for (child, slot_changed) in embedded_ones {
        if let Some(child) = child {
            if child.is_modified() {
                return true;
            }
        }
        if *slot_changed && !root_is_new {
            return true;
        }
    }
    for group in groups {
        if group.contributes_modification(root_is_new) {
            return true;
        }
    }
    false
}
