//! Polymorphic reference groups.
//!
//! The baseline source is a list of `{id, discriminator}` entries stored on
//! the parent. Materialization groups the ids by resolved type (directly by
//! discriminator value, or through a discriminator-to-type map), performs
//! one batched fetch per type, and concatenates the per-type results - so
//! the result order is grouped by type, not the original entry order.

use crate::core::{OdmError, Result, Value};
use crate::document::document::Document;
use crate::document::DocumentHandle;
use crate::group::{merge_membership, GroupCore};
use log::debug;
use std::collections::BTreeMap;
use std::sync::{RwLock, Weak};

#[derive(Debug)]
pub struct PolymorphicReferenceGroup {
    discriminator_field: String,
    discriminator_map: Option<BTreeMap<String, String>>,
    field: String,
    parent: Weak<RwLock<Document>>,
    mapper: Weak<crate::facade::Mapper>,
    core: GroupCore<DocumentHandle>,
    // single-flight for lazy baseline resolution
    resolve_gate: tokio::sync::Mutex<()>,
}

impl PolymorphicReferenceGroup {
    pub(crate) fn new(
        discriminator_field: String,
        discriminator_map: Option<BTreeMap<String, String>>,
        field: String,
        parent: Weak<RwLock<Document>>,
        mapper: Weak<crate::facade::Mapper>,
    ) -> Self {
        Self {
            discriminator_field,
            discriminator_map,
            field,
            parent,
            mapper,
            core: GroupCore::new(),
            resolve_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn discriminator_field(&self) -> &str {
        &self.discriminator_field
    }

    pub fn discriminator_map(&self) -> Option<&BTreeMap<String, String>> {
        self.discriminator_map.as_ref()
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn parent(&self) -> Option<DocumentHandle> {
        DocumentHandle::from_weak(&self.parent)
    }

    /// The `{id, discriminator}` entries the baseline resolves from.
    pub fn source_entries(&self) -> Vec<Value> {
        let Some(parent) = self.parent() else {
            return Vec::new();
        };
        match parent.get_raw(&self.field) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries,
            Some(other) => vec![other],
        }
    }

    fn resolve_type(&self, discriminator: &str) -> Result<String> {
        match &self.discriminator_map {
            Some(map) => map.get(discriminator).cloned().ok_or_else(|| {
                OdmError::ExecutionError(format!(
                    "discriminator value '{}' missing from the discriminator map of field '{}'",
                    discriminator, self.field
                ))
            }),
            None => Ok(discriminator.to_string()),
        }
    }

    /// The saved baseline, resolved at most once per generation: one
    /// batched fetch per member type, grouped in first-seen type order.
    pub async fn saved(&self) -> Result<Vec<DocumentHandle>> {
        if let Some(saved) = self.core.cached_saved() {
            return Ok(saved);
        }
        let _guard = self.resolve_gate.lock().await;
        if let Some(saved) = self.core.cached_saved() {
            return Ok(saved);
        }
        let mapper = self.mapper.upgrade().ok_or_else(|| {
            OdmError::Detached(format!(
                "mapper gone for polymorphic group on field '{}'",
                self.field
            ))
        })?;

        let mut ids_by_type: Vec<(String, Vec<Value>)> = Vec::new();
        for entry in self.source_entries() {
            let Some(map) = entry.as_map() else {
                debug!("polymorphic '{}': malformed entry omitted", self.field);
                continue;
            };
            let (Some(id), Some(discriminator)) =
                (map.get("id"), map.get(&self.discriminator_field))
            else {
                debug!("polymorphic '{}': incomplete entry omitted", self.field);
                continue;
            };
            let type_name = self.resolve_type(&discriminator.to_key())?;
            match ids_by_type.iter_mut().find(|(name, _)| *name == type_name) {
                Some((_, ids)) => ids.push(id.clone()),
                None => ids_by_type.push((type_name, vec![id.clone()])),
            }
        }

        let mut members = Vec::new();
        for (type_name, ids) in ids_by_type {
            let repository = mapper.repository(&type_name)?;
            let resident = repository.find_by_ids(&ids).await?;
            for id in &ids {
                match resident.get(&id.to_key()) {
                    Some(document) => members.push(document.clone()),
                    None => debug!(
                        "polymorphic '{}' -> '{}': id {} unresolvable, omitted",
                        self.field, type_name, id
                    ),
                }
            }
        }
        self.core.set_saved(members.clone());
        Ok(members)
    }

    /// Effective membership: saved then staged adds, minus removals.
    pub async fn all(&self) -> Result<Vec<DocumentHandle>> {
        let saved = self.saved().await?;
        let (_, add, remove, _) = self.core.snapshot();
        Ok(merge_membership(&saved, &add, &remove, |a, b| {
            a.value_eq(b)
        }))
    }

    pub async fn one(&self) -> Result<Option<DocumentHandle>> {
        Ok(self.all().await?.into_iter().next())
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.all().await?.len())
    }

    /// Stages members for addition; see the embedded variant for the
    /// pending-remove conflict rule.
    pub async fn add(&self, members: Vec<DocumentHandle>) -> Result<()> {
        if !self.core.remove_queue().is_empty() {
            if !self.all().await?.is_empty() {
                return Err(OdmError::ConflictingModification(
                    "adding to a group with pending removals".to_string(),
                ));
            }
            self.core.restart_empty();
        }
        self.core.push_add(members);
        Ok(())
    }

    pub async fn add_one(&self, member: DocumentHandle) -> Result<()> {
        self.add(vec![member]).await
    }

    /// Stages members for removal. Membership is not validated.
    pub fn remove(&self, members: Vec<DocumentHandle>) {
        self.core.push_remove(members);
    }

    pub fn remove_one(&self, member: DocumentHandle) {
        self.remove(vec![member]);
    }

    /// Sets the clear marker; a modification signal only.
    pub fn clear(&self) {
        self.core.set_clear_marker();
    }

    pub fn clear_marker(&self) -> bool {
        self.core.clear_marker()
    }

    pub fn add_queue(&self) -> Vec<DocumentHandle> {
        self.core.add_queue()
    }

    pub fn remove_queue(&self) -> Vec<DocumentHandle> {
        self.core.remove_queue()
    }

    pub fn is_saved_initialized(&self) -> bool {
        self.core.is_saved_initialized()
    }

    pub fn clear_saved(&self) {
        self.core.invalidate_saved();
    }

    pub async fn refresh_saved(&self) -> Result<Vec<DocumentHandle>> {
        self.core.invalidate_saved();
        self.saved().await
    }

    /// Promotes the current effective membership to the saved baseline and
    /// clears both queues.
    pub async fn mark_all_saved(&self) -> Result<()> {
        let members = self.all().await?;
        for member in &members {
            member.clear_modified();
        }
        self.core.set_saved(members);
        self.core.clear_add();
        self.core.clear_remove();
        Ok(())
    }

    /// Replaces the whole membership; an empty replacement only raises the
    /// clear marker.
    pub async fn replace(&self, members: Vec<DocumentHandle>) -> Result<()> {
        self.core.clear_add();
        if members.is_empty() {
            self.clear();
            return Ok(());
        }
        let saved = self.saved().await?;
        self.remove(saved);
        self.core.clear_remove();
        self.core.set_saved(Vec::new());
        self.add(members).await
    }

    /// Clears both queues, dropping the cached baseline when local edits
    /// were pending.
    pub fn reset(&self) {
        self.core.reset();
    }

    pub(crate) fn has_local_changes(&self) -> bool {
        let (_, add, remove, clear) = self.core.snapshot();
        !add.is_empty() || !remove.is_empty() || clear
    }

    /// `{id, discriminator}` entries of the effective membership, for
    /// write-back into the parent's stored field.
    pub(crate) async fn current_entries(&self) -> Result<Vec<Value>> {
        let members = self.all().await?;
        let mut entries = Vec::with_capacity(members.len());
        for member in members {
            let id = member.id().ok_or_else(|| {
                OdmError::MissingId(format!(
                    "referenced '{}' must be saved before its id can be stored",
                    member.type_name()
                ))
            })?;
            let type_name = member.type_name();
            let discriminator = match &self.discriminator_map {
                Some(map) => map
                    .iter()
                    .find(|(_, target)| **target == type_name)
                    .map(|(value, _)| value.clone())
                    .ok_or_else(|| {
                        OdmError::ExecutionError(format!(
                            "type '{}' missing from the discriminator map of field '{}'",
                            type_name, self.field
                        ))
                    })?,
                None => type_name,
            };
            let mut entry = BTreeMap::new();
            entry.insert("id".to_string(), id);
            entry.insert(
                self.discriminator_field.clone(),
                Value::Text(discriminator),
            );
            entries.push(Value::Map(entry));
        }
        Ok(entries)
    }
}
