//! Simple reference groups.
//!
//! The baseline is the parent's stored id-list field, resolved through the
//! referenced type's repository (identity map consulted before the store).
//! The stored id order is preserved; an id with no resolvable document is
//! omitted from the result, not an error.

use crate::core::{OdmError, Result, Value};
use crate::document::document::Document;
use crate::document::DocumentHandle;
use crate::group::{merge_membership, GroupCore};
use log::debug;
use std::sync::{RwLock, Weak};

#[derive(Debug)]
pub struct ReferenceGroup {
    target: String,
    field: String,
    parent: Weak<RwLock<Document>>,
    mapper: Weak<crate::facade::Mapper>,
    core: GroupCore<DocumentHandle>,
    // single-flight for lazy baseline resolution
    resolve_gate: tokio::sync::Mutex<()>,
}

impl ReferenceGroup {
    pub(crate) fn new(
        target: String,
        field: String,
        parent: Weak<RwLock<Document>>,
        mapper: Weak<crate::facade::Mapper>,
    ) -> Self {
        Self {
            target,
            field,
            parent,
            mapper,
            core: GroupCore::new(),
            resolve_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// The parent's field holding the referenced ids.
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn parent(&self) -> Option<DocumentHandle> {
        DocumentHandle::from_weak(&self.parent)
    }

    /// The id list the baseline resolves from, read off the parent.
    pub fn source_ids(&self) -> Vec<Value> {
        let Some(parent) = self.parent() else {
            return Vec::new();
        };
        match parent.get_raw(&self.field) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(ids)) => ids,
            Some(other) => vec![other],
        }
    }

    /// The saved baseline, resolved at most once per generation.
    pub async fn saved(&self) -> Result<Vec<DocumentHandle>> {
        if let Some(saved) = self.core.cached_saved() {
            return Ok(saved);
        }
        let _guard = self.resolve_gate.lock().await;
        if let Some(saved) = self.core.cached_saved() {
            return Ok(saved);
        }
        let ids = self.source_ids();
        let mapper = self.mapper.upgrade().ok_or_else(|| {
            OdmError::Detached(format!("mapper gone for reference group of '{}'", self.target))
        })?;
        let repository = mapper.repository(&self.target)?;
        let resident = repository.find_by_ids(&ids).await?;
        let mut members = Vec::with_capacity(ids.len());
        for id in &ids {
            match resident.get(&id.to_key()) {
                Some(document) => members.push(document.clone()),
                None => debug!(
                    "reference '{}' -> '{}': id {} unresolvable, omitted",
                    self.field, self.target, id
                ),
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
    /// clears both queues. Referenced members have no root/path to rewrite.
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

    /// Ids of the effective membership, for write-back into the parent's
    /// stored field. Every member must have been assigned an id.
    pub(crate) async fn current_ids(&self) -> Result<Vec<Value>> {
        let members = self.all().await?;
        let mut ids = Vec::with_capacity(members.len());
        for member in members {
            let id = member.id().ok_or_else(|| {
                OdmError::MissingId(format!(
                    "referenced '{}' must be saved before its id can be stored",
                    member.type_name()
                ))
            })?;
            ids.push(id);
        }
        Ok(ids)
    }
}
