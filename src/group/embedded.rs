//! Embedded-member groups.
//!
//! The baseline of an embedded group is the raw ordered payload array held
//! on the parent record. Materializing it constructs one embedded instance
//! per non-null entry, rooted at `<path>.<index>`. Staged adds live at
//! `<path>._add<k>` until [`EmbeddedGroup::mark_all_saved`] promotes them.

use crate::core::{OdmError, Result, Slot, Value};
use crate::document::{DocumentHandle, EmbeddedHandle, RootAndPath};
use crate::group::{merge_membership, GroupCore};
use std::sync::{Arc, Mutex, Weak};

#[derive(Debug)]
pub struct EmbeddedGroup {
    target: String,
    mapper: Weak<crate::facade::Mapper>,
    core: GroupCore<EmbeddedHandle>,
    rap: Mutex<Slot<RootAndPath>>,
    saved_data: Mutex<Slot<Vec<Value>>>,
    // serializes first materialization per generation
    init_lock: Mutex<()>,
}

impl EmbeddedGroup {
    pub(crate) fn new(target: String, mapper: Weak<crate::facade::Mapper>) -> Self {
        Self {
            target,
            mapper,
            core: GroupCore::new(),
            rap: Mutex::new(Slot::new()),
            saved_data: Mutex::new(Slot::new()),
            init_lock: Mutex::new(()),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Attaches the group below `root` at `path` and restamps the staged-add
    /// members with their `._add<k>` locations.
    pub fn set_root_and_path(&self, root: &DocumentHandle, path: impl Into<String>) {
        let path = path.into();
        {
            let mut slot = self.rap.lock().unwrap_or_else(|e| e.into_inner());
            slot.set(RootAndPath::new(root, path.clone()));
        }
        for (k, member) in self.core.add_queue().iter().enumerate() {
            member.set_root_and_path(root, format!("{}._add{}", path, k));
        }
    }

    pub fn root_and_path(&self) -> Option<RootAndPath> {
        self.rap
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get()
            .cloned()
    }

    /// Installs the raw payload array the baseline resolves from and starts
    /// a new generation.
    pub(crate) fn set_saved_data(&self, data: Vec<Value>) {
        {
            let mut slot = self.saved_data.lock().unwrap_or_else(|e| e.into_inner());
            slot.set(data);
        }
        self.core.invalidate_saved();
    }

    pub(crate) fn saved_data(&self) -> Option<Vec<Value>> {
        self.saved_data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get()
            .cloned()
    }

    /// The saved baseline, materialized at most once per generation.
    pub fn saved(&self) -> Result<Vec<EmbeddedHandle>> {
        if let Some(saved) = self.core.cached_saved() {
            return Ok(saved);
        }
        let _guard = self.init_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(saved) = self.core.cached_saved() {
            return Ok(saved);
        }
        let rap = self.root_and_path();
        if let Some(rap) = &rap {
            if let Some(root) = rap.root() {
                root.widen_field_hint(rap.path());
            }
        }
        let data = self.saved_data().unwrap_or_default();
        let members = self.materialize(&data, rap.as_ref())?;
        self.core.set_saved(members.clone());
        Ok(members)
    }

    fn materialize(
        &self,
        data: &[Value],
        rap: Option<&RootAndPath>,
    ) -> Result<Vec<EmbeddedHandle>> {
        let mapper = self.mapper.upgrade().ok_or_else(|| {
            OdmError::Detached(format!("mapper gone for embedded group of '{}'", self.target))
        })?;
        let mut members = Vec::new();
        for (index, datum) in data.iter().enumerate() {
            if datum.is_null() {
                continue;
            }
            let Some(payload) = datum.as_map() else {
                continue;
            };
            let member = mapper.create_embedded(&self.target)?;
            member.set_document_data(payload, true)?;
            if let Some(rap) = rap {
                if let Some(root) = rap.root() {
                    member.set_root_and_path(&root, format!("{}.{}", rap.path(), index));
                }
            }
            members.push(member);
        }
        Ok(members)
    }

    /// Effective membership: saved then staged adds, minus removals.
    pub fn all(&self) -> Result<Vec<EmbeddedHandle>> {
        let saved = self.saved()?;
        let (_, add, remove, _) = self.core.snapshot();
        Ok(merge_membership(&saved, &add, &remove, |a, b| {
            a.value_eq(b)
        }))
    }

    pub fn one(&self) -> Result<Option<EmbeddedHandle>> {
        Ok(self.all()?.into_iter().next())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.all()?.len())
    }

    /// Stages members for addition.
    ///
    /// Fails when removals are pending and the effective membership is
    /// non-empty; when the pending removals already emptied the group, the
    /// queues and baseline are reset instead and the add proceeds.
    pub fn add(&self, members: Vec<EmbeddedHandle>) -> Result<()> {
        if !self.core.remove_queue().is_empty() {
            if !self.all()?.is_empty() {
                return Err(OdmError::ConflictingModification(
                    "adding to a group with pending removals".to_string(),
                ));
            }
            self.core.restart_empty();
        }
        self.core.push_add(members);
        if let Some(rap) = self.root_and_path() {
            if let Some(root) = rap.root() {
                for (k, member) in self.core.add_queue().iter().enumerate() {
                    member.set_root_and_path(&root, format!("{}._add{}", rap.path(), k));
                }
            }
        }
        Ok(())
    }

    pub fn add_one(&self, member: EmbeddedHandle) -> Result<()> {
        self.add(vec![member])
    }

    /// Stages members for removal. Membership is not validated.
    pub fn remove(&self, members: Vec<EmbeddedHandle>) {
        self.core.push_remove(members);
    }

    pub fn remove_one(&self, member: EmbeddedHandle) {
        self.remove(vec![member]);
    }

    /// Sets the clear marker. A modification signal only: existing members
    /// still come back from [`all`](Self::all).
    pub fn clear(&self) {
        self.core.set_clear_marker();
    }

    pub fn clear_marker(&self) -> bool {
        self.core.clear_marker()
    }

    pub fn add_queue(&self) -> Vec<EmbeddedHandle> {
        self.core.add_queue()
    }

    pub fn remove_queue(&self) -> Vec<EmbeddedHandle> {
        self.core.remove_queue()
    }

    pub fn is_saved_initialized(&self) -> bool {
        self.core.is_saved_initialized()
    }

    /// Drops the cached baseline; next access re-materializes.
    pub fn clear_saved(&self) {
        self.core.invalidate_saved();
    }

    pub fn refresh_saved(&self) -> Result<Vec<EmbeddedHandle>> {
        self.core.invalidate_saved();
        self.saved()
    }

    /// Promotes the current effective membership to the saved baseline.
    /// Members get their modification state cleared and their staged-add
    /// path markers stripped, then both queues are emptied.
    pub fn mark_all_saved(&self) -> Result<()> {
        let members = self.all()?;
        for member in &members {
            member.clear_modified();
            if let Some(rap) = member.root_and_path() {
                if let Some(root) = rap.root() {
                    let promoted = rap.path().replace("._add", ".");
                    member.set_root_and_path(&root, promoted);
                }
            }
        }
        self.core.set_saved(members);
        self.core.clear_add();
        self.core.clear_remove();
        Ok(())
    }

    /// Replaces the whole membership. An empty replacement only raises the
    /// clear marker; otherwise the current baseline is staged for removal,
    /// the baseline reset, and the new members staged for add.
    pub fn replace(&self, members: Vec<EmbeddedHandle>) -> Result<()> {
        self.core.clear_add();
        if members.is_empty() {
            self.clear();
            return Ok(());
        }
        let saved = self.saved()?;
        self.remove(saved);
        self.core.clear_remove();
        self.core.set_saved(Vec::new());
        self.add(members)
    }

    /// Clears both queues, dropping the cached baseline when local edits
    /// were pending.
    pub fn reset(&self) {
        self.core.reset();
    }

    /// Whether this group makes its owner count as modified; the
    /// remove/clear clauses only fire once the root exists in storage.
    pub(crate) fn contributes_modification(&self, root_is_new: bool) -> bool {
        let (saved, add, remove, clear) = self.core.snapshot();
        if add.iter().any(|member| member.is_modified()) {
            return true;
        }
        if !root_is_new && (!remove.is_empty() || clear) {
            return true;
        }
        if let Some(saved) = saved {
            if !add.is_empty() {
                return true;
            }
            if saved.iter().any(|member| member.is_modified()) {
                return true;
            }
        }
        false
    }

    /// Serialized payload for persistence. An untouched, unmaterialized
    /// group round-trips its raw data without building instances.
    pub(crate) fn to_payload(&self) -> Result<Option<Vec<Value>>> {
        let (saved, add, remove, _) = self.core.snapshot();
        if saved.is_none() && add.is_empty() && remove.is_empty() {
            return Ok(self.saved_data());
        }
        let members = self.all()?;
        let mut payload = Vec::with_capacity(members.len());
        for member in members {
            payload.push(Value::Map(member.to_record()?));
        }
        Ok(Some(payload))
    }
}
