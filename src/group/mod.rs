// ============================================================================
// Relation Groups
// ============================================================================
//
// A group is a lazily-materialized one-to-many membership set. Local edits
// are staged in an add queue and a remove queue next to a baseline of saved
// members that is resolved from the underlying data source at most once per
// generation. Effective membership is recomputed on every access:
//
//     all() = saved ++ add, minus the first value-equal match per removal
//
// The clear marker is exactly that - a marker. It flags the group as
// modified for persistence but never filters `all()` or empties a queue.
//
// ============================================================================

mod embedded;
mod polymorphic;
mod reference;

pub use embedded::EmbeddedGroup;
pub use polymorphic::PolymorphicReferenceGroup;
pub use reference::ReferenceGroup;

use crate::core::Slot;
use std::sync::{Arc, Mutex, MutexGuard};

/// A collection-valued reference relation, simple or polymorphic.
#[derive(Debug, Clone)]
pub enum ReferenceGroupHandle {
    Simple(Arc<ReferenceGroup>),
    Polymorphic(Arc<PolymorphicReferenceGroup>),
}

impl ReferenceGroupHandle {
    pub fn as_simple(&self) -> Option<&Arc<ReferenceGroup>> {
        match self {
            Self::Simple(group) => Some(group),
            _ => None,
        }
    }

    pub fn as_polymorphic(&self) -> Option<&Arc<PolymorphicReferenceGroup>> {
        match self {
            Self::Polymorphic(group) => Some(group),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct GroupState<M> {
    saved: Option<Vec<M>>,
    add: Slot<Vec<M>>,
    remove: Slot<Vec<M>>,
    clear: Slot<bool>,
}

impl<M> Default for GroupState<M> {
    fn default() -> Self {
        Self {
            saved: None,
            add: Slot::new(),
            remove: Slot::new(),
            clear: Slot::new(),
        }
    }
}

/// Queue and baseline state shared by every group variant.
#[derive(Debug)]
pub(crate) struct GroupCore<M> {
    state: Mutex<GroupState<M>>,
}

impl<M: Clone> GroupCore<M> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GroupState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GroupState<M>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_queue(&self) -> Vec<M> {
        self.lock().add.get_or_default(Vec::new())
    }

    pub fn push_add(&self, members: Vec<M>) {
        let mut state = self.lock();
        state.add.get_or_insert_with(Vec::new).extend(members);
    }

    pub fn clear_add(&self) {
        self.lock().add.clear();
    }

    pub fn remove_queue(&self) -> Vec<M> {
        self.lock().remove.get_or_default(Vec::new())
    }

    pub fn push_remove(&self, members: Vec<M>) {
        let mut state = self.lock();
        state.remove.get_or_insert_with(Vec::new).extend(members);
    }

    pub fn clear_remove(&self) {
        self.lock().remove.clear();
    }

    pub fn set_clear_marker(&self) {
        self.lock().clear.set(true);
    }

    pub fn clear_marker(&self) -> bool {
        self.lock().clear.get_or_default(false)
    }

    pub fn cached_saved(&self) -> Option<Vec<M>> {
        self.lock().saved.clone()
    }

    pub fn set_saved(&self, members: Vec<M>) {
        self.lock().saved = Some(members);
    }

    pub fn invalidate_saved(&self) {
        self.lock().saved = None;
    }

    pub fn is_saved_initialized(&self) -> bool {
        self.lock().saved.is_some()
    }

    /// One consistent view of (saved, add, remove, clear).
    pub fn snapshot(&self) -> (Option<Vec<M>>, Vec<M>, Vec<M>, bool) {
        let state = self.lock();
        (
            state.saved.clone(),
            state.add.get_or_default(Vec::new()),
            state.remove.get_or_default(Vec::new()),
            state.clear.get_or_default(false),
        )
    }

    /// Clears both queues; the cached baseline is dropped only when local
    /// edits were pending, forcing re-resolution on next access.
    pub fn reset(&self) {
        let mut state = self.lock();
        let had_edits = state.add.get().map(|a| !a.is_empty()).unwrap_or(false)
            || state.remove.get().map(|r| !r.is_empty()).unwrap_or(false);
        if had_edits {
            state.saved = None;
        }
        state.add.clear();
        state.remove.clear();
    }

    /// Wipes queues and fixes the baseline to empty; used when an `add`
    /// lands on a pending remove that already emptied the membership.
    pub fn restart_empty(&self) {
        let mut state = self.lock();
        state.add.clear();
        state.remove.clear();
        state.saved = Some(Vec::new());
    }
}

/// `saved ++ add` with removals deleted by first value-equal match.
pub(crate) fn merge_membership<M: Clone>(
    saved: &[M],
    add: &[M],
    remove: &[M],
    eq: impl Fn(&M, &M) -> bool,
) -> Vec<M> {
    let mut members: Vec<M> = saved.iter().chain(add.iter()).cloned().collect();
    for removed in remove {
        if let Some(pos) = members.iter().position(|m| eq(m, removed)) {
            members.remove(pos);
        }
    }
    members
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq(a: &i32, b: &i32) -> bool {
        a == b
    }

    #[test]
    fn test_merge_preserves_saved_then_add_order() {
        let merged = merge_membership(&[1, 2], &[3, 4], &[], eq);
        assert_eq!(merged, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_merge_removes_first_match_only() {
        let merged = merge_membership(&[1, 1, 2], &[1], &[1], eq);
        assert_eq!(merged, vec![1, 2, 1]);
    }

    #[test]
    fn test_reset_drops_baseline_only_with_pending_edits() {
        let core: GroupCore<i32> = GroupCore::new();
        core.set_saved(vec![1]);
        core.reset();
        assert!(core.is_saved_initialized());

        core.push_add(vec![2]);
        core.reset();
        assert!(!core.is_saved_initialized());
        assert!(core.add_queue().is_empty());
    }

    #[test]
    fn test_clear_is_only_a_marker() {
        let core: GroupCore<i32> = GroupCore::new();
        core.set_saved(vec![1, 2]);
        core.set_clear_marker();
        assert!(core.clear_marker());
        assert_eq!(core.cached_saved(), Some(vec![1, 2]));
    }
}
