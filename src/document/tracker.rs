// ============================================================================
// Change Tracking
// ============================================================================
//
// Every document and embedded document carries a tracker that records the
// original value of each mutated field. Recording is first-original-wins:
// the value captured at the start of a modification streak survives later
// writes until the tracker is cleared. Presence of a recorded original is
// what makes a field "modified" - a recorded Null counts.
//
// ============================================================================

use crate::core::Value;
use crate::document::EmbeddedHandle;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct ChangeTracker {
    fields_modified: HashMap<String, Value>,
    embedded_one_changed: HashMap<String, Option<EmbeddedHandle>>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the original value of a field. A field that already has a
    /// recorded original keeps it.
    pub fn mark_field_dirty(&mut self, name: &str, previous: Value) {
        self.fields_modified
            .entry(name.to_string())
            .or_insert(previous);
    }

    /// Drops the recorded original, un-marking the field.
    pub fn unmark_field(&mut self, name: &str) {
        self.fields_modified.remove(name);
    }

    pub fn is_field_modified(&self, name: &str) -> bool {
        self.fields_modified.contains_key(name)
    }

    pub fn recorded_original(&self, name: &str) -> Option<&Value> {
        self.fields_modified.get(name)
    }

    /// Field name to original value for every modified field.
    pub fn fields_modified(&self) -> &HashMap<String, Value> {
        &self.fields_modified
    }

    pub fn has_modified_fields(&self) -> bool {
        !self.fields_modified.is_empty()
    }

    pub fn clear_fields_modified(&mut self) {
        self.fields_modified.clear();
    }

    /// Records that a single-embedded slot was replaced, keeping the value
    /// it held before the first replacement.
    pub fn mark_embedded_one_changed(&mut self, name: &str, previous: Option<EmbeddedHandle>) {
        self.embedded_one_changed
            .entry(name.to_string())
            .or_insert(previous);
    }

    pub fn is_embedded_one_changed(&self, name: &str) -> bool {
        self.embedded_one_changed.contains_key(name)
    }

    pub fn original_embedded_one(&self, name: &str) -> Option<&Option<EmbeddedHandle>> {
        self.embedded_one_changed.get(name)
    }

    pub fn embedded_ones_changed(&self) -> &HashMap<String, Option<EmbeddedHandle>> {
        &self.embedded_one_changed
    }

    pub fn clear_embedded_ones_changed(&mut self) {
        self.embedded_one_changed.clear();
    }

    pub fn clear(&mut self) {
        self.clear_fields_modified();
        self.clear_embedded_ones_changed();
    }
}
