// ============================================================================
// Scratch Slots
// ============================================================================
//
// Out-of-band bookkeeping that is not part of a document's persisted field
// set (staged add/remove queues, root/path pointers, query-hash lists) lives
// in typed slots instead of the serialized shape. A slot tracks presence
// separately from its content: `Slot<Option<T>>` can hold "set to nothing",
// which is distinct from "never set".
//
// ============================================================================

/// A lazily-created storage slot.
#[derive(Debug, Clone, Default)]
pub struct Slot<T> {
    value: Option<T>,
}

impl<T> Slot<T> {
    pub fn new() -> Self {
        Self { value: None }
    }

    /// Returns if the slot has been set.
    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn set(&mut self, value: T) {
        self.value = Some(value);
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.value.as_mut()
    }

    /// Removes the slot content, returning it if it was set.
    pub fn take(&mut self) -> Option<T> {
        self.value.take()
    }

    pub fn clear(&mut self) {
        self.value = None;
    }

    /// Returns a mutable reference, creating the slot on first access.
    pub fn get_or_insert_with(&mut self, default: impl FnOnce() -> T) -> &mut T {
        self.value.get_or_insert_with(default)
    }
}

impl<T: Clone> Slot<T> {
    /// Returns the slot content or a default without creating the slot.
    pub fn get_or_default(&self, default: T) -> T {
        self.value.clone().unwrap_or(default)
    }
}
