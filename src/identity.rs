//! Identity map.
//!
//! One resident instance per persisted id, scoped per repository. Bulk
//! fetch paths serve resident ids from here and only send the remainder to
//! the store. Keys are the string form of the id.

use crate::document::DocumentHandle;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct IdentityMap {
    documents: Mutex<HashMap<String, DocumentHandle>>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: impl Into<String>, document: DocumentHandle) {
        self.lock().insert(id.into(), document);
    }

    pub fn has(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<DocumentHandle> {
        self.lock().get(id).cloned()
    }

    pub fn remove(&self, id: &str) {
        self.lock().remove(id);
    }

    pub fn all(&self) -> Vec<(String, DocumentHandle)> {
        self.lock()
            .iter()
            .map(|(id, document)| (id.clone(), document.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, DocumentHandle>> {
        self.documents.lock().unwrap_or_else(|e| e.into_inner())
    }
}
