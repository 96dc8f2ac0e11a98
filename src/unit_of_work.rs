// ============================================================================
// Unit of Work
// ============================================================================
//
// Session-scoped staging of documents queued for persist or removal, keyed
// [document type][instance identity]. Staging a persist cancels a pending
// removal of the same instance and vice versa. Commit flushes one batched
// repository call per type - all persist batches first, then all removal
// batches - and clears the staged state regardless of batch failures; the
// first error propagates to the caller. There is no rollback: a batch that
// succeeded before a later one failed stays written.
//
// ============================================================================

use crate::core::{OdmError, Result};
use crate::document::DocumentHandle;
use log::debug;
use std::sync::{Mutex, MutexGuard, Weak};

type StagedBatches = Vec<(String, Vec<(usize, DocumentHandle)>)>;

#[derive(Default)]
struct UowState {
    persist: StagedBatches,
    remove: StagedBatches,
}

impl UowState {
    fn stage(batches: &mut StagedBatches, type_name: &str, key: usize, document: DocumentHandle) {
        match batches.iter_mut().find(|(name, _)| name == type_name) {
            Some((_, bucket)) => {
                if !bucket.iter().any(|(staged, _)| *staged == key) {
                    bucket.push((key, document));
                }
            }
            None => batches.push((type_name.to_string(), vec![(key, document)])),
        }
    }

    fn cancel(batches: &mut StagedBatches, type_name: &str, key: usize) {
        if let Some((_, bucket)) = batches.iter_mut().find(|(name, _)| name == type_name) {
            bucket.retain(|(staged, _)| *staged != key);
        }
        batches.retain(|(_, bucket)| !bucket.is_empty());
    }

    fn contains(batches: &StagedBatches, type_name: &str, key: usize) -> bool {
        batches
            .iter()
            .find(|(name, _)| name == type_name)
            .map(|(_, bucket)| bucket.iter().any(|(staged, _)| *staged == key))
            .unwrap_or(false)
    }

    fn has_any(batches: &StagedBatches) -> bool {
        batches.iter().any(|(_, bucket)| !bucket.is_empty())
    }
}

pub struct UnitOfWork {
    mapper: Weak<crate::facade::Mapper>,
    state: Mutex<UowState>,
    // serializes concurrent commits against the same session
    commit_gate: tokio::sync::Mutex<()>,
}

impl UnitOfWork {
    pub(crate) fn new(mapper: Weak<crate::facade::Mapper>) -> Self {
        Self {
            mapper,
            state: Mutex::new(UowState::default()),
            commit_gate: tokio::sync::Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, UowState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stages documents for persist, cancelling any pending removal of the
    /// same instances. Staging an instance twice has no additional effect.
    pub fn persist(&self, documents: &[DocumentHandle]) {
        let mut state = self.lock();
        for document in documents {
            let type_name = document.type_name();
            let key = document.instance_key();
            UowState::cancel(&mut state.remove, &type_name, key);
            UowState::stage(&mut state.persist, &type_name, key, document.clone());
        }
    }

    /// Stages documents for removal, cancelling any pending persist of the
    /// same instances.
    pub fn remove(&self, documents: &[DocumentHandle]) {
        let mut state = self.lock();
        for document in documents {
            let type_name = document.type_name();
            let key = document.instance_key();
            UowState::cancel(&mut state.persist, &type_name, key);
            UowState::stage(&mut state.remove, &type_name, key, document.clone());
        }
    }

    pub fn is_pending_for_persist(&self, document: &DocumentHandle) -> bool {
        UowState::contains(
            &self.lock().persist,
            &document.type_name(),
            document.instance_key(),
        )
    }

    pub fn has_pending_for_persist(&self) -> bool {
        UowState::has_any(&self.lock().persist)
    }

    pub fn is_pending_for_remove(&self, document: &DocumentHandle) -> bool {
        UowState::contains(
            &self.lock().remove,
            &document.type_name(),
            document.instance_key(),
        )
    }

    pub fn has_pending_for_remove(&self) -> bool {
        UowState::has_any(&self.lock().remove)
    }

    pub fn has_pending(&self) -> bool {
        self.has_pending_for_persist() || self.has_pending_for_remove()
    }

    /// Flushes the session: one batched save per type with staged persists
    /// (in staging order), then one batched delete per type with staged
    /// removals. Every batch is attempted even after an earlier failure;
    /// staged state is cleared unconditionally and the first error
    /// propagates. Writes that already ran are not rolled back.
    pub async fn commit(&self) -> Result<()> {
        let _gate = self.commit_gate.lock().await;
        let (persist, remove) = {
            let mut state = self.lock();
            (
                std::mem::take(&mut state.persist),
                std::mem::take(&mut state.remove),
            )
        };

        let mapper = match self.mapper.upgrade() {
            Some(mapper) => mapper,
            None => {
                return Err(OdmError::Detached(
                    "mapper gone while committing the unit of work".to_string(),
                ))
            }
        };

        let mut first_error: Option<OdmError> = None;
        for (type_name, bucket) in persist {
            let documents: Vec<DocumentHandle> =
                bucket.into_iter().map(|(_, document)| document).collect();
            debug!("committing {} persist(s) for '{}'", documents.len(), type_name);
            let outcome = match mapper.repository(&type_name) {
                Ok(repository) => repository.save(&documents).await,
                Err(err) => Err(err),
            };
            if let Err(err) = outcome {
                first_error.get_or_insert(err);
            }
        }
        for (type_name, bucket) in remove {
            let documents: Vec<DocumentHandle> =
                bucket.into_iter().map(|(_, document)| document).collect();
            debug!("committing {} removal(s) for '{}'", documents.len(), type_name);
            let outcome = match mapper.repository(&type_name) {
                Ok(repository) => repository.delete(&documents).await,
                Err(err) => Err(err),
            };
            if let Err(err) = outcome {
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Discards staged state without touching document field state.
    pub fn clear(&self) {
        *self.lock() = UowState::default();
    }
}
