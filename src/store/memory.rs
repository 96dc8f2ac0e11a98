use crate::core::{OdmError, Result, Value};
use crate::store::{Filter, Record, Store, ID_FIELD};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

/// Per-operation call counters, mostly for tests asserting fetch dedup.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub find_calls: usize,
    pub insert_calls: usize,
    pub update_calls: usize,
    pub delete_calls: usize,
}

/// In-memory reference backend: one ordered map per collection, keyed by
/// the string form of the record id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, BTreeMap<String, Record>>>,
    stats: Mutex<StoreStats>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> StoreStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Raw view of one collection, for test assertions.
    pub fn records(&self, collection: &str) -> Vec<Record> {
        self.lock()
            .get(collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, BTreeMap<String, Record>>> {
        self.collections.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bump(&self, f: impl FnOnce(&mut StoreStats)) {
        f(&mut self.stats.lock().unwrap_or_else(|e| e.into_inner()));
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_by_ids(&self, collection: &str, ids: &[Value]) -> Result<Vec<Record>> {
        self.bump(|stats| stats.find_calls += 1);
        let collections = self.lock();
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| records.get(&id.to_key()).cloned())
            .collect())
    }

    async fn insert_batch(&self, collection: &str, records: Vec<Record>) -> Result<Vec<Value>> {
        self.bump(|stats| stats.insert_calls += 1);
        let mut collections = self.lock();
        let target = collections.entry(collection.to_string()).or_default();
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let id = record.get(ID_FIELD).cloned().ok_or_else(|| {
                OdmError::MissingId(format!("insert into '{}' without an id", collection))
            })?;
            target.insert(id.to_key(), record);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn update_many(&self, collection: &str, filter: Filter, update: Record) -> Result<u64> {
        self.bump(|stats| stats.update_calls += 1);
        let mut collections = self.lock();
        let Some(records) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let keys: Vec<String> = match filter {
            Filter::All => records.keys().cloned().collect(),
            Filter::Ids(ids) => ids
                .iter()
                .map(|id| id.to_key())
                .filter(|key| records.contains_key(key))
                .collect(),
        };
        for key in &keys {
            if let Some(record) = records.get_mut(key) {
                for (field, value) in &update {
                    if value.is_null() {
                        record.remove(field);
                    } else {
                        record.insert(field.clone(), value.clone());
                    }
                }
            }
        }
        Ok(keys.len() as u64)
    }

    async fn delete_many(&self, collection: &str, filter: Filter) -> Result<u64> {
        self.bump(|stats| stats.delete_calls += 1);
        let mut collections = self.lock();
        let Some(records) = collections.get_mut(collection) else {
            return Ok(0);
        };
        match filter {
            Filter::All => {
                let removed = records.len() as u64;
                records.clear();
                Ok(removed)
            }
            Filter::Ids(ids) => {
                let mut removed = 0;
                for id in ids {
                    if records.remove(&id.to_key()).is_some() {
                        removed += 1;
                    }
                }
                Ok(removed)
            }
        }
    }

    async fn count(&self, collection: &str, filter: Filter) -> Result<u64> {
        let collections = self.lock();
        let Some(records) = collections.get(collection) else {
            return Ok(0);
        };
        match filter {
            Filter::All => Ok(records.len() as u64),
            Filter::Ids(ids) => Ok(ids
                .iter()
                .filter(|id| records.contains_key(&id.to_key()))
                .count() as u64),
        }
    }
}
