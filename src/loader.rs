//! Fixture loading.
//!
//! Bulk-stages raw records as documents and flushes them in one unit of
//! work. Refuses to run while the session already has unflushed state, so
//! a fixture load never silently commits someone else's pending edits.

use crate::core::{OdmError, Result, Value};
use crate::facade::Mapper;
use crate::store::{Filter, Record, ID_FIELD};
use log::debug;
use std::sync::Arc;

pub struct DataLoader {
    mapper: Arc<Mapper>,
}

impl DataLoader {
    pub fn new(mapper: Arc<Mapper>) -> Self {
        Self { mapper }
    }

    /// Loads `(type, records)` fixtures. With `purge`, every named type's
    /// collection is emptied first.
    pub async fn load(&self, fixtures: Vec<(String, Vec<Record>)>, purge: bool) -> Result<()> {
        if self.mapper.unit_of_work().has_pending() {
            return Err(OdmError::PendingOperations(
                "the session's unit of work has unflushed operations".to_string(),
            ));
        }

        if purge {
            for (type_name, _) in &fixtures {
                let repository = self.mapper.repository(type_name)?;
                let purged = repository.remove(Filter::All).await?;
                debug!("purged {} record(s) from '{}'", purged, type_name);
            }
        }

        for (type_name, records) in fixtures {
            for record in records {
                let document = self.mapper.create(&type_name)?;
                if let Some(id) = record.get(ID_FIELD) {
                    document.set_id(id.clone());
                }
                for (name, value) in &record {
                    if name == ID_FIELD {
                        continue;
                    }
                    document.set(name, value.clone())?;
                }
                self.mapper.persist(&document);
            }
        }

        self.mapper.flush().await
    }

    /// Loads fixtures from a JSON object of `{type: [records]}`.
    pub async fn load_json(&self, json: &serde_json::Value, purge: bool) -> Result<()> {
        let object = json.as_object().ok_or_else(|| {
            OdmError::SerializationError("fixture root must be an object".to_string())
        })?;
        let mut fixtures = Vec::new();
        for (type_name, records) in object {
            let records = records.as_array().ok_or_else(|| {
                OdmError::SerializationError(format!(
                    "fixtures for '{}' must be an array",
                    type_name
                ))
            })?;
            let mut converted = Vec::with_capacity(records.len());
            for record in records {
                match Value::from_json(record) {
                    Value::Map(map) => converted.push(map),
                    _ => {
                        return Err(OdmError::SerializationError(format!(
                            "fixture record for '{}' must be an object",
                            type_name
                        )))
                    }
                }
            }
            fixtures.push((type_name.clone(), converted));
        }
        self.load(fixtures, purge).await
    }
}
