//! Id generation.
//!
//! New documents get their ids client-side, before the insert batch goes
//! out, so references can be wired up without waiting for the store. The
//! registry maps each declared strategy to its generator and is owned by
//! the mapper - generators are never looked up through global state.

use crate::core::{Result, Value};
use crate::metadata::IdStrategy;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Produces ids for new documents of a type.
///
/// Returning `None` means the strategy expects the caller to have assigned
/// an id already; saving without one is then an error.
pub trait IdGenerator: Send + Sync {
    fn generate(&self, type_name: &str) -> Result<Option<Value>>;
}

/// Client-side uuid v4 ids, the default.
pub struct NativeIdGenerator;

impl IdGenerator for NativeIdGenerator {
    fn generate(&self, _type_name: &str) -> Result<Option<Value>> {
        Ok(Some(Value::Text(Uuid::new_v4().to_string())))
    }
}

/// Caller-assigned ids.
pub struct NoneIdGenerator;

impl IdGenerator for NoneIdGenerator {
    fn generate(&self, _type_name: &str) -> Result<Option<Value>> {
        Ok(None)
    }
}

/// Strategy-to-generator registry, defaults pre-registered.
pub struct IdGeneratorRegistry {
    generators: HashMap<IdStrategy, Arc<dyn IdGenerator>>,
}

impl IdGeneratorRegistry {
    pub fn new() -> Self {
        let mut generators: HashMap<IdStrategy, Arc<dyn IdGenerator>> = HashMap::new();
        generators.insert(IdStrategy::Native, Arc::new(NativeIdGenerator));
        generators.insert(IdStrategy::None, Arc::new(NoneIdGenerator));
        Self { generators }
    }

    /// Replaces the generator behind a strategy (e.g. deterministic ids in
    /// tests).
    pub fn set(&mut self, strategy: IdStrategy, generator: Arc<dyn IdGenerator>) {
        self.generators.insert(strategy, generator);
    }

    pub fn generate(&self, strategy: IdStrategy, type_name: &str) -> Result<Option<Value>> {
        match self.generators.get(&strategy) {
            Some(generator) => generator.generate(type_name),
            None => Ok(None),
        }
    }
}

impl Default for IdGeneratorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
