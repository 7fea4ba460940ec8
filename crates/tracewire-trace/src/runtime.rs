//! Per-execution-unit scratchpad shared by the phases of one invocation.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

#[derive(Default)]
pub struct RuntimeContext {
    values: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<V: Any + Send + Sync>(&mut self, key: impl Into<String>, value: V) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// Typed lookup. A value stored under another type reads as absent.
    pub fn get<V: Any>(&self, key: &str) -> Option<&V> {
        self.values.get(key).and_then(|v| v.downcast_ref::<V>())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}
