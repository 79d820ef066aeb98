//! Adapter Binding Store

use crate::bindings::Binding;
use std::sync::RwLock;

/// In-memory set of the bindings this adapter services. Insertion order is
/// preserved for listing; duplicates are rejected so re-created bindings
/// are no-ops.
#[derive(Debug, Default)]
pub struct BindingStore {
    bindings: RwLock<Vec<Binding>>,
}

impl BindingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> Vec<Binding> {
        self.bindings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Add a binding. Returns false when it was already held.
    pub fn add(&self, binding: Binding) -> bool {
        let mut bindings = self
            .bindings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if bindings.contains(&binding) {
            return false;
        }
        bindings.push(binding);
        true
    }

    /// Remove a binding. Returns false when it was not held.
    pub fn remove(&self, binding: &Binding) -> bool {
        let mut bindings = self
            .bindings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match bindings.iter().position(|b| b == binding) {
            Some(idx) => {
                bindings.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.bindings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
