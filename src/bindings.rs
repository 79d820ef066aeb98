//! Binding Data Model
//!
//! Shared between the scheduler (which decides where bindings live) and the
//! adapter (which holds them). A binding is a plain value; two bindings are
//! the same forwarding rule iff all three fields match.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One forwarding rule: logs of `app_id` go to the syslog drain at `drain`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Binding {
    pub hostname: String,
    pub app_id: String,
    pub drain: String,
}

/// Desired drains for a single application
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AppBinding {
    pub hostname: String,
    pub drains: Vec<String>,
}

/// Desired state as reported by the CUPS provider, keyed by application id
pub type AppBindings = HashMap<String, AppBinding>;

/// Wire form of a ListBindings response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BindingList {
    pub bindings: Vec<Binding>,
}

/// Bag of bindings. The same binding appears once per adapter reporting it,
/// so membership is counted rather than tested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings(pub Vec<Binding>);

impl Bindings {
    pub fn drain_count(&self, search: &Binding) -> usize {
        self.0.iter().filter(|b| *b == search).count()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Binding> {
        self.0.iter()
    }
}

impl From<Vec<Binding>> for Bindings {
    fn from(bindings: Vec<Binding>) -> Self {
        Self(bindings)
    }
}

impl IntoIterator for Bindings {
    type Item = Binding;
    type IntoIter = std::vec::IntoIter<Binding>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
