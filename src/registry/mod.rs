//! Process-wide ordered set of collectors (SPEC_FULL §4.3).

use crate::collector::Collector;
use std::collections::HashMap;
use std::sync::Arc;

/// Insertion-ordered registry. Re-registering a name replaces its collector
/// in place without disturbing its original position; iteration always
/// follows first-registration order.
#[derive(Default)]
pub struct Registry {
    order: Vec<String>,
    by_name: HashMap<String, Arc<dyn Collector>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, collector: Arc<dyn Collector>) {
        let name = collector.name().to_string();
        if !self.by_name.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.by_name.insert(name, collector);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Collector>> {
        self.by_name.get(name).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Defensive snapshot: a fresh `Vec` in registration order, immune to
    /// later mutation of the registry.
    pub fn snapshot(&self) -> Vec<Arc<dyn Collector>> {
        self.order
            .iter()
            .filter_map(|name| self.by_name.get(name).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
