use std::collections::BTreeMap;

use super::Update;
use crate::Instance;

/// Folds update batches into the current instance set of one service.
///
/// Owned by exactly one consumer task; `&mut self` on [`apply`](Merger::apply)
/// is the only synchronization it needs.
///
/// Last write wins per key with no revision check: a stale `Add` delivered
/// after a `Delete` resurrects the key. Ordering is the store's job.
#[derive(Debug, Default)]
pub struct Merger {
    entries: BTreeMap<String, Instance>,
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `updates` in delivery order
    pub fn apply(
        &mut self,
        updates: &[Update],
    ) {
        for update in updates {
            match update {
                Update::Add { key, instance } => {
                    self.entries.insert(key.clone(), instance.clone());
                }
                Update::Delete { key } => {
                    self.entries.remove(key);
                }
            }
        }
    }

    /// Every live instance, ordered by storage key
    pub fn snapshot(&self) -> Vec<Instance> {
        self.entries.values().cloned().collect()
    }

    /// `host:port` of every live instance, ordered by storage key
    pub fn addresses(&self) -> Vec<String> {
        self.entries.values().map(Instance::addr).collect()
    }

    pub fn contains_key(
        &self,
        key: &str,
    ) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
