//! Per-container memoization of evaluated fields.
//!
//! Entries are keyed by [`CacheScope`] and [`FieldKey`]. Insertion is idempotent: when two
//! evaluations race, the first stored array wins and both callers observe it. The cache
//! also records which fields each derived field read during evaluation.
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::data::{FieldArray, PatchId};
use crate::fields::FieldKey;

/// Extent an entry covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheScope {
    /// Values for the container's full selection.
    Selection,
    /// Values for every cell (or particle) of one patch.
    Patch(PatchId),
}

/// Cache of evaluated field arrays.
#[derive(Debug, Default)]
pub struct FieldCache {
    entries: Mutex<HashMap<(CacheScope, FieldKey), Arc<FieldArray>>>,
    dependencies: Mutex<HashMap<FieldKey, BTreeSet<FieldKey>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FieldCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, scope: CacheScope, key: &FieldKey) -> Option<Arc<FieldArray>> {
        lock(&self.entries).get(&(scope, key.clone())).cloned()
    }

    /// Stores `array` unless an entry already exists, returning the stored entry.
    pub fn insert(&self, scope: CacheScope, key: FieldKey, array: FieldArray) -> Arc<FieldArray> {
        lock(&self.entries)
            .entry((scope, key))
            .or_insert_with(|| Arc::new(array))
            .clone()
    }

    /// Drops every entry for `key`.
    pub fn remove(&self, key: &FieldKey) {
        lock(&self.entries).retain(|(_, k), _| k != key);
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
        lock(&self.dependencies).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    pub fn record_dependency(&self, field: &FieldKey, dependency: &FieldKey) {
        lock(&self.dependencies)
            .entry(field.clone())
            .or_default()
            .insert(dependency.clone());
    }

    /// Fields read while evaluating `field`, sorted.
    pub fn dependencies(&self, field: &FieldKey) -> Vec<FieldKey> {
        lock(&self.dependencies)
            .get(field)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }
}
