//! In-memory data source.
use std::collections::{BTreeSet, HashMap};

use crate::data::{DataSource, Patch, PatchId};
use crate::error::Result;
use crate::fields::FieldKey;

/// A [`DataSource`] backed by per-patch vectors.
#[derive(Clone, Debug, Default)]
pub struct InMemorySource {
    values: HashMap<(PatchId, FieldKey), Vec<f64>>,
    fields: BTreeSet<FieldKey>,
    particle_types: BTreeSet<String>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores values of `key` for `patch`, replacing previous values.
    pub fn insert(&mut self, patch: PatchId, key: impl Into<FieldKey>, values: Vec<f64>) -> &mut Self {
        let key = key.into();
        if let Some(ptype) = &key.ptype {
            self.particle_types.insert(ptype.clone());
        }
        self.fields.insert(key.clone());
        self.values.insert((patch, key), values);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl DataSource for InMemorySource {
    fn field_list(&self) -> Vec<FieldKey> {
        self.fields.iter().cloned().collect()
    }

    fn read_field(&self, patch: &Patch, key: &FieldKey) -> Result<Option<Vec<f64>>> {
        Ok(self.values.get(&(patch.id, key.clone())).cloned())
    }

    fn particle_types(&self) -> Vec<String> {
        self.particle_types.iter().cloned().collect()
    }
}
