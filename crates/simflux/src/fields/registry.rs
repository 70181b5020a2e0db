//! Field registries with fallback chains.
//!
//! A [`FieldRegistry`] maps [`FieldKey`]s to shared [`FieldInfo`] descriptors. Frontends
//! build a registry of their own fields that falls back to the universal set, and each
//! dataset owns a registry layered on top of its frontend defaults, so fields added to one
//! dataset never leak into another.
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::fields::{FieldInfo, FieldKey};

/// Lookup table of field descriptors.
#[derive(Clone, Debug, Default)]
pub struct FieldRegistry {
    fields: HashMap<FieldKey, Arc<FieldInfo>>,
    fallback: Option<Arc<FieldRegistry>>,
    strict: bool,
}

impl FieldRegistry {
    /// Creates an empty registry without a fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry that defers to `fallback` for unknown keys.
    pub fn create_with_fallback(fallback: Arc<FieldRegistry>) -> Self {
        Self {
            fields: HashMap::new(),
            fallback: Some(fallback),
            strict: false,
        }
    }

    /// In strict mode re-registering a local key fails with [`Error::DuplicateField`].
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn fallback(&self) -> Option<&Arc<FieldRegistry>> {
        self.fallback.as_ref()
    }

    /// Registers a descriptor. Later registrations replace earlier ones unless strict.
    pub fn register(&mut self, info: FieldInfo) -> Result<()> {
        if self.strict && self.fields.contains_key(&info.key) {
            return Err(Error::DuplicateField {
                field: info.key.to_string(),
            });
        }
        if self.fields.contains_key(&info.key) {
            debug!("Replacing field descriptor '{}'.", info.key);
        }
        self.fields.insert(info.key.clone(), Arc::new(info));
        Ok(())
    }

    /// Chainable variant of [`FieldRegistry::register`] that always replaces.
    pub fn add(&mut self, info: FieldInfo) -> &mut Self {
        self.fields.insert(info.key.clone(), Arc::new(info));
        self
    }

    /// Edits a locally registered descriptor in place.
    pub fn update(&mut self, key: &FieldKey, edit: impl FnOnce(&mut FieldInfo)) -> Result<()> {
        let Some(entry) = self.fields.get_mut(key) else {
            return Err(Error::UnknownField {
                field: key.to_string(),
            });
        };
        edit(Arc::make_mut(entry));
        Ok(())
    }

    /// Looks up `key` locally, then along the fallback chain.
    ///
    /// A particle-scoped key also matches an unscoped particle field of the same name.
    pub fn find(&self, key: &FieldKey) -> Option<Arc<FieldInfo>> {
        if let Some(info) = self.fields.get(key) {
            return Some(info.clone());
        }
        if key.is_particle_scoped() {
            if let Some(info) = self.fields.get(&key.unscoped()) {
                if info.particle_type {
                    return Some(info.clone());
                }
            }
        }
        self.fallback.as_ref().and_then(|fb| fb.find(key))
    }

    /// Like [`FieldRegistry::find`] but fails with [`Error::UnknownField`].
    pub fn lookup(&self, key: &FieldKey) -> Result<Arc<FieldInfo>> {
        self.find(key).ok_or_else(|| Error::UnknownField {
            field: key.to_string(),
        })
    }

    pub fn contains(&self, key: &FieldKey) -> bool {
        self.find(key).is_some()
    }

    /// Number of locally registered descriptors.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Keys registered in this registry, excluding the fallback chain.
    pub fn local_keys(&self) -> impl Iterator<Item = &FieldKey> {
        self.fields.keys()
    }

    /// All keys reachable from this registry, sorted.
    pub fn keys(&self) -> Vec<FieldKey> {
        let mut out = BTreeSet::new();
        self.collect_keys(&mut out);
        out.into_iter().collect()
    }

    fn collect_keys(&self, out: &mut BTreeSet<FieldKey>) {
        out.extend(self.fields.keys().cloned());
        if let Some(fb) = &self.fallback {
            fb.collect_keys(out);
        }
    }
}
