//! Field descriptors, registries and lazy evaluation.
//!
//! A field is either raw (read from the [`DataSource`](crate::data::DataSource)) or derived
//! from other fields by a function. Descriptors ([`FieldInfo`]) live in a
//! [`FieldRegistry`]; evaluation happens per patch through a [`FieldContext`] and results
//! are memoized in the owning container's [`FieldCache`].
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod cache;
pub mod context;
pub mod info;
pub mod registry;
pub mod universal;
pub mod validators;

pub use cache::{CacheScope, FieldCache};
pub use context::{DepositMethod, FieldContext};
pub use info::{DerivedFn, FieldFunction, FieldInfo, SpatialField};
pub use registry::FieldRegistry;
pub use validators::Validator;

/// Particle type used when a particle field is requested without one.
pub const DEFAULT_PARTICLE_TYPE: &str = "all";

/// Name of a field, optionally scoped to a particle type.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    pub ptype: Option<String>,
    pub name: String,
}

impl FieldKey {
    /// A mesh (or unscoped) field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            ptype: None,
            name: name.into(),
        }
    }

    /// A field scoped to particle type `ptype`.
    pub fn particle(ptype: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ptype: Some(ptype.into()),
            name: name.into(),
        }
    }

    pub fn is_particle_scoped(&self) -> bool {
        self.ptype.is_some()
    }

    /// The same name without a particle type.
    pub fn unscoped(&self) -> FieldKey {
        FieldKey::new(self.name.clone())
    }

    pub fn with_ptype(&self, ptype: impl Into<String>) -> FieldKey {
        FieldKey::particle(ptype, self.name.clone())
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ptype {
            Some(ptype) => write!(f, "({ptype}, {})", self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl From<&str> for FieldKey {
    fn from(name: &str) -> Self {
        FieldKey::new(name)
    }
}

impl From<String> for FieldKey {
    fn from(name: String) -> Self {
        FieldKey::new(name)
    }
}

impl From<&String> for FieldKey {
    fn from(name: &String) -> Self {
        FieldKey::new(name.clone())
    }
}

impl From<(&str, &str)> for FieldKey {
    fn from((ptype, name): (&str, &str)) -> Self {
        FieldKey::particle(ptype, name)
    }
}

impl From<&FieldKey> for FieldKey {
    fn from(key: &FieldKey) -> Self {
        key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_display_with_particle_type() {
        assert_eq!(FieldKey::from("Density").to_string(), "Density");
        assert_eq!(
            FieldKey::from(("stars", "particle_mass")).to_string(),
            "(stars, particle_mass)"
        );
    }

    #[test]
    fn unscoped_drops_particle_type() {
        let key = FieldKey::particle("darkmatter", "particle_index");
        assert!(key.is_particle_scoped());
        assert_eq!(key.unscoped(), FieldKey::new("particle_index"));
        assert_eq!(key.unscoped().with_ptype("darkmatter"), key);
    }
}
