//! Geometric selectors used by data containers.
use glam::DVec3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::data::Patch;

/// Region of space selected by a container. Cells are selected by their centers.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub enum Selector {
    /// The whole domain.
    All,
    /// Points within `radius` of `center` (inclusive).
    Sphere { center: DVec3, radius: f64 },
    /// Points in the half-open box `[left, right)`.
    Region { left: DVec3, right: DVec3 },
}

impl Selector {
    pub fn select_point(&self, p: DVec3) -> bool {
        match self {
            Selector::All => true,
            Selector::Sphere { center, radius } => p.distance_squared(*center) <= radius * radius,
            Selector::Region { left, right } => p.cmpge(*left).all() && p.cmplt(*right).all(),
        }
    }

    /// Conservative test whether any part of `patch` may be selected.
    pub fn intersects_patch(&self, patch: &Patch) -> bool {
        match self {
            Selector::All => true,
            Selector::Sphere { center, radius } => {
                let closest = center.clamp(patch.left_edge, patch.right_edge());
                closest.distance_squared(*center) <= radius * radius
            }
            Selector::Region { left, right } => patch.intersects_box(*left, *right),
        }
    }

    /// Bounding box of the selection, clipped to the domain.
    pub fn bounds(&self, domain_left: DVec3, domain_right: DVec3) -> (DVec3, DVec3) {
        match self {
            Selector::All => (domain_left, domain_right),
            Selector::Sphere { center, radius } => (
                (*center - DVec3::splat(*radius)).max(domain_left),
                (*center + DVec3::splat(*radius)).min(domain_right),
            ),
            Selector::Region { left, right } => {
                (left.max(domain_left), right.min(domain_right))
            }
        }
    }

    /// Natural center of the selection, if it has one.
    pub fn center(&self) -> Option<DVec3> {
        match self {
            Selector::All => None,
            Selector::Sphere { center, .. } => Some(*center),
            Selector::Region { left, right } => Some((*left + *right) * 0.5),
        }
    }
}
