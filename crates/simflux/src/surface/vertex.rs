//! Point sampling of mesh fields for surface extraction.
//!
//! Cell-centered data are turned into corner values by averaging the eight cells that
//! share a corner, across patch seams and clamped at the domain edge. Fields with a
//! closed form ([`SpatialField`]) skip the data entirely and are evaluated exactly.
use std::collections::HashMap;
use std::sync::Arc;

use glam::DVec3;

use crate::data::{DataContainer, Dataset, FieldArray, Patch, PatchId};
use crate::error::{Error, Result};
use crate::fields::{FieldKey, SpatialField};
use crate::surface::CellRef;
use crate::units::Unit;

#[derive(Clone, Copy, Debug)]
struct Exact {
    field: SpatialField,
    center: DVec3,
    /// Code length to declared units.
    scale: f64,
}

impl Exact {
    #[inline]
    fn value(&self, p: DVec3) -> f64 {
        self.field.evaluate(p, self.center) * self.scale
    }
}

/// Samples one mesh field of a container at cells, corners and arbitrary points.
pub(crate) struct FieldSampler<'c> {
    container: &'c DataContainer<'c>,
    dataset: &'c Dataset,
    key: FieldKey,
    units: Unit,
    exact: Option<Exact>,
    cells: HashMap<PatchId, Arc<FieldArray>>,
    corners: HashMap<PatchId, Arc<Vec<f64>>>,
}

impl<'c> FieldSampler<'c> {
    pub(crate) fn new(container: &'c DataContainer<'c>, key: impl Into<FieldKey>) -> Result<Self> {
        let dataset = container.dataset();
        let key = container.resolve(key);
        let info = dataset.field_info(&key)?;
        if info.particle_type {
            return Err(Error::InvalidConfig(format!(
                "particle field '{key}' cannot be sampled on a surface"
            )));
        }
        let units = dataset.parse_unit(&info.units)?;
        let exact = match info.spatial {
            Some(field) => Some(Exact {
                field,
                center: container.center(),
                scale: dataset.code_length().conversion_factor(&units)?,
            }),
            None => None,
        };
        Ok(Self {
            container,
            dataset,
            key,
            units,
            exact,
            cells: HashMap::new(),
            corners: HashMap::new(),
        })
    }

    pub(crate) fn key(&self) -> &FieldKey {
        &self.key
    }

    pub(crate) fn units(&self) -> &Unit {
        &self.units
    }

    /// True when the field is evaluated from coordinates rather than data.
    pub(crate) fn is_exact(&self) -> bool {
        self.exact.is_some()
    }

    /// Axis index and scale for coordinate fields.
    pub(crate) fn axis(&self) -> Option<(usize, f64)> {
        self.exact
            .and_then(|e| e.field.axis().map(|axis| (axis, e.scale)))
    }

    fn patch(&self, id: PatchId) -> Result<&'c Patch> {
        self.dataset
            .patch(id)
            .ok_or_else(|| Error::InvalidData(format!("unknown patch {}", id.0)))
    }

    fn cell_values(&mut self, patch: &Patch) -> Result<Arc<FieldArray>> {
        if let Some(hit) = self.cells.get(&patch.id) {
            return Ok(Arc::clone(hit));
        }
        let values = self.container.patch_field(patch, &self.key)?;
        if values.len() != patch.cell_count() {
            return Err(Error::InvalidData(format!(
                "field '{}' has {} values on patch {} with {} cells",
                self.key,
                values.len(),
                patch.id.0,
                patch.cell_count()
            )));
        }
        self.cells.insert(patch.id, Arc::clone(&values));
        Ok(values)
    }

    fn global_cell_value(&mut self, global: [i64; 3], hint: Option<&Patch>) -> Result<f64> {
        let (patch, idx) = self
            .dataset
            .locate_cell(global, hint)
            .ok_or_else(|| Error::InvalidData(format!("no patch owns cell {global:?}")))?;
        Ok(self.cell_values(patch)?.values[idx])
    }

    /// Value of the field in one cell.
    pub(crate) fn at_cell(&mut self, cell: CellRef) -> Result<f64> {
        let patch = self.patch(cell.patch)?;
        if let Some(exact) = self.exact {
            let [i, j, k] = patch.unravel(cell.cell);
            return Ok(exact.value(patch.cell_center(i, j, k)));
        }
        Ok(self.cell_values(patch)?.values[cell.cell])
    }

    /// Corner values of `patch`, indexed by [`Patch::vertex_index`].
    pub(crate) fn corner_values(&mut self, patch: &Patch) -> Result<Arc<Vec<f64>>> {
        if let Some(hit) = self.corners.get(&patch.id) {
            return Ok(Arc::clone(hit));
        }
        let [vx, vy, vz] = patch.vertex_dims();
        let mut out = Vec::with_capacity(vx * vy * vz);

        if let Some(exact) = self.exact {
            for k in 0..vz {
                for j in 0..vy {
                    for i in 0..vx {
                        let global = global_corner(patch, i, j, k);
                        out.push(exact.value(corner_position(self.dataset, global)));
                    }
                }
            }
        } else {
            let own = self.cell_values(patch)?;
            let dims = self.dataset.domain_dimensions();
            for k in 0..vz {
                for j in 0..vy {
                    for i in 0..vx {
                        let global = global_corner(patch, i, j, k);
                        let mut ranges = [[0usize; 2]; 3];
                        let mut local = true;
                        for axis in 0..3 {
                            let max = dims[axis].saturating_sub(1);
                            let lo = global[axis].saturating_sub(1).min(max);
                            let hi = global[axis].min(max);
                            let start = patch.start_index[axis];
                            local &= lo >= start && hi < start + patch.dims[axis];
                            ranges[axis] = [lo, hi];
                        }

                        let mut sum = 0.0;
                        for cz in ranges[2] {
                            for cy in ranges[1] {
                                for cx in ranges[0] {
                                    sum += if local {
                                        own.values[patch.index(
                                            cx - patch.start_index[0],
                                            cy - patch.start_index[1],
                                            cz - patch.start_index[2],
                                        )]
                                    } else {
                                        let cell = [cx as i64, cy as i64, cz as i64];
                                        self.global_cell_value(cell, Some(patch))?
                                    };
                                }
                            }
                        }
                        out.push(sum / 8.0);
                    }
                }
            }
        }

        let out = Arc::new(out);
        self.corners.insert(patch.id, Arc::clone(&out));
        Ok(out)
    }

    /// Trilinear interpolation of the corner values of `cell` at `p`.
    ///
    /// Points outside the cell are clamped onto its boundary.
    pub(crate) fn at_cell_point(&mut self, cell: CellRef, p: DVec3) -> Result<f64> {
        if let Some(exact) = self.exact {
            return Ok(exact.value(p));
        }
        let patch = self.patch(cell.patch)?;
        let corners = self.corner_values(patch)?;
        let [i, j, k] = patch.unravel(cell.cell);
        let lo = corner_position(self.dataset, global_corner(patch, i, j, k));
        let t = ((p - lo) / patch.cell_size).clamp(DVec3::ZERO, DVec3::ONE);

        let mut c = [0.0; 8];
        for (n, slot) in c.iter_mut().enumerate() {
            let (di, dj, dk) = (n & 1, (n >> 1) & 1, (n >> 2) & 1);
            *slot = corners[patch.vertex_index(i + di, j + dj, k + dk)];
        }
        Ok(trilinear(&c, t))
    }

    /// Trilinear interpolation between the cell centers surrounding `p`.
    pub(crate) fn at_point(&mut self, p: DVec3) -> Result<f64> {
        if let Some(exact) = self.exact {
            return Ok(exact.value(p));
        }
        let rel = (p - self.dataset.domain_left_edge()) / self.dataset.cell_size() - 0.5;
        let base = rel.floor();
        let t = (rel - base).clamp(DVec3::ZERO, DVec3::ONE);
        let base = [base.x as i64, base.y as i64, base.z as i64];

        let mut c = [0.0; 8];
        let mut hint: Option<&'c Patch> = None;
        for (n, slot) in c.iter_mut().enumerate() {
            let cell = [
                base[0] + (n & 1) as i64,
                base[1] + ((n >> 1) & 1) as i64,
                base[2] + ((n >> 2) & 1) as i64,
            ];
            let (patch, idx) = self
                .dataset
                .locate_cell(cell, hint)
                .ok_or_else(|| Error::InvalidData(format!("no patch owns cell {cell:?}")))?;
            hint = Some(patch);
            *slot = self.cell_values(patch)?.values[idx];
        }
        Ok(trilinear(&c, t))
    }
}

/// Global lattice index of local corner `(i, j, k)` of `patch`.
#[inline]
pub(crate) fn global_corner(patch: &Patch, i: usize, j: usize, k: usize) -> [usize; 3] {
    [
        patch.start_index[0] + i,
        patch.start_index[1] + j,
        patch.start_index[2] + k,
    ]
}

/// Position of a global lattice corner.
///
/// Computed from the domain edge so that patches sharing a corner agree bit for bit.
#[inline]
pub(crate) fn corner_position(dataset: &Dataset, global: [usize; 3]) -> DVec3 {
    dataset.domain_left_edge()
        + dataset.cell_size() * DVec3::new(global[0] as f64, global[1] as f64, global[2] as f64)
}

/// Interpolates eight corner values ordered with `x` varying fastest.
pub(crate) fn trilinear(c: &[f64; 8], t: DVec3) -> f64 {
    let x00 = c[0] + (c[1] - c[0]) * t.x;
    let x10 = c[2] + (c[3] - c[2]) * t.x;
    let x01 = c[4] + (c[5] - c[4]) * t.x;
    let x11 = c[6] + (c[7] - c[6]) * t.x;
    let y0 = x00 + (x10 - x00) * t.y;
    let y1 = x01 + (x11 - x01) * t.y;
    y0 + (y1 - y0) * t.z
}
