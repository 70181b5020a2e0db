//! Grid patch geometry.
//!
//! This module defines [`Patch`] and [`PatchId`]: rectilinear blocks of the simulation
//! domain with a uniform cell size. Cell-centered arrays on a patch are stored with `x`
//! varying fastest, then `y`, then `z`.
use glam::DVec3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier for a patch within a dataset.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatchId(pub usize);

/// A rectilinear block of cells with uniform spacing.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Patch {
    /// Patch identifier.
    pub id: PatchId,
    /// Lower corner in code units.
    pub left_edge: DVec3,
    /// Cell size along each axis in code units.
    pub cell_size: DVec3,
    /// Number of cells along each axis.
    pub dims: [usize; 3],
    /// Index of the first cell in the global (domain) cell lattice.
    pub start_index: [usize; 3],
}

impl Patch {
    /// Upper corner in code units.
    pub fn right_edge(&self) -> DVec3 {
        self.left_edge + self.cell_size * dims_vec(self.dims)
    }

    /// Number of cells in the patch.
    pub fn cell_count(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Number of cell corners along each axis.
    pub fn vertex_dims(&self) -> [usize; 3] {
        [self.dims[0] + 1, self.dims[1] + 1, self.dims[2] + 1]
    }

    /// Linear index of cell `(i, j, k)`.
    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.dims[0] * (j + self.dims[1] * k)
    }

    /// Inverse of [`Patch::index`].
    #[inline]
    pub fn unravel(&self, idx: usize) -> [usize; 3] {
        let i = idx % self.dims[0];
        let j = (idx / self.dims[0]) % self.dims[1];
        let k = idx / (self.dims[0] * self.dims[1]);
        [i, j, k]
    }

    /// Linear index of corner `(i, j, k)` in a vertex-centered array.
    #[inline]
    pub fn vertex_index(&self, i: usize, j: usize, k: usize) -> usize {
        let [vx, vy, _] = self.vertex_dims();
        i + vx * (j + vy * k)
    }

    /// Position of the center of cell `(i, j, k)`.
    pub fn cell_center(&self, i: usize, j: usize, k: usize) -> DVec3 {
        self.left_edge + self.cell_size * DVec3::new(i as f64 + 0.5, j as f64 + 0.5, k as f64 + 0.5)
    }

    /// Position of corner `(i, j, k)`.
    pub fn vertex_position(&self, i: usize, j: usize, k: usize) -> DVec3 {
        self.left_edge + self.cell_size * DVec3::new(i as f64, j as f64, k as f64)
    }

    /// Centers of all cells, in storage order.
    pub fn cell_centers(&self) -> Vec<DVec3> {
        let mut out = Vec::with_capacity(self.cell_count());
        for k in 0..self.dims[2] {
            for j in 0..self.dims[1] {
                for i in 0..self.dims[0] {
                    out.push(self.cell_center(i, j, k));
                }
            }
        }
        out
    }

    /// Volume of one cell in code units.
    pub fn cell_volume(&self) -> f64 {
        self.cell_size.x * self.cell_size.y * self.cell_size.z
    }

    /// Returns true if `p` lies inside the patch (upper faces excluded).
    pub fn contains(&self, p: DVec3) -> bool {
        let hi = self.right_edge();
        p.cmpge(self.left_edge).all() && p.cmplt(hi).all()
    }

    /// Converts a position to local cell indices, or `None` outside the patch.
    pub fn world_to_index(&self, p: DVec3) -> Option<[usize; 3]> {
        if !self.contains(p) {
            return None;
        }
        let rel = (p - self.left_edge) / self.cell_size;
        Some([
            (rel.x.floor() as usize).min(self.dims[0] - 1),
            (rel.y.floor() as usize).min(self.dims[1] - 1),
            (rel.z.floor() as usize).min(self.dims[2] - 1),
        ])
    }

    /// Local index of a global cell, or `None` if this patch does not own it.
    pub fn local_index(&self, global: [usize; 3]) -> Option<usize> {
        let mut local = [0usize; 3];
        for axis in 0..3 {
            let g = global[axis];
            let s = self.start_index[axis];
            if g < s || g >= s + self.dims[axis] {
                return None;
            }
            local[axis] = g - s;
        }
        Some(self.index(local[0], local[1], local[2]))
    }

    /// Axis-aligned box overlap test.
    pub fn intersects_box(&self, lo: DVec3, hi: DVec3) -> bool {
        let right = self.right_edge();
        self.left_edge.cmple(hi).all() && right.cmpge(lo).all()
    }
}

/// Splits a domain of `dims` cells into roughly `parts` patches.
///
/// Prime factors of `parts` are assigned to whichever axis currently has the largest
/// patches. Patches are numbered with `x` varying fastest.
pub fn decompose_domain(left: DVec3, right: DVec3, dims: [usize; 3], parts: usize) -> Vec<Patch> {
    let mut splits = [1usize; 3];
    for factor in prime_factors(parts.max(1)) {
        let axis = (0..3)
            .filter(|&a| splits[a] * factor <= dims[a])
            .max_by(|&a, &b| {
                let wa = dims[a] as f64 / splits[a] as f64;
                let wb = dims[b] as f64 / splits[b] as f64;
                wa.total_cmp(&wb).then(b.cmp(&a))
            });
        if let Some(axis) = axis {
            splits[axis] *= factor;
        }
    }

    let cell_size = (right - left) / dims_vec(dims);
    let bound = |axis: usize, n: usize| dims[axis] * n / splits[axis];
    let mut patches = Vec::with_capacity(splits.iter().product());
    for pk in 0..splits[2] {
        for pj in 0..splits[1] {
            for pi in 0..splits[0] {
                let start = [bound(0, pi), bound(1, pj), bound(2, pk)];
                let end = [bound(0, pi + 1), bound(1, pj + 1), bound(2, pk + 1)];
                patches.push(Patch {
                    id: PatchId(patches.len()),
                    left_edge: left + cell_size * dims_vec(start),
                    cell_size,
                    dims: [end[0] - start[0], end[1] - start[1], end[2] - start[2]],
                    start_index: start,
                });
            }
        }
    }
    patches
}

fn prime_factors(mut n: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut f = 2;
    while f * f <= n {
        while n % f == 0 {
            out.push(f);
            n /= f;
        }
        f += 1;
    }
    if n > 1 {
        out.push(n);
    }
    out.reverse();
    out
}

fn dims_vec(dims: [usize; 3]) -> DVec3 {
    DVec3::new(dims[0] as f64, dims[1] as f64, dims[2] as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_patch() -> Patch {
        Patch {
            id: PatchId(3),
            left_edge: DVec3::new(0.5, 0.0, 0.0),
            cell_size: DVec3::splat(0.25),
            dims: [2, 4, 4],
            start_index: [2, 0, 0],
        }
    }

    #[test]
    fn index_roundtrip() {
        let patch = sample_patch();
        let idx = patch.index(1, 2, 3);
        assert_eq!(patch.unravel(idx), [1, 2, 3]);
        assert_eq!(patch.cell_count(), 32);
    }

    #[test]
    fn edges_and_centers() {
        let patch = sample_patch();
        assert_eq!(patch.right_edge(), DVec3::new(1.0, 1.0, 1.0));
        assert_eq!(patch.cell_center(0, 0, 0), DVec3::new(0.625, 0.125, 0.125));
        assert_eq!(patch.vertex_position(2, 4, 4), DVec3::new(1.0, 1.0, 1.0));
        assert_eq!(patch.cell_centers().len(), patch.cell_count());
    }

    #[test]
    fn world_to_index_rejects_outside_points() {
        let patch = sample_patch();
        assert_eq!(patch.world_to_index(DVec3::new(0.8, 0.3, 0.9)), Some([1, 1, 3]));
        assert_eq!(patch.world_to_index(DVec3::new(0.2, 0.3, 0.9)), None);
        assert_eq!(patch.world_to_index(DVec3::new(1.0, 0.3, 0.9)), None);
    }

    #[test]
    fn local_index_maps_global_cells() {
        let patch = sample_patch();
        assert_eq!(patch.local_index([2, 0, 0]), Some(0));
        assert_eq!(patch.local_index([3, 1, 0]), Some(patch.index(1, 1, 0)));
        assert_eq!(patch.local_index([1, 0, 0]), None);
        assert_eq!(patch.local_index([4, 0, 0]), None);
    }

    #[test]
    fn decomposition_tiles_the_domain() {
        let patches = decompose_domain(DVec3::ZERO, DVec3::ONE, [64, 64, 64], 4);
        assert_eq!(patches.len(), 4);
        let total: usize = patches.iter().map(Patch::cell_count).sum();
        assert_eq!(total, 64 * 64 * 64);
        assert_eq!(patches[0].dims, [32, 32, 64]);
        assert_eq!(patches[3].start_index, [32, 32, 0]);
        assert_eq!(patches[3].left_edge, DVec3::new(0.5, 0.5, 0.0));
    }

    #[test]
    fn decomposition_handles_uneven_and_single_parts() {
        let single = decompose_domain(DVec3::ZERO, DVec3::ONE, [5, 5, 5], 1);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].dims, [5, 5, 5]);

        let uneven = decompose_domain(DVec3::ZERO, DVec3::ONE, [5, 4, 4], 3);
        assert_eq!(uneven.len(), 3);
        assert_eq!(uneven.iter().map(|p| p.dims[0]).sum::<usize>(), 5);
    }

    #[test]
    fn intersects_box_is_inclusive() {
        let patch = sample_patch();
        assert!(patch.intersects_box(DVec3::ZERO, DVec3::splat(0.5)));
        assert!(!patch.intersects_box(DVec3::ZERO, DVec3::splat(0.4)));
    }
}
