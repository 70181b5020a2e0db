//! Per-patch isosurface triangulation.
//!
//! Each cell is split into six tetrahedra around its `(0,0,0)`–`(1,1,1)` diagonal. The
//! split is the same in every cell, so neighbouring cells (and neighbouring patches)
//! cut their shared faces identically and the surface has no cracks.
use std::collections::HashMap;

use glam::DVec3;

use crate::data::{Dataset, Patch};
use crate::surface::vertex::{corner_position, global_corner};
use crate::surface::CellRef;

/// Cell corner offsets.
const CORNERS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

/// Six tetrahedra sharing the corner 0 to corner 6 diagonal.
const TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 5, 1, 6],
    [0, 1, 2, 6],
    [0, 2, 3, 6],
    [0, 3, 7, 6],
    [0, 7, 4, 6],
    [0, 4, 5, 6],
];

/// Triangles produced from a single patch, with patch-local vertex indices.
#[derive(Debug, Default)]
pub(crate) struct PatchMesh {
    pub(crate) vertices: Vec<DVec3>,
    pub(crate) triangles: Vec<[u32; 3]>,
    pub(crate) cells: Vec<CellRef>,
}

#[derive(Clone, Copy)]
struct Corner {
    id: u64,
    pos: DVec3,
    value: f64,
}

struct Marcher<'a> {
    isovalue: f64,
    min_area: f64,
    edges: HashMap<(u64, u64), u32>,
    mesh: &'a mut PatchMesh,
}

impl Marcher<'_> {
    /// Vertex on the edge between two corners, shared by every tetrahedron using the edge.
    fn edge_vertex(&mut self, a: Corner, b: Corner) -> u32 {
        let (lo, hi) = if a.id < b.id { (a, b) } else { (b, a) };
        if let Some(&idx) = self.edges.get(&(lo.id, hi.id)) {
            return idx;
        }
        let t = (self.isovalue - lo.value) / (hi.value - lo.value);
        let pos = lo.pos + (hi.pos - lo.pos) * t.clamp(0.0, 1.0);
        let idx = self.mesh.vertices.len() as u32;
        self.mesh.vertices.push(pos);
        self.edges.insert((lo.id, hi.id), idx);
        idx
    }

    fn emit(&mut self, tri: [u32; 3], uphill: DVec3, cell: CellRef) {
        if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
            return;
        }
        let [a, b, c] = tri.map(|i| self.mesh.vertices[i as usize]);
        let normal = (b - a).cross(c - a);
        if normal.length() * 0.5 <= self.min_area {
            return;
        }
        let tri = if normal.dot(uphill) < 0.0 {
            [tri[0], tri[2], tri[1]]
        } else {
            tri
        };
        self.mesh.triangles.push(tri);
        self.mesh.cells.push(cell);
    }

    fn tetrahedron(&mut self, corners: [Corner; 4], cell: CellRef) {
        let (mut above, mut below) = (Vec::with_capacity(4), Vec::with_capacity(4));
        for c in corners {
            if c.value > self.isovalue {
                above.push(c);
            } else {
                below.push(c);
            }
        }
        if above.is_empty() || below.is_empty() {
            return;
        }
        let mean = |cs: &[Corner]| cs.iter().map(|c| c.pos).sum::<DVec3>() / cs.len() as f64;
        let uphill = mean(&above) - mean(&below);

        match (above.as_slice(), below.as_slice()) {
            ([lone], others) | (others, [lone]) if others.len() == 3 => {
                let tri = [
                    self.edge_vertex(*lone, others[0]),
                    self.edge_vertex(*lone, others[1]),
                    self.edge_vertex(*lone, others[2]),
                ];
                self.emit(tri, uphill, cell);
            }
            ([a, b], [c, d]) => {
                let quad = [
                    self.edge_vertex(*a, *c),
                    self.edge_vertex(*a, *d),
                    self.edge_vertex(*b, *d),
                    self.edge_vertex(*b, *c),
                ];
                self.emit([quad[0], quad[1], quad[2]], uphill, cell);
                self.emit([quad[0], quad[2], quad[3]], uphill, cell);
            }
            _ => {}
        }
    }
}

/// Triangulates the `isovalue` level set over the selected cells of `patch`.
///
/// `corners` holds the field at the patch's cell corners (see
/// [`Patch::vertex_index`]). Cells touching a non-finite corner are skipped, as are
/// triangles with area at or below `min_area`. Triangles are wound so that their normal
/// points toward larger field values.
pub(crate) fn march_patch(
    dataset: &Dataset,
    patch: &Patch,
    corners: &[f64],
    mask: &[bool],
    isovalue: f64,
    min_area: f64,
) -> PatchMesh {
    let mut mesh = PatchMesh::default();
    let dims = dataset.domain_dimensions();
    let lattice = [dims[0] as u64 + 1, dims[1] as u64 + 1];
    let mut marcher = Marcher {
        isovalue,
        min_area,
        edges: HashMap::new(),
        mesh: &mut mesh,
    };

    for k in 0..patch.dims[2] {
        for j in 0..patch.dims[1] {
            for i in 0..patch.dims[0] {
                let cell = patch.index(i, j, k);
                if !mask.get(cell).copied().unwrap_or(false) {
                    continue;
                }

                let mut cube = [Corner {
                    id: 0,
                    pos: DVec3::ZERO,
                    value: 0.0,
                }; 8];
                let (mut any_above, mut any_below, mut finite) = (false, false, true);
                for (slot, [di, dj, dk]) in cube.iter_mut().zip(CORNERS) {
                    let value = corners[patch.vertex_index(i + di, j + dj, k + dk)];
                    finite &= value.is_finite();
                    if value > isovalue {
                        any_above = true;
                    } else {
                        any_below = true;
                    }
                    let g = global_corner(patch, i + di, j + dj, k + dk);
                    *slot = Corner {
                        id: g[0] as u64 + lattice[0] * (g[1] as u64 + lattice[1] * g[2] as u64),
                        pos: corner_position(dataset, g),
                        value,
                    };
                }
                if !finite || !any_above || !any_below {
                    continue;
                }

                let cell = CellRef {
                    patch: patch.id,
                    cell,
                };
                for tet in TETRAHEDRA {
                    marcher.tetrahedron(tet.map(|c| cube[c]), cell);
                }
            }
        }
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DatasetBuilder, InMemorySource};

    fn dataset(n: usize) -> Dataset {
        DatasetBuilder::new("grid", [n, n, n])
            .build(InMemorySource::default())
            .expect("valid dataset")
    }

    fn plane_corners(patch: &Patch, ds: &Dataset) -> Vec<f64> {
        let [vx, vy, vz] = patch.vertex_dims();
        let mut out = Vec::new();
        for k in 0..vz {
            for j in 0..vy {
                for i in 0..vx {
                    out.push(corner_position(ds, global_corner(patch, i, j, k)).x);
                }
            }
        }
        out
    }

    #[test]
    fn plane_is_flat_and_oriented_uphill() {
        let ds = dataset(4);
        let patch = &ds.patches()[0];
        let corners = plane_corners(patch, &ds);
        let mesh = march_patch(&ds, patch, &corners, &vec![true; 64], 0.6, 0.0);

        assert!(!mesh.triangles.is_empty());
        assert!(mesh.vertices.iter().all(|v| (v.x - 0.6).abs() < 1e-12));
        let mut area = 0.0;
        for tri in &mesh.triangles {
            let [a, b, c] = tri.map(|i| mesh.vertices[i as usize]);
            let n = (b - a).cross(c - a);
            assert!(n.x > 0.0);
            area += n.length() * 0.5;
        }
        assert!((area - 1.0).abs() < 1e-12);
        assert_eq!(mesh.cells.len(), mesh.triangles.len());
    }

    #[test]
    fn shared_edges_reuse_vertices() {
        let ds = dataset(4);
        let patch = &ds.patches()[0];
        let corners = plane_corners(patch, &ds);
        let mesh = march_patch(&ds, patch, &corners, &vec![true; 64], 0.6, 0.0);
        // One vertex per crossed x-edge plus one per crossed face diagonal.
        assert_eq!(mesh.vertices.len(), 5 * 5 + 4 * 5 + 5 * 4 + 4 * 4);
    }

    #[test]
    fn masked_and_non_finite_cells_are_skipped() {
        let ds = dataset(2);
        let patch = &ds.patches()[0];
        let corners = plane_corners(patch, &ds);
        let none = march_patch(&ds, patch, &corners, &vec![false; 8], 0.25, 0.0);
        assert!(none.triangles.is_empty());

        let mut poisoned = corners.clone();
        poisoned.iter_mut().for_each(|v| *v = f64::NAN);
        let nan = march_patch(&ds, patch, &poisoned, &vec![true; 8], 0.25, 0.0);
        assert!(nan.triangles.is_empty());
    }
}
