//! Seam vertex merging.
//!
//! Patches are triangulated independently, so a vertex on a patch boundary is emitted
//! once per patch. The merge pass snaps vertices that lie within a tolerance of a
//! representative onto it, using a spatial hash with cells as wide as the tolerance.
//! Vertices are clustered in lexicographic position order, so the result does not
//! depend on the order patches were appended in.
use std::collections::HashMap;

use glam::DVec3;

use crate::surface::marching::PatchMesh;
use crate::surface::CellRef;

/// Arena collecting per-patch meshes in patch order with stable global indices.
#[derive(Debug, Default)]
pub(crate) struct MeshArena {
    pub(crate) vertices: Vec<DVec3>,
    pub(crate) triangles: Vec<[u32; 3]>,
    pub(crate) cells: Vec<CellRef>,
}

impl MeshArena {
    pub(crate) fn append(&mut self, mesh: PatchMesh) {
        let offset = self.vertices.len() as u32;
        self.vertices.extend(mesh.vertices);
        self.triangles
            .extend(mesh.triangles.into_iter().map(|t| t.map(|i| i + offset)));
        self.cells.extend(mesh.cells);
    }
}

/// Result of [`merge_vertices`].
#[derive(Debug, Default)]
pub(crate) struct MergedMesh {
    pub(crate) vertices: Vec<DVec3>,
    pub(crate) triangles: Vec<[u32; 3]>,
    pub(crate) cells: Vec<CellRef>,
    pub(crate) dropped_triangles: usize,
}

/// Merges vertices closer than `tolerance`, then drops collapsed triangles and
/// unreferenced vertices.
///
/// The lexicographically smallest vertex of a cluster represents it, so no two output
/// vertices are within `tolerance` of each other. Output vertices keep the order in which
/// their clusters first appear in the arena.
pub(crate) fn merge_vertices(arena: MeshArena, tolerance: f64) -> MergedMesh {
    let bucket = |p: DVec3| -> [i64; 3] {
        let q = (p / tolerance).floor();
        [q.x as i64, q.y as i64, q.z as i64]
    };

    let mut order: Vec<usize> = (0..arena.vertices.len()).collect();
    order.sort_by(|&a, &b| {
        let (pa, pb) = (arena.vertices[a], arena.vertices[b]);
        pa.x.total_cmp(&pb.x)
            .then(pa.y.total_cmp(&pb.y))
            .then(pa.z.total_cmp(&pb.z))
            .then(a.cmp(&b))
    });

    let mut grid: HashMap<[i64; 3], Vec<u32>> = HashMap::new();
    let mut representatives: Vec<DVec3> = Vec::new();
    let mut remap = vec![0u32; arena.vertices.len()];

    for &v in &order {
        let p = arena.vertices[v];
        let b = bucket(p);
        let mut found = None;
        'search: for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let Some(candidates) = grid.get(&[b[0] + dx, b[1] + dy, b[2] + dz]) else {
                        continue;
                    };
                    if let Some(&rep) = candidates
                        .iter()
                        .find(|&&r| representatives[r as usize].distance(p) <= tolerance)
                    {
                        found = Some(rep);
                        break 'search;
                    }
                }
            }
        }
        remap[v] = found.unwrap_or_else(|| {
            let idx = representatives.len() as u32;
            representatives.push(p);
            grid.entry(b).or_default().push(idx);
            idx
        });
    }

    let mut used = vec![false; representatives.len()];
    let mut triangles = Vec::with_capacity(arena.triangles.len());
    let mut cells = Vec::with_capacity(arena.cells.len());
    let mut dropped = 0;
    for (tri, cell) in arena.triangles.iter().zip(&arena.cells) {
        let t = tri.map(|i| remap[i as usize]);
        if t[0] == t[1] || t[1] == t[2] || t[0] == t[2] {
            dropped += 1;
            continue;
        }
        t.iter().for_each(|&i| used[i as usize] = true);
        triangles.push(t);
        cells.push(*cell);
    }

    let mut compact = vec![u32::MAX; representatives.len()];
    let mut vertices = Vec::with_capacity(representatives.len());
    for &rep in &remap {
        let r = rep as usize;
        if used[r] && compact[r] == u32::MAX {
            compact[r] = vertices.len() as u32;
            vertices.push(representatives[r]);
        }
    }
    for t in &mut triangles {
        *t = t.map(|i| compact[i as usize]);
    }

    MergedMesh {
        vertices,
        triangles,
        cells,
        dropped_triangles: dropped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PatchId;

    fn cell() -> CellRef {
        CellRef {
            patch: PatchId(0),
            cell: 0,
        }
    }

    fn mesh(vertices: Vec<DVec3>, triangles: Vec<[u32; 3]>) -> PatchMesh {
        let cells = vec![cell(); triangles.len()];
        PatchMesh {
            vertices,
            triangles,
            cells,
        }
    }

    #[test]
    fn seam_duplicates_collapse() {
        let mut arena = MeshArena::default();
        arena.append(mesh(
            vec![DVec3::ZERO, DVec3::X, DVec3::Y],
            vec![[0, 1, 2]],
        ));
        arena.append(mesh(
            vec![DVec3::X + DVec3::splat(1e-9), DVec3::Y, DVec3::new(1.0, 1.0, 0.0)],
            vec![[0, 2, 1]],
        ));
        let merged = merge_vertices(arena, 1e-6);
        assert_eq!(merged.vertices.len(), 4);
        assert_eq!(merged.triangles, vec![[0, 1, 2], [1, 3, 2]]);
        assert_eq!(merged.dropped_triangles, 0);
    }

    #[test]
    fn collapsed_triangles_and_orphans_are_removed() {
        let mut arena = MeshArena::default();
        arena.append(mesh(
            vec![
                DVec3::ZERO,
                DVec3::splat(1e-8),
                DVec3::X,
                DVec3::new(5.0, 5.0, 5.0),
                DVec3::Y,
            ],
            vec![[0, 1, 2], [0, 2, 4]],
        ));
        let merged = merge_vertices(arena, 1e-6);
        assert_eq!(merged.dropped_triangles, 1);
        assert_eq!(merged.vertices, vec![DVec3::ZERO, DVec3::X, DVec3::Y]);
        assert_eq!(merged.triangles, vec![[0, 1, 2]]);
        assert_eq!(merged.cells.len(), 1);
    }

    #[test]
    fn clusters_do_not_depend_on_input_order() {
        let chain = [
            DVec3::ZERO,
            DVec3::new(0.6e-6, 0.0, 0.0),
            DVec3::new(1.2e-6, 0.0, 0.0),
        ];
        let merged_positions = |order: [usize; 3]| {
            let mut vertices: Vec<DVec3> = order.iter().map(|&i| chain[i]).collect();
            vertices.extend([DVec3::Y, DVec3::Z]);
            let triangles = vec![[0, 3, 4], [1, 3, 4], [2, 3, 4]];
            let mut arena = MeshArena::default();
            arena.append(mesh(vertices, triangles));
            let mut out = merge_vertices(arena, 1e-6).vertices;
            out.sort_by(|a, b| {
                a.x.total_cmp(&b.x)
                    .then(a.y.total_cmp(&b.y))
                    .then(a.z.total_cmp(&b.z))
            });
            out
        };

        let expected = merged_positions([0, 1, 2]);
        assert_eq!(expected, vec![chain[0], DVec3::Z, DVec3::Y, chain[2]]);
        for order in [[1, 0, 2], [2, 1, 0], [1, 2, 0]] {
            assert_eq!(merged_positions(order), expected);
        }
    }

    #[test]
    fn output_vertices_are_separated() {
        let mut arena = MeshArena::default();
        let mut vertices: Vec<DVec3> = (0..49)
            .map(|n| DVec3::new(n as f64 * 4e-7, 0.0, 0.0))
            .collect();
        vertices.push(DVec3::Y);
        let triangles = (0..48).map(|n| [n, n + 1, 49]).collect();
        arena.append(mesh(vertices, triangles));
        let merged = merge_vertices(arena, 1e-6);
        assert!(merged.vertices.len() > 2);
        for (i, a) in merged.vertices.iter().enumerate() {
            for b in &merged.vertices[i + 1..] {
                assert!(a.distance(*b) > 1e-6);
            }
        }
    }
}
