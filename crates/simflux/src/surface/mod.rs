//! Isosurfaces of mesh fields and the data sampled on them.
//!
//! A [`Surface`] is a triangle mesh in code length, produced by [`SurfaceExtractor`]
//! from the cells of a [`DataContainer`]. Every triangle remembers the cell it was cut
//! from, so fields can be sampled per vertex, per face or per source cell afterwards.
//!
//! ```no_run
//! use simflux::prelude::*;
//!
//! # fn main() -> simflux::error::Result<()> {
//! let ds = FakeDatasetBuilder::new(32).build()?;
//! let ad = ds.all_data();
//! let mut surf = ds.surface(&ad, "x", 0.51)?;
//! let flux = surf.calculate_flux("ones", "zeros", "zeros", Some("ones".into()))?;
//! let n = surf.triangle_count();
//! println!("{n} triangles, flux {flux}");
//! let x = surf.get("x")?;
//! assert_eq!(x.len(), n);
//! # Ok(())
//! # }
//! ```
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use glam::DVec3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::data::{DataContainer, FieldArray, PatchId};
use crate::error::{Error, Result};
use crate::fields::FieldKey;
use crate::units::{Dimensions, Quantity, Unit};

pub mod events;
pub mod extract;
mod flux;
mod marching;
mod merge;
mod vertex;

pub use events::{EventSink, FnSink, MultiSink, SurfaceEvent, SurfaceEventKind, VecSink};
pub use extract::{SurfaceConfig, SurfaceExtractor};

pub(crate) use vertex::FieldSampler;

/// A cell of a patch: the source of a surface triangle.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub patch: PatchId,
    /// Linear cell index within the patch.
    pub cell: usize,
}

/// Where a field is sampled on a surface.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SampleType {
    /// One value per vertex.
    Vertex,
    /// One value per triangle, interpolated at its centroid within the source cell.
    Face,
    /// One value per triangle, taken from the source cell.
    Cell,
}

impl FromStr for SampleType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "vertex" => Ok(SampleType::Vertex),
            "face" => Ok(SampleType::Face),
            "cell" => Ok(SampleType::Cell),
            other => Err(Error::InvalidConfig(format!("unknown sample type '{other}'"))),
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SampleType::Vertex => "vertex",
            SampleType::Face => "face",
            SampleType::Cell => "cell",
        })
    }
}

/// A triangulated isosurface extracted from a container.
///
/// Vertex positions are in code length. Triangles are wound so that their normals
/// point toward larger values of the extracted field.
#[derive(Debug)]
pub struct Surface<'c> {
    container: &'c DataContainer<'c>,
    field: FieldKey,
    isovalue: f64,
    field_units: Unit,
    vertices: Vec<DVec3>,
    triangles: Vec<[u32; 3]>,
    triangle_cells: Vec<CellRef>,
    samples: HashMap<(FieldKey, SampleType), FieldArray>,
}

impl<'c> Surface<'c> {
    pub(crate) fn new(
        container: &'c DataContainer<'c>,
        field: FieldKey,
        isovalue: f64,
        field_units: Unit,
        vertices: Vec<DVec3>,
        triangles: Vec<[u32; 3]>,
        triangle_cells: Vec<CellRef>,
    ) -> Self {
        Self {
            container,
            field,
            isovalue,
            field_units,
            vertices,
            triangles,
            triangle_cells,
            samples: HashMap::new(),
        }
    }

    pub(crate) fn empty(
        container: &'c DataContainer<'c>,
        field: FieldKey,
        isovalue: f64,
        field_units: Unit,
    ) -> Self {
        Self::new(
            container,
            field,
            isovalue,
            field_units,
            Vec::new(),
            Vec::new(),
            Vec::new(),
        )
    }

    pub fn container(&self) -> &'c DataContainer<'c> {
        self.container
    }

    /// The extracted field.
    pub fn field(&self) -> &FieldKey {
        &self.field
    }

    /// The isovalue, in the units of [`Surface::field`].
    pub fn isovalue(&self) -> Quantity {
        Quantity::new(self.isovalue, self.field_units.clone())
    }

    pub fn vertices(&self) -> &[DVec3] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    /// Source cell of each triangle.
    pub fn triangle_cells(&self) -> &[CellRef] {
        &self.triangle_cells
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Units of the vertex positions.
    pub fn units(&self) -> Unit {
        self.container.dataset().code_length()
    }

    /// Corner positions of triangle `t`.
    pub fn triangle(&self, t: usize) -> Option<[DVec3; 3]> {
        self.triangles
            .get(t)
            .map(|tri| tri.map(|i| self.vertices[i as usize]))
    }

    /// Total area in `code_length**2`.
    pub fn surface_area(&self) -> Quantity {
        let area = (0..self.triangles.len())
            .filter_map(|t| self.triangle(t))
            .map(|[a, b, c]| 0.5 * (b - a).cross(c - a).length())
            .sum();
        Quantity::new(area, self.units().powf(2.0))
    }

    /// Samples `field` on the surface, caching the result.
    ///
    /// For coordinate fields sampled per vertex the values are the matching column of
    /// [`Surface::vertices`].
    pub fn get_data(
        &mut self,
        field: impl Into<FieldKey>,
        sample_type: SampleType,
    ) -> Result<&FieldArray> {
        let key = self.container.resolve(field);
        match self.samples.entry((key, sample_type)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let values = sample_field(
                    self.container,
                    &self.vertices,
                    &self.triangles,
                    &self.triangle_cells,
                    &entry.key().0,
                    sample_type,
                )?;
                Ok(entry.insert(values))
            }
        }
    }

    /// Per-triangle samples of `field`.
    pub fn get(&mut self, field: impl Into<FieldKey>) -> Result<&FieldArray> {
        self.get_data(field, SampleType::Face)
    }

    /// Samples `field` without touching the cache.
    pub fn sample(&self, field: impl Into<FieldKey>, sample_type: SampleType) -> Result<FieldArray> {
        let key = self.container.resolve(field);
        if let Some(hit) = self.samples.get(&(key.clone(), sample_type)) {
            return Ok(hit.clone());
        }
        sample_field(
            self.container,
            &self.vertices,
            &self.triangles,
            &self.triangle_cells,
            &key,
            sample_type,
        )
    }
}

fn sample_field<'c>(
    container: &'c DataContainer<'c>,
    vertices: &[DVec3],
    triangles: &[[u32; 3]],
    cells: &[CellRef],
    key: &FieldKey,
    sample_type: SampleType,
) -> Result<FieldArray> {
    let mut sampler = FieldSampler::new(container, key)?;
    let units = sampler.units().clone();
    let values = match sample_type {
        SampleType::Vertex => match sampler.axis() {
            Some((axis, scale)) => vertices.iter().map(|v| v[axis] * scale).collect(),
            None => vertices
                .iter()
                .map(|v| sampler.at_point(*v))
                .collect::<Result<Vec<_>>>()?,
        },
        SampleType::Face => triangles
            .iter()
            .zip(cells)
            .map(|(tri, cell)| {
                let centroid = tri.iter().map(|&i| vertices[i as usize]).sum::<DVec3>() / 3.0;
                sampler.at_cell_point(*cell, centroid)
            })
            .collect::<Result<Vec<_>>>()?,
        SampleType::Cell => cells
            .iter()
            .map(|cell| sampler.at_cell(*cell))
            .collect::<Result<Vec<_>>>()?,
    };
    Ok(FieldArray::new(values, units))
}

/// Area unit used for fluxes.
pub(crate) fn cgs_area() -> Unit {
    Unit::cgs(Dimensions::LENGTH.powf(2.0))
}
