//! Isosurface extraction over a data container.
use tracing::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::data::DataContainer;
use crate::error::{Error, Result};
use crate::fields::FieldKey;
use crate::surface::events::{EventSink, SurfaceEvent, SurfaceEventKind};
use crate::surface::marching::march_patch;
use crate::surface::merge::{merge_vertices, MeshArena};
use crate::surface::vertex::FieldSampler;
use crate::surface::Surface;
use crate::units::Quantity;

/// Configuration for surface extraction.
///
/// Both tolerances are relative to the smallest cell width of the dataset.
#[non_exhaustive]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceConfig {
    /// Vertices closer than this (in cell widths) are merged.
    pub merge_tolerance: f64,
    /// Triangles with an area at or below this (in squared cell widths) are dropped.
    pub min_triangle_area: f64,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            merge_tolerance: 1e-6,
            min_triangle_area: 1e-12,
        }
    }
}

impl SurfaceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the relative merge tolerance.
    pub fn with_merge_tolerance(mut self, merge_tolerance: f64) -> Self {
        self.merge_tolerance = merge_tolerance;
        self
    }

    /// Sets the relative minimum triangle area.
    pub fn with_min_triangle_area(mut self, min_triangle_area: f64) -> Self {
        self.min_triangle_area = min_triangle_area;
        self
    }

    /// Validates the configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if !(self.merge_tolerance.is_finite() && self.merge_tolerance > 0.0) {
            return Err(Error::InvalidConfig(
                "merge_tolerance must be finite and > 0".into(),
            ));
        }
        if !(self.min_triangle_area.is_finite() && self.min_triangle_area >= 0.0) {
            return Err(Error::InvalidConfig(
                "min_triangle_area must be finite and >= 0".into(),
            ));
        }
        Ok(())
    }
}

/// Extracts isosurfaces of mesh fields from data containers.
#[derive(Debug, Clone, Default)]
pub struct SurfaceExtractor {
    pub config: SurfaceConfig,
}

impl SurfaceExtractor {
    pub fn try_new(config: SurfaceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn new(config: SurfaceConfig) -> Self {
        debug_assert!(
            config.merge_tolerance > 0.0,
            "merge_tolerance must be > 0"
        );
        debug_assert!(
            config.min_triangle_area >= 0.0,
            "min_triangle_area must be >= 0"
        );
        Self { config }
    }

    /// Extracts the surface where `field` equals `isovalue` (in the field's units).
    pub fn extract<'c>(
        &self,
        container: &'c DataContainer<'c>,
        field: impl Into<FieldKey>,
        isovalue: f64,
    ) -> Result<Surface<'c>> {
        self.extract_with_events(container, field, isovalue, &mut ())
    }

    /// Like [`SurfaceExtractor::extract`], converting a unit-tagged isovalue into the
    /// field's units first.
    pub fn extract_quantity<'c>(
        &self,
        container: &'c DataContainer<'c>,
        field: impl Into<FieldKey>,
        isovalue: &Quantity,
    ) -> Result<Surface<'c>> {
        let key = container.resolve(field);
        let dataset = container.dataset();
        let units = dataset.parse_unit(&dataset.field_info(&key)?.units)?;
        let value = isovalue.to(&units)?.value;
        self.extract(container, key, value)
    }

    pub fn extract_with_events<'c>(
        &self,
        container: &'c DataContainer<'c>,
        field: impl Into<FieldKey>,
        isovalue: f64,
        sink: &mut dyn EventSink,
    ) -> Result<Surface<'c>> {
        self.config.validate()?;
        if !isovalue.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "isovalue must be finite, got {isovalue}"
            )));
        }

        let mut sampler = FieldSampler::new(container, field)?;
        let key = sampler.key().clone();
        let units = sampler.units().clone();

        if !sampler.is_exact() {
            let in_range = container
                .extrema(key.clone())?
                .is_some_and(|(lo, hi)| lo <= isovalue && isovalue <= hi);
            if !in_range {
                info!(
                    "Isovalue {} of '{}' is outside the selected data; surface is empty.",
                    isovalue, key
                );
                if sink.wants(SurfaceEventKind::Warning) {
                    sink.send(SurfaceEvent::Warning {
                        context: format!("field:{key}"),
                        message: format!("isovalue {isovalue} outside data range"),
                    });
                }
                if sink.wants(SurfaceEventKind::ExtractionFinished) {
                    sink.send(SurfaceEvent::ExtractionFinished {
                        vertices: 0,
                        triangles: 0,
                    });
                }
                return Ok(Surface::empty(container, key, isovalue, units));
            }
        }

        let dataset = container.dataset();
        let h = dataset.cell_size().min_element();
        let tolerance = self.config.merge_tolerance * h;
        let min_area = self.config.min_triangle_area * h * h;

        let patches = container.patches();
        info!(
            "Extracting '{}' = {} over {} patches of container {}.",
            key,
            isovalue,
            patches.len(),
            container.id().0
        );
        if sink.wants(SurfaceEventKind::ExtractionStarted) {
            sink.send(SurfaceEvent::ExtractionStarted {
                field: key.clone(),
                isovalue,
                config: self.config.clone(),
                patch_count: patches.len(),
            });
        }

        let mut arena = MeshArena::default();
        for patch in patches {
            let mask = container.cell_mask(patch);
            if !mask.iter().any(|&m| m) {
                continue;
            }
            let corners = sampler.corner_values(patch)?;
            let mesh = march_patch(dataset, patch, &corners, &mask, isovalue, min_area);
            debug!(
                "Patch {}: {} vertices, {} triangles.",
                patch.id.0,
                mesh.vertices.len(),
                mesh.triangles.len()
            );
            if sink.wants(SurfaceEventKind::PatchExtracted) {
                sink.send(SurfaceEvent::PatchExtracted {
                    patch: patch.id,
                    vertices: mesh.vertices.len(),
                    triangles: mesh.triangles.len(),
                });
            }
            arena.append(mesh);
        }

        let before = arena.vertices.len();
        let merged = merge_vertices(arena, tolerance);
        debug!(
            "Merged {} vertices into {}, dropping {} triangles.",
            before,
            merged.vertices.len(),
            merged.dropped_triangles
        );
        if sink.wants(SurfaceEventKind::VerticesMerged) {
            sink.send(SurfaceEvent::VerticesMerged {
                before,
                after: merged.vertices.len(),
                dropped_triangles: merged.dropped_triangles,
            });
        }

        if merged.triangles.is_empty() {
            warn!("Surface of '{}' at {} has no triangles.", key, isovalue);
        }
        info!(
            "Surface of '{}' has {} vertices and {} triangles.",
            key,
            merged.vertices.len(),
            merged.triangles.len()
        );
        if sink.wants(SurfaceEventKind::ExtractionFinished) {
            sink.send(SurfaceEvent::ExtractionFinished {
                vertices: merged.vertices.len(),
                triangles: merged.triangles.len(),
            });
        }

        Ok(Surface::new(
            container,
            key,
            isovalue,
            units,
            merged.vertices,
            merged.triangles,
            merged.cells,
        ))
    }
}
