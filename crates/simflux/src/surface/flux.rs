//! Flux of vector fields through a surface.
use glam::DVec3;
use tracing::debug;

use crate::error::{Error, Result};
use crate::fields::FieldKey;
use crate::surface::{cgs_area, FieldSampler, Surface};
use crate::units::Quantity;

impl Surface<'_> {
    /// Integrates `(fx, fy, fz)` (optionally times `weight`) over the surface.
    ///
    /// Each component is interpolated at the triangle's vertices within its source cell
    /// and averaged, then dotted with the triangle's area vector. Normals follow the
    /// extraction winding and point toward larger values of the extracted field. The
    /// result has units of `fx * weight * cm**2`.
    pub fn calculate_flux(
        &self,
        fx: impl Into<FieldKey>,
        fy: impl Into<FieldKey>,
        fz: impl Into<FieldKey>,
        weight: Option<FieldKey>,
    ) -> Result<Quantity> {
        let container = self.container();
        let mut components = [
            FieldSampler::new(container, fx)?,
            FieldSampler::new(container, fy)?,
            FieldSampler::new(container, fz)?,
        ];
        let units = components[0].units().clone();
        let mut factors = [1.0; 3];
        for (factor, sampler) in factors.iter_mut().zip(&components).skip(1) {
            if !sampler.units().same_dimensions(&units) {
                return Err(Error::UnitMismatch {
                    expected: units.expr().to_string(),
                    found: sampler.units().expr().to_string(),
                });
            }
            *factor = sampler.units().conversion_factor(&units)?;
        }
        let mut weight = weight
            .map(|key| FieldSampler::new(container, key))
            .transpose()?;

        let mut total = 0.0;
        for (t, cell) in self.triangle_cells().iter().enumerate() {
            let Some([a, b, c]) = self.triangle(t) else {
                continue;
            };
            let mut vector = DVec3::ZERO;
            let mut w = 0.0;
            for p in [a, b, c] {
                for (axis, sampler) in components.iter_mut().enumerate() {
                    vector[axis] += sampler.at_cell_point(*cell, p)? * factors[axis];
                }
                if let Some(sampler) = weight.as_mut() {
                    w += sampler.at_cell_point(*cell, p)?;
                }
            }
            vector /= 3.0;
            let w = if weight.is_some() { w / 3.0 } else { 1.0 };
            let area = 0.5 * (b - a).cross(c - a);
            total += vector.dot(area) * w;
        }

        let length_cm = self.units().cgs_factor();
        let weight_units = weight.as_ref().map(|s| s.units().clone());
        let mut result_units = units;
        if let Some(wu) = &weight_units {
            result_units = result_units.mul(wu);
        }
        let result_units = result_units.mul(&cgs_area());
        debug!(
            "Flux of ({}, {}, {}) through '{}' surface: {} {}.",
            components[0].key(),
            components[1].key(),
            components[2].key(),
            self.field(),
            total * length_cm * length_cm,
            result_units
        );
        Ok(Quantity::new(total * length_cm * length_cm, result_units))
    }
}
