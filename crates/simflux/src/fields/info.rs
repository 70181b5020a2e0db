//! Field descriptors.
use std::fmt;
use std::sync::Arc;

use glam::DVec3;

use crate::data::FieldArray;
use crate::error::Result;
use crate::fields::{FieldContext, FieldKey, Validator};
use crate::units::ConversionFactors;

/// Function computing a derived field on one patch.
pub type DerivedFn = Arc<dyn Fn(&mut FieldContext<'_, '_>) -> Result<FieldArray> + Send + Sync>;

/// Function computing a scalar multiplier from the dataset's conversion factors.
pub type ConvertFn = Arc<dyn Fn(&ConversionFactors) -> Result<f64> + Send + Sync>;

/// How a field's values are produced.
#[derive(Clone)]
pub enum FieldFunction {
    /// Read from the data source.
    Null,
    /// Computed from other fields.
    Derived(DerivedFn),
}

impl fmt::Debug for FieldFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldFunction::Null => f.write_str("Null"),
            FieldFunction::Derived(_) => f.write_str("Derived(<fn>)"),
        }
    }
}

/// Geometric fields with a closed form, evaluated exactly at arbitrary points.
///
/// Values are in code length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpatialField {
    X,
    Y,
    Z,
    /// Distance from the container's `center` parameter.
    Radius,
}

impl SpatialField {
    pub fn evaluate(&self, p: DVec3, center: DVec3) -> f64 {
        match self {
            SpatialField::X => p.x,
            SpatialField::Y => p.y,
            SpatialField::Z => p.z,
            SpatialField::Radius => p.distance(center),
        }
    }

    /// Returns the axis index for coordinate fields.
    pub fn axis(&self) -> Option<usize> {
        match self {
            SpatialField::X => Some(0),
            SpatialField::Y => Some(1),
            SpatialField::Z => Some(2),
            SpatialField::Radius => None,
        }
    }
}

/// Descriptor of a named field.
#[derive(Clone)]
pub struct FieldInfo {
    pub key: FieldKey,
    pub function: FieldFunction,
    /// Unit expression of the evaluated values.
    pub units: String,
    /// Unit expression after line-of-sight integration.
    pub projected_units: String,
    /// Whether the field is usually displayed logarithmically.
    pub take_log: bool,
    /// True for per-particle (rather than per-cell) fields.
    pub particle_type: bool,
    pub validators: Vec<Validator>,
    /// Optional multiplier applied after the raw read or derived function.
    pub convert: Option<ConvertFn>,
    pub display_name: Option<String>,
    pub spatial: Option<SpatialField>,
}

impl FieldInfo {
    fn with_function(key: impl Into<FieldKey>, function: FieldFunction) -> Self {
        Self {
            key: key.into(),
            function,
            units: String::new(),
            projected_units: String::new(),
            take_log: true,
            particle_type: false,
            validators: Vec::new(),
            convert: None,
            display_name: None,
            spatial: None,
        }
    }

    /// A field read directly from the data source.
    pub fn raw(key: impl Into<FieldKey>) -> Self {
        Self::with_function(key, FieldFunction::Null)
    }

    /// A field computed by `f`.
    pub fn derived<F>(key: impl Into<FieldKey>, f: F) -> Self
    where
        F: Fn(&mut FieldContext<'_, '_>) -> Result<FieldArray> + Send + Sync + 'static,
    {
        Self::with_function(key, FieldFunction::Derived(Arc::new(f)))
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }

    pub fn with_projected_units(mut self, units: impl Into<String>) -> Self {
        self.projected_units = units.into();
        self
    }

    pub fn with_take_log(mut self, take_log: bool) -> Self {
        self.take_log = take_log;
        self
    }

    /// Marks the field as a per-particle field.
    pub fn particle(mut self) -> Self {
        self.particle_type = true;
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn with_convert<F>(mut self, f: F) -> Self
    where
        F: Fn(&ConversionFactors) -> Result<f64> + Send + Sync + 'static,
    {
        self.convert = Some(Arc::new(f));
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_spatial(mut self, spatial: SpatialField) -> Self {
        self.spatial = Some(spatial);
        self
    }

    pub fn is_raw(&self) -> bool {
        matches!(self.function, FieldFunction::Null)
    }

    /// Display label, falling back to the field name.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.key.name)
    }
}

impl fmt::Debug for FieldInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldInfo")
            .field("key", &self.key)
            .field("function", &self.function)
            .field("units", &self.units)
            .field("projected_units", &self.projected_units)
            .field("take_log", &self.take_log)
            .field("particle_type", &self.particle_type)
            .field("validators", &self.validators)
            .field("convert", &self.convert.as_ref().map(|_| "<fn>"))
            .field("display_name", &self.display_name)
            .field("spatial", &self.spatial)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_fields_default_to_log_scaling() {
        let info = FieldInfo::raw("Density").with_units("g/cm**3");
        assert!(info.is_raw());
        assert!(info.take_log);
        assert_eq!(info.label(), "Density");
    }

    #[test]
    fn builder_sets_metadata() {
        let info = FieldInfo::derived("x", |ctx| Ok(FieldArray::dimensionless(vec![0.0; ctx.cell_count()])))
            .with_units("code_length")
            .with_take_log(false)
            .with_display_name("X")
            .with_spatial(SpatialField::X);
        assert!(!info.is_raw());
        assert_eq!(info.label(), "X");
        assert_eq!(info.spatial.and_then(|s| s.axis()), Some(0));
        assert!(format!("{info:?}").contains("Derived(<fn>)"));
    }

    #[test]
    fn radius_is_distance_to_center() {
        let r = SpatialField::Radius.evaluate(DVec3::new(3.0, 4.0, 0.0), DVec3::ZERO);
        assert!((r - 5.0).abs() < 1e-12);
    }
}
