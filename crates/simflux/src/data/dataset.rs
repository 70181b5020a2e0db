//! Datasets and the data-source seam.
//!
//! [`Dataset`] is the single owner of a simulation output's metadata: the domain, its
//! patches, a [`FieldRegistry`] layered on the frontend defaults, a [`UnitRegistry`] with
//! code units and the [`ConversionFactors`] used by convert functions. Raw values are read
//! lazily through a boxed [`DataSource`].
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glam::DVec3;
use tracing::{debug, info};

use crate::data::{decompose_domain, ContainerId, DataContainer, Patch, PatchId, Selector};
use crate::error::{Error, Result};
use crate::fields::{universal, FieldInfo, FieldKey, FieldRegistry};
use crate::surface::{Surface, SurfaceExtractor};
use crate::units::{ConversionFactors, Dimensions, Quantity, Unit, UnitRegistry};

/// Reads raw field values for one patch.
pub trait DataSource: Send + Sync {
    /// Raw fields this source can provide.
    fn field_list(&self) -> Vec<FieldKey>;

    /// Reads `key` on `patch`.
    ///
    /// Mesh fields return one value per cell in patch storage order. Particle fields
    /// (keys with a particle type) return one value per particle owned by the patch.
    /// Returns `Ok(None)` when the field is not stored for this patch.
    fn read_field(&self, patch: &Patch, key: &FieldKey) -> Result<Option<Vec<f64>>>;

    /// Particle types present in the data.
    fn particle_types(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A simulation output with uniform resolution.
pub struct Dataset {
    name: String,
    domain_left_edge: DVec3,
    domain_right_edge: DVec3,
    domain_dimensions: [usize; 3],
    patches: Vec<Patch>,
    fields: FieldRegistry,
    units: UnitRegistry,
    conversion: ConversionFactors,
    properties: HashMap<String, f64>,
    source: Box<dyn DataSource>,
    raw_fields: BTreeSet<FieldKey>,
    next_container: AtomicUsize,
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("name", &self.name)
            .field("domain_left_edge", &self.domain_left_edge)
            .field("domain_right_edge", &self.domain_right_edge)
            .field("domain_dimensions", &self.domain_dimensions)
            .field("patches", &self.patches.len())
            .field("raw_fields", &self.raw_fields)
            .finish()
    }
}

impl Dataset {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain_left_edge(&self) -> DVec3 {
        self.domain_left_edge
    }

    pub fn domain_right_edge(&self) -> DVec3 {
        self.domain_right_edge
    }

    pub fn domain_width(&self) -> DVec3 {
        self.domain_right_edge - self.domain_left_edge
    }

    pub fn domain_center(&self) -> DVec3 {
        (self.domain_left_edge + self.domain_right_edge) * 0.5
    }

    pub fn domain_dimensions(&self) -> [usize; 3] {
        self.domain_dimensions
    }

    /// Cell size shared by every patch.
    pub fn cell_size(&self) -> DVec3 {
        self.domain_width()
            / DVec3::new(
                self.domain_dimensions[0] as f64,
                self.domain_dimensions[1] as f64,
                self.domain_dimensions[2] as f64,
            )
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn patch(&self, id: PatchId) -> Option<&Patch> {
        self.patches.get(id.0).filter(|p| p.id == id)
    }

    pub fn fields(&self) -> &FieldRegistry {
        &self.fields
    }

    /// Registers a field on this dataset only.
    pub fn add_field(&mut self, info: FieldInfo) -> Result<()> {
        debug!("Adding field '{}' to dataset '{}'.", info.key, self.name);
        self.fields.register(info)
    }

    /// Looks up the descriptor for `key`.
    pub fn field_info(&self, key: &FieldKey) -> Result<Arc<FieldInfo>> {
        self.fields.lookup(key)
    }

    pub fn units(&self) -> &UnitRegistry {
        &self.units
    }

    pub fn parse_unit(&self, expr: &str) -> Result<Unit> {
        self.units.parse(expr)
    }

    /// The dataset's code length unit.
    pub fn code_length(&self) -> Unit {
        self.units
            .parse("code_length")
            .unwrap_or_else(|_| Unit::cgs(Dimensions::LENGTH))
    }

    /// Code length expressed in centimeters.
    pub fn length_unit(&self) -> Quantity {
        Quantity::new(
            self.code_length().cgs_factor(),
            Unit::cgs(Dimensions::LENGTH),
        )
    }

    pub fn conversion(&self) -> &ConversionFactors {
        &self.conversion
    }

    pub fn property(&self, name: &str) -> Option<f64> {
        self.properties.get(name).copied()
    }

    /// Simulation time in seconds, when known.
    pub fn current_time(&self) -> Option<f64> {
        self.property("current_time")
    }

    pub fn source(&self) -> &dyn DataSource {
        self.source.as_ref()
    }

    /// Raw fields available from the data source.
    pub fn raw_fields(&self) -> impl Iterator<Item = &FieldKey> {
        self.raw_fields.iter()
    }

    pub fn has_raw_field(&self, key: &FieldKey) -> bool {
        self.raw_fields.contains(key)
    }

    pub(crate) fn next_container_id(&self) -> ContainerId {
        ContainerId(self.next_container.fetch_add(1, Ordering::Relaxed))
    }

    /// A container selecting the whole domain.
    pub fn all_data(&self) -> DataContainer<'_> {
        DataContainer::new(self, Selector::All)
    }

    /// A container selecting cells whose centers lie within `radius` (code length) of
    /// `center`. The container's `center` parameter is set to `center`.
    pub fn sphere(&self, center: impl Into<mint::Vector3<f64>>, radius: f64) -> DataContainer<'_> {
        let center = to_dvec3(center);
        DataContainer::new(self, Selector::Sphere { center, radius })
    }

    /// Like [`Dataset::sphere`] with a radius in physical units.
    pub fn sphere_with_radius(
        &self,
        center: impl Into<mint::Vector3<f64>>,
        radius: &Quantity,
    ) -> Result<DataContainer<'_>> {
        let radius = radius.to(&self.code_length())?.value;
        Ok(self.sphere(center, radius))
    }

    /// A container selecting the half-open box `[left, right)` in code length.
    pub fn region(
        &self,
        left: impl Into<mint::Vector3<f64>>,
        right: impl Into<mint::Vector3<f64>>,
    ) -> DataContainer<'_> {
        DataContainer::new(
            self,
            Selector::Region {
                left: to_dvec3(left),
                right: to_dvec3(right),
            },
        )
    }

    /// Extracts an isosurface of `field` at `isovalue` over `container` with default
    /// extraction settings.
    pub fn surface<'c>(
        &self,
        container: &'c DataContainer<'c>,
        field: impl Into<FieldKey>,
        isovalue: f64,
    ) -> Result<Surface<'c>> {
        SurfaceExtractor::default().extract(container, field, isovalue)
    }

    /// Global cell index containing `p`, without clamping.
    pub fn global_cell(&self, p: DVec3) -> [i64; 3] {
        let rel = (p - self.domain_left_edge) / self.cell_size();
        [
            rel.x.floor() as i64,
            rel.y.floor() as i64,
            rel.z.floor() as i64,
        ]
    }

    /// Finds the patch and local index of a global cell, clamping out-of-domain indices
    /// to the nearest boundary cell. `hint` is checked first.
    pub fn locate_cell(&self, global: [i64; 3], hint: Option<&Patch>) -> Option<(&Patch, usize)> {
        let mut clamped = [0usize; 3];
        for axis in 0..3 {
            let hi = self.domain_dimensions[axis] as i64 - 1;
            clamped[axis] = global[axis].clamp(0, hi.max(0)) as usize;
        }
        if let Some(patch) = hint {
            if let Some(idx) = patch.local_index(clamped) {
                return self.patch(patch.id).map(|p| (p, idx));
            }
        }
        self.patches
            .iter()
            .find_map(|p| p.local_index(clamped).map(|idx| (p, idx)))
    }
}

/// Builder for [`Dataset`].
pub struct DatasetBuilder {
    name: String,
    domain_left_edge: DVec3,
    domain_right_edge: DVec3,
    domain_dimensions: [usize; 3],
    patches: Option<Vec<Patch>>,
    patch_count: usize,
    length_unit_cm: f64,
    mass_unit_g: f64,
    time_unit_s: f64,
    conversion: ConversionFactors,
    properties: HashMap<String, f64>,
    field_defaults: Option<Arc<FieldRegistry>>,
    strict_fields: bool,
}

impl DatasetBuilder {
    /// Starts a dataset over the unit cube with `domain_dimensions` cells.
    pub fn new(name: impl Into<String>, domain_dimensions: [usize; 3]) -> Self {
        Self {
            name: name.into(),
            domain_left_edge: DVec3::ZERO,
            domain_right_edge: DVec3::ONE,
            domain_dimensions,
            patches: None,
            patch_count: 1,
            length_unit_cm: 1.0,
            mass_unit_g: 1.0,
            time_unit_s: 1.0,
            conversion: ConversionFactors::new(),
            properties: HashMap::new(),
            field_defaults: None,
            strict_fields: false,
        }
    }

    pub fn with_domain(
        mut self,
        left: impl Into<mint::Vector3<f64>>,
        right: impl Into<mint::Vector3<f64>>,
    ) -> Self {
        self.domain_left_edge = to_dvec3(left);
        self.domain_right_edge = to_dvec3(right);
        self
    }

    /// Uses an explicit patch layout.
    pub fn with_patches(mut self, patches: Vec<Patch>) -> Self {
        self.patches = Some(patches);
        self
    }

    /// Splits the domain into about `count` patches.
    pub fn with_patch_count(mut self, count: usize) -> Self {
        self.patch_count = count;
        self
    }

    /// Sets the CGS scale of code length, mass and time.
    pub fn with_code_units(mut self, length_cm: f64, mass_g: f64, time_s: f64) -> Self {
        self.length_unit_cm = length_cm;
        self.mass_unit_g = mass_g;
        self.time_unit_s = time_s;
        self
    }

    pub fn with_conversion_factor(mut self, name: impl Into<String>, factor: f64) -> Self {
        self.conversion.set(name, factor);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: f64) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    /// Field descriptors the dataset's registry falls back to. Defaults to the universal
    /// fields.
    pub fn with_field_defaults(mut self, defaults: Arc<FieldRegistry>) -> Self {
        self.field_defaults = Some(defaults);
        self
    }

    /// Makes the dataset's registry reject duplicate registrations.
    pub fn strict_fields(mut self, strict: bool) -> Self {
        self.strict_fields = strict;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.domain_dimensions.contains(&0) {
            return Err(Error::InvalidConfig(
                "domain dimensions must be positive".into(),
            ));
        }
        if !(self.domain_right_edge.cmpgt(self.domain_left_edge).all()) {
            return Err(Error::InvalidConfig(
                "domain right edge must exceed left edge".into(),
            ));
        }
        for (name, v) in [
            ("length", self.length_unit_cm),
            ("mass", self.mass_unit_g),
            ("time", self.time_unit_s),
        ] {
            if !(v.is_finite() && v > 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "code {name} unit must be positive and finite"
                )));
            }
        }
        Ok(())
    }

    /// Finalizes the dataset over `source`.
    pub fn build(self, source: impl DataSource + 'static) -> Result<Dataset> {
        self.validate()?;

        let patches = match self.patches {
            Some(patches) => patches,
            None => decompose_domain(
                self.domain_left_edge,
                self.domain_right_edge,
                self.domain_dimensions,
                self.patch_count,
            ),
        };
        check_patches(&patches, self.domain_dimensions)?;

        let mut units = UnitRegistry::new();
        units.define_code_units(self.length_unit_cm, self.mass_unit_g, self.time_unit_s);

        let defaults = self
            .field_defaults
            .unwrap_or_else(|| Arc::new(universal::universal_fields()));
        let fields = FieldRegistry::create_with_fallback(defaults).strict(self.strict_fields);

        let raw_fields: BTreeSet<FieldKey> = source.field_list().into_iter().collect();
        info!(
            "Loaded dataset '{}' with {} patches and {} raw fields.",
            self.name,
            patches.len(),
            raw_fields.len()
        );

        Ok(Dataset {
            name: self.name,
            domain_left_edge: self.domain_left_edge,
            domain_right_edge: self.domain_right_edge,
            domain_dimensions: self.domain_dimensions,
            patches,
            fields,
            units,
            conversion: self.conversion,
            properties: self.properties,
            source: Box::new(source),
            raw_fields,
            next_container: AtomicUsize::new(0),
        })
    }
}

pub(crate) fn to_dvec3(v: impl Into<mint::Vector3<f64>>) -> DVec3 {
    let v: mint::Vector3<f64> = v.into();
    DVec3::from(v)
}

fn check_patches(patches: &[Patch], dims: [usize; 3]) -> Result<()> {
    if patches.is_empty() {
        return Err(Error::InvalidConfig("dataset has no patches".into()));
    }
    let mut covered = 0usize;
    for (n, patch) in patches.iter().enumerate() {
        if patch.id != PatchId(n) {
            return Err(Error::InvalidConfig(format!(
                "patch at position {n} has id {}",
                patch.id.0
            )));
        }
        for axis in 0..3 {
            if patch.start_index[axis] + patch.dims[axis] > dims[axis] {
                return Err(Error::InvalidConfig(format!(
                    "patch {n} extends past the domain"
                )));
            }
        }
        covered += patch.cell_count();
    }
    let total = dims[0] * dims[1] * dims[2];
    if covered != total {
        return Err(Error::InvalidConfig(format!(
            "patches cover {covered} cells of {total}"
        )));
    }
    Ok(())
}
