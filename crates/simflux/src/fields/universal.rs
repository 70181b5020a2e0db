//! Fields available on every dataset.
//!
//! Coordinates, cell geometry, distance from the container center and a few
//! hydrodynamic combinations built from the conventional `density` and
//! `x-velocity`/`y-velocity`/`z-velocity` names. Frontends alias their own raw fields onto
//! these names.
use crate::data::FieldArray;
use crate::error::Result;
use crate::fields::{DepositMethod, FieldContext, FieldInfo, FieldRegistry, SpatialField, Validator};

fn coordinate(ctx: &mut FieldContext<'_, '_>, axis: usize) -> Result<FieldArray> {
    let values = ctx
        .patch()
        .cell_centers()
        .into_iter()
        .map(|c| c[axis])
        .collect();
    Ok(FieldArray::new(values, ctx.code_length()))
}

fn cell_width(ctx: &mut FieldContext<'_, '_>, axis: usize) -> Result<FieldArray> {
    let width = ctx.patch().cell_size[axis];
    Ok(FieldArray::filled(ctx.cell_count(), width, ctx.code_length()))
}

fn speed_squared(ctx: &mut FieldContext<'_, '_>) -> Result<FieldArray> {
    let vx = ctx.get("x-velocity")?;
    let vy = ctx.get("y-velocity")?;
    let vz = ctx.get("z-velocity")?;
    vx.mul(&vx)?.add(&vy.mul(&vy)?)?.add(&vz.mul(&vz)?)
}

/// Builds the registry of universal fields.
pub fn universal_fields() -> FieldRegistry {
    let mut reg = FieldRegistry::new();
    for (name, axis, spatial) in [
        ("x", 0, SpatialField::X),
        ("y", 1, SpatialField::Y),
        ("z", 2, SpatialField::Z),
    ] {
        reg.add(
            FieldInfo::derived(name, move |ctx| coordinate(ctx, axis))
                .with_units("code_length")
                .with_take_log(false)
                .with_spatial(spatial),
        );
    }
    for (name, axis) in [("dx", 0), ("dy", 1), ("dz", 2)] {
        reg.add(
            FieldInfo::derived(name, move |ctx| cell_width(ctx, axis))
                .with_units("code_length")
                .with_take_log(false),
        );
    }

    reg.add(
        FieldInfo::derived("cell_volume", |ctx| {
            let volume = ctx.patch().cell_volume();
            let units = ctx.code_length().powf(3.0);
            Ok(FieldArray::filled(ctx.cell_count(), volume, units))
        })
        .with_units("cm**3"),
    )
    .add(
        FieldInfo::derived("radius", |ctx| {
            let center = ctx.center();
            let values = ctx
                .patch()
                .cell_centers()
                .into_iter()
                .map(|c| SpatialField::Radius.evaluate(c, center))
                .collect();
            Ok(FieldArray::new(values, ctx.code_length()))
        })
        .with_units("cm")
        .with_validator(Validator::parameter("center"))
        .with_spatial(SpatialField::Radius),
    )
    .add(
        FieldInfo::derived("ones", |ctx| {
            Ok(FieldArray::dimensionless(vec![1.0; ctx.cell_count()]))
        })
        .with_take_log(false),
    )
    .add(
        FieldInfo::derived("zeros", |ctx| {
            Ok(FieldArray::dimensionless(vec![0.0; ctx.cell_count()]))
        })
        .with_take_log(false),
    )
    .add(
        FieldInfo::derived("cell_mass", |ctx| {
            let density = ctx.get("density")?;
            let volume = ctx.get("cell_volume")?;
            density.mul(&volume)
        })
        .with_units("g")
        .with_display_name("Cell Mass"),
    )
    .add(
        FieldInfo::derived("velocity_magnitude", |ctx| Ok(speed_squared(ctx)?.sqrt()))
            .with_units("cm/s")
            .with_display_name("|v|"),
    )
    .add(
        FieldInfo::derived("kinetic_energy", |ctx| {
            let density = ctx.get("density")?;
            Ok(density.mul(&speed_squared(ctx)?)?.scale(0.5))
        })
        .with_units("erg/cm**3")
        .with_display_name("Kinetic Energy"),
    );
    reg
}

fn particle_column(
    ctx: &mut FieldContext<'_, '_>,
    ptype: &str,
    name: &str,
    units: &str,
) -> Result<FieldArray> {
    let target = ctx.unit(units)?;
    ctx.get((ptype, name))?.to(&target)
}

fn deposited_mass(ctx: &mut FieldContext<'_, '_>, ptype: &str) -> Result<FieldArray> {
    let mass = particle_column(ctx, ptype, "particle_mass", "g")?;
    let sums = ctx.deposit(ptype, Some(&mass), DepositMethod::Sum)?;
    Ok(FieldArray::new(sums, mass.units))
}

fn deposited_count(ctx: &mut FieldContext<'_, '_>, ptype: &str) -> Result<FieldArray> {
    let counts = ctx.deposit(ptype, None, DepositMethod::Count)?;
    Ok(FieldArray::dimensionless(counts))
}

/// Adds mesh fields that deposit particles of `ptype` onto cells with nearest-grid-point
/// assignment: `{ptype}_mass_deposit`, `{ptype}_mass_density_deposit`,
/// `{ptype}_number_deposit`, `{ptype}_number_density_deposit`,
/// `{ptype}_velocity_{x,y,z}_deposit` and `{ptype}_weighted_velocity_{x,y,z}_deposit`.
///
/// `label` is the human readable particle family used in display names.
pub fn register_deposit_fields(reg: &mut FieldRegistry, ptype: &str, label: &str) {
    let owned = ptype.to_string();

    let p = owned.clone();
    reg.add(
        FieldInfo::derived(format!("{ptype}_mass_deposit"), move |ctx| deposited_mass(ctx, &p))
            .with_units("g")
            .with_validator(Validator::spatial(0))
            .with_display_name(format!("{label} Mass")),
    );

    let p = owned.clone();
    reg.add(
        FieldInfo::derived(format!("{ptype}_mass_density_deposit"), move |ctx| {
            let mass = deposited_mass(ctx, &p)?;
            let volume = ctx.get("cell_volume")?;
            mass.div(&volume)
        })
        .with_units("g/cm**3")
        .with_validator(Validator::spatial(0))
        .with_display_name(format!("{label} Density")),
    );

    let p = owned.clone();
    reg.add(
        FieldInfo::derived(format!("{ptype}_number_deposit"), move |ctx| {
            deposited_count(ctx, &p)
        })
        .with_validator(Validator::spatial(0))
        .with_display_name(format!("{label} Number")),
    );

    let p = owned.clone();
    reg.add(
        FieldInfo::derived(format!("{ptype}_number_density_deposit"), move |ctx| {
            let count = deposited_count(ctx, &p)?;
            let volume = ctx.get("cell_volume")?;
            count.div(&volume)
        })
        .with_units("1/cm**3")
        .with_validator(Validator::spatial(0))
        .with_display_name(format!("{label} Number Density")),
    );

    for axis in ["x", "y", "z"] {
        let component = format!("particle_velocity_{axis}");

        let (p, c) = (owned.clone(), component.clone());
        reg.add(
            FieldInfo::derived(format!("{ptype}_velocity_{axis}_deposit"), move |ctx| {
                let vel = particle_column(ctx, &p, &c, "cm/s")?;
                let sums = ctx.deposit(&p, Some(&vel), DepositMethod::Sum)?;
                Ok(FieldArray::new(sums, vel.units))
            })
            .with_units("cm/s")
            .with_take_log(false)
            .with_validator(Validator::spatial(0))
            .with_display_name(format!("{label} Velocity {}", axis.to_uppercase())),
        );

        let (p, c) = (owned.clone(), component);
        reg.add(
            FieldInfo::derived(
                format!("{ptype}_weighted_velocity_{axis}_deposit"),
                move |ctx| {
                    let vel = particle_column(ctx, &p, &c, "cm/s")?;
                    let mass = particle_column(ctx, &p, "particle_mass", "g")?;
                    let momentum = vel.mul(&mass)?;
                    let num = ctx.deposit(&p, Some(&momentum), DepositMethod::Sum)?;
                    let norm = ctx.deposit(&p, Some(&mass), DepositMethod::Sum)?;
                    let values = num
                        .iter()
                        .zip(&norm)
                        .map(|(n, m)| if *m > 0.0 { n / m } else { 0.0 })
                        .collect();
                    Ok(FieldArray::new(values, vel.units))
                },
            )
            .with_units("cm/s")
            .with_take_log(false)
            .with_validator(Validator::spatial(0))
            .with_display_name(format!("{label} Weighted Velocity {}", axis.to_uppercase())),
        );
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use crate::data::{FakeDatasetBuilder, ParamValue};
    use crate::error::Error;

    #[test]
    fn coordinates_cover_the_domain() {
        let ds = FakeDatasetBuilder::new(4).with_patches(2).build().unwrap();
        let ad = ds.all_data();
        let x = ad.get("x").unwrap();
        assert_eq!(x.len(), 64);
        let (lo, hi) = x.extrema().unwrap();
        assert!((lo - 0.125).abs() < 1e-12);
        assert!((hi - 0.875).abs() < 1e-12);
        assert_eq!(x.units.expr(), "code_length");
    }

    #[test]
    fn cell_volume_converts_to_cgs() {
        let ds = FakeDatasetBuilder::new(4)
            .with_length_unit(2.0)
            .build()
            .unwrap();
        let vol = ds.all_data().get("cell_volume").unwrap();
        // (0.25 code_length * 2 cm)^3
        assert!((vol.values[0] - 0.125).abs() < 1e-12);
        assert_eq!(vol.units.expr(), "cm**3");
    }

    #[test]
    fn radius_uses_center_parameter() {
        let ds = FakeDatasetBuilder::new(4).build().unwrap();
        let mut ad = ds.all_data();
        ad.set_field_parameter("center", ParamValue::Vector(DVec3::ZERO));
        let r = ad.get("radius").unwrap();
        let expected = DVec3::splat(0.125).length();
        assert!((r.values[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn cell_mass_is_density_times_volume() {
        let ds = FakeDatasetBuilder::new(4).build().unwrap();
        let ad = ds.all_data();
        let rho = ad.get("density").unwrap();
        let mass = ad.get("cell_mass").unwrap();
        let dv = 0.25f64.powi(3);
        for (r, m) in rho.values.iter().zip(&mass.values) {
            assert!((r * dv - m).abs() < 1e-12);
        }
    }

    #[test]
    fn velocity_fields_require_velocity_data() {
        let ds = FakeDatasetBuilder::new(4).build().unwrap();
        let err = ds.all_data().get("velocity_magnitude").unwrap_err();
        assert!(matches!(err.root_cause(), Error::UnknownField { .. }));

        let ds = FakeDatasetBuilder::new(4)
            .with_fields(&[
                ("density", "g/cm**3"),
                ("x-velocity", "cm/s"),
                ("y-velocity", "cm/s"),
                ("z-velocity", "cm/s"),
            ])
            .build()
            .unwrap();
        let ad = ds.all_data();
        let speed = ad.get("velocity_magnitude").unwrap();
        let ke = ad.get("kinetic_energy").unwrap();
        let rho = ad.get("density").unwrap();
        for ((v, e), r) in speed.values.iter().zip(&ke.values).zip(&rho.values) {
            assert!((0.5 * r * v * v - e).abs() < 1e-9);
        }
    }

    #[test]
    fn deposited_mass_matches_particle_total() {
        let ds = FakeDatasetBuilder::new(4)
            .with_patches(4)
            .with_particles(50)
            .build()
            .unwrap();
        let ad = ds.all_data();
        let particle_total: f64 = ad.get(("all", "particle_mass")).unwrap().values.iter().sum();
        let deposited: f64 = ad.get("all_mass_deposit").unwrap().values.iter().sum();
        assert!((particle_total - deposited).abs() < 1e-9);
    }

    #[test]
    fn weighted_velocity_stays_within_particle_range() {
        let ds = FakeDatasetBuilder::new(2)
            .with_particles(40)
            .build()
            .unwrap();
        let ad = ds.all_data();
        let (lo, hi) = ad.extrema(("all", "particle_velocity_x")).unwrap().unwrap();
        let w = ad.get("all_weighted_velocity_x_deposit").unwrap();
        assert!(w.values.iter().all(|v| *v == 0.0 || (*v >= lo - 1e-12 && *v <= hi + 1e-12)));
        assert_eq!(w.units.expr(), "cm/s");

        let number: f64 = ad.get("all_number_deposit").unwrap().values.iter().sum();
        assert_eq!(number, 40.0);
    }
}
