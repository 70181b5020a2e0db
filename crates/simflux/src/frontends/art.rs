//! Field tables for ART (Adaptive Refinement Tree) outputs.
//!
//! Raw fluid values are stored in code units and scaled to CGS by convert functions that
//! read the dataset's conversion factors (`Density`, `GasEnergy`, `Velocity`,
//! `Pressure`, `Potential`, `tr`, `particle_mass`, `particle_velocity_{x,y,z}`).
use std::sync::Arc;

use tracing::debug;

use crate::data::FieldArray;
use crate::error::{Error, Result};
use crate::fields::universal::{register_deposit_fields, universal_fields};
use crate::fields::{FieldContext, FieldInfo, FieldRegistry, Validator};

/// Fluid fields written by ART.
pub const FLUID_FIELDS: [&str; 12] = [
    "Density",
    "TotalEnergy",
    "XMomentumDensity",
    "YMomentumDensity",
    "ZMomentumDensity",
    "Pressure",
    "Gamma",
    "GasEnergy",
    "MetalDensitySNII",
    "MetalDensitySNIa",
    "PotentialNew",
    "PotentialOld",
];

/// Particle types with deposit fields, and their display labels.
pub const PARTICLE_TYPES: [(&str, &str); 3] = [
    ("all", "Particle"),
    ("darkmatter", "Dark Matter"),
    ("stars", "Stellar"),
];

/// Width of the window star-formation lumps are spread over, in seconds.
pub const AGE_SPREAD: f64 = 1.0e7 * 365.0 * 24.0 * 3600.0;

const MOMENTUM_UNITS: &str = r"\rm{g}/\rm{s}/\rm{cm}^2";
const MOMENTUM_PROJECTED: &str = r"\rm{g}/\rm{s}/\rm{cm}";
const ENERGY_UNITS: &str = r"\rm{g}\rm{cm}^2/\rm{s}^2";
const ENERGY_PROJECTED: &str = r"\rm{g}\rm{cm}^3/\rm{s}^2";
const DENSITY_UNITS: &str = r"\rm{g}/\rm{cm}^3";
const DENSITY_PROJECTED: &str = r"\rm{g}/\rm{cm}^2";

fn fluid(name: &str) -> FieldInfo {
    FieldInfo::raw(name).with_validator(Validator::data_field(name))
}

fn particle(name: &str) -> FieldInfo {
    FieldInfo::raw(name)
        .particle()
        .with_validator(Validator::data_field(name))
}

/// Registers the raw fields ART writes.
pub fn add_known_fields(reg: &mut FieldRegistry) {
    reg.add(
        fluid("Density")
            .with_units(DENSITY_UNITS)
            .with_projected_units(DENSITY_PROJECTED)
            .with_convert(|cf| cf.convert("Density")),
    );
    for name in ["TotalEnergy", "GasEnergy"] {
        reg.add(
            fluid(name)
                .with_units(ENERGY_UNITS)
                .with_projected_units(ENERGY_PROJECTED)
                .with_convert(|cf| cf.convert("GasEnergy")),
        );
    }
    for name in ["XMomentumDensity", "YMomentumDensity", "ZMomentumDensity"] {
        reg.add(
            fluid(name)
                .with_units(MOMENTUM_UNITS)
                .with_projected_units(MOMENTUM_PROJECTED)
                .with_convert(|cf| {
                    let mass = cf.convert("Mass")?;
                    Ok(mass * cf.convert("Velocity")? * (cf.convert("Density")? / mass))
                }),
        );
    }
    reg.add(
        fluid("Pressure")
            .with_units(r"\rm{g}/\rm{s}^2/\rm{cm}^1")
            .with_projected_units(r"\rm{g}/\rm{s}^2")
            .with_convert(|cf| cf.convert("Pressure")),
    )
    .add(fluid("Gamma").with_convert(|_| Ok(1.0)));
    for name in ["MetalDensitySNII", "MetalDensitySNIa"] {
        reg.add(
            fluid(name)
                .with_units(DENSITY_UNITS)
                .with_projected_units(DENSITY_PROJECTED)
                .with_convert(|cf| cf.convert("Density")),
        );
    }
    for name in ["PotentialNew", "PotentialOld"] {
        reg.add(
            fluid(name)
                .with_units(ENERGY_UNITS)
                .with_projected_units(ENERGY_PROJECTED)
                .with_convert(|cf| cf.convert("Potential")),
        );
    }

    for axis in ["x", "y", "z"] {
        reg.add(
            particle(&format!("particle_position_{axis}"))
                .with_units("code_length")
                .with_take_log(false),
        );
        let factor = format!("particle_velocity_{axis}");
        reg.add(
            particle(&factor)
                .with_units("cm/s")
                .with_convert(move |cf| cf.convert(&factor)),
        );
    }
    for name in ["particle_mass", "particle_mass_initial"] {
        reg.add(
            particle(name)
                .with_units("g")
                .with_convert(|cf| cf.convert("particle_mass")),
        );
    }
    reg.add(particle("particle_creation_time").with_units("s"))
        .add(particle("particle_index").with_take_log(false));
}

fn ratio(ctx: &mut FieldContext<'_, '_>, num: &str, den: &str) -> Result<FieldArray> {
    let a = ctx.get(num)?;
    let b = ctx.get(den)?;
    a.div(&b)
}

fn particle_age(ctx: &mut FieldContext<'_, '_>) -> Result<FieldArray> {
    let now = ctx.current_time()?;
    let created = ctx.get("particle_creation_time")?.to(&ctx.unit("s")?)?;
    Ok(created.map(|t| now - t))
}

/// Registers the derived ART fields and per-type deposit fields.
pub fn add_derived_fields(reg: &mut FieldRegistry) {
    reg.add(
        FieldInfo::derived("Temperature", |ctx| {
            let energy = ctx.get("GasEnergy")?;
            let density = ctx.get("Density")?;
            let scale = ctx.convert("Density")? * ctx.convert("tr")? / ctx.convert("GasEnergy")?;
            let values = energy
                .iter()
                .zip(density.iter())
                .map(|(e, d)| e / d * scale)
                .collect();
            Ok(FieldArray::dimensionless(values))
        })
        .with_units(r"\mathrm{K}")
        .with_projected_units(r"\mathrm{K}"),
    )
    .add(FieldInfo::derived("Metallicity_SNII", |ctx| {
        ratio(ctx, "MetalDensitySNII", "Density")
    }))
    .add(FieldInfo::derived("Metallicity_SNIa", |ctx| {
        ratio(ctx, "MetalDensitySNIa", "Density")
    }))
    .add(FieldInfo::derived("Metallicity", |ctx| {
        ratio(ctx, "Metal_Density", "Density")
    }))
    .add(
        FieldInfo::derived("Metal_Density", |ctx| {
            let snia = ctx.get("MetalDensitySNIa")?;
            let snii = ctx.get("MetalDensitySNII")?;
            snia.add(&snii)
        })
        .with_units(DENSITY_UNITS)
        .with_projected_units(DENSITY_PROJECTED),
    )
    .add(
        FieldInfo::derived("density", |ctx| Ok((*ctx.get("Density")?).clone()))
            .with_units("g/cm**3")
            .with_projected_units("g/cm**2"),
    );

    for (axis, momentum) in [
        ("x", "XMomentumDensity"),
        ("y", "YMomentumDensity"),
        ("z", "ZMomentumDensity"),
    ] {
        reg.add(
            FieldInfo::derived(format!("{axis}-velocity"), move |ctx| {
                ratio(ctx, momentum, "Density")
            })
            .with_units(r"\rm{cm}/\rm{s}")
            .with_projected_units(r"\rm{cm}/\rm{s}")
            .with_take_log(false),
        );
    }

    reg.add(
        FieldInfo::derived("particle_age", particle_age)
            .with_units(r"\mathrm{s}")
            .with_validator(Validator::property("current_time"))
            .particle(),
    )
    .add(
        FieldInfo::derived("particle_age_spread", |ctx| {
            let ages = particle_age(ctx)?;
            let spread = spread_ages(&ages.values, AGE_SPREAD)?;
            Ok(FieldArray::new(spread, ages.units))
        })
        .with_units(r"\rm{s}")
        .with_validator(Validator::property("current_time"))
        .particle(),
    )
    .add(
        FieldInfo::derived("ParticleMassMsun", |ctx| {
            let msun = ctx.unit("Msun")?;
            ctx.get("particle_mass")?.to(&msun)
        })
        .with_units(r"\rm{Msun}")
        .particle(),
    );

    for (ptype, label) in PARTICLE_TYPES {
        register_deposit_fields(reg, ptype, label);
    }
}

/// The ART field registry: known raw fields and derived fields over the universal set.
pub fn art_fields() -> Arc<FieldRegistry> {
    let mut reg = FieldRegistry::create_with_fallback(Arc::new(universal_fields()));
    add_known_fields(&mut reg);
    add_derived_fields(&mut reg);
    debug!("Built ART field registry with {} fields.", reg.len());
    Arc::new(reg)
}

/// Spreads star ages formed in lumps linearly over the preceding `spread` seconds.
///
/// `ages` must be non-increasing. Each run of equal ages is replaced by evenly spaced
/// values from `max(age - spread, 0)` up to the age that starts the next run.
pub fn spread_ages(ages: &[f64], spread: f64) -> Result<Vec<f64>> {
    if ages.windows(2).any(|w| w[1] > w[0]) {
        return Err(Error::InvalidData(
            "particle ages must be sorted in decreasing order".into(),
        ));
    }
    let Some(&last) = ages.last() else {
        return Ok(Vec::new());
    };

    let mut out = vec![0.0; ages.len()];
    let mut left = 0;
    for (i, w) in ages.windows(2).enumerate() {
        if w[1] < w[0] {
            let right = i + 1;
            let rage = ages[right];
            fill_linspace(&mut out[left..right], (rage - spread).max(0.0), rage);
            left = right;
        }
    }
    fill_linspace(&mut out[left..], (last - spread).max(0.0), last);
    Ok(out)
}

fn fill_linspace(out: &mut [f64], start: f64, end: f64) {
    let n = out.len();
    if n == 1 {
        out[0] = start;
        return;
    }
    for (k, v) in out.iter_mut().enumerate() {
        *v = start + (end - start) * k as f64 / (n - 1) as f64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Dataset, DatasetBuilder, InMemorySource, PatchId};
    use crate::fields::FieldKey;
    use crate::units::MASS_SUN_GRAMS;

    fn art_dataset() -> Dataset {
        let mut source = InMemorySource::new();
        let n = 8;
        source
            .insert(PatchId(0), "Density", vec![2.0; n])
            .insert(PatchId(0), "GasEnergy", vec![3.0; n])
            .insert(PatchId(0), "XMomentumDensity", vec![4.0; n])
            .insert(PatchId(0), "YMomentumDensity", vec![0.0; n])
            .insert(PatchId(0), "ZMomentumDensity", vec![-4.0; n])
            .insert(PatchId(0), "MetalDensitySNII", vec![0.2; n])
            .insert(PatchId(0), "MetalDensitySNIa", vec![0.1; n])
            .insert(PatchId(0), ("stars", "particle_position_x"), vec![0.1, 0.6, 0.9])
            .insert(PatchId(0), ("stars", "particle_position_y"), vec![0.1, 0.6, 0.9])
            .insert(PatchId(0), ("stars", "particle_position_z"), vec![0.1, 0.6, 0.9])
            .insert(PatchId(0), ("stars", "particle_mass"), vec![1.0, 2.0, 3.0])
            .insert(
                PatchId(0),
                ("stars", "particle_creation_time"),
                vec![10.0, 20.0, 20.0],
            );
        DatasetBuilder::new("art", [2, 2, 2])
            .with_field_defaults(art_fields())
            .with_conversion_factor("Density", 10.0)
            .with_conversion_factor("GasEnergy", 100.0)
            .with_conversion_factor("Mass", 5.0)
            .with_conversion_factor("Velocity", 0.5)
            .with_conversion_factor("tr", 7.0)
            .with_conversion_factor("particle_mass", MASS_SUN_GRAMS)
            .with_property("current_time", 50.0)
            .build(source)
            .expect("valid ART dataset")
    }

    #[test]
    fn density_applies_conversion_factor() {
        let ds = art_dataset();
        let ad = ds.all_data();
        let rho = ad.get("Density").unwrap();
        assert!(rho.values.iter().all(|v| (*v - 20.0).abs() < 1e-12));
        let alias = ad.get("density").unwrap();
        assert_eq!(alias.values, rho.values);
        assert_eq!(alias.units.expr(), "g/cm**3");
    }

    #[test]
    fn temperature_uses_raw_ratio() {
        let ds = art_dataset();
        let t = ds.all_data().get("Temperature").unwrap();
        // (300 / 20) / 100 * 10 * 7
        assert!((t.values[0] - 10.5).abs() < 1e-9);
        assert!(t.units.same_dimensions(&ds.parse_unit("K").unwrap()));
    }

    #[test]
    fn velocity_is_momentum_over_density() {
        let ds = art_dataset();
        let ad = ds.all_data();
        // momentum factor = 5 * 0.5 * (10 / 5) = 5, so 20 / 20
        let vx = ad.get("x-velocity").unwrap();
        assert!((vx.values[0] - 1.0).abs() < 1e-12);
        let vz = ad.get("z-velocity").unwrap();
        assert!((vz.values[0] + 1.0).abs() < 1e-12);
        let speed = ad.get("velocity_magnitude").unwrap();
        assert!((speed.values[0] - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn metallicity_chains_through_metal_density() {
        let ds = art_dataset();
        let ad = ds.all_data();
        let z = ad.get("Metallicity").unwrap();
        assert!((z.values[0] - 0.15).abs() < 1e-12);
        assert!(z.units.is_dimensionless());
        assert_eq!(
            ad.dependencies(&"Metallicity".into()),
            vec![FieldKey::new("Density"), FieldKey::new("Metal_Density")]
        );
    }

    #[test]
    fn missing_raw_field_fails_validation() {
        let ds = art_dataset();
        let err = ds.all_data().get("Pressure").unwrap_err();
        assert!(matches!(err, Error::FieldValidation { .. }));
    }

    #[test]
    fn particle_fields_are_scoped_by_type() {
        let ds = art_dataset();
        let ad = ds.all_data();
        let age = ad.get(("stars", "particle_age")).unwrap();
        assert_eq!(age.values, vec![40.0, 30.0, 30.0]);

        let msun = ad.get(("stars", "ParticleMassMsun")).unwrap();
        assert!((msun.values[2] - 3.0).abs() < 1e-9);

        let deposited: f64 = ad
            .get("stars_number_deposit")
            .unwrap()
            .values
            .iter()
            .sum();
        assert_eq!(deposited, 3.0);
    }

    #[test]
    fn spread_ages_fills_runs_linearly() {
        let spread = spread_ages(&[30.0, 30.0, 20.0, 20.0, 20.0], 10.0).unwrap();
        assert_eq!(spread, vec![10.0, 20.0, 10.0, 15.0, 20.0]);
        assert!(spread_ages(&[1.0, 2.0], 1.0).is_err());
        assert!(spread_ages(&[], 1.0).unwrap().is_empty());
    }
}
