use simflux::frontends::art::spread_ages;
use simflux::prelude::*;
use simflux::units::{CM_PER_PC, MASS_SUN_GRAMS, SECONDS_PER_YEAR};
use simflux_examples::init_tracing;
use tracing::info;

fn main() -> anyhow::Result<()> {
    init_tracing();
    let n = 8;
    let cells = n * n * n;
    let mut source = InMemorySource::default();
    let density: Vec<f64> = (0..cells).map(|i| 1.0 + (i % 7) as f64).collect();
    let energy: Vec<f64> = density.iter().map(|rho| 2.0 * rho).collect();
    let momentum: Vec<f64> = density.iter().map(|rho| 0.1 * rho).collect();
    source
        .insert(PatchId(0), "Density", density)
        .insert(PatchId(0), "GasEnergy", energy)
        .insert(PatchId(0), "XMomentumDensity", momentum.clone())
        .insert(PatchId(0), "YMomentumDensity", momentum.clone())
        .insert(PatchId(0), "ZMomentumDensity", momentum)
        .insert(PatchId(0), "MetalDensitySNII", vec![0.01; cells])
        .insert(PatchId(0), "MetalDensitySNIa", vec![0.005; cells]);

    let ds = DatasetBuilder::new("art_demo", [n, n, n])
        .with_code_units(1e3 * CM_PER_PC, 1e9 * MASS_SUN_GRAMS, 1e6 * SECONDS_PER_YEAR)
        .with_conversion_factor("Density", 1e-24)
        .with_conversion_factor("GasEnergy", 1e-12)
        .with_conversion_factor("Mass", 1.0)
        .with_conversion_factor("Velocity", 1e5)
        .with_conversion_factor("tr", 1e4)
        .with_property("current_time", 1e9 * SECONDS_PER_YEAR)
        .with_field_defaults(art_fields())
        .build(source)?;

    let ad = ds.all_data();
    for field in ["Temperature", "Metallicity", "x-velocity"] {
        let values = ad.get(field)?;
        let (lo, hi) = values.extrema().unwrap_or((0.0, 0.0));
        info!("{}: [{:.4e}, {:.4e}] {}", field, lo, hi, values.units);
        info!("  depends on {:?}", ad.dependencies(&field.into()));
    }

    let rho = ad.max("Density")?;
    let surf = ds.surface(&ad, "Density", 0.5 * rho.value)?;
    info!(
        "Density surface at {} {}: {} triangles",
        0.5 * rho.value,
        rho.units,
        surf.triangle_count()
    );

    let ages = spread_ages(&[30.0, 30.0, 20.0, 20.0, 20.0], 10.0)?;
    info!("Spread stellar ages: {:?}", ages);
    Ok(())
}
