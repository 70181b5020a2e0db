use simflux::prelude::*;
use simflux_examples::{init_tracing, output_dir};
use tracing::info;

fn main() -> anyhow::Result<()> {
    init_tracing();
    let ds = FakeDatasetBuilder::new(64).with_patches(4).build()?;
    let ad = ds.all_data();

    let mut surf = ds.surface(&ad, "x", 0.51)?;
    let flux = surf.calculate_flux("ones", "zeros", "zeros", Some("ones".into()))?;
    info!("Flux of (1, 0, 0) through x = 0.51: {}", flux);

    let n = surf.triangle_count();
    let density = surf.get("density")?;
    let (lo, hi) = density.extrema().unwrap_or((0.0, 0.0));
    info!("{} faces, density in [{}, {}] {}", n, lo, hi, density.units);

    let path = output_dir()?.join("flux-plane-slice.ply");
    let options = PlyOptions::new()
        .with_bounds([(0.0, 1.0); 3])
        .with_sample_type(SampleType::Vertex)
        .with_color_field("density");
    surf.export_ply(&path, &options)?;
    Ok(())
}
