use simflux::prelude::*;
use simflux_examples::{init_tracing, output_dir};
use tracing::info;

fn main() -> anyhow::Result<()> {
    init_tracing();
    let mut ds = FakeDatasetBuilder::new(16)
        .with_patches(4)
        .with_particles(16 * 16 * 16)
        .with_fields(&[("density", "g/cm**3"), ("temperature", "K")])
        .build()?;
    ds.add_field(
        FieldInfo::derived("emissivity", |ctx| {
            let rho = ctx.get("density")?;
            let temp = ctx.get("temperature")?;
            rho.mul(&rho)?.mul(&temp.sqrt())
        })
        .with_units("g**2*sqrt(K)/cm**6"),
    )?;

    let ad = ds.all_data();
    let center = ad.argmax("density")?;
    let sp = ds.sphere(center, 0.3);
    let max = sp.max("density")?;
    info!("Densest cell at {} ({})", center, max);

    let dir = output_dir()?;
    let rhos = [0.5 * max.value, 0.3 * max.value];
    let transparency = [1.0, 0.5];
    for (i, (rho, trans)) in rhos.into_iter().zip(transparency).enumerate() {
        let surf = ds.surface(&sp, "density", rho)?;
        let options = ObjOptions::new()
            .with_transparency(trans)
            .with_color_field("temperature")
            .with_emit_field("emissivity")
            .with_colormap(Colormap::Hot)
            .with_plot_index(i);
        surf.export_obj(dir.join("galaxy"), &options)?;
    }
    Ok(())
}
