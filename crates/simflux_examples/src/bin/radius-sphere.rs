use std::f64::consts::PI;

use simflux::prelude::*;
use simflux_examples::init_tracing;
use tracing::info;

fn main() -> anyhow::Result<()> {
    init_tracing();
    let ds = FakeDatasetBuilder::new(64)
        .with_patches(4)
        .with_particles(16 * 16 * 16)
        .build()?;
    let extractor = SurfaceExtractor::try_new(SurfaceConfig::default())?;

    let ad = ds.all_data();
    let sp = ds.sphere(ds.domain_center(), 0.5);
    for (name, container) in [("all_data", &ad), ("sphere", &sp)] {
        for r in [0.05, 0.1, 0.4] {
            let mut events = VecSink::only(&[SurfaceEventKind::VerticesMerged]);
            let surf = extractor.extract_with_events(container, "radius", r, &mut events)?;
            let area = surf.surface_area();
            info!(
                "{}: r = {} area = {:.5} (4 pi r^2 = {:.5}), {} vertices",
                name,
                r,
                area.value,
                4.0 * PI * r * r,
                surf.vertex_count()
            );
            for event in events.as_slice() {
                if let SurfaceEvent::VerticesMerged { before, after, .. } = event {
                    info!("  merged {} seam vertices", before - after);
                }
            }
        }
    }
    Ok(())
}
