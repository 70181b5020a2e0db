//! Mesh export of surfaces to PLY and OBJ/MTL files.
//!
//! Exporters only read the surface geometry and samples; colours come from a field
//! sampled on the surface, normalised (logarithmically when the field's descriptor asks
//! for it) and passed through a [`Colormap`].
use std::path::Path;

use crate::error::{Error, Result};
use crate::fields::FieldKey;
use crate::surface::{SampleType, Surface};

pub mod colormap;
pub mod obj;
pub mod ply;

pub use colormap::{normalize, Colormap};
pub use obj::ObjOptions;
pub use ply::{PlyFormat, PlyOptions};

pub(crate) fn export_io(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |source| Error::ExportIo {
        path: path.to_path_buf(),
        source,
    }
}

/// Samples `field` and rescales it into `[0, 1]`.
///
/// `log` overrides the field's take-log flag.
pub(crate) fn normalized_samples(
    surface: &Surface<'_>,
    field: &FieldKey,
    sample_type: SampleType,
    min: Option<f64>,
    max: Option<f64>,
    log: Option<bool>,
) -> Result<Vec<f64>> {
    let container = surface.container();
    let key = container.resolve(field);
    let log = match log {
        Some(log) => log,
        None => container.dataset().field_info(&key)?.take_log,
    };
    let samples = surface.sample(key, sample_type)?;
    Ok(normalize(&samples.values, min, max, log))
}
