//! Stanford PLY export.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use glam::DVec3;
use tracing::info;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::export::{export_io, normalized_samples, Colormap};
use crate::fields::FieldKey;
use crate::surface::{SampleType, Surface};

/// Encoding of the PLY body.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlyFormat {
    Ascii,
    #[default]
    BinaryLittleEndian,
}

/// Options for [`Surface::export_ply`].
#[non_exhaustive]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct PlyOptions {
    /// Per-axis `(lo, hi)` box rescaled into the unit cube.
    pub bounds: Option<[(f64, f64); 3]>,
    pub format: PlyFormat,
    /// Colour per vertex ([`SampleType::Vertex`]) or per face (otherwise).
    pub sample_type: SampleType,
    pub color_field: Option<FieldKey>,
    pub colormap: Colormap,
    /// Overrides the colour field's take-log flag.
    pub color_log: Option<bool>,
}

impl Default for PlyOptions {
    fn default() -> Self {
        Self {
            bounds: None,
            format: PlyFormat::default(),
            sample_type: SampleType::Face,
            color_field: None,
            colormap: Colormap::default(),
            color_log: None,
        }
    }
}

impl PlyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bounds(mut self, bounds: [(f64, f64); 3]) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_format(mut self, format: PlyFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_sample_type(mut self, sample_type: SampleType) -> Self {
        self.sample_type = sample_type;
        self
    }

    pub fn with_color_field(mut self, field: impl Into<FieldKey>) -> Self {
        self.color_field = Some(field.into());
        self
    }

    pub fn with_colormap(mut self, colormap: Colormap) -> Self {
        self.colormap = colormap;
        self
    }

    pub fn with_color_log(mut self, log: bool) -> Self {
        self.color_log = Some(log);
        self
    }

    /// Validates the options, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if let Some(bounds) = &self.bounds {
            if bounds
                .iter()
                .any(|(lo, hi)| !(lo.is_finite() && hi.is_finite() && hi > lo))
            {
                return Err(Error::InvalidConfig(
                    "PLY bounds must be finite with hi > lo on every axis".into(),
                ));
            }
        }
        Ok(())
    }
}

impl Surface<'_> {
    /// Writes the surface to a PLY file at `path`.
    pub fn export_ply(&self, path: impl AsRef<Path>, options: &PlyOptions) -> Result<()> {
        let path = path.as_ref();
        options.validate()?;
        let file = File::create(path).map_err(export_io(path))?;
        let mut w = BufWriter::new(file);
        self.write_ply_to(&mut w, options)
            .and_then(|_| w.flush().map_err(Error::Io))
            .map_err(|err| match err {
                Error::Io(source) => Error::ExportIo {
                    path: path.to_path_buf(),
                    source,
                },
                other => other,
            })?;
        info!(
            "Wrote {} vertices and {} faces to '{}'.",
            self.vertex_count(),
            self.triangle_count(),
            path.display()
        );
        Ok(())
    }

    /// Writes the surface as PLY into `w`.
    pub fn write_ply_to<W: Write>(&self, w: &mut W, options: &PlyOptions) -> Result<()> {
        options.validate()?;
        let colors = match &options.color_field {
            Some(field) => {
                let t = normalized_samples(
                    self,
                    field,
                    options.sample_type,
                    None,
                    None,
                    options.color_log,
                )?;
                Some(t.into_iter().map(|t| options.colormap.rgb8(t)).collect::<Vec<_>>())
            }
            None => None,
        };
        let vertex_colors = options.sample_type == SampleType::Vertex;
        let color_of = |i: usize| colors.as_ref().map(|c| c[i]);

        let format = match options.format {
            PlyFormat::Ascii => "ascii",
            PlyFormat::BinaryLittleEndian => "binary_little_endian",
        };
        let mut header = format!(
            "ply\nformat {format} 1.0\ncomment isosurface of {} at {}\n",
            self.field(),
            self.isovalue()
        );
        header.push_str(&format!("element vertex {}\n", self.vertex_count()));
        header.push_str("property float x\nproperty float y\nproperty float z\n");
        if colors.is_some() && vertex_colors {
            header.push_str("property uchar red\nproperty uchar green\nproperty uchar blue\n");
        }
        header.push_str(&format!("element face {}\n", self.triangle_count()));
        header.push_str("property list uchar int vertex_indices\n");
        if colors.is_some() && !vertex_colors {
            header.push_str("property uchar red\nproperty uchar green\nproperty uchar blue\n");
        }
        header.push_str("end_header\n");
        w.write_all(header.as_bytes())?;

        let rescale = |v: DVec3| match &options.bounds {
            Some(b) => DVec3::new(
                (v.x - b[0].0) / (b[0].1 - b[0].0),
                (v.y - b[1].0) / (b[1].1 - b[1].0),
                (v.z - b[2].0) / (b[2].1 - b[2].0),
            ),
            None => v,
        };

        for (i, v) in self.vertices().iter().enumerate() {
            let p = rescale(*v).as_vec3();
            let rgb = if vertex_colors { color_of(i) } else { None };
            match options.format {
                PlyFormat::Ascii => {
                    write!(w, "{} {} {}", p.x, p.y, p.z)?;
                    if let Some([r, g, b]) = rgb {
                        write!(w, " {r} {g} {b}")?;
                    }
                    writeln!(w)?;
                }
                PlyFormat::BinaryLittleEndian => {
                    for c in p.to_array() {
                        w.write_all(&c.to_le_bytes())?;
                    }
                    if let Some(rgb) = rgb {
                        w.write_all(&rgb)?;
                    }
                }
            }
        }

        for (t, tri) in self.triangles().iter().enumerate() {
            let rgb = if vertex_colors { None } else { color_of(t) };
            match options.format {
                PlyFormat::Ascii => {
                    write!(w, "3 {} {} {}", tri[0], tri[1], tri[2])?;
                    if let Some([r, g, b]) = rgb {
                        write!(w, " {r} {g} {b}")?;
                    }
                    writeln!(w)?;
                }
                PlyFormat::BinaryLittleEndian => {
                    w.write_all(&[3u8])?;
                    for i in tri {
                        w.write_all(&(*i as i32).to_le_bytes())?;
                    }
                    if let Some(rgb) = rgb {
                        w.write_all(&rgb)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Dataset, FakeDatasetBuilder};

    fn dataset() -> Dataset {
        FakeDatasetBuilder::new(16)
            .with_patches(4)
            .build()
            .expect("fake dataset")
    }

    fn header_count(text: &str, element: &str) -> usize {
        text.lines()
            .find_map(|l| l.strip_prefix(&format!("element {element} ")))
            .and_then(|n| n.parse().ok())
            .expect("element declared")
    }

    #[test]
    fn ascii_counts_match_surface() {
        let ds = dataset();
        let ad = ds.all_data();
        let surf = ds.surface(&ad, "x", 0.51).unwrap();
        let options = PlyOptions::new()
            .with_format(PlyFormat::Ascii)
            .with_bounds([(0.0, 1.0); 3]);
        let mut out = Vec::new();
        surf.write_ply_to(&mut out, &options).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(header_count(&text, "vertex"), surf.vertex_count());
        assert_eq!(header_count(&text, "face"), surf.triangle_count());
        let body: Vec<&str> = text.split("end_header\n").nth(1).unwrap().lines().collect();
        assert_eq!(body.len(), surf.vertex_count() + surf.triangle_count());
        assert!(body[surf.vertex_count()].starts_with("3 "));
    }

    #[test]
    fn binary_vertex_colours_have_expected_size() {
        let ds = dataset();
        let ad = ds.all_data();
        let surf = ds.surface(&ad, "x", 0.51).unwrap();
        let options = PlyOptions::new()
            .with_sample_type(SampleType::Vertex)
            .with_color_field("density");
        let mut out = Vec::new();
        surf.write_ply_to(&mut out, &options).unwrap();

        let marker = b"end_header\n";
        let split = out
            .windows(marker.len())
            .position(|w| w == marker)
            .unwrap()
            + marker.len();
        let header = std::str::from_utf8(&out[..split]).unwrap();
        assert!(header.contains("property uchar red"));
        let expected = surf.vertex_count() * (12 + 3) + surf.triangle_count() * 13;
        assert_eq!(out.len() - split, expected);
    }

    #[test]
    fn invalid_bounds_are_rejected() {
        let options = PlyOptions::new().with_bounds([(0.0, 1.0), (1.0, 1.0), (0.0, 1.0)]);
        assert!(matches!(options.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn export_writes_file() {
        let ds = dataset();
        let ad = ds.all_data();
        let surf = ds.surface(&ad, "density", 0.5).unwrap();
        let dir = std::env::temp_dir().join(format!("simflux-ply-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("surface.ply");
        let options = PlyOptions::new().with_color_field("density");
        surf.export_ply(&path, &options).unwrap();
        assert!(path.exists());
        std::fs::remove_dir_all(&dir).ok();

        let missing = dir.join("no/such/dir/surface.ply");
        let err = surf.export_ply(&missing, &options).unwrap_err();
        assert!(matches!(err, Error::ExportIo { .. }));
    }
}
