//! Wavefront OBJ/MTL export.
//!
//! Faces are binned by colour into 256 materials per plot index. Several surfaces can
//! share one OBJ/MTL pair: `plot_index` 0 creates the files and later indices append,
//! continuing the vertex numbering.
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::export::{export_io, normalized_samples, Colormap};
use crate::fields::FieldKey;
use crate::surface::{SampleType, Surface};

const COLOR_BINS: usize = 256;

/// Options for [`Surface::export_obj`].
#[non_exhaustive]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ObjOptions {
    /// Opacity in `[0, 1]`, written as `d` (and `Tr = 1 - d`).
    pub transparency: f64,
    /// Vertex positions are divided by this.
    pub dist_fac: f64,
    pub color_field: Option<FieldKey>,
    pub color_field_min: Option<f64>,
    pub color_field_max: Option<f64>,
    /// Field driving the `Ke` emission colour.
    pub emit_field: Option<FieldKey>,
    pub emit_field_min: Option<f64>,
    pub emit_field_max: Option<f64>,
    pub plot_index: usize,
    pub colormap: Colormap,
}

impl Default for ObjOptions {
    fn default() -> Self {
        Self {
            transparency: 1.0,
            dist_fac: 1.0,
            color_field: None,
            color_field_min: None,
            color_field_max: None,
            emit_field: None,
            emit_field_min: None,
            emit_field_max: None,
            plot_index: 0,
            colormap: Colormap::default(),
        }
    }
}

impl ObjOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transparency(mut self, transparency: f64) -> Self {
        self.transparency = transparency;
        self
    }

    pub fn with_dist_fac(mut self, dist_fac: f64) -> Self {
        self.dist_fac = dist_fac;
        self
    }

    pub fn with_color_field(mut self, field: impl Into<FieldKey>) -> Self {
        self.color_field = Some(field.into());
        self
    }

    /// Fixes the colour range instead of using the sampled extrema.
    pub fn with_color_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.color_field_min = min;
        self.color_field_max = max;
        self
    }

    pub fn with_emit_field(mut self, field: impl Into<FieldKey>) -> Self {
        self.emit_field = Some(field.into());
        self
    }

    pub fn with_emit_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.emit_field_min = min;
        self.emit_field_max = max;
        self
    }

    pub fn with_plot_index(mut self, plot_index: usize) -> Self {
        self.plot_index = plot_index;
        self
    }

    pub fn with_colormap(mut self, colormap: Colormap) -> Self {
        self.colormap = colormap;
        self
    }

    /// Validates the options, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.transparency) {
            return Err(Error::InvalidConfig("transparency must be in [0, 1]".into()));
        }
        if !(self.dist_fac.is_finite() && self.dist_fac > 0.0) {
            return Err(Error::InvalidConfig("dist_fac must be finite and > 0".into()));
        }
        Ok(())
    }
}

/// Paths of the OBJ and MTL files for `base` (any extension is replaced).
pub fn obj_paths(base: impl AsRef<Path>) -> (PathBuf, PathBuf) {
    let base = base.as_ref();
    (base.with_extension("obj"), base.with_extension("mtl"))
}

fn material_name(plot_index: usize, bin: usize) -> String {
    format!("surface{plot_index}_color{bin}")
}

/// Number of `v` records already in an OBJ file.
fn existing_vertices(path: &Path) -> Result<usize> {
    let text = fs::read_to_string(path).map_err(export_io(path))?;
    Ok(text.lines().filter(|l| l.starts_with("v ")).count())
}

fn open(path: &Path, append: bool) -> Result<BufWriter<File>> {
    let file = if append {
        OpenOptions::new().append(true).open(path)
    } else {
        File::create(path)
    };
    Ok(BufWriter::new(file.map_err(export_io(path))?))
}

impl Surface<'_> {
    /// Writes the surface to `<base>.obj` and `<base>.mtl`.
    pub fn export_obj(&self, base: impl AsRef<Path>, options: &ObjOptions) -> Result<()> {
        options.validate()?;
        let (obj_path, mtl_path) = obj_paths(base);
        let append = options.plot_index > 0;
        let offset = if append {
            existing_vertices(&obj_path)?
        } else {
            0
        };

        let colors = match &options.color_field {
            Some(field) => normalized_samples(
                self,
                field,
                SampleType::Face,
                options.color_field_min,
                options.color_field_max,
                None,
            )?,
            None => vec![1.0; self.triangle_count()],
        };
        let emission = match &options.emit_field {
            Some(field) => Some(normalized_samples(
                self,
                field,
                SampleType::Face,
                options.emit_field_min,
                options.emit_field_max,
                None,
            )?),
            None => None,
        };

        // bin -> (faces, summed emission)
        let mut bins: BTreeMap<usize, (Vec<usize>, f64)> = BTreeMap::new();
        for (t, c) in colors.iter().enumerate() {
            let bin = ((c * COLOR_BINS as f64) as usize).min(COLOR_BINS - 1);
            let entry = bins.entry(bin).or_default();
            entry.0.push(t);
            entry.1 += emission.as_ref().map_or(0.0, |e| e[t]);
        }

        let mtl_name = mtl_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut obj = open(&obj_path, append)?;
        let write_obj = |obj: &mut BufWriter<File>| -> std::io::Result<()> {
            if !append {
                writeln!(obj, "mtllib {mtl_name}")?;
            }
            writeln!(obj, "# surface {} of '{}'", options.plot_index, self.field())?;
            for v in self.vertices() {
                let p = *v / options.dist_fac;
                writeln!(obj, "v {} {} {}", p.x, p.y, p.z)?;
            }
            writeln!(obj, "g surface{}", options.plot_index)?;
            for (bin, (faces, _)) in &bins {
                writeln!(obj, "usemtl {}", material_name(options.plot_index, *bin))?;
                for &t in faces {
                    let [a, b, c] = self.triangles()[t].map(|i| i as usize + offset + 1);
                    writeln!(obj, "f {a} {b} {c}")?;
                }
            }
            obj.flush()
        };
        write_obj(&mut obj).map_err(export_io(&obj_path))?;

        let mut mtl = open(&mtl_path, append)?;
        let write_mtl = |mtl: &mut BufWriter<File>| -> std::io::Result<()> {
            for (bin, (faces, emitted)) in &bins {
                let t = (*bin as f64 + 0.5) / COLOR_BINS as f64;
                let [r, g, b] = if options.color_field.is_some() {
                    options.colormap.rgb(t)
                } else {
                    [1.0; 3]
                };
                writeln!(mtl, "newmtl {}", material_name(options.plot_index, *bin))?;
                writeln!(mtl, "Ka {r:.6} {g:.6} {b:.6}")?;
                writeln!(mtl, "Kd {r:.6} {g:.6} {b:.6}")?;
                writeln!(mtl, "Ks 0.000000 0.000000 0.000000")?;
                writeln!(mtl, "d {:.6}", options.transparency)?;
                writeln!(mtl, "Tr {:.6}", 1.0 - options.transparency)?;
                if options.emit_field.is_some() {
                    let e = emitted / faces.len() as f64;
                    writeln!(mtl, "Ke {e:.6} {e:.6} {e:.6}")?;
                    writeln!(mtl, "illum 2")?;
                } else {
                    writeln!(mtl, "illum 1")?;
                }
                writeln!(mtl)?;
            }
            mtl.flush()
        };
        write_mtl(&mut mtl).map_err(export_io(&mtl_path))?;

        info!(
            "Wrote surface {} ({} vertices, {} faces, {} materials) to '{}'.",
            options.plot_index,
            self.vertex_count(),
            self.triangle_count(),
            bins.len(),
            obj_path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Dataset, FakeDatasetBuilder};
    use crate::fields::FieldInfo;

    fn dataset() -> Dataset {
        let mut ds = FakeDatasetBuilder::new(16)
            .with_patches(4)
            .with_particles(16 * 16 * 16)
            .with_fields(&[("density", "g/cm**3"), ("temperature", "K")])
            .build()
            .expect("fake dataset");
        ds.add_field(
            FieldInfo::derived("emissivity", |ctx| {
                let rho = ctx.get("density")?;
                let temp = ctx.get("temperature")?;
                rho.mul(&rho)?.mul(&temp.sqrt())
            })
            .with_units("g**2*sqrt(K)/cm**6"),
        )
        .expect("register emissivity");
        ds
    }

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("simflux-obj-{}-{name}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn count(text: &str, prefix: &str) -> usize {
        text.lines().filter(|l| l.starts_with(prefix)).count()
    }

    #[test]
    fn plain_export_writes_both_files() {
        let ds = dataset();
        let sp = ds.sphere([0.5, 0.5, 0.5], 0.3);
        let surf = ds.surface(&sp, "density", 0.5).unwrap();
        let dir = scratch("plain");
        let base = dir.join("my_galaxy");
        surf.export_obj(&base, &ObjOptions::new()).unwrap();

        let (obj, mtl) = obj_paths(&base);
        let text = fs::read_to_string(obj).unwrap();
        assert_eq!(count(&text, "v "), surf.vertex_count());
        assert_eq!(count(&text, "f "), surf.triangle_count());
        assert!(fs::read_to_string(mtl).unwrap().contains("d 1.000000"));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn plot_indices_append_and_continue_numbering() {
        let ds = dataset();
        let sp = ds.sphere([0.5, 0.5, 0.5], 0.3);
        let dir = scratch("append");
        let base = dir.join("my_galaxy_emis");
        let mut first_vertices = 0;
        let mut total_vertices = 0;
        let mut total_faces = 0;
        for (i, (rho, trans)) in [(0.5, 1.0), (0.7, 0.5)].into_iter().enumerate() {
            let surf = ds.surface(&sp, "density", rho).unwrap();
            let options = ObjOptions::new()
                .with_transparency(trans)
                .with_color_field("temperature")
                .with_emit_field("emissivity")
                .with_plot_index(i);
            surf.export_obj(&base, &options).unwrap();
            if i == 0 {
                first_vertices = surf.vertex_count();
            }
            total_vertices += surf.vertex_count();
            total_faces += surf.triangle_count();
        }

        let (obj, mtl) = obj_paths(&base);
        let text = fs::read_to_string(obj).unwrap();
        assert_eq!(count(&text, "v "), total_vertices);
        assert_eq!(count(&text, "f "), total_faces);
        assert_eq!(count(&text, "mtllib "), 1);
        let max_index = text
            .lines()
            .filter_map(|l| l.strip_prefix("f "))
            .flat_map(|l| l.split_whitespace().map(|n| n.parse::<usize>().unwrap()))
            .max()
            .unwrap();
        assert!(max_index > first_vertices && max_index <= total_vertices);

        let materials = fs::read_to_string(mtl).unwrap();
        assert!(count(&materials, "newmtl surface0_") > 0);
        assert!(count(&materials, "newmtl surface1_") > 0);
        assert!(materials.contains("Ke "));
        assert!(materials.contains("d 0.500000"));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn invalid_options_are_rejected() {
        assert!(ObjOptions::new().with_transparency(1.5).validate().is_err());
        assert!(ObjOptions::new().with_dist_fac(0.0).validate().is_err());
    }

    #[test]
    fn appending_without_a_base_file_fails() {
        let ds = dataset();
        let ad = ds.all_data();
        let surf = ds.surface(&ad, "x", 0.5).unwrap();
        let dir = scratch("missing");
        let err = surf
            .export_obj(dir.join("absent"), &ObjOptions::new().with_plot_index(1))
            .unwrap_err();
        assert!(matches!(err, Error::ExportIo { .. }));
        fs::remove_dir_all(dir).ok();
    }
}
