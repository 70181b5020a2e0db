#![forbid(unsafe_code)]
//! simflux: derived-field evaluation, isosurface extraction and surface flux integration
//! for patch-based simulation snapshots.
//!
//! Modules:
//! - units: unit expressions, dimensional analysis and quantities
//! - data: datasets, patches, data sources, selections and containers
//! - fields: field descriptors, per-dataset registries, lazy evaluation and caching
//! - frontends: field tables for specific simulation codes (ART)
//! - surface: isosurface extraction, sampling and flux integration
//! - export: PLY and OBJ/MTL mesh writers
//!
//! For examples, see the `simflux_examples` crate.
pub mod data;
pub mod error;
pub mod export;
pub mod fields;
pub mod frontends;
pub mod surface;
pub mod units;

/// Convenient re-exports for common types. Import with `use simflux::prelude::*;`.
pub mod prelude {
    pub use crate::data::{
        DataContainer, DataSource, Dataset, DatasetBuilder, FakeDatasetBuilder, FieldArray,
        InMemorySource, ParamValue, Patch, PatchId, Selector,
    };
    pub use crate::error::{Error, Result};
    pub use crate::export::{Colormap, ObjOptions, PlyFormat, PlyOptions};
    pub use crate::fields::{
        DepositMethod, FieldContext, FieldInfo, FieldKey, FieldRegistry, SpatialField,
        Validator,
    };
    pub use crate::frontends::art::art_fields;
    pub use crate::surface::{
        CellRef, EventSink, FnSink, MultiSink, SampleType, Surface, SurfaceConfig,
        SurfaceEvent, SurfaceEventKind, SurfaceExtractor, VecSink,
    };
    pub use crate::units::{ConversionFactors, Dimensions, Quantity, Unit, UnitRegistry};
}
