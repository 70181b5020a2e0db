//! Datasets, data sources, geometric selections and data containers.
//!
//! A [`Dataset`] describes a uniform-resolution domain split into [`Patch`]es and owns the
//! field registry, unit registry and conversion factors for that dataset. Raw values come
//! from a [`DataSource`]. A [`DataContainer`] is a geometric selection over a dataset that
//! evaluates and caches fields.
pub mod array;
pub mod container;
pub mod dataset;
pub mod fake;
pub mod grid;
pub mod memory;
pub mod selection;

pub use array::FieldArray;
pub use container::{ContainerId, DataContainer, ParamValue};
pub use dataset::{DataSource, Dataset, DatasetBuilder};
pub use fake::FakeDatasetBuilder;
pub use grid::{decompose_domain, Patch, PatchId};
pub use memory::InMemorySource;
pub use selection::Selector;
