//! Frontend field tables.
//!
//! A frontend describes the raw fields a simulation code writes (units and conversion to
//! CGS) and the fields derived from them. Frontends expose their descriptors as a
//! [`FieldRegistry`](crate::fields::FieldRegistry) that falls back to the universal
//! fields; datasets layer their own registry on top.
pub mod art;
