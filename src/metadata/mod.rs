//! Metadata Module
//!
//! Catalog access and normalization:
//! - Dynamically typed frames returned by catalog queries
//! - Role resolution and typed records (the normalizer)
//! - MySQL query constants and the live introspector

pub mod frame;
pub mod introspect;
pub mod normalizer;
pub mod queries;

pub use frame::{Cell, MetadataFrame};
pub use introspect::MySqlIntrospector;
pub use normalizer::{MetadataFrames, MetadataIndex, NormalizedMetadata, TableRef};
