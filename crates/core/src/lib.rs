//! # nbspot Core
//!
//! Core types and I/O for the nbspot NbS prioritization toolkit.
//!
//! This crate provides:
//! - `Raster<T>`: masked single-band raster grid
//! - `GeoTransform`: affine georeferencing
//! - `Feature` / `FeatureCollection`: attributed vector features
//! - Native GeoTIFF I/O

pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement};
pub use vector::{AttributeValue, Feature, FeatureCollection};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
    pub use crate::vector::{AttributeValue, Feature, FeatureCollection};
}
