//! Terrain derivatives from a DEM

mod aspect;
mod slope;

pub use aspect::{aspect, ASPECT_NODATA};
pub use slope::{slope, SlopeParams, SlopeUnits};
