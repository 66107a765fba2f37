//! I/O for geospatial rasters

mod native;

pub use native::{read_geotiff, write_geotiff};
