//! Aspect calculation from DEMs
//!
//! Direction of steepest descent via the Horn (1981) method, as a compass
//! bearing in degrees (0 = north, clockwise). Flat cells, edge cells, and
//! cells with no-data in the neighborhood get `ASPECT_NODATA`; the
//! mitigation scorer treats that sentinel as "no aspect adjustment".

use crate::maybe_rayon::*;
use nbspot_core::raster::Raster;
use nbspot_core::{Error, RasterElement, Result};
use ndarray::Array2;
use std::f64::consts::PI;

/// Sentinel for flat or undefined aspect
pub const ASPECT_NODATA: f64 = -1.0;

/// Calculate aspect from a DEM, in degrees clockwise from north.
pub fn aspect(dem: &Raster<f64>) -> Result<Raster<f64>> {
    let (rows, cols) = dem.shape();
    let nodata = dem.nodata();

    const FLAT_THRESHOLD: f64 = 1e-10;

    let output_data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![ASPECT_NODATA; cols];

            for col in 0..cols {
                let e = unsafe { dem.get_unchecked(row, col) };
                if e.is_nodata(nodata) {
                    continue;
                }

                if row == 0 || row == rows - 1 || col == 0 || col == cols - 1 {
                    continue;
                }

                let a = unsafe { dem.get_unchecked(row - 1, col - 1) };
                let b = unsafe { dem.get_unchecked(row - 1, col) };
                let c = unsafe { dem.get_unchecked(row - 1, col + 1) };
                let d = unsafe { dem.get_unchecked(row, col - 1) };
                let f = unsafe { dem.get_unchecked(row, col + 1) };
                let g = unsafe { dem.get_unchecked(row + 1, col - 1) };
                let h = unsafe { dem.get_unchecked(row + 1, col) };
                let i = unsafe { dem.get_unchecked(row + 1, col + 1) };

                if [a, b, c, d, f, g, h, i].iter().any(|v| v.is_nan()) {
                    continue;
                }

                let dz_dx = (c + 2.0 * f + i) - (a + 2.0 * d + g);
                let dz_dy = (g + 2.0 * h + i) - (a + 2.0 * b + c);

                if dz_dx.abs() < FLAT_THRESHOLD && dz_dy.abs() < FLAT_THRESHOLD {
                    continue;
                }

                // Descent direction in (east, north) space; pixel Y opposes
                // geographic Y, hence the sign flips
                let bearing = (-dz_dx).atan2(dz_dy);
                let bearing = if bearing < 0.0 {
                    bearing + 2.0 * PI
                } else {
                    bearing
                };

                row_data[col] = bearing.to_degrees();
            }

            row_data
        })
        .collect();

    let mut output = dem.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(ASPECT_NODATA));
    *output.data_mut() = Array2::from_shape_vec((rows, cols), output_data)
        .map_err(|e| Error::Other(e.to_string()))?;

    Ok(output)
}
