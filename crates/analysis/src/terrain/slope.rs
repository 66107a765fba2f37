//! Slope calculation from DEMs
//!
//! Rate of change of elevation via the Horn (1981) method: partial
//! derivatives from a 3x3 neighborhood. The mitigation scorer and the
//! hillslope unit both consume the degree output.

use crate::maybe_rayon::*;
use nbspot_core::raster::Raster;
use nbspot_core::{Error, RasterElement, Result};
use ndarray::Array2;

/// Units for slope output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlopeUnits {
    /// Degrees (0-90)
    #[default]
    Degrees,
    /// Radians (0-π/2)
    Radians,
}

/// Parameters for slope calculation
#[derive(Debug, Clone)]
pub struct SlopeParams {
    /// Output units
    pub units: SlopeUnits,
    /// Z-factor for unit conversion (default 1.0).
    /// Use ~111320 for lat/lon DEMs with meters elevation.
    pub z_factor: f64,
}

impl Default for SlopeParams {
    fn default() -> Self {
        Self {
            units: SlopeUnits::Degrees,
            z_factor: 1.0,
        }
    }
}

/// Calculate slope from a DEM
///
/// Horn's (1981) method with a 3x3 neighborhood:
/// ```text
/// a b c
/// d e f
/// g h i
/// ```
///
/// dz/dx = ((c + 2f + i) - (a + 2d + g)) / (8 * cellsize)
/// dz/dy = ((g + 2h + i) - (a + 2b + c)) / (8 * cellsize)
/// slope = atan(sqrt(dz/dx² + dz/dy²))
///
/// Edge cells and cells with no-data anywhere in the neighborhood stay
/// masked (NaN).
pub fn slope(dem: &Raster<f64>, params: SlopeParams) -> Result<Raster<f64>> {
    let (rows, cols) = dem.shape();
    let cell_size = dem.cell_size() * params.z_factor;
    let nodata = dem.nodata();

    let eight_cell_size = 8.0 * cell_size;

    let output_data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];

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

                let dz_dx = ((c + 2.0 * f + i) - (a + 2.0 * d + g)) / eight_cell_size;
                let dz_dy = ((g + 2.0 * h + i) - (a + 2.0 * b + c)) / eight_cell_size;

                let slope_rad = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt().atan();

                row_data[col] = match params.units {
                    SlopeUnits::Degrees => slope_rad.to_degrees(),
                    SlopeUnits::Radians => slope_rad,
                };
            }

            row_data
        })
        .collect();

    let mut output = dem.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() = Array2::from_shape_vec((rows, cols), output_data)
        .map_err(|e| Error::Other(e.to_string()))?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nbspot_core::GeoTransform;

    fn tilted_dem() -> Raster<f64> {
        // z = x + y plane
        let mut dem = Raster::new(10, 10);
        dem.set_transform(GeoTransform::new(0.0, 10.0, 1.0, -1.0));
        for row in 0..10 {
            for col in 0..10 {
                dem.set(row, col, (row + col) as f64).unwrap();
            }
        }
        dem
    }

    #[test]
    fn test_slope_flat() {
        let mut dem = Raster::filled(10, 10, 100.0);
        dem.set_transform(GeoTransform::new(0.0, 10.0, 1.0, -1.0));

        let result = slope(&dem, SlopeParams::default()).unwrap();
        assert_relative_eq!(result.get(5, 5).unwrap(), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_slope_tilted_plane() {
        let dem = tilted_dem();
        let result = slope(&dem, SlopeParams::default()).unwrap();

        // Gradient (1, 1): slope = atan(sqrt(2)) ≈ 54.7356°
        let expected = 2.0_f64.sqrt().atan().to_degrees();
        assert_relative_eq!(result.get(5, 5).unwrap(), expected, epsilon = 1e-6);
    }

    #[test]
    fn test_slope_edges_masked() {
        let dem = tilted_dem();
        let result = slope(&dem, SlopeParams::default()).unwrap();
        assert!(result.get(0, 5).unwrap().is_nan());
        assert!(result.get(5, 0).unwrap().is_nan());
        assert!(result.get(9, 9).unwrap().is_nan());
    }

    #[test]
    fn test_slope_nodata_neighborhood_masked() {
        let mut dem = tilted_dem();
        dem.set_nodata(Some(f64::NAN));
        dem.set(4, 4, f64::NAN).unwrap();

        let result = slope(&dem, SlopeParams::default()).unwrap();
        assert!(result.get(5, 5).unwrap().is_nan());
        assert!(!result.get(7, 7).unwrap().is_nan());
    }
}
