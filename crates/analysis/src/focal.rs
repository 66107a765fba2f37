//! Focal maximum within a radius
//!
//! Circular moving-window maximum with the radius given in map units.
//! This is the spatial diffusion primitive used to spread floodplain
//! demand onto adjacent hillslopes before demand/supply coupling.

use crate::maybe_rayon::*;
use nbspot_core::raster::Raster;
use nbspot_core::{Error, Result};
use ndarray::Array2;

/// Compute the maximum of valid cells within `radius` map units of each cell.
///
/// Cells with no valid neighbor in the window (including themselves) stay
/// masked. A radius smaller than one cell reduces to the identity on valid
/// cells.
pub fn focal_max(raster: &Raster<f64>, radius: f64) -> Result<Raster<f64>> {
    if !radius.is_finite() || radius < 0.0 {
        return Err(Error::InvalidParameter {
            name: "radius",
            value: radius.to_string(),
            reason: "must be a non-negative finite distance".into(),
        });
    }

    let cell_size = raster.cell_size();
    if cell_size <= 0.0 {
        return Err(Error::InvalidParameter {
            name: "cell_size",
            value: cell_size.to_string(),
            reason: "raster has a degenerate geotransform".into(),
        });
    }

    let (rows, cols) = raster.shape();
    let r_cells = (radius / cell_size).floor() as isize;
    let r_sq = (radius / cell_size) * (radius / cell_size);

    // Precompute circular window offsets
    let mut offsets: Vec<(isize, isize)> = Vec::new();
    for dr in -r_cells..=r_cells {
        for dc in -r_cells..=r_cells {
            if (dr * dr + dc * dc) as f64 <= r_sq {
                offsets.push((dr, dc));
            }
        }
    }
    if offsets.is_empty() {
        offsets.push((0, 0));
    }

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];

            for (col, out) in row_data.iter_mut().enumerate() {
                let mut best = f64::NAN;

                for &(dr, dc) in &offsets {
                    let nr = row as isize + dr;
                    let nc = col as isize + dc;

                    if nr >= 0 && nc >= 0 && (nr as usize) < rows && (nc as usize) < cols {
                        let v = unsafe { raster.get_unchecked(nr as usize, nc as usize) };
                        if !v.is_nan() && (best.is_nan() || v > best) {
                            best = v;
                        }
                    }
                }

                *out = best;
            }

            row_data
        })
        .collect();

    let mut output = raster.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbspot_core::GeoTransform;

    fn grid(size: usize, cell: f64) -> Raster<f64> {
        let mut r = Raster::new(size, size);
        r.set_transform(GeoTransform::new(0.0, size as f64 * cell, cell, -cell));
        r.set_nodata(Some(f64::NAN));
        r
    }

    #[test]
    fn test_focal_max_spreads_peak() {
        let mut r = grid(9, 100.0);
        r.set(4, 4, 5.0).unwrap();

        // 250 m radius on 100 m cells: window reaches 2 cells out
        let out = focal_max(&r, 250.0).unwrap();
        assert_eq!(out.get(4, 4).unwrap(), 5.0);
        assert_eq!(out.get(4, 6).unwrap(), 5.0);
        assert_eq!(out.get(2, 4).unwrap(), 5.0);
        // Outside the radius the zero background survives
        assert_eq!(out.get(0, 0).unwrap(), 0.0);
    }

    #[test]
    fn test_focal_max_zero_radius_identity() {
        let mut r = grid(5, 100.0);
        r.set(2, 2, 3.0).unwrap();

        let out = focal_max(&r, 0.0).unwrap();
        assert_eq!(out.get(2, 2).unwrap(), 3.0);
        assert_eq!(out.get(2, 3).unwrap(), 0.0);
    }

    #[test]
    fn test_focal_max_all_masked_stays_masked() {
        let mut r = grid(3, 100.0);
        for row in 0..3 {
            for col in 0..3 {
                r.set(row, col, f64::NAN).unwrap();
            }
        }

        let out = focal_max(&r, 150.0).unwrap();
        assert!(out.get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn test_focal_max_negative_radius_rejected() {
        let r = grid(3, 100.0);
        assert!(focal_max(&r, -1.0).is_err());
    }
}
