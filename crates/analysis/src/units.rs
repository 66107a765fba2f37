//! Functional landscape units
//!
//! Derives the disjoint spatial partitions the coupling stage works over:
//! a floodplain corridor buffered from the stream network, hillslopes
//! (steep ground outside the floodplain), and the forest/non-forest split
//! of the land cover.

use crate::algebra::{self, MASK_NODATA};
use crate::maybe_rayon::*;
use crate::rasterize;
use nbspot_core::raster::Raster;
use nbspot_core::vector::FeatureCollection;
use nbspot_core::{Error, Result};
use ndarray::Array2;

/// Parameters for functional unit derivation
#[derive(Debug, Clone)]
pub struct UnitParams {
    /// Minimum slope for hillslope membership, in degrees
    pub slope_threshold_deg: f64,
    /// Land-cover codes treated as forest
    pub forest_codes: Vec<i32>,
    /// Stream attribute carrying the stream order
    pub order_attribute: String,
}

impl Default for UnitParams {
    fn default() -> Self {
        Self {
            slope_threshold_deg: 8.0,
            forest_codes: vec![311, 312, 313],
            order_attribute: "ORD_FLOW".to_string(),
        }
    }
}

/// The four unit masks consumed by coupling and aggregation
#[derive(Debug, Clone)]
pub struct FunctionalUnits {
    pub floodplain: Raster<u8>,
    pub hillslope: Raster<u8>,
    pub forest: Raster<u8>,
    pub non_forest: Raster<u8>,
}

/// Buffer distance (map units) for a given stream order.
///
/// Step function: larger rivers carry a wider floodplain corridor.
pub fn buffer_for_order(order: f64) -> f64 {
    if order >= 7.0 {
        150.0
    } else if order >= 6.0 {
        120.0
    } else if order >= 5.0 {
        90.0
    } else if order >= 4.0 {
        60.0
    } else if order >= 3.0 {
        40.0
    } else {
        25.0
    }
}

/// Rasterize the floodplain corridor: the union of per-stream buffers,
/// each sized by the stream's order attribute.
///
/// An empty stream collection yields an all-false mask, not an error.
/// Streams without the order attribute get the minimum buffer.
pub fn floodplain_mask(
    streams: &FeatureCollection,
    template: &Raster<f64>,
    params: &UnitParams,
) -> Result<Raster<u8>> {
    let (rows, cols) = template.shape();
    let mut mask = template.with_same_meta::<u8>(rows, cols);

    for feature in streams.iter() {
        let Some(geom) = feature.geometry.as_ref() else {
            continue;
        };
        let order = feature.f64_or(&params.order_attribute, 0.0);
        rasterize::paint_line_buffer(&mut mask, geom, buffer_for_order(order))?;
    }

    Ok(mask)
}

/// Hillslope mask: slope at or above the threshold, outside the floodplain.
///
/// The floodplain is unmasked to false before the conjunction, so a cell
/// with no floodplain data can still be a hillslope. Missing slope stays
/// missing.
pub fn hillslope_mask(
    slope: &Raster<f64>,
    floodplain: &Raster<u8>,
    threshold_deg: f64,
) -> Result<Raster<u8>> {
    if slope.shape() != floodplain.shape() {
        return Err(Error::SizeMismatch {
            er: slope.rows(),
            ec: slope.cols(),
            ar: floodplain.rows(),
            ac: floodplain.cols(),
        });
    }

    let (rows, cols) = slope.shape();

    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![MASK_NODATA; cols];
            for col in 0..cols {
                let s = unsafe { slope.get_unchecked(row, col) };
                if s.is_nan() {
                    continue;
                }
                let fp = unsafe { floodplain.get_unchecked(row, col) };
                let in_floodplain = fp == 1;
                row_data[col] = u8::from(s >= threshold_deg && !in_floodplain);
            }
            row_data
        })
        .collect();

    let mut output = slope.with_same_meta::<u8>(rows, cols);
    output.set_nodata(Some(MASK_NODATA));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

/// Forest / non-forest partition by exact land-cover code membership
pub fn forest_masks(
    landcover: &Raster<i32>,
    forest_codes: &[i32],
) -> Result<(Raster<u8>, Raster<u8>)> {
    let forest = algebra::code_mask(landcover, forest_codes)?;
    let non_forest = algebra::mask_not(&forest)?;
    Ok((forest, non_forest))
}

/// Build all four functional unit masks on the slope raster's grid
pub fn build_units(
    streams: &FeatureCollection,
    slope: &Raster<f64>,
    landcover: &Raster<i32>,
    params: &UnitParams,
) -> Result<FunctionalUnits> {
    let floodplain = floodplain_mask(streams, slope, params)?;
    let hillslope = hillslope_mask(slope, &floodplain, params.slope_threshold_deg)?;
    let (forest, non_forest) = forest_masks(landcover, &params.forest_codes)?;

    Ok(FunctionalUnits {
        floodplain,
        hillslope,
        forest,
        non_forest,
    })
}
