//! Land-cover mitigation scoring
//!
//! Maps land-cover classes to per-hazard mitigation coefficients through
//! hand-authored lookup tables, then adjusts the base score by terrain:
//! slope favoring flat or steep ground depending on the hazard, aspect
//! (northness/eastness) for the heat-driven hazards, and a three-zone
//! elevation multiplier. The adjusted score is deliberately unclamped;
//! the coupling stage renormalizes it.

use crate::algebra;
use crate::maybe_rayon::*;
use nbspot_core::raster::Raster;
use nbspot_core::{Error, Result};
use ndarray::Array2;

/// Hazard kinds scored by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hazard {
    Flood,
    Fire,
    Drought,
    Heatwave,
    Erosion,
}

impl Hazard {
    pub const ALL: [Hazard; 5] = [
        Hazard::Flood,
        Hazard::Fire,
        Hazard::Drought,
        Hazard::Heatwave,
        Hazard::Erosion,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Hazard::Flood => "flood",
            Hazard::Fire => "fire",
            Hazard::Drought => "drought",
            Hazard::Heatwave => "heatwave",
            Hazard::Erosion => "erosion",
        }
    }
}

/// Flood mitigation coefficients by CORINE code
pub const FLOOD_MITIGATION: &[(i32, f64)] = &[
    (411, 0.95), // Inland marshes
    (412, 0.95), // Peat bogs
    (421, 0.75), // Salt marshes
    (311, 0.75), // Broad-leaved forest
    (312, 0.6),  // Coniferous forest
    (213, 0.4),  // Rice fields
    (244, 0.6),  // Agroforestry
    (321, 0.6),  // Natural grasslands
    (323, 0.75), // Sclerophyllous vegetation
    (324, 0.4),  // Transitional woodland/shrub
    (523, 0.9),  // Estuaries
    (521, 0.75), // Coastal lagoons
    (511, 0.4),  // Water courses
    (141, 0.2),  // Green urban areas
    (112, 0.1),  // Discontinuous urban fabric
];

/// Fire mitigation coefficients by CORINE code
pub const FIRE_MITIGATION: &[(i32, f64)] = &[
    (231, 0.4), // Pastures
    (241, 0.3), // Annual crops
    (243, 0.4), // Mosaic vegetation
    (311, 0.2), // Broad-leaved forest
    (322, 0.5), // Heathland
    (324, 0.3), // Transitional woodland/shrub
    (411, 0.8), // Inland marshes
    (512, 0.9), // Lakes
    (141, 0.3), // Green urban areas
    (112, 0.2), // Discontinuous urban fabric
];

/// Drought mitigation coefficients by CORINE code
pub const DROUGHT_MITIGATION: &[(i32, f64)] = &[
    (411, 0.95), // Inland marshes
    (412, 0.95), // Peat bogs
    (311, 0.8),  // Broad-leaved forest
    (312, 0.7),  // Coniferous forest
    (321, 0.6),  // Natural grasslands
    (241, 0.75), // Agroforestry
    (211, 0.2),  // Arable land
    (142, 0.05), // Sports/leisure
    (521, 0.7),  // Coastal lagoons
];

/// Heatwave mitigation coefficients by CORINE code
pub const HEATWAVE_MITIGATION: &[(i32, f64)] = &[
    (311, 0.9),  // Broad-leaved forest, strong cooling
    (312, 0.8),  // Coniferous forest
    (313, 0.85), // Mixed forest
    (141, 0.6),  // Green urban areas, partial buffering
    (142, 0.5),  // Sports/leisure
    (112, 0.3),  // Discontinuous urban fabric
    (243, 0.4),  // Mosaic vegetation
    (321, 0.65), // Natural grasslands
    (324, 0.5),  // Transitional woodland/shrub
    (322, 0.4),  // Heathland
    (512, 0.8),  // Lakes, evaporative cooling
    (411, 0.7),  // Inland marshes
];

/// Erosion mitigation coefficients by CORINE code
pub const EROSION_MITIGATION: &[(i32, f64)] = &[
    (244, 0.6),  // Agroforestry, soil holding
    (321, 0.6),  // Natural grasslands, cover vegetation
    (323, 0.75), // Sclerophyllous, deep root systems
    (324, 0.4),  // Transitional woodland/shrub
    (211, 0.2),  // Arable land, exposed soils
    (243, 0.5),  // Mosaic crops/natural
    (222, 0.25), // Permanently irrigated
    (231, 0.3),  // Pastures
    (312, 0.5),  // Coniferous forest
    (311, 0.6),  // Broad-leaved forest
    (313, 0.55), // Mixed forest
];

/// The mitigation table for a hazard
pub fn mitigation_table(hazard: Hazard) -> &'static [(i32, f64)] {
    match hazard {
        Hazard::Flood => FLOOD_MITIGATION,
        Hazard::Fire => FIRE_MITIGATION,
        Hazard::Drought => DROUGHT_MITIGATION,
        Hazard::Heatwave => HEATWAVE_MITIGATION,
        Hazard::Erosion => EROSION_MITIGATION,
    }
}

/// Slope is normalized against this angle before the slope factors apply
pub const SLOPE_NORM_DEGREES: f64 = 60.0;
/// Elevation zone boundaries; the >= branch wins at each boundary
pub const MIDLAND_MIN: f64 = 300.0;
pub const UPLAND_MIN: f64 = 800.0;

/// Terrain rasters feeding the adjustment
#[derive(Debug, Clone, Copy)]
pub struct TerrainLayers<'a> {
    /// Slope in degrees
    pub slope: &'a Raster<f64>,
    /// Aspect in degrees from north; `ASPECT_NODATA` for flat cells
    pub aspect: &'a Raster<f64>,
    /// Elevation in map vertical units
    pub elevation: &'a Raster<f64>,
}

struct ZoneWeights {
    lowland: f64,
    midland: f64,
    upland: f64,
}

fn zone_weights(hazard: Hazard) -> ZoneWeights {
    match hazard {
        // Flood mitigation is worth more in lowlands, less in uplands
        Hazard::Flood => ZoneWeights {
            lowland: 1.1,
            midland: 1.0,
            upland: 0.8,
        },
        // Erosion control is more valuable upslope
        Hazard::Erosion => ZoneWeights {
            lowland: 0.9,
            midland: 1.0,
            upland: 1.2,
        },
        Hazard::Fire => ZoneWeights {
            lowland: 0.95,
            midland: 1.05,
            upland: 1.1,
        },
        Hazard::Drought => ZoneWeights {
            lowland: 0.9,
            midland: 1.05,
            upland: 1.1,
        },
        Hazard::Heatwave => ZoneWeights {
            lowland: 1.05,
            midland: 1.05,
            upland: 1.0,
        },
    }
}

fn zone_weight(hazard: Hazard, elevation: f64) -> f64 {
    let w = zone_weights(hazard);
    if elevation < MIDLAND_MIN {
        w.lowland
    } else if elevation < UPLAND_MIN {
        w.midland
    } else {
        w.upland
    }
}

/// Base mitigation score: remap land-cover codes through the hazard table.
///
/// Codes absent from the table become masked cells, never zero.
pub fn base_score(landcover: &Raster<i32>, hazard: Hazard) -> Result<Raster<f64>> {
    algebra::remap(landcover, mitigation_table(hazard))
}

/// Apply the terrain adjustment to a base mitigation score.
///
/// Per hazard:
/// - flood:    (1 − 0.5·slopeNorm) · zone
/// - erosion:  (1 + 0.5·slopeNorm) · zone
/// - fire:     (1 − 0.2·slopeNorm) · (1 + 0.1·northness) · zone
/// - drought:  (1 + 0.1·northness) · zone
/// - heatwave: (1 + 0.05·northness) · (1 + 0.05·eastness) · zone
///
/// Northness/eastness are cos/sin of aspect rescaled from [−1,1] to [0,1].
/// Cells with the flat-aspect sentinel skip the aspect factors. Masked
/// base, elevation, or (where consulted) slope cells stay masked.
pub fn adjust_score(
    base: &Raster<f64>,
    hazard: Hazard,
    terrain: TerrainLayers<'_>,
) -> Result<Raster<f64>> {
    for layer in [terrain.slope, terrain.aspect, terrain.elevation] {
        if base.shape() != layer.shape() {
            return Err(Error::SizeMismatch {
                er: base.rows(),
                ec: base.cols(),
                ar: layer.rows(),
                ac: layer.cols(),
            });
        }
    }

    let (rows, cols) = base.shape();
    let uses_slope = matches!(hazard, Hazard::Flood | Hazard::Erosion | Hazard::Fire);

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];

            for col in 0..cols {
                let b = unsafe { base.get_unchecked(row, col) };
                if b.is_nan() {
                    continue;
                }

                let elev = unsafe { terrain.elevation.get_unchecked(row, col) };
                if elev.is_nan() {
                    continue;
                }

                let slope_norm = if uses_slope {
                    let s = unsafe { terrain.slope.get_unchecked(row, col) };
                    if s.is_nan() {
                        continue;
                    }
                    (s / SLOPE_NORM_DEGREES).clamp(0.0, 1.0)
                } else {
                    0.0
                };

                let a = unsafe { terrain.aspect.get_unchecked(row, col) };
                let (northness, eastness) = if a.is_nan() || a < 0.0 {
                    // Flat or undefined aspect: neutral factors
                    (None, None)
                } else {
                    let rad = a.to_radians();
                    (Some((rad.cos() + 1.0) / 2.0), Some((rad.sin() + 1.0) / 2.0))
                };

                let zone = zone_weight(hazard, elev);

                let factor = match hazard {
                    Hazard::Flood => (1.0 - 0.5 * slope_norm) * zone,
                    Hazard::Erosion => (1.0 + 0.5 * slope_norm) * zone,
                    Hazard::Fire => {
                        let north = northness.map_or(1.0, |n| 1.0 + 0.1 * n);
                        (1.0 - 0.2 * slope_norm) * north * zone
                    }
                    Hazard::Drought => {
                        let north = northness.map_or(1.0, |n| 1.0 + 0.1 * n);
                        north * zone
                    }
                    Hazard::Heatwave => {
                        let north = northness.map_or(1.0, |n| 1.0 + 0.05 * n);
                        let east = eastness.map_or(1.0, |e| 1.0 + 0.05 * e);
                        north * east * zone
                    }
                };

                row_data[col] = b * factor;
            }

            row_data
        })
        .collect();

    let mut output = base.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

/// Base score plus terrain adjustment in one call
pub fn score(
    landcover: &Raster<i32>,
    hazard: Hazard,
    terrain: TerrainLayers<'_>,
) -> Result<Raster<f64>> {
    let base = base_score(landcover, hazard)?;
    adjust_score(&base, hazard, terrain)
}
