//! Hazard count normalization
//!
//! Turns raw event-count rasters (flood detections, burned months) into
//! unit-scaled intensity layers. The normalization constant is adaptive:
//! a high percentile of the strictly-positive counts over the region, so
//! a handful of extreme cells cannot flatten everything else. Sparse or
//! empty regions degrade through two fallback tiers instead of failing:
//! percentile → region maximum (floored at 1) → caller-supplied constant.

use crate::algebra;
use crate::stats::{self, ReduceParams};
use nbspot_core::raster::Raster;
use nbspot_core::Result;

/// Parameters for hazard normalization
#[derive(Debug, Clone)]
pub struct NormalizeParams {
    /// Percentile of positive cells used as the normalization constant
    pub percentile: f64,
    /// Region reduction hints
    pub reduce: ReduceParams,
    /// Normalization constant when no positive cell exists; defaults to
    /// the region maximum floored at 1
    pub fallback: Option<f64>,
}

impl Default for NormalizeParams {
    fn default() -> Self {
        Self {
            percentile: 90.0,
            reduce: ReduceParams::default(),
            fallback: None,
        }
    }
}

/// Normalize a non-negative count raster into [0, 1].
///
/// Steps:
/// 1. Region maximum, floored at 1, as the safety floor.
/// 2. Percentile of strictly-positive cells at `params.percentile`.
/// 3. Empty positive set → `params.fallback`, or the floor when none given.
/// 4. Divide by the resolved constant and clamp to [0, 1].
///
/// An all-zero region therefore normalizes to all zeros, and no input can
/// produce a division by zero. Masked cells stay masked.
pub fn normalize(
    counts: &Raster<f64>,
    region: Option<&Raster<u8>>,
    params: &NormalizeParams,
) -> Result<Raster<f64>> {
    let floor = stats::region_max(counts, region, params.reduce)?
        .unwrap_or(0.0)
        .max(1.0);
    let fallback = params.fallback.unwrap_or(floor);

    let mut denom =
        stats::positive_percentile(counts, params.percentile, region, params.reduce, fallback)?;
    if !denom.is_finite() || denom <= 0.0 {
        // A zero or negative constant would invert the defensive intent;
        // the floor is always >= 1
        denom = floor;
    }

    algebra::map(counts, |v| (v / denom).clamp(0.0, 1.0))
}
