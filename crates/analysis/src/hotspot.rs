//! Adaptive hotspot selection
//!
//! Thresholds a priority/opportunity surface at a percentile computed from
//! the surface itself (positive cells only), so "hotspot" always means
//! "high for this region, this run" rather than an absolute cutoff.
//! Degenerate surfaces resolve the threshold to the caller's fallback.

use crate::algebra;
use crate::stats::{self, ReduceParams};
use nbspot_core::raster::Raster;
use nbspot_core::Result;

/// Default percentile for flood priority hotspots (keeps the top 40%)
pub const FLOOD_PRIORITY_PERCENTILE: f64 = 60.0;
/// Default percentile for fire priority hotspots (keeps the top 20%)
pub const FIRE_PRIORITY_PERCENTILE: f64 = 80.0;
/// Default percentile for functional-unit opportunity hotspots
pub const OPPORTUNITY_PERCENTILE: f64 = 80.0;
/// Default threshold when a priority surface has no positive cells
pub const PRIORITY_FALLBACK: f64 = 0.2;

/// Default joint-gate percentile for flood protect/enhance zones
pub const PROTECT_GATE_FLOOD_PERCENTILE: f64 = 55.0;
/// Default joint-gate percentile for fire protect/enhance zones
pub const PROTECT_GATE_FIRE_PERCENTILE: f64 = 70.0;
/// Default gate value when a layer has no positive cells
pub const PROTECT_GATE_FALLBACK: f64 = 0.6;

/// Parameters for hotspot selection
#[derive(Debug, Clone)]
pub struct HotspotParams {
    /// Positive-only percentile defining the threshold
    pub percentile: f64,
    /// Threshold when no positive cell exists
    pub fallback_threshold: f64,
    /// Region reduction hints
    pub reduce: ReduceParams,
}

impl Default for HotspotParams {
    fn default() -> Self {
        Self {
            percentile: OPPORTUNITY_PERCENTILE,
            fallback_threshold: PRIORITY_FALLBACK,
            reduce: ReduceParams::default(),
        }
    }
}

/// Resolve the hotspot threshold for a score surface
pub fn threshold(
    score: &Raster<f64>,
    region: Option<&Raster<u8>>,
    params: &HotspotParams,
) -> Result<f64> {
    stats::positive_percentile(
        score,
        params.percentile,
        region,
        params.reduce,
        params.fallback_threshold,
    )
}

/// Select hotspots: cells with `score >= threshold`.
///
/// Masked score cells stay masked in the output; with a positive fallback
/// an all-zero surface yields an empty (all-false) hotspot set.
pub fn select(
    score: &Raster<f64>,
    region: Option<&Raster<u8>>,
    params: &HotspotParams,
) -> Result<Raster<u8>> {
    let th = threshold(score, region, params)?;
    algebra::ge_mask(score, th)
}

/// Parameters for joint protect/enhance gating
#[derive(Debug, Clone)]
pub struct JointGateParams {
    /// Percentile gate on the hazard layer
    pub hazard_percentile: f64,
    /// Percentile gate on the mitigation layer
    pub mitigation_percentile: f64,
    /// Gate value when a layer has no positive cells
    pub fallback: f64,
    /// Region reduction hints
    pub reduce: ReduceParams,
}

impl Default for JointGateParams {
    fn default() -> Self {
        Self {
            hazard_percentile: PROTECT_GATE_FLOOD_PERCENTILE,
            mitigation_percentile: PROTECT_GATE_FLOOD_PERCENTILE,
            fallback: PROTECT_GATE_FALLBACK,
            reduce: ReduceParams::default(),
        }
    }
}

/// Protect/enhance zones: hazard and mitigation both above their adaptive
/// gates — places where the hazard matters and nature is already working.
pub fn protect_zone(
    hazard: &Raster<f64>,
    mitigation: &Raster<f64>,
    region: Option<&Raster<u8>>,
    params: &JointGateParams,
) -> Result<Raster<u8>> {
    let haz_gate = stats::positive_percentile(
        hazard,
        params.hazard_percentile,
        region,
        params.reduce,
        params.fallback,
    )?;
    let mit_gate = stats::positive_percentile(
        mitigation,
        params.mitigation_percentile,
        region,
        params.reduce,
        params.fallback,
    )?;

    let haz_high = algebra::ge_mask(hazard, haz_gate)?;
    let mit_high = algebra::ge_mask(mitigation, mit_gate)?;
    algebra::mask_and(&haz_high, &mit_high)
}
