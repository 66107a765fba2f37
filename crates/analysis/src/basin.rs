//! Basin-level aggregation and selection
//!
//! Rolls the pixel layers up to hydrological basin polygons: per-basin
//! means of demand, supply under two regimes, and floodplain storage,
//! coupled into protect/restore priorities. Basins qualify as hotspots
//! when every statistic clears its percentile gate; when none do, a
//! deterministic top-N ranking guarantees a non-empty, explainable result
//! for small or data-sparse study areas.

use crate::priority::UnitLayers;
use crate::rasterize;
use crate::stats::{self, ReduceParams};
use geo::Area;
use nbspot_core::raster::Raster;
use nbspot_core::vector::FeatureCollection;
use nbspot_core::Result;
use serde::Serialize;

/// Scalar aggregates for one basin. Created by `score_basins`, never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct BasinScore {
    /// Position of the basin in the input collection
    pub index: usize,
    /// Feature ID when the source carried one
    pub id: Option<String>,
    /// Mean flood hazard inside the basin's floodplain
    pub demand_floodplain: f64,
    /// Mean mitigation on forested hillslopes
    pub supply_forest: f64,
    /// Mean mitigation on non-forested hillslopes
    pub supply_potential: f64,
    /// Mean floodplain attenuation capacity
    pub floodplain_storage: f64,
    /// demand × forest supply
    pub priority_protect: f64,
    /// demand × potential supply
    pub priority_restore: f64,
    /// Basin area in km²
    pub area_km2: f64,
}

/// Intervention type driving basin selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intervention {
    /// Protect/enhance existing forest supply
    Protect,
    /// Restore/reforest potential supply
    Restore,
}

/// Parameters for joint basin gating
#[derive(Debug, Clone)]
pub struct GateParams {
    /// Percentile applied independently to each gated statistic
    pub percentile: f64,
    /// Fallback size when no basin clears every gate
    pub top_n: usize,
    /// Region reduction hints for the per-basin means
    pub reduce: ReduceParams,
}

impl Default for GateParams {
    fn default() -> Self {
        Self {
            percentile: 80.0,
            top_n: 5,
            reduce: ReduceParams::default(),
        }
    }
}

fn basin_area_km2(geom: &geo_types::Geometry<f64>) -> f64 {
    match geom {
        geo_types::Geometry::Polygon(p) => p.unsigned_area() / 1e6,
        geo_types::Geometry::MultiPolygon(mp) => mp.unsigned_area() / 1e6,
        geo_types::Geometry::Rect(r) => r.unsigned_area() / 1e6,
        _ => 0.0,
    }
}

/// Score every basin polygon against the unit layers.
///
/// Each reduction that comes back empty (a basin with no floodplain, no
/// hillslope forest, ...) coalesces to zero rather than erroring, so every
/// areal basin produces a complete record. Features without areal geometry
/// are skipped.
pub fn score_basins(
    basins: &FeatureCollection,
    layers: &UnitLayers,
    reduce: ReduceParams,
) -> Result<Vec<BasinScore>> {
    let mut scores = Vec::with_capacity(basins.len());

    for (index, feature) in basins.iter().enumerate() {
        let Some(geom) = feature.geometry.as_ref() else {
            continue;
        };
        let area_km2 = basin_area_km2(geom);
        if area_km2 == 0.0 {
            continue;
        }

        let region = rasterize::polygon_mask(&layers.demand_floodplain, geom)?;

        let demand_floodplain =
            stats::region_mean(&layers.demand_floodplain, Some(&region), reduce)?.unwrap_or(0.0);
        let supply_forest =
            stats::region_mean(&layers.supply_forest, Some(&region), reduce)?.unwrap_or(0.0);
        let supply_potential =
            stats::region_mean(&layers.supply_potential, Some(&region), reduce)?.unwrap_or(0.0);
        let floodplain_storage =
            stats::region_mean(&layers.floodplain_storage, Some(&region), reduce)?.unwrap_or(0.0);

        scores.push(BasinScore {
            index,
            id: feature.id.clone(),
            demand_floodplain,
            supply_forest,
            supply_potential,
            floodplain_storage,
            priority_protect: demand_floodplain * supply_forest,
            priority_restore: demand_floodplain * supply_potential,
            area_km2,
        });
    }

    Ok(scores)
}

fn gated_fields(score: &BasinScore, intervention: Intervention) -> [f64; 3] {
    match intervention {
        Intervention::Protect => [
            score.demand_floodplain,
            score.supply_forest,
            score.floodplain_storage,
        ],
        Intervention::Restore => [
            score.demand_floodplain,
            score.supply_potential,
            score.floodplain_storage,
        ],
    }
}

fn rank_field(score: &BasinScore, intervention: Intervention) -> f64 {
    match intervention {
        Intervention::Protect => score.priority_protect,
        Intervention::Restore => score.priority_restore,
    }
}

/// Select hotspot basins for an intervention.
///
/// A basin qualifies when every gated statistic is at or above the
/// percentile of that statistic across all basins. When no basin
/// qualifies, the top `top_n` basins by the intervention's priority field
/// are returned instead, in descending order with ties kept in input
/// order, so the result is never empty for a non-empty study area.
pub fn select_basins(
    scores: &[BasinScore],
    intervention: Intervention,
    params: &GateParams,
) -> Vec<BasinScore> {
    if scores.is_empty() {
        return Vec::new();
    }

    // Gates follow the positive-only defensive pattern: a statistic with no
    // positive value across basins yields an unsatisfiable gate, pushing
    // the selection onto the deterministic fallback below
    let gates: Vec<f64> = (0..3)
        .map(|i| {
            let values: Vec<f64> = scores
                .iter()
                .map(|s| gated_fields(s, intervention)[i])
                .filter(|&v| v > 0.0)
                .collect();
            stats::percentile_of_slice(&values, params.percentile).unwrap_or(f64::INFINITY)
        })
        .collect();

    let qualifying: Vec<BasinScore> = scores
        .iter()
        .filter(|s| {
            gated_fields(s, intervention)
                .iter()
                .zip(&gates)
                .all(|(v, g)| v >= g)
        })
        .cloned()
        .collect();

    if !qualifying.is_empty() {
        return qualifying;
    }

    // Deterministic fallback: stable sort keeps input order on ties
    let mut ranked: Vec<BasinScore> = scores.to_vec();
    ranked.sort_by(|a, b| {
        rank_field(b, intervention)
            .partial_cmp(&rank_field(a, intervention))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(params.top_n.min(scores.len()));
    ranked
}

/// Paint a per-basin statistic back onto the pixel grid.
///
/// Cells outside every basin stay masked; overlapping basins resolve to
/// the last one painted.
pub fn paint_statistic<F>(
    basins: &FeatureCollection,
    scores: &[BasinScore],
    template: &Raster<f64>,
    field: F,
) -> Result<Raster<f64>>
where
    F: Fn(&BasinScore) -> f64,
{
    let mut out = template.like(f64::NAN);
    out.set_nodata(Some(f64::NAN));

    for score in scores {
        let Some(feature) = basins.features.get(score.index) else {
            continue;
        };
        let Some(geom) = feature.geometry.as_ref() else {
            continue;
        };
        rasterize::paint_polygon_value(&mut out, geom, field(score))?;
    }

    Ok(out)
}
