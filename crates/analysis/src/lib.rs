//! # nbspot Analysis
//!
//! The multi-hazard NbS (nature-based solution) hotspot prioritization
//! pipeline.
//!
//! Stages, leaves first:
//!
//! - **algebra** / **focal** / **stats**: masked raster algebra, focal
//!   maximum, and region-constrained reducers
//! - **terrain**: slope and aspect from a DEM
//! - **rasterize**: painting vector features onto raster grids
//! - **units**: functional landscape units (floodplain, hillslope,
//!   forest/non-forest)
//! - **mitigation**: land-cover mitigation scoring with terrain adjustment
//! - **hazard**: adaptive hazard-count normalization
//! - **priority**: hazard-gap coupling and demand/supply scores
//! - **hotspot**: adaptive percentile hotspot selection
//! - **basin**: basin-level aggregation and joint-gate selection

pub mod algebra;
pub mod basin;
pub mod focal;
pub mod hazard;
pub mod hotspot;
mod maybe_rayon;
pub mod mitigation;
pub mod priority;
pub mod rasterize;
pub mod stats;
pub mod terrain;
pub mod units;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::basin::{score_basins, select_basins, BasinScore, GateParams, Intervention};
    pub use crate::hazard::{normalize, NormalizeParams};
    pub use crate::hotspot::{select, HotspotParams};
    pub use crate::mitigation::{base_score, score, Hazard, TerrainLayers};
    pub use crate::priority::{
        mitigation_gap, normalize_mitigation, priority, unit_layers, CouplingParams, UnitLayers,
    };
    pub use crate::stats::{positive_percentile, PercentileValue, ReduceParams};
    pub use crate::terrain::{aspect, slope, SlopeParams};
    pub use crate::units::{build_units, FunctionalUnits, UnitParams};
    pub use nbspot_core::prelude::*;
}
