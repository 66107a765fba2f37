//! Hazard–mitigation coupling
//!
//! Combines normalized hazard intensity with mitigation capacity into
//! priority surfaces: `priority = hazard × (1 − mitigation)`, plus the
//! functional-unit coupling of demand (hazard where it matters) against
//! supply (mitigation where it can act).
//!
//! Floodplain demand is spatially diffused onto hillslopes with a focal
//! maximum before coupling. This is intentional, not a smoothing artifact:
//! hillslope intervention value is driven by downstream floodplain risk
//! within a catchment-scale radius, and without the spread the product
//! would be empty wherever the two units are disjoint.

use crate::algebra;
use crate::focal;
use crate::units::FunctionalUnits;
use nbspot_core::raster::Raster;
use nbspot_core::Result;

/// Adjusted mitigation scores are normalized against this cap before the
/// gap is taken
pub const MITIGATION_CAP: f64 = 1.5;

/// Parameters for demand/supply coupling
#[derive(Debug, Clone)]
pub struct CouplingParams {
    /// Radius (map units) over which floodplain demand reaches hillslopes
    pub diffusion_radius: f64,
}

impl Default for CouplingParams {
    fn default() -> Self {
        Self {
            diffusion_radius: 1500.0,
        }
    }
}

/// Clamp-normalize an adjusted mitigation score into [0, 1]
pub fn normalize_mitigation(adjusted: &Raster<f64>) -> Result<Raster<f64>> {
    algebra::map(adjusted, |v| (v / MITIGATION_CAP).clamp(0.0, 1.0))
}

/// Mitigation gap: the protection that is missing, `1 − mitigation`
pub fn mitigation_gap(mitigation: &Raster<f64>) -> Result<Raster<f64>> {
    algebra::map(mitigation, |v| 1.0 - v)
}

/// Priority surface: hazard intensity where the gap is large
pub fn priority(hazard: &Raster<f64>, gap: &Raster<f64>) -> Result<Raster<f64>> {
    algebra::multiply(hazard, gap)
}

/// Demand and supply layers restricted to their functional units
#[derive(Debug, Clone)]
pub struct UnitLayers {
    /// Existing regulation: mitigation on forested hillslopes
    pub supply_forest: Raster<f64>,
    /// Potential regulation: mitigation on non-forested hillslopes
    pub supply_potential: Raster<f64>,
    /// Floodplain attenuation capacity
    pub floodplain_storage: Raster<f64>,
    /// Hazard intensity inside the floodplain
    pub demand_floodplain: Raster<f64>,
}

/// Restrict mitigation and hazard layers to their functional units
pub fn unit_layers(
    mitigation_adj: &Raster<f64>,
    hazard_norm: &Raster<f64>,
    units: &FunctionalUnits,
) -> Result<UnitLayers> {
    let on_forest = algebra::mask_where(mitigation_adj, &units.forest)?;
    let on_non_forest = algebra::mask_where(mitigation_adj, &units.non_forest)?;

    Ok(UnitLayers {
        supply_forest: algebra::mask_where(&on_forest, &units.hillslope)?,
        supply_potential: algebra::mask_where(&on_non_forest, &units.hillslope)?,
        floodplain_storage: algebra::mask_where(mitigation_adj, &units.floodplain)?,
        demand_floodplain: algebra::mask_where(hazard_norm, &units.floodplain)?,
    })
}

/// Coupled priority surfaces per intervention type
#[derive(Debug, Clone)]
pub struct CoupledScores {
    /// Keep/protect/enhance existing forest on hillslopes
    pub protect: Raster<f64>,
    /// Restore/reforest hillslopes with potential
    pub restore: Raster<f64>,
    /// Retain floodplain storage
    pub retain: Raster<f64>,
}

/// Couple demand against supply per functional unit.
///
/// Demand is unmasked to zero and spread by focal maximum before the
/// hillslope products, so hillslopes within `diffusion_radius` of a risky
/// floodplain see that risk.
pub fn couple(layers: &UnitLayers, params: &CouplingParams) -> Result<CoupledScores> {
    let demand_filled = algebra::unmask(&layers.demand_floodplain, 0.0)?;
    let demand_hills = focal::focal_max(&demand_filled, params.diffusion_radius)?;

    Ok(CoupledScores {
        protect: algebra::multiply(&layers.supply_forest, &demand_hills)?,
        restore: algebra::multiply(&layers.supply_potential, &demand_hills)?,
        retain: algebra::multiply(&layers.floodplain_storage, &demand_filled)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::MASK_NODATA;
    use approx::assert_relative_eq;
    use nbspot_core::GeoTransform;

    fn layer(fill: f64, size: usize, cell: f64) -> Raster<f64> {
        let mut r = Raster::filled(size, size, fill);
        r.set_transform(GeoTransform::new(0.0, size as f64 * cell, cell, -cell));
        r.set_nodata(Some(f64::NAN));
        r
    }

    fn mask_from(template: &Raster<f64>, ones: &[(usize, usize)]) -> Raster<u8> {
        let (rows, cols) = template.shape();
        let mut m = template.with_same_meta::<u8>(rows, cols);
        m.set_nodata(Some(MASK_NODATA));
        for &(r, c) in ones {
            m.set(r, c, 1).unwrap();
        }
        m
    }

    #[test]
    fn test_mitigation_normalization_caps_at_one() {
        let adj = layer(1.8, 3, 100.0);
        let mit = normalize_mitigation(&adj).unwrap();
        assert_relative_eq!(mit.get(1, 1).unwrap(), 1.0, epsilon = 1e-12);

        let adj = layer(0.75, 3, 100.0);
        let mit = normalize_mitigation(&adj).unwrap();
        assert_relative_eq!(mit.get(1, 1).unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_gap_is_complement() {
        let mit = layer(0.3, 3, 100.0);
        let gap = mitigation_gap(&mit).unwrap();
        assert_relative_eq!(gap.get(0, 0).unwrap(), 0.7, epsilon = 1e-12);
    }

    #[test]
    fn test_priority_zero_when_hazard_zero() {
        let haz = layer(0.0, 3, 100.0);
        let gap = layer(1.0, 3, 100.0);
        let prio = priority(&haz, &gap).unwrap();
        assert_eq!(prio.get(1, 1).unwrap(), 0.0);
    }

    #[test]
    fn test_diffusion_bridges_disjoint_units() {
        // Demand lives in a floodplain row, supply on a hillslope row two
        // cells away; without diffusion their product would be empty
        let size = 9;
        let cell = 100.0;
        let adj = layer(0.9, size, cell);
        let haz = layer(0.8, size, cell);

        let floodplain = mask_from(&adj, &[(4, 0), (4, 1), (4, 2), (4, 3), (4, 4)]);
        let hillslope = mask_from(&adj, &[(6, 0), (6, 1), (6, 2), (6, 3), (6, 4)]);
        let forest = {
            let (rows, cols) = adj.shape();
            let mut m = adj.with_same_meta::<u8>(rows, cols);
            for r in 0..rows {
                for c in 0..cols {
                    m.set(r, c, 1).unwrap();
                }
            }
            m
        };
        let non_forest = crate::algebra::mask_not(&forest).unwrap();

        let units = FunctionalUnits {
            floodplain,
            hillslope,
            forest,
            non_forest,
        };

        let layers = unit_layers(&adj, &haz, &units).unwrap();

        // Undiffused product: supply and demand never share a cell
        let direct =
            crate::algebra::multiply(&layers.supply_forest, &layers.demand_floodplain).unwrap();
        assert_eq!(direct.valid_count(), 0);

        // 250 m reach covers the two-cell separation
        let scores = couple(
            &layers,
            &CouplingParams {
                diffusion_radius: 250.0,
            },
        )
        .unwrap();
        assert!(scores.protect.valid_count() > 0);
        assert_relative_eq!(scores.protect.get(6, 2).unwrap(), 0.9 * 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_retain_couples_in_place() {
        let size = 5;
        let adj = layer(0.6, size, 100.0);
        let haz = layer(0.5, size, 100.0);

        let floodplain = mask_from(&adj, &[(2, 2)]);
        let hillslope = mask_from(&adj, &[]);
        let forest = mask_from(&adj, &[]);
        let non_forest = crate::algebra::mask_not(&forest).unwrap();

        let units = FunctionalUnits {
            floodplain,
            hillslope,
            forest,
            non_forest,
        };
        let layers = unit_layers(&adj, &haz, &units).unwrap();
        let scores = couple(&layers, &CouplingParams::default()).unwrap();

        assert_relative_eq!(scores.retain.get(2, 2).unwrap(), 0.6 * 0.5, epsilon = 1e-12);
    }
}
