//! End-to-end pipeline run over a synthetic landscape
//!
//! A 20x20 grid of 100 m cells: a west-east river in a valley, forest on
//! the western hillslopes, grassland on the eastern ones, flood history
//! concentrated along the river. The tests drive the full chain from DEM
//! and land cover to hotspot masks and basin selection.

use geo_types::{line_string, polygon, Geometry};
use nbspot_analysis::algebra;
use nbspot_analysis::basin::{self, GateParams, Intervention};
use nbspot_analysis::hazard::{self, NormalizeParams};
use nbspot_analysis::hotspot::{self, HotspotParams};
use nbspot_analysis::mitigation::{self, Hazard, TerrainLayers};
use nbspot_analysis::priority::{self, CouplingParams};
use nbspot_analysis::stats::{self, ReduceParams};
use nbspot_analysis::terrain::{aspect, slope, SlopeParams};
use nbspot_analysis::units::{self, UnitParams};
use nbspot_core::vector::{AttributeValue, Feature, FeatureCollection};
use nbspot_core::{GeoTransform, Raster};

const SIZE: usize = 20;
const CELL: f64 = 100.0;
const RIVER_ROW: usize = 10;

fn grid_transform() -> GeoTransform {
    GeoTransform::new(0.0, SIZE as f64 * CELL, CELL, -CELL)
}

/// Valley DEM: elevation rises away from the river row
fn make_dem() -> Raster<f64> {
    let mut dem = Raster::new(SIZE, SIZE);
    dem.set_transform(grid_transform());
    dem.set_nodata(Some(f64::NAN));
    for row in 0..SIZE {
        for col in 0..SIZE {
            let dist = row.abs_diff(RIVER_ROW) as f64;
            dem.set(row, col, 100.0 + dist * 60.0).unwrap();
        }
    }
    dem
}

/// Forest (311) in the west, natural grassland (321) in the east
fn make_landcover() -> Raster<i32> {
    let mut lc = Raster::new(SIZE, SIZE);
    lc.set_transform(grid_transform());
    lc.set_nodata(Some(i32::MAX));
    for row in 0..SIZE {
        for col in 0..SIZE {
            let code = if col < SIZE / 2 { 311 } else { 321 };
            lc.set(row, col, code).unwrap();
        }
    }
    lc
}

/// Flood detections along the river corridor, quiet elsewhere
fn make_flood_counts() -> Raster<f64> {
    let mut counts = Raster::new(SIZE, SIZE);
    counts.set_transform(grid_transform());
    counts.set_nodata(Some(f64::NAN));
    for row in 0..SIZE {
        for col in 0..SIZE {
            let v = match row.abs_diff(RIVER_ROW) {
                0 => 3.0,
                1 => 1.0,
                _ => 0.0,
            };
            counts.set(row, col, v).unwrap();
        }
    }
    counts
}

/// One order-7 stream along the river row
fn make_streams() -> FeatureCollection {
    let y = (SIZE - RIVER_ROW) as f64 * CELL - CELL / 2.0;
    let mut f = Feature::new(Geometry::LineString(line_string![
        (x: 0.0, y: y),
        (x: SIZE as f64 * CELL, y: y),
    ]));
    f.set_property("ORD_FLOW", AttributeValue::Float(7.0));
    let mut fc = FeatureCollection::new();
    fc.push(f);
    fc
}

/// Two basins splitting the study area west/east
fn make_basins() -> FeatureCollection {
    let extent = SIZE as f64 * CELL;
    let mut fc = FeatureCollection::new();
    for (x0, x1) in [(0.0, extent / 2.0), (extent / 2.0, extent)] {
        fc.push(Feature::new(Geometry::Polygon(polygon![
            (x: x0, y: 0.0),
            (x: x1, y: 0.0),
            (x: x1, y: extent),
            (x: x0, y: extent),
            (x: x0, y: 0.0),
        ])));
    }
    fc
}

struct World {
    slope: Raster<f64>,
    aspect: Raster<f64>,
    dem: Raster<f64>,
    landcover: Raster<i32>,
    flood_counts: Raster<f64>,
    streams: FeatureCollection,
    basins: FeatureCollection,
}

fn make_world() -> World {
    let dem = make_dem();
    let slope = slope(&dem, SlopeParams::default()).unwrap();
    let aspect = aspect(&dem).unwrap();
    World {
        slope,
        aspect,
        dem,
        landcover: make_landcover(),
        flood_counts: make_flood_counts(),
        streams: make_streams(),
        basins: make_basins(),
    }
}

#[test]
fn flood_pipeline_end_to_end() {
    let w = make_world();

    let terrain = TerrainLayers {
        slope: &w.slope,
        aspect: &w.aspect,
        elevation: &w.dem,
    };
    let adjusted = mitigation::score(&w.landcover, Hazard::Flood, terrain).unwrap();

    let haz = hazard::normalize(&w.flood_counts, None, &NormalizeParams::default()).unwrap();
    let mit = priority::normalize_mitigation(&adjusted).unwrap();
    let gap = priority::mitigation_gap(&mit).unwrap();
    let prio = priority::priority(&haz, &gap).unwrap();

    // Normalized layers stay in their unit ranges wherever valid
    for layer in [&haz, &mit, &prio] {
        for &v in layer.data().iter() {
            if !v.is_nan() {
                assert!((0.0..=1.0).contains(&v), "value out of range: {}", v);
            }
        }
    }

    // The river row carries the peak hazard
    assert_eq!(haz.get(RIVER_ROW, 5).unwrap(), 1.0);
    assert_eq!(haz.get(2, 5).unwrap(), 0.0);

    let hotspots = hotspot::select(
        &prio,
        None,
        &HotspotParams {
            percentile: hotspot::FLOOD_PRIORITY_PERCENTILE,
            fallback_threshold: hotspot::PRIORITY_FALLBACK,
            reduce: ReduceParams::default(),
        },
    )
    .unwrap();

    let hot = hotspots.data().iter().filter(|&&v| v == 1).count();
    assert!(hot > 0, "flood history along the river must yield hotspots");
    assert!(stats::masked_area_km2(&hotspots) > 0.0);

    // Hotspots concentrate where hazard is: nothing far from the river
    assert_eq!(hotspots.get(2, 5).unwrap(), 0);
}

#[test]
fn functional_units_and_basin_selection() {
    let w = make_world();

    let terrain = TerrainLayers {
        slope: &w.slope,
        aspect: &w.aspect,
        elevation: &w.dem,
    };
    let adjusted = mitigation::score(&w.landcover, Hazard::Flood, terrain).unwrap();
    let haz = hazard::normalize(&w.flood_counts, None, &NormalizeParams::default()).unwrap();

    let units = units::build_units(
        &w.streams,
        &w.slope,
        &w.landcover,
        &UnitParams::default(),
    )
    .unwrap();

    // Order-7 stream buffers 150 m: the corridor spans three rows
    assert_eq!(units.floodplain.get(RIVER_ROW, 5).unwrap(), 1);
    assert_eq!(units.floodplain.get(RIVER_ROW - 1, 5).unwrap(), 1);
    assert_eq!(units.floodplain.get(RIVER_ROW - 2, 5).unwrap(), 0);

    // Valley walls are hillslope, the corridor is not
    assert_eq!(units.hillslope.get(5, 5).unwrap(), 1);
    assert_eq!(units.hillslope.get(RIVER_ROW, 5).unwrap(), 0);

    let layers = priority::unit_layers(&adjusted, &haz, &units).unwrap();

    // Supply splits cleanly: forest supply west, potential east
    assert!(!layers.supply_forest.get(5, 5).unwrap().is_nan());
    assert!(layers.supply_forest.get(5, 15).unwrap().is_nan());
    assert!(!layers.supply_potential.get(5, 15).unwrap().is_nan());

    let scores = priority::couple(&layers, &CouplingParams::default()).unwrap();

    // The 1500 m diffusion reaches every hillslope in this small valley
    assert!(scores.protect.valid_count() > 0);
    assert!(scores.restore.valid_count() > 0);
    assert!(scores.retain.valid_count() > 0);

    let opportunity_hotspots =
        hotspot::select(&scores.restore, None, &HotspotParams::default()).unwrap();
    assert!(opportunity_hotspots.data().iter().any(|&v| v == 1));

    // Basin records: both basins produce complete, positive-demand records
    let records = basin::score_basins(&w.basins, &layers, ReduceParams::default()).unwrap();
    assert_eq!(records.len(), 2);
    for r in &records {
        assert!(r.demand_floodplain > 0.0);
        assert!(r.floodplain_storage > 0.0);
        assert_eq!(r.area_km2, 2.0);
    }
    // West basin is forested, east is not
    assert!(records[0].supply_forest > 0.0);
    assert_eq!(records[1].supply_forest, 0.0);
    assert!(records[1].supply_potential > 0.0);

    let protect = basin::select_basins(&records, Intervention::Protect, &GateParams::default());
    let restore = basin::select_basins(&records, Intervention::Restore, &GateParams::default());
    assert!(!protect.is_empty());
    assert!(!restore.is_empty());

    // Demand painted back onto pixels covers the study area
    let demand_img =
        basin::paint_statistic(&w.basins, &records, &haz, |r| r.demand_floodplain).unwrap();
    assert!(!demand_img.get(5, 5).unwrap().is_nan());
}

#[test]
fn zero_hazard_history_degrades_to_deterministic_fallbacks() {
    let w = make_world();

    let terrain = TerrainLayers {
        slope: &w.slope,
        aspect: &w.aspect,
        elevation: &w.dem,
    };
    let adjusted = mitigation::score(&w.landcover, Hazard::Flood, terrain).unwrap();

    // No flood has ever been observed
    let mut counts = Raster::new(SIZE, SIZE);
    counts.set_transform(grid_transform());
    counts.set_nodata(Some(f64::NAN));

    let haz = hazard::normalize(&counts, None, &NormalizeParams::default()).unwrap();
    for &v in haz.data().iter() {
        assert_eq!(v, 0.0);
    }

    let mit = priority::normalize_mitigation(&adjusted).unwrap();
    let gap = priority::mitigation_gap(&mit).unwrap();
    let prio = priority::priority(&haz, &gap).unwrap();
    for &v in prio.data().iter() {
        if !v.is_nan() {
            assert_eq!(v, 0.0);
        }
    }

    // No cell clears the positive fallback threshold
    let hotspots = hotspot::select(&prio, None, &HotspotParams::default()).unwrap();
    assert_eq!(hotspots.data().iter().filter(|&&v| v == 1).count(), 0);

    // Basin selection still yields a ranked, non-empty answer
    let units = units::build_units(
        &w.streams,
        &w.slope,
        &w.landcover,
        &UnitParams::default(),
    )
    .unwrap();
    let layers = priority::unit_layers(&adjusted, &haz, &units).unwrap();
    let records = basin::score_basins(&w.basins, &layers, ReduceParams::default()).unwrap();
    let selected = basin::select_basins(&records, Intervention::Protect, &GateParams::default());

    assert_eq!(selected.len(), records.len().min(5));
    // All priorities tie at zero, so input order is preserved
    let indices: Vec<usize> = selected.iter().map(|s| s.index).collect();
    assert_eq!(indices, vec![0, 1]);
}

#[test]
fn custom_table_remap_with_neutral_terrain() {
    // A one-entry table over a uniform class: the base score is uniform,
    // and flat midland terrain leaves the adjustment at identity
    let mut lc = Raster::new(4, 4);
    lc.set_transform(GeoTransform::new(0.0, 400.0, 100.0, -100.0));
    lc.set_nodata(Some(i32::MAX));
    for row in 0..4 {
        for col in 0..4 {
            lc.set(row, col, 100).unwrap();
        }
    }

    let base = algebra::remap(&lc, &[(100, 0.9)]).unwrap();
    for &v in base.data().iter() {
        assert_eq!(v, 0.9);
    }

    let mut flat = Raster::filled(4, 4, 0.0);
    flat.set_transform(GeoTransform::new(0.0, 400.0, 100.0, -100.0));
    flat.set_nodata(Some(f64::NAN));
    let no_aspect = flat.like(-1.0);
    let mut midland = Raster::filled(4, 4, 500.0);
    midland.set_transform(GeoTransform::new(0.0, 400.0, 100.0, -100.0));
    midland.set_nodata(Some(f64::NAN));

    let adjusted = mitigation::adjust_score(
        &base,
        Hazard::Flood,
        TerrainLayers {
            slope: &flat,
            aspect: &no_aspect,
            elevation: &midland,
        },
    )
    .unwrap();

    for &v in adjusted.data().iter() {
        assert_eq!(v, 0.9);
    }
}
