//! nbspot CLI - multi-hazard NbS hotspot prioritization

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use nbspot_analysis::algebra;
use nbspot_analysis::basin::{self, GateParams, Intervention};
use nbspot_analysis::hazard::{self, NormalizeParams};
use nbspot_analysis::hotspot::{self, HotspotParams, JointGateParams};
use nbspot_analysis::mitigation::{self, Hazard, TerrainLayers};
use nbspot_analysis::priority::{self, CouplingParams};
use nbspot_analysis::stats::{self, ReduceParams};
use nbspot_analysis::terrain::{aspect, slope, SlopeParams};
use nbspot_analysis::units::{self, UnitParams};
use nbspot_core::io::{read_geotiff, write_geotiff};
use nbspot_core::vector::{AttributeValue, Feature, FeatureCollection};
use nbspot_core::Raster;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "nbspot")]
#[command(author, version, about = "Multi-hazard NbS hotspot prioritization", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Per-hazard priority surfaces and hotspot masks
    Hotspots {
        /// Digital elevation model (GeoTIFF)
        #[arg(long)]
        dem: PathBuf,
        /// CORINE land-cover codes (GeoTIFF)
        #[arg(long)]
        landcover: PathBuf,
        /// Flood event counts (GeoTIFF)
        #[arg(long)]
        flood_counts: PathBuf,
        /// Permanent-water mask excluded from the flood counts (GeoTIFF, optional)
        #[arg(long)]
        permanent_water: Option<PathBuf>,
        /// Burned-month counts (GeoTIFF, optional)
        #[arg(long)]
        fire_counts: Option<PathBuf>,
        /// Output directory
        #[arg(short, long, default_value = "out")]
        out_dir: PathBuf,
    },
    /// Functional-unit coupling and basin hotspot selection
    Basins {
        /// Digital elevation model (GeoTIFF)
        #[arg(long)]
        dem: PathBuf,
        /// CORINE land-cover codes (GeoTIFF)
        #[arg(long)]
        landcover: PathBuf,
        /// Flood event counts (GeoTIFF)
        #[arg(long)]
        flood_counts: PathBuf,
        /// Stream network with a stream-order attribute (GeoJSON)
        #[arg(long)]
        rivers: PathBuf,
        /// Basin polygons (GeoJSON)
        #[arg(long)]
        basins: PathBuf,
        /// Stream-order attribute name
        #[arg(long, default_value = "ORD_FLOW")]
        order_attribute: String,
        /// Demand diffusion radius in map units
        #[arg(long, default_value = "1500")]
        diffusion_radius: f64,
        /// Output directory
        #[arg(short, long, default_value = "out")]
        out_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let start = Instant::now();
    match cli.command {
        Commands::Info { input } => run_info(&input)?,
        Commands::Hotspots {
            dem,
            landcover,
            flood_counts,
            permanent_water,
            fire_counts,
            out_dir,
        } => run_hotspots(
            &dem,
            &landcover,
            &flood_counts,
            permanent_water.as_deref(),
            fire_counts.as_deref(),
            &out_dir,
        )?,
        Commands::Basins {
            dem,
            landcover,
            flood_counts,
            rivers,
            basins,
            order_attribute,
            diffusion_radius,
            out_dir,
        } => run_basins(
            &dem,
            &landcover,
            &flood_counts,
            &rivers,
            &basins,
            &order_attribute,
            diffusion_radius,
            &out_dir,
        )?,
    }
    info!("Done in {:.2?}", start.elapsed());

    Ok(())
}

// ─── Commands ───────────────────────────────────────────────────────────

fn run_info(input: &Path) -> Result<()> {
    let raster: Raster<f64> = read_geotiff(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let (rows, cols) = raster.shape();
    let (min_x, min_y, max_x, max_y) = raster.bounds();
    println!("File:    {}", input.display());
    println!("Size:    {} rows x {} cols", rows, cols);
    println!("Cell:    {} map units", raster.cell_size());
    println!("Bounds:  ({min_x}, {min_y}) - ({max_x}, {max_y})");
    println!("Valid:   {} / {} cells", raster.valid_count(), raster.len());
    Ok(())
}

struct Terrain {
    slope: Raster<f64>,
    aspect: Raster<f64>,
    elevation: Raster<f64>,
}

fn derive_terrain(dem_path: &Path) -> Result<Terrain> {
    let spinner = stage_spinner("Deriving terrain");
    let elevation: Raster<f64> = read_geotiff(dem_path)
        .with_context(|| format!("Failed to read DEM {}", dem_path.display()))?;
    let slope = slope(&elevation, SlopeParams::default())?;
    let aspect = aspect(&elevation)?;
    spinner.finish_and_clear();
    Ok(Terrain {
        slope,
        aspect,
        elevation,
    })
}

fn run_hotspots(
    dem: &Path,
    landcover: &Path,
    flood_counts: &Path,
    permanent_water: Option<&Path>,
    fire_counts: Option<&Path>,
    out_dir: &Path,
) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Cannot create {}", out_dir.display()))?;

    let terrain = derive_terrain(dem)?;
    let lc: Raster<i32> = read_geotiff(landcover)
        .with_context(|| format!("Failed to read land cover {}", landcover.display()))?;

    let mut jobs: Vec<(Hazard, PathBuf, f64, f64, f64)> = vec![(
        Hazard::Flood,
        flood_counts.to_path_buf(),
        90.0,
        hotspot::FLOOD_PRIORITY_PERCENTILE,
        hotspot::PROTECT_GATE_FLOOD_PERCENTILE,
    )];
    if let Some(fire) = fire_counts {
        jobs.push((
            Hazard::Fire,
            fire.to_path_buf(),
            95.0,
            hotspot::FIRE_PRIORITY_PERCENTILE,
            hotspot::PROTECT_GATE_FIRE_PERCENTILE,
        ));
    }

    for (kind, counts_path, norm_pct, hotspot_pct, gate_pct) in jobs {
        let spinner = stage_spinner(&format!("Scoring {} hazard", kind.name()));

        let mut counts: Raster<f64> = read_geotiff(&counts_path)
            .with_context(|| format!("Failed to read counts {}", counts_path.display()))?;

        // Flood detections over permanent water are open water, not floods
        if kind == Hazard::Flood {
            if let Some(water_path) = permanent_water {
                let water: Raster<f64> = read_geotiff(water_path)
                    .with_context(|| format!("Failed to read {}", water_path.display()))?;
                let water_mask = algebra::ge_mask(&water, 0.5)?;
                counts = algebra::mask_where_not(&counts, &water_mask)?;
            }
        }

        let layers = TerrainLayers {
            slope: &terrain.slope,
            aspect: &terrain.aspect,
            elevation: &terrain.elevation,
        };
        let adjusted = mitigation::score(&lc, kind, layers)?;

        let haz = hazard::normalize(
            &counts,
            None,
            &NormalizeParams {
                percentile: norm_pct,
                ..NormalizeParams::default()
            },
        )?;
        let mit = priority::normalize_mitigation(&adjusted)?;
        let gap = priority::mitigation_gap(&mit)?;
        let prio = priority::priority(&haz, &gap)?;

        let params = HotspotParams {
            percentile: hotspot_pct,
            fallback_threshold: hotspot::PRIORITY_FALLBACK,
            reduce: ReduceParams::default(),
        };
        let th = hotspot::threshold(&prio, None, &params)?;
        let hotspots = hotspot::select(&prio, None, &params)?;

        let protect = hotspot::protect_zone(
            &haz,
            &mit,
            None,
            &JointGateParams {
                hazard_percentile: gate_pct,
                mitigation_percentile: gate_pct,
                ..JointGateParams::default()
            },
        )?;

        let name = kind.name();
        write_geotiff(&prio, out_dir.join(format!("priority_{name}.tif")))?;
        write_geotiff(&hotspots, out_dir.join(format!("hotspot_{name}.tif")))?;
        write_geotiff(&protect, out_dir.join(format!("protect_{name}.tif")))?;

        spinner.finish_and_clear();
        info!(
            "{} scored: threshold {:.4}, hotspots {:.2} km2, protect zones {:.2} km2",
            name,
            th,
            stats::masked_area_km2(&hotspots),
            stats::masked_area_km2(&protect)
        );
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_basins(
    dem: &Path,
    landcover: &Path,
    flood_counts: &Path,
    rivers: &Path,
    basins: &Path,
    order_attribute: &str,
    diffusion_radius: f64,
    out_dir: &Path,
) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Cannot create {}", out_dir.display()))?;

    let terrain = derive_terrain(dem)?;
    let lc: Raster<i32> = read_geotiff(landcover)
        .with_context(|| format!("Failed to read land cover {}", landcover.display()))?;
    let counts: Raster<f64> = read_geotiff(flood_counts)
        .with_context(|| format!("Failed to read counts {}", flood_counts.display()))?;

    let (min_x, min_y, max_x, max_y) = terrain.elevation.bounds();
    let rivers = load_features(rivers)?.filter_bounds(min_x, min_y, max_x, max_y);
    let basin_features = load_features(basins)?.filter_bounds(min_x, min_y, max_x, max_y);
    info!(
        "loaded {} stream features and {} basins in the study area",
        rivers.len(),
        basin_features.len()
    );

    let spinner = stage_spinner("Building functional units");
    let unit_params = UnitParams {
        order_attribute: order_attribute.to_string(),
        ..UnitParams::default()
    };
    let fu = units::build_units(&rivers, &terrain.slope, &lc, &unit_params)?;
    spinner.finish_and_clear();

    let spinner = stage_spinner("Coupling demand and supply");
    let layers = TerrainLayers {
        slope: &terrain.slope,
        aspect: &terrain.aspect,
        elevation: &terrain.elevation,
    };
    let adjusted = mitigation::score(&lc, Hazard::Flood, layers)?;
    let haz = hazard::normalize(&counts, None, &NormalizeParams::default())?;

    let unit_layers = priority::unit_layers(&adjusted, &haz, &fu)?;
    let coupled = priority::couple(
        &unit_layers,
        &CouplingParams {
            diffusion_radius,
        },
    )?;
    spinner.finish_and_clear();

    let fu_params = HotspotParams {
        percentile: hotspot::OPPORTUNITY_PERCENTILE,
        fallback_threshold: 0.0,
        reduce: ReduceParams::default(),
    };
    for (name, score) in [
        ("protect", &coupled.protect),
        ("restore", &coupled.restore),
        ("retain", &coupled.retain),
    ] {
        let mask = hotspot::select(score, None, &fu_params)?;
        write_geotiff(score, out_dir.join(format!("score_{name}.tif")))?;
        write_geotiff(&mask, out_dir.join(format!("hotspot_{name}.tif")))?;
        info!(
            "functional hotspot '{}': {:.2} km2",
            name,
            stats::masked_area_km2(&mask)
        );
    }

    let spinner = stage_spinner("Scoring basins");
    let records = basin::score_basins(&basin_features, &unit_layers, ReduceParams::default())?;
    spinner.finish_and_clear();

    if records.is_empty() {
        bail!("No areal basin features intersect the study area");
    }

    write_basin_csv(&records, &out_dir.join("basin_scores.csv"))?;

    for (intervention, name) in [
        (Intervention::Protect, "protect"),
        (Intervention::Restore, "restore"),
    ] {
        let selected = basin::select_basins(&records, intervention, &GateParams::default());
        write_basin_csv(&selected, &out_dir.join(format!("basin_hotspots_{name}.csv")))?;
        info!(
            "basin hotspots ({}): {} of {} basins",
            name,
            selected.len(),
            records.len()
        );
    }

    // Broadcast basin demand back to pixels for expert inspection
    let demand_img =
        basin::paint_statistic(&basin_features, &records, &haz, |r| r.demand_floodplain)?;
    write_geotiff(&demand_img, out_dir.join("basin_demand.tif"))?;

    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn stage_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner());
    spinner.set_message(message.to_string());
    spinner
}

fn json_to_attribute(value: &serde_json::Value) -> AttributeValue {
    match value {
        serde_json::Value::Null => AttributeValue::Null,
        serde_json::Value::Bool(b) => AttributeValue::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                AttributeValue::Int(i)
            } else {
                AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => AttributeValue::String(s.clone()),
        other => AttributeValue::String(other.to_string()),
    }
}

fn load_features(path: &Path) -> Result<FeatureCollection> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let geojson: geojson::GeoJson = text
        .parse()
        .with_context(|| format!("Invalid GeoJSON in {}", path.display()))?;

    let geojson::GeoJson::FeatureCollection(collection) = geojson else {
        bail!("{} is not a GeoJSON FeatureCollection", path.display());
    };

    let mut out = FeatureCollection::new();
    for feature in collection.features {
        let Some(geometry) = feature.geometry else {
            continue;
        };
        let geometry: geo_types::Geometry<f64> = geometry
            .try_into()
            .with_context(|| format!("Unsupported geometry in {}", path.display()))?;

        let mut out_feature = Feature::new(geometry);
        out_feature.id = match feature.id {
            Some(geojson::feature::Id::String(s)) => Some(s),
            Some(geojson::feature::Id::Number(n)) => Some(n.to_string()),
            None => None,
        };
        if let Some(properties) = feature.properties {
            for (key, value) in properties {
                out_feature.set_property(key, json_to_attribute(&value));
            }
        }
        out.push(out_feature);
    }

    Ok(out)
}

fn write_basin_csv(records: &[basin::BasinScore], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Cannot write {}", path.display()))?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}
