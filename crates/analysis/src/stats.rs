//! Region-constrained reducers
//!
//! Scalar reductions (max, mean, sum, percentile, frequency histogram) over
//! the valid cells of a raster, optionally restricted to a region mask.
//! An empty reduction is an ordinary outcome here, not an error: every
//! reducer returns an `Option` or a typed result carrying a `present` flag,
//! and callers supply the fallback (see `positive_percentile`).

use nbspot_core::raster::Raster;
use nbspot_core::{Error, Result};
use std::collections::HashMap;

/// Bounded-cost hints for region reductions.
///
/// `sample_step` subsamples the grid (every k-th row and column), the
/// in-memory analogue of the hosted engine's best-effort sampling scale.
/// Statistics computed with a step above 1 are approximate by design.
#[derive(Debug, Clone, Copy)]
pub struct ReduceParams {
    /// Take every k-th row/column (k >= 1)
    pub sample_step: usize,
}

impl Default for ReduceParams {
    fn default() -> Self {
        Self { sample_step: 1 }
    }
}

/// Typed percentile result; `present` is false when the reduction saw no
/// valid cells
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentileValue {
    pub value: f64,
    pub present: bool,
}

impl PercentileValue {
    /// The value, or `fallback` when the reduction was empty
    pub fn or(self, fallback: f64) -> f64 {
        if self.present {
            self.value
        } else {
            fallback
        }
    }
}

fn check_region<T>(raster: &Raster<T>, region: Option<&Raster<u8>>) -> Result<()>
where
    T: nbspot_core::RasterElement,
{
    if let Some(region) = region {
        if raster.shape() != region.shape() {
            return Err(Error::SizeMismatch {
                er: raster.rows(),
                ec: raster.cols(),
                ar: region.rows(),
                ac: region.cols(),
            });
        }
    }
    Ok(())
}

/// Collect valid in-region cell values, honoring the sampling step
fn collect_valid(
    raster: &Raster<f64>,
    region: Option<&Raster<u8>>,
    params: ReduceParams,
) -> Vec<f64> {
    let (rows, cols) = raster.shape();
    let step = params.sample_step.max(1);
    let mut values = Vec::new();

    for row in (0..rows).step_by(step) {
        for col in (0..cols).step_by(step) {
            if let Some(region) = region {
                let m = unsafe { region.get_unchecked(row, col) };
                if m != 1 {
                    continue;
                }
            }
            let v = unsafe { raster.get_unchecked(row, col) };
            if !v.is_nan() {
                values.push(v);
            }
        }
    }

    values
}

/// Maximum of valid in-region cells; `None` when the reduction is empty
pub fn region_max(
    raster: &Raster<f64>,
    region: Option<&Raster<u8>>,
    params: ReduceParams,
) -> Result<Option<f64>> {
    check_region(raster, region)?;
    let values = collect_valid(raster, region, params);
    Ok(values.into_iter().reduce(f64::max))
}

/// Mean of valid in-region cells; `None` when the reduction is empty
pub fn region_mean(
    raster: &Raster<f64>,
    region: Option<&Raster<u8>>,
    params: ReduceParams,
) -> Result<Option<f64>> {
    check_region(raster, region)?;
    let values = collect_valid(raster, region, params);
    if values.is_empty() {
        return Ok(None);
    }
    let n = values.len() as f64;
    Ok(Some(values.iter().sum::<f64>() / n))
}

/// Sum of valid in-region cells; `None` when the reduction is empty
pub fn region_sum(
    raster: &Raster<f64>,
    region: Option<&Raster<u8>>,
    params: ReduceParams,
) -> Result<Option<f64>> {
    check_region(raster, region)?;
    let values = collect_valid(raster, region, params);
    if values.is_empty() {
        return Ok(None);
    }
    Ok(Some(values.iter().sum()))
}

/// Frequency histogram of classification codes over valid in-region cells
pub fn frequency_histogram(
    codes: &Raster<i32>,
    region: Option<&Raster<u8>>,
    params: ReduceParams,
) -> Result<HashMap<i32, usize>> {
    check_region(codes, region)?;
    let (rows, cols) = codes.shape();
    let step = params.sample_step.max(1);
    let nodata = codes.nodata();
    let mut counts = HashMap::new();

    for row in (0..rows).step_by(step) {
        for col in (0..cols).step_by(step) {
            if let Some(region) = region {
                let m = unsafe { region.get_unchecked(row, col) };
                if m != 1 {
                    continue;
                }
            }
            let code = unsafe { codes.get_unchecked(row, col) };
            if let Some(nd) = nodata {
                if code == nd {
                    continue;
                }
            }
            *counts.entry(code).or_insert(0) += 1;
        }
    }

    Ok(counts)
}

/// Linearly interpolated percentile of a value slice; `None` on empty input
pub fn percentile_of_slice(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi || hi >= sorted.len() {
        return Some(sorted[lo.min(sorted.len() - 1)]);
    }
    let frac = rank - lo as f64;
    Some(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}

/// Percentile of valid in-region cells
pub fn percentile(
    raster: &Raster<f64>,
    pct: f64,
    region: Option<&Raster<u8>>,
    params: ReduceParams,
) -> Result<PercentileValue> {
    if !(0.0..=100.0).contains(&pct) {
        return Err(Error::InvalidParameter {
            name: "pct",
            value: pct.to_string(),
            reason: "percentile must be between 0 and 100".into(),
        });
    }
    check_region(raster, region)?;

    let values = collect_valid(raster, region, params);
    match percentile_of_slice(&values, pct) {
        Some(value) => Ok(PercentileValue {
            value,
            present: true,
        }),
        None => Ok(PercentileValue {
            value: f64::NAN,
            present: false,
        }),
    }
}

/// Percentile of strictly-positive cells, with an explicit fallback.
///
/// The defensive reduction used throughout the hazard pipeline: zeros are
/// excluded so a sea of empty cells cannot drag the threshold to zero, and
/// an empty positive set resolves to `fallback` instead of failing.
pub fn positive_percentile(
    raster: &Raster<f64>,
    pct: f64,
    region: Option<&Raster<u8>>,
    params: ReduceParams,
    fallback: f64,
) -> Result<f64> {
    if !(0.0..=100.0).contains(&pct) {
        return Err(Error::InvalidParameter {
            name: "pct",
            value: pct.to_string(),
            reason: "percentile must be between 0 and 100".into(),
        });
    }
    check_region(raster, region)?;

    let values: Vec<f64> = collect_valid(raster, region, params)
        .into_iter()
        .filter(|&v| v > 0.0)
        .collect();

    Ok(percentile_of_slice(&values, pct).unwrap_or(fallback))
}

/// Area in km² of cells where `mask` is 1
pub fn masked_area_km2(mask: &Raster<u8>) -> f64 {
    let cell_area = mask.transform().cell_area();
    let count = mask.data().iter().filter(|&&v| v == 1).count();
    count as f64 * cell_area / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nbspot_core::GeoTransform;

    fn layer(values: Vec<f64>, rows: usize, cols: usize) -> Raster<f64> {
        let mut r = Raster::from_vec(values, rows, cols).unwrap();
        r.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        r.set_nodata(Some(f64::NAN));
        r
    }

    #[test]
    fn test_region_max_and_mean() {
        let r = layer(vec![1.0, 2.0, f64::NAN, 4.0], 2, 2);
        let max = region_max(&r, None, ReduceParams::default()).unwrap();
        let mean = region_mean(&r, None, ReduceParams::default()).unwrap();
        assert_eq!(max, Some(4.0));
        assert_relative_eq!(mean.unwrap(), 7.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_region_reduces_to_none() {
        let r = layer(vec![f64::NAN; 4], 2, 2);
        assert_eq!(region_max(&r, None, ReduceParams::default()).unwrap(), None);
        assert_eq!(region_mean(&r, None, ReduceParams::default()).unwrap(), None);
        assert_eq!(region_sum(&r, None, ReduceParams::default()).unwrap(), None);
    }

    #[test]
    fn test_region_mask_restricts() {
        let r = layer(vec![1.0, 10.0, 100.0, 1000.0], 2, 2);
        let mut region: Raster<u8> = Raster::from_vec(vec![1, 1, 0, 0], 2, 2).unwrap();
        region.set_nodata(Some(crate::algebra::MASK_NODATA));

        let max = region_max(&r, Some(&region), ReduceParams::default()).unwrap();
        assert_eq!(max, Some(10.0));
    }

    #[test]
    fn test_percentile_empty_not_present() {
        let r = layer(vec![f64::NAN; 4], 2, 2);
        let p = percentile(&r, 90.0, None, ReduceParams::default()).unwrap();
        assert!(!p.present);
        assert_eq!(p.or(0.7), 0.7);
    }

    #[test]
    fn test_positive_percentile_tempers_outlier() {
        // One outlier among a cluster of ones: zeros are excluded and the
        // interpolated p90 lands between cluster and outlier, well under
        // the outlier itself
        let r = layer(
            vec![0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 10.0],
            2,
            5,
        );
        let p90 = positive_percentile(&r, 90.0, None, ReduceParams::default(), 1.0).unwrap();
        // 8 positive values, rank 0.9 * 7 = 6.3 → 1 + 0.3 * (10 − 1)
        assert_relative_eq!(p90, 3.7, epsilon = 1e-12);
        assert!(p90 > 1.0 && p90 < 10.0);
    }

    #[test]
    fn test_positive_percentile_falls_back_when_all_zero() {
        let r = layer(vec![0.0; 9], 3, 3);
        let th = positive_percentile(&r, 95.0, None, ReduceParams::default(), 0.42).unwrap();
        assert_eq!(th, 0.42);
    }

    #[test]
    fn test_percentile_rejects_out_of_range() {
        let r = layer(vec![1.0; 4], 2, 2);
        assert!(percentile(&r, 101.0, None, ReduceParams::default()).is_err());
        assert!(positive_percentile(&r, -1.0, None, ReduceParams::default(), 0.0).is_err());
    }

    #[test]
    fn test_sample_step_subsamples() {
        let r = layer((0..16).map(|v| v as f64).collect(), 4, 4);
        let all = collect_valid(&r, None, ReduceParams { sample_step: 1 });
        let sampled = collect_valid(&r, None, ReduceParams { sample_step: 2 });
        assert_eq!(all.len(), 16);
        assert_eq!(sampled.len(), 4);
    }

    #[test]
    fn test_frequency_histogram() {
        let mut codes: Raster<i32> =
            Raster::from_vec(vec![311, 311, 211, i32::MAX], 2, 2).unwrap();
        codes.set_nodata(Some(i32::MAX));

        let counts = frequency_histogram(&codes, None, ReduceParams::default()).unwrap();
        assert_eq!(counts.get(&311), Some(&2));
        assert_eq!(counts.get(&211), Some(&1));
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn test_masked_area() {
        let mut mask: Raster<u8> = Raster::from_vec(vec![1, 0, 1, 1], 2, 2).unwrap();
        mask.set_transform(GeoTransform::new(0.0, 200.0, 100.0, -100.0));
        assert_relative_eq!(masked_area_km2(&mask), 0.03, epsilon = 1e-12);
    }
}
