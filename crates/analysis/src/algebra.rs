//! Masked raster algebra
//!
//! Pixelwise operators over `Raster<f64>` score layers and `Raster<u8>`
//! boolean masks. Float layers use NaN for masked cells; mask layers use
//! `MASK_NODATA` (255). Every operator propagates masked-in to masked-out;
//! `unmask` variants are the only way to fill masked cells.

use crate::maybe_rayon::*;
use nbspot_core::raster::Raster;
use nbspot_core::{Error, Result};
use ndarray::Array2;

/// No-data sentinel for `Raster<u8>` boolean masks
pub const MASK_NODATA: u8 = 255;

fn check_shapes<A, B>(a: &Raster<A>, b: &Raster<B>) -> Result<()>
where
    A: nbspot_core::RasterElement,
    B: nbspot_core::RasterElement,
{
    if a.shape() != b.shape() {
        return Err(Error::SizeMismatch {
            er: a.rows(),
            ec: a.cols(),
            ar: b.rows(),
            ac: b.cols(),
        });
    }
    Ok(())
}

fn collect_f64(template: &Raster<f64>, data: Vec<f64>) -> Result<Raster<f64>> {
    let (rows, cols) = template.shape();
    let mut output = template.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

fn collect_mask<T>(template: &Raster<T>, data: Vec<u8>) -> Result<Raster<u8>>
where
    T: nbspot_core::RasterElement,
{
    let (rows, cols) = template.shape();
    let mut output = template.with_same_meta::<u8>(rows, cols);
    output.set_nodata(Some(MASK_NODATA));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

/// Apply a unary function to every valid cell; masked cells stay masked.
pub fn map<F>(raster: &Raster<f64>, f: F) -> Result<Raster<f64>>
where
    F: Fn(f64) -> f64 + Sync + Send,
{
    let (rows, cols) = raster.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let val = unsafe { raster.get_unchecked(row, col) };
                if !val.is_nan() {
                    row_data[col] = f(val);
                }
            }
            row_data
        })
        .collect();

    collect_f64(raster, data)
}

/// Apply a binary function between two rasters element-wise.
///
/// Masked cells in either input produce masked output.
pub fn zip_with<F>(a: &Raster<f64>, b: &Raster<f64>, f: F) -> Result<Raster<f64>>
where
    F: Fn(f64, f64) -> f64 + Sync + Send,
{
    check_shapes(a, b)?;
    let (rows, cols) = a.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let va = unsafe { a.get_unchecked(row, col) };
                let vb = unsafe { b.get_unchecked(row, col) };
                if !va.is_nan() && !vb.is_nan() {
                    row_data[col] = f(va, vb);
                }
            }
            row_data
        })
        .collect();

    collect_f64(a, data)
}

/// Pixelwise product of two layers
pub fn multiply(a: &Raster<f64>, b: &Raster<f64>) -> Result<Raster<f64>> {
    zip_with(a, b, |x, y| x * y)
}

/// Clamp every valid cell into [lo, hi]
pub fn clamp(raster: &Raster<f64>, lo: f64, hi: f64) -> Result<Raster<f64>> {
    map(raster, |v| v.clamp(lo, hi))
}

/// Replace masked cells with a fill value
pub fn unmask(raster: &Raster<f64>, fill: f64) -> Result<Raster<f64>> {
    let (rows, cols) = raster.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![0.0; cols];
            for col in 0..cols {
                let val = unsafe { raster.get_unchecked(row, col) };
                row_data[col] = if val.is_nan() { fill } else { val };
            }
            row_data
        })
        .collect();

    collect_f64(raster, data)
}

/// Keep cells where `mask` is 1; everything else becomes masked.
///
/// Mask no-data cells also mask the output.
pub fn mask_where(raster: &Raster<f64>, mask: &Raster<u8>) -> Result<Raster<f64>> {
    check_shapes(raster, mask)?;
    let (rows, cols) = raster.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let m = unsafe { mask.get_unchecked(row, col) };
                if m == 1 {
                    row_data[col] = unsafe { raster.get_unchecked(row, col) };
                }
            }
            row_data
        })
        .collect();

    collect_f64(raster, data)
}

/// Keep cells where `mask` is 0 (valid but false); 1 and no-data cells mask
/// the output.
pub fn mask_where_not(raster: &Raster<f64>, mask: &Raster<u8>) -> Result<Raster<f64>> {
    check_shapes(raster, mask)?;
    let (rows, cols) = raster.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let m = unsafe { mask.get_unchecked(row, col) };
                if m == 0 {
                    row_data[col] = unsafe { raster.get_unchecked(row, col) };
                }
            }
            row_data
        })
        .collect();

    collect_f64(raster, data)
}

/// Boolean mask: 1 where `raster >= threshold`, 0 below, no-data where masked
pub fn ge_mask(raster: &Raster<f64>, threshold: f64) -> Result<Raster<u8>> {
    let (rows, cols) = raster.shape();

    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![MASK_NODATA; cols];
            for col in 0..cols {
                let val = unsafe { raster.get_unchecked(row, col) };
                if !val.is_nan() {
                    row_data[col] = u8::from(val >= threshold);
                }
            }
            row_data
        })
        .collect();

    collect_mask(raster, data)
}

/// Logical AND of two masks; no-data in either input propagates
pub fn mask_and(a: &Raster<u8>, b: &Raster<u8>) -> Result<Raster<u8>> {
    check_shapes(a, b)?;
    let (rows, cols) = a.shape();

    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![MASK_NODATA; cols];
            for col in 0..cols {
                let va = unsafe { a.get_unchecked(row, col) };
                let vb = unsafe { b.get_unchecked(row, col) };
                if va != MASK_NODATA && vb != MASK_NODATA {
                    row_data[col] = u8::from(va == 1 && vb == 1);
                }
            }
            row_data
        })
        .collect();

    collect_mask(a, data)
}

/// Logical OR of two masks; no-data in either input propagates
pub fn mask_or(a: &Raster<u8>, b: &Raster<u8>) -> Result<Raster<u8>> {
    check_shapes(a, b)?;
    let (rows, cols) = a.shape();

    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![MASK_NODATA; cols];
            for col in 0..cols {
                let va = unsafe { a.get_unchecked(row, col) };
                let vb = unsafe { b.get_unchecked(row, col) };
                if va != MASK_NODATA && vb != MASK_NODATA {
                    row_data[col] = u8::from(va == 1 || vb == 1);
                }
            }
            row_data
        })
        .collect();

    collect_mask(a, data)
}

/// Logical complement of a mask; no-data propagates
pub fn mask_not(mask: &Raster<u8>) -> Result<Raster<u8>> {
    let (rows, cols) = mask.shape();

    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![MASK_NODATA; cols];
            for col in 0..cols {
                let v = unsafe { mask.get_unchecked(row, col) };
                if v != MASK_NODATA {
                    row_data[col] = u8::from(v != 1);
                }
            }
            row_data
        })
        .collect();

    collect_mask(mask, data)
}

/// Replace mask no-data cells with a fill value (0 or 1)
pub fn unmask_mask(mask: &Raster<u8>, fill: u8) -> Result<Raster<u8>> {
    let (rows, cols) = mask.shape();

    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![0u8; cols];
            for col in 0..cols {
                let v = unsafe { mask.get_unchecked(row, col) };
                row_data[col] = if v == MASK_NODATA { fill } else { v };
            }
            row_data
        })
        .collect();

    collect_mask(mask, data)
}

/// Remap classification codes through a lookup table.
///
/// Codes absent from the table become masked, not zero: an unmapped class
/// is unscored, which is different from a confirmed score of zero.
pub fn remap(codes: &Raster<i32>, table: &[(i32, f64)]) -> Result<Raster<f64>> {
    let (rows, cols) = codes.shape();
    let nodata = codes.nodata();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for col in 0..cols {
                let code = unsafe { codes.get_unchecked(row, col) };
                if let Some(nd) = nodata {
                    if code == nd {
                        continue;
                    }
                }
                if let Some(&(_, v)) = table.iter().find(|&&(c, _)| c == code) {
                    row_data[col] = v;
                }
            }
            row_data
        })
        .collect();

    let mut output = codes.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

/// Boolean mask from exact membership in a code set; classification
/// no-data propagates
pub fn code_mask(codes: &Raster<i32>, members: &[i32]) -> Result<Raster<u8>> {
    let (rows, cols) = codes.shape();
    let nodata = codes.nodata();

    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![MASK_NODATA; cols];
            for col in 0..cols {
                let code = unsafe { codes.get_unchecked(row, col) };
                if let Some(nd) = nodata {
                    if code == nd {
                        continue;
                    }
                }
                row_data[col] = u8::from(members.contains(&code));
            }
            row_data
        })
        .collect();

    collect_mask(codes, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbspot_core::GeoTransform;

    fn layer(values: Vec<f64>, rows: usize, cols: usize) -> Raster<f64> {
        let mut r = Raster::from_vec(values, rows, cols).unwrap();
        r.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        r.set_nodata(Some(f64::NAN));
        r
    }

    #[test]
    fn test_map_preserves_mask() {
        let r = layer(vec![1.0, f64::NAN, 3.0, 4.0], 2, 2);
        let out = map(&r, |v| v * 2.0).unwrap();
        assert_eq!(out.get(0, 0).unwrap(), 2.0);
        assert!(out.get(0, 1).unwrap().is_nan());
        assert_eq!(out.get(1, 1).unwrap(), 8.0);
    }

    #[test]
    fn test_zip_with_masks_either_side() {
        let a = layer(vec![1.0, f64::NAN, 3.0, 4.0], 2, 2);
        let b = layer(vec![2.0, 2.0, f64::NAN, 2.0], 2, 2);
        let out = zip_with(&a, &b, |x, y| x * y).unwrap();
        assert_eq!(out.get(0, 0).unwrap(), 2.0);
        assert!(out.get(0, 1).unwrap().is_nan());
        assert!(out.get(1, 0).unwrap().is_nan());
        assert_eq!(out.get(1, 1).unwrap(), 8.0);
    }

    #[test]
    fn test_zip_shape_mismatch() {
        let a = layer(vec![1.0; 4], 2, 2);
        let b = layer(vec![1.0; 6], 2, 3);
        assert!(zip_with(&a, &b, |x, y| x + y).is_err());
    }

    #[test]
    fn test_clamp_idempotent() {
        let r = layer(vec![-0.5, 0.3, 1.7, f64::NAN], 2, 2);
        let once = clamp(&r, 0.0, 1.0).unwrap();
        let twice = clamp(&once, 0.0, 1.0).unwrap();
        for row in 0..2 {
            for col in 0..2 {
                let a = once.get(row, col).unwrap();
                let b = twice.get(row, col).unwrap();
                assert!(a == b || (a.is_nan() && b.is_nan()));
            }
        }
        assert_eq!(once.get(0, 0).unwrap(), 0.0);
        assert_eq!(once.get(1, 0).unwrap(), 1.0);
    }

    #[test]
    fn test_mask_where() {
        let r = layer(vec![1.0, 2.0, 3.0, 4.0], 2, 2);
        let mut m: Raster<u8> = Raster::from_vec(vec![1, 0, MASK_NODATA, 1], 2, 2).unwrap();
        m.set_nodata(Some(MASK_NODATA));

        let kept = mask_where(&r, &m).unwrap();
        assert_eq!(kept.get(0, 0).unwrap(), 1.0);
        assert!(kept.get(0, 1).unwrap().is_nan());
        assert!(kept.get(1, 0).unwrap().is_nan());
        assert_eq!(kept.get(1, 1).unwrap(), 4.0);
    }

    #[test]
    fn test_unmask_fills_only_masked() {
        let r = layer(vec![1.0, f64::NAN, 3.0, f64::NAN], 2, 2);
        let filled = unmask(&r, 0.0).unwrap();
        assert_eq!(filled.get(0, 0).unwrap(), 1.0);
        assert_eq!(filled.get(0, 1).unwrap(), 0.0);
        assert_eq!(filled.get(1, 1).unwrap(), 0.0);
    }

    #[test]
    fn test_remap_unmapped_is_masked() {
        let mut codes: Raster<i32> = Raster::from_vec(vec![311, 999, 312, 100], 2, 2).unwrap();
        codes.set_nodata(Some(i32::MAX));

        let table = [(311, 0.75), (312, 0.6)];
        let out = remap(&codes, &table).unwrap();
        assert_eq!(out.get(0, 0).unwrap(), 0.75);
        assert!(out.get(0, 1).unwrap().is_nan());
        assert_eq!(out.get(1, 0).unwrap(), 0.6);
        assert!(out.get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn test_code_mask_partition() {
        let mut codes: Raster<i32> =
            Raster::from_vec(vec![311, 211, 313, i32::MAX], 2, 2).unwrap();
        codes.set_nodata(Some(i32::MAX));

        let forest = code_mask(&codes, &[311, 312, 313]).unwrap();
        let non_forest = mask_not(&forest).unwrap();

        assert_eq!(forest.get(0, 0).unwrap(), 1);
        assert_eq!(forest.get(0, 1).unwrap(), 0);
        assert_eq!(non_forest.get(0, 0).unwrap(), 0);
        assert_eq!(non_forest.get(0, 1).unwrap(), 1);
        assert_eq!(forest.get(1, 1).unwrap(), MASK_NODATA);
        assert_eq!(non_forest.get(1, 1).unwrap(), MASK_NODATA);
    }

    #[test]
    fn test_mask_or_union() {
        let mut a: Raster<u8> = Raster::from_vec(vec![1, 0, 0, MASK_NODATA], 2, 2).unwrap();
        a.set_nodata(Some(MASK_NODATA));
        let mut b: Raster<u8> = Raster::from_vec(vec![0, 0, 1, 1], 2, 2).unwrap();
        b.set_nodata(Some(MASK_NODATA));

        let either = mask_or(&a, &b).unwrap();
        assert_eq!(either.get(0, 0).unwrap(), 1);
        assert_eq!(either.get(0, 1).unwrap(), 0);
        assert_eq!(either.get(1, 0).unwrap(), 1);
        assert_eq!(either.get(1, 1).unwrap(), MASK_NODATA);
    }

    #[test]
    fn test_ge_mask_and_conjunction() {
        let a = layer(vec![0.9, 0.1, f64::NAN, 0.5], 2, 2);
        let b = layer(vec![0.9, 0.9, 0.9, 0.1], 2, 2);

        let ga = ge_mask(&a, 0.5).unwrap();
        let gb = ge_mask(&b, 0.5).unwrap();
        let both = mask_and(&ga, &gb).unwrap();

        assert_eq!(both.get(0, 0).unwrap(), 1);
        assert_eq!(both.get(0, 1).unwrap(), 0);
        assert_eq!(both.get(1, 0).unwrap(), MASK_NODATA);
        assert_eq!(both.get(1, 1).unwrap(), 0);
    }
}
