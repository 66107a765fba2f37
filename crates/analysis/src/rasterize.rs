//! Painting vector features onto raster grids
//!
//! Cell-center rasterization: a cell belongs to a polygon when its center
//! lies inside, and to a buffered line when its center is within the buffer
//! distance of any segment. Overlapping paints keep the mask true; for
//! value painting the last write wins.

use geo::Contains;
use geo_types::{Geometry, LineString, Point};
use nbspot_core::raster::{Raster, RasterElement};
use nbspot_core::Result;

/// Pixel window covering a map-space box, clipped to the raster
fn cell_range<T: RasterElement>(
    raster: &Raster<T>,
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
    let (rows, cols) = raster.shape();
    // North-up grids: max_y maps to the top row
    let (col0, row0) = raster.transform().geo_to_pixel(min_x, max_y);
    let (col1, row1) = raster.transform().geo_to_pixel(max_x, min_y);

    let row_start = row0.floor().max(0.0) as usize;
    let row_end = (row1.ceil().max(0.0) as usize).min(rows);
    let col_start = col0.floor().max(0.0) as usize;
    let col_end = (col1.ceil().max(0.0) as usize).min(cols);

    (row_start..row_end.max(row_start), col_start..col_end.max(col_start))
}

fn geometry_bounds(geom: &Geometry<f64>) -> Option<(f64, f64, f64, f64)> {
    use geo::BoundingRect;
    geom.bounding_rect()
        .map(|r| (r.min().x, r.min().y, r.max().x, r.max().y))
}

/// Rasterize a polygon (or multipolygon) interior as a 1/0 mask.
///
/// Non-areal geometries produce an all-zero mask.
pub fn polygon_mask<T: RasterElement>(
    template: &Raster<T>,
    geom: &Geometry<f64>,
) -> Result<Raster<u8>> {
    let (rows, cols) = template.shape();
    let mut mask = template.with_same_meta::<u8>(rows, cols);

    let Some((min_x, min_y, max_x, max_y)) = geometry_bounds(geom) else {
        return Ok(mask);
    };
    let (row_range, col_range) = cell_range(template, min_x, min_y, max_x, max_y);

    for row in row_range {
        for col in col_range.clone() {
            let (x, y) = template.pixel_to_geo(col, row);
            let p = Point::new(x, y);
            let inside = match geom {
                Geometry::Polygon(poly) => poly.contains(&p),
                Geometry::MultiPolygon(mp) => mp.contains(&p),
                Geometry::Rect(rect) => rect.contains(&p),
                _ => false,
            };
            if inside {
                unsafe { mask.set_unchecked(row, col, 1) };
            }
        }
    }

    Ok(mask)
}

/// Paint a polygon interior with a value; cells outside are untouched.
pub fn paint_polygon_value(
    target: &mut Raster<f64>,
    geom: &Geometry<f64>,
    value: f64,
) -> Result<()> {
    let Some((min_x, min_y, max_x, max_y)) = geometry_bounds(geom) else {
        return Ok(());
    };
    let (row_range, col_range) = cell_range(target, min_x, min_y, max_x, max_y);

    for row in row_range {
        for col in col_range.clone() {
            let (x, y) = target.pixel_to_geo(col, row);
            let p = Point::new(x, y);
            let inside = match geom {
                Geometry::Polygon(poly) => poly.contains(&p),
                Geometry::MultiPolygon(mp) => mp.contains(&p),
                Geometry::Rect(rect) => rect.contains(&p),
                _ => false,
            };
            if inside {
                unsafe { target.set_unchecked(row, col, value) };
            }
        }
    }

    Ok(())
}

fn point_segment_distance(px: f64, py: f64, ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;

    let t = if len_sq > 0.0 {
        (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let cx = ax + t * dx;
    let cy = ay + t * dy;
    ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt()
}

fn paint_linestring_buffer(mask: &mut Raster<u8>, line: &LineString<f64>, distance: f64) {
    for seg in line.lines() {
        let (ax, ay) = (seg.start.x, seg.start.y);
        let (bx, by) = (seg.end.x, seg.end.y);

        let min_x = ax.min(bx) - distance;
        let max_x = ax.max(bx) + distance;
        let min_y = ay.min(by) - distance;
        let max_y = ay.max(by) + distance;

        let (row_range, col_range) = cell_range(mask, min_x, min_y, max_x, max_y);
        for row in row_range {
            for col in col_range.clone() {
                let (x, y) = mask.pixel_to_geo(col, row);
                if point_segment_distance(x, y, ax, ay, bx, by) <= distance {
                    unsafe { mask.set_unchecked(row, col, 1) };
                }
            }
        }
    }
}

/// Paint cells within `distance` of a line geometry onto a mask (union
/// semantics: cells already painted stay painted).
pub fn paint_line_buffer(
    mask: &mut Raster<u8>,
    geom: &Geometry<f64>,
    distance: f64,
) -> Result<()> {
    match geom {
        Geometry::LineString(ls) => paint_linestring_buffer(mask, ls, distance),
        Geometry::MultiLineString(mls) => {
            for ls in &mls.0 {
                paint_linestring_buffer(mask, ls, distance);
            }
        }
        Geometry::Line(line) => {
            let ls = LineString::from(vec![
                (line.start.x, line.start.y),
                (line.end.x, line.end.y),
            ]);
            paint_linestring_buffer(mask, &ls, distance);
        }
        // Buffering other geometry kinds is not a stream-network concern
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{line_string, polygon};
    use nbspot_core::GeoTransform;

    fn template(size: usize, cell: f64) -> Raster<f64> {
        let mut r = Raster::new(size, size);
        r.set_transform(GeoTransform::new(0.0, size as f64 * cell, cell, -cell));
        r
    }

    #[test]
    fn test_polygon_mask_interior() {
        let t = template(10, 1.0);
        let geom = Geometry::Polygon(polygon![
            (x: 2.0, y: 2.0),
            (x: 8.0, y: 2.0),
            (x: 8.0, y: 8.0),
            (x: 2.0, y: 8.0),
            (x: 2.0, y: 2.0),
        ]);

        let mask = polygon_mask(&t, &geom).unwrap();
        // Center (5.5, 4.5) → inside
        assert_eq!(mask.get(5, 5).unwrap(), 1);
        // Corner cell center (0.5, 9.5) → outside
        assert_eq!(mask.get(0, 0).unwrap(), 0);
    }

    #[test]
    fn test_polygon_mask_non_areal_geometry() {
        let t = template(5, 1.0);
        let geom = Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 4.0, y: 4.0)]);
        let mask = polygon_mask(&t, &geom).unwrap();
        assert_eq!(mask.data().iter().filter(|&&v| v == 1).count(), 0);
    }

    #[test]
    fn test_line_buffer_width() {
        let t = template(11, 1.0);
        let mut mask = t.with_same_meta::<u8>(11, 11);

        // Horizontal line across the middle (y = 5.5 aligns with row 5 centers)
        let geom = Geometry::LineString(line_string![(x: 0.0, y: 5.5), (x: 11.0, y: 5.5)]);
        paint_line_buffer(&mut mask, &geom, 1.0).unwrap();

        assert_eq!(mask.get(5, 5).unwrap(), 1);
        // One row away: centers at y 4.5 / 6.5, distance 1.0 → painted
        assert_eq!(mask.get(4, 5).unwrap(), 1);
        assert_eq!(mask.get(6, 5).unwrap(), 1);
        // Two rows away: distance 2.0 → not painted
        assert_eq!(mask.get(3, 5).unwrap(), 0);
        assert_eq!(mask.get(7, 5).unwrap(), 0);
    }

    #[test]
    fn test_line_buffer_union_overlap() {
        let t = template(10, 1.0);
        let mut mask = t.with_same_meta::<u8>(10, 10);

        let a = Geometry::LineString(line_string![(x: 0.0, y: 5.0), (x: 10.0, y: 5.0)]);
        let b = Geometry::LineString(line_string![(x: 5.0, y: 0.0), (x: 5.0, y: 10.0)]);
        paint_line_buffer(&mut mask, &a, 1.0).unwrap();
        paint_line_buffer(&mut mask, &b, 1.0).unwrap();

        // The crossing stays painted
        assert_eq!(mask.get(4, 5).unwrap(), 1);
        assert_eq!(mask.get(5, 4).unwrap(), 1);
    }

    #[test]
    fn test_paint_polygon_value_last_write_wins() {
        let mut target = template(6, 1.0).like(f64::NAN);
        let geom = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 6.0, y: 0.0),
            (x: 6.0, y: 6.0),
            (x: 0.0, y: 6.0),
            (x: 0.0, y: 0.0),
        ]);

        paint_polygon_value(&mut target, &geom, 1.0).unwrap();
        paint_polygon_value(&mut target, &geom, 2.0).unwrap();
        assert_eq!(target.get(3, 3).unwrap(), 2.0);
    }
}
