use std::fmt;

use geo::{Coord, MultiPolygon, Polygon};

use crate::{CellWindow, CoverageMask, CoveragePolicy, GeoTransform};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while rasterizing a polygon.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterizeError {
    /// The grid transform has a zero (or non-finite) determinant.
    SingularTransform,
    /// A polygon vertex is NaN or infinite.
    NonFiniteCoordinate { x: f64, y: f64 },
}

impl fmt::Display for RasterizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RasterizeError::SingularTransform => write!(f, "grid transform is not invertible"),
            RasterizeError::NonFiniteCoordinate { x, y } => write!(f, "non-finite vertex ({x}, {y})"),
        }
    }
}

impl std::error::Error for RasterizeError {}

// ---------------------------------------------------------------------------
// Rasterization
// ---------------------------------------------------------------------------

/// A closed ring in pixel space (`x` = column, `y` = row).
type PixelRing = Vec<Coord<f64>>;

/// Decide which cells of `window` are covered by `shape`.
///
/// Center-in coverage is computed with a scanline through each row's cell
/// centers. Crossings are counted with the half-open rule per edge and paired
/// even-odd per polygon part, so holes subtract regardless of ring winding.
/// Intervals are closed and horizontal edges / vertices lying on the scanline
/// are added explicitly, which makes the test boundary-inclusive: a center on
/// any ring (exterior or hole) is covered.
///
/// All-touched coverage adds every cell whose open footprint is crossed by an
/// edge. Cells that only share an edge line or a corner with the boundary are
/// not added.
pub fn rasterize(
    shape: &MultiPolygon<f64>,
    transform: &GeoTransform,
    window: CellWindow,
    policy: CoveragePolicy,
) -> Result<CoverageMask, RasterizeError> {
    if !transform.is_invertible() {
        return Err(RasterizeError::SingularTransform);
    }

    let mut mask = CoverageMask::empty(window);
    if window.is_empty() {
        return Ok(mask);
    }

    for polygon in &shape.0 {
        if polygon.exterior().0.is_empty() {
            continue;
        }
        let part = pixel_rings(polygon, transform)?;
        scan_centers(&part, &mut mask);
        if policy == CoveragePolicy::AllTouched {
            mark_touched(&part, &mut mask);
        }
    }

    Ok(mask)
}

/// Map every ring of `polygon` into pixel space, closing rings that are not.
fn pixel_rings(polygon: &Polygon<f64>, transform: &GeoTransform) -> Result<Vec<PixelRing>, RasterizeError> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .filter(|ring| !ring.0.is_empty())
        .map(|ring| {
            let mut pts = ring.0.iter()
                .map(|c| {
                    if !(c.x.is_finite() && c.y.is_finite()) {
                        return Err(RasterizeError::NonFiniteCoordinate { x: c.x, y: c.y });
                    }
                    transform.to_pixel(c.x, c.y).ok_or(RasterizeError::SingularTransform)
                })
                .collect::<Result<PixelRing, _>>()?;
            if pts.first() != pts.last() {
                pts.push(pts[0]);
            }
            Ok(pts)
        })
        .collect()
}

/// Row extent (min y, max y) of a part; holes lie inside the exterior.
fn row_extent(part: &[PixelRing]) -> (f64, f64) {
    part[0].iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| (lo.min(c.y), hi.max(c.y)))
}

fn scan_centers(part: &[PixelRing], mask: &mut CoverageMask) {
    let window = mask.window();
    let (y_min, y_max) = row_extent(part);

    let mut crossings: Vec<f64> = Vec::new();
    let mut spans: Vec<(f64, f64)> = Vec::new();

    for local_row in 0..window.rows {
        let cy = (window.row_off + local_row) as f64 + 0.5;
        if cy < y_min || cy > y_max {
            continue;
        }

        crossings.clear();
        spans.clear();

        for ring in part {
            for seg in ring.windows(2) {
                let (a, b) = (seg[0], seg[1]);
                if (a.y > cy) != (b.y > cy) {
                    crossings.push(a.x + (cy - a.y) * (b.x - a.x) / (b.y - a.y));
                }
                // Boundary points on the scanline itself.
                if a.y == cy {
                    if b.y == cy {
                        spans.push((a.x.min(b.x), a.x.max(b.x)));
                    } else {
                        spans.push((a.x, a.x));
                    }
                }
            }
        }

        crossings.sort_by(f64::total_cmp);
        spans.extend(crossings.chunks_exact(2).map(|pair| (pair[0], pair[1])));

        for &(x0, x1) in &spans {
            // Columns whose center c + 0.5 lies in [x0, x1].
            let first = (x0 - 0.5).ceil() as i64 - window.col_off as i64;
            let last = (x1 - 0.5).floor() as i64 - window.col_off as i64;
            mask.fill_span(local_row, first, last);
        }
    }
}

/// Cells `c` whose open interval `(c, c + 1)` meets the closed range `[lo, hi]`.
fn open_cell_range(lo: f64, hi: f64) -> Option<(i64, i64)> {
    if lo < hi {
        Some((lo.floor() as i64, hi.ceil() as i64 - 1))
    } else if lo.fract() != 0.0 {
        Some((lo.floor() as i64, lo.floor() as i64))
    } else {
        None
    }
}

fn mark_touched(part: &[PixelRing], mask: &mut CoverageMask) {
    let window = mask.window();
    let (row_lo, row_hi) = (window.row_off as i64, window.row_end() as i64 - 1);

    for ring in part {
        for seg in ring.windows(2) {
            let (a, b) = (seg[0], seg[1]);
            let (y_lo, y_hi) = (a.y.min(b.y), a.y.max(b.y));
            let Some((r0, r1)) = open_cell_range(y_lo, y_hi) else { continue };

            for row in r0.max(row_lo)..=r1.min(row_hi) {
                let (x_lo, x_hi) = if a.y == b.y {
                    (a.x.min(b.x), a.x.max(b.x))
                } else {
                    // Clip the edge to this row's band.
                    let x_at = |y: f64| a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y);
                    let (xa, xb) = (x_at(y_lo.max(row as f64)), x_at(y_hi.min(row as f64 + 1.0)));
                    (xa.min(xb), xa.max(xb))
                };

                if let Some((c0, c1)) = open_cell_range(x_lo, x_hi) {
                    let off = window.col_off as i64;
                    mask.fill_span((row - row_lo) as usize, c0 - off, c1 - off);
                }
            }
        }
    }
}
