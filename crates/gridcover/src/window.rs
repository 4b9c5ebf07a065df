use std::fmt;

use geo::Rect;

use crate::GeoTransform;

/// A rectangular, half-open block of grid cells:
/// rows `row_off..row_off + rows`, columns `col_off..col_off + cols`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CellWindow {
    pub row_off: usize,
    pub col_off: usize,
    pub rows: usize,
    pub cols: usize,
}

impl CellWindow {
    pub fn new(row_off: usize, col_off: usize, rows: usize, cols: usize) -> Self {
        Self { row_off, col_off, rows, cols }
    }

    /// The window spanning a whole `rows x cols` grid.
    pub fn full(rows: usize, cols: usize) -> Self {
        Self::new(0, 0, rows, cols)
    }

    #[inline] pub fn is_empty(&self) -> bool { self.rows == 0 || self.cols == 0 }

    /// Number of cells in the window.
    #[inline] pub fn len(&self) -> usize { self.rows * self.cols }

    #[inline] pub fn row_end(&self) -> usize { self.row_off + self.rows }

    #[inline] pub fn col_end(&self) -> usize { self.col_off + self.cols }

    #[inline]
    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.row_off && row < self.row_end() && col >= self.col_off && col < self.col_end()
    }

    /// Overlap of two windows, or `None` if they share no cell.
    pub fn intersect(&self, other: &CellWindow) -> Option<CellWindow> {
        let row_off = self.row_off.max(other.row_off);
        let col_off = self.col_off.max(other.col_off);
        let row_end = self.row_end().min(other.row_end());
        let col_end = self.col_end().min(other.col_end());
        (row_off < row_end && col_off < col_end)
            .then(|| CellWindow::new(row_off, col_off, row_end - row_off, col_end - col_off))
    }

    /// Split into full-width row bands of at most `max_cells` cells each.
    /// Every band holds at least one row, even if a single row is wider than `max_cells`.
    pub fn bands(&self, max_cells: usize) -> impl Iterator<Item = CellWindow> + '_ {
        let band_rows = if self.cols == 0 { self.rows.max(1) } else { (max_cells / self.cols).max(1) };
        (self.row_off..self.row_end())
            .step_by(band_rows)
            .map(move |start| {
                let rows = band_rows.min(self.row_end() - start);
                CellWindow::new(start, self.col_off, rows, self.cols)
            })
    }
}

impl fmt::Display for CellWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rows {}..{}, cols {}..{}", self.row_off, self.row_end(), self.col_off, self.col_end())
    }
}

/// Smallest window holding every cell of a `rows x cols` grid whose footprint
/// meets the world-space rectangle `bounds`.
///
/// Returns `None` if the rectangle misses the grid entirely, if the transform
/// is singular, or if `bounds` has non-finite corners.
pub fn window_for_bounds(transform: &GeoTransform, bounds: &Rect<f64>, rows: usize, cols: usize) -> Option<CellWindow> {
    let (min, max) = (bounds.min(), bounds.max());
    let corners = [(min.x, min.y), (min.x, max.y), (max.x, min.y), (max.x, max.y)];

    let mut px_min = (f64::INFINITY, f64::INFINITY);
    let mut px_max = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for (x, y) in corners {
        let p = transform.to_pixel(x, y)?;
        px_min = (px_min.0.min(p.x), px_min.1.min(p.y));
        px_max = (px_max.0.max(p.x), px_max.1.max(p.y));
    }
    if !(px_min.0.is_finite() && px_min.1.is_finite() && px_max.0.is_finite() && px_max.1.is_finite()) {
        return None;
    }

    // Clamp in floating point before converting so huge coordinates cannot overflow.
    let clamp = |v: f64, hi: usize| v.max(0.0).min(hi as f64) as usize;
    let col_off = clamp(px_min.0.floor(), cols);
    let col_end = clamp(px_max.0.ceil(), cols);
    let row_off = clamp(px_min.1.floor(), rows);
    let row_end = clamp(px_max.1.ceil(), rows);

    // A degenerate box on a cell edge still names the cell it sits on.
    let col_end = if col_end == col_off && px_min.0 == px_max.0 && col_off < cols { col_off + 1 } else { col_end };
    let row_end = if row_end == row_off && px_min.1 == px_max.1 && row_off < rows { row_off + 1 } else { row_end };

    (col_off < col_end && row_off < row_end)
        .then(|| CellWindow::new(row_off, col_off, row_end - row_off, col_end - col_off))
}
