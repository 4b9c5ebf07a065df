use crate::CellWindow;

/// Per-cell coverage of one polygon over one [`CellWindow`], stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageMask {
    window: CellWindow,
    covered: Vec<bool>,
}

impl CoverageMask {
    pub(crate) fn empty(window: CellWindow) -> Self {
        Self { window, covered: vec![false; window.len()] }
    }

    #[inline] pub fn window(&self) -> CellWindow { self.window }

    /// Number of covered cells.
    pub fn count(&self) -> usize {
        self.covered.iter().filter(|&&c| c).count()
    }

    /// Coverage of the cell at absolute grid index `(row, col)`; cells outside
    /// the window are never covered.
    pub fn get(&self, row: usize, col: usize) -> bool {
        self.window.contains(row, col)
            && self.covered[(row - self.window.row_off) * self.window.cols + (col - self.window.col_off)]
    }

    /// Absolute `(row, col)` of every covered cell, in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let CellWindow { row_off, col_off, cols, .. } = self.window;
        self.covered.iter().enumerate()
            .filter(|(_, &c)| c)
            .map(move |(i, _)| (row_off + i / cols, col_off + i % cols))
    }

    /// Mark window-relative row `row`, columns `col_start..=col_end` (clamped).
    pub(crate) fn fill_span(&mut self, row: usize, col_start: i64, col_end: i64) {
        let last = self.window.cols as i64 - 1;
        let (start, end) = (col_start.max(0), col_end.min(last));
        if start > end {
            return;
        }
        let base = row * self.window.cols;
        self.covered[base + start as usize..=base + end as usize].fill(true);
    }
}
