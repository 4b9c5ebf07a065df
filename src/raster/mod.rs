//! Read-only access to single-band rasters.
//!
//! A [`RasterSource`] exposes a grid shape, its affine georeferencing, the
//! declared no-data value and windowed reads. Values are widened to `f64`
//! regardless of the on-disk sample type.

mod geotiff;
mod grid;

use std::path::Path;

use geo::{Coord, Rect};
use gridcover::{CellWindow, GeoTransform};
use ndarray::Array2;

use crate::{common::fs::find_file_with_extension, error::{Result, ZonalError}};

pub use geotiff::{write_geotiff, GeoTiffRaster};
pub use grid::RasterGrid;

/// A georeferenced 2D grid of numeric samples.
///
/// Implementations are shared read-only across aggregation workers.
pub trait RasterSource: Send + Sync {
    /// Grid size as `(rows, cols)`.
    fn shape(&self) -> (usize, usize);

    fn transform(&self) -> &GeoTransform;

    /// Declared no-data value, if the source carries one.
    fn no_data(&self) -> Option<f64>;

    /// EPSG code of the grid's coordinate reference system, if known.
    fn epsg(&self) -> Option<u32>;

    /// Raw values of `window`, shaped `(window.rows, window.cols)`.
    ///
    /// Fails with [`ZonalError::RasterUnavailable`] when the window is outside
    /// the grid or the underlying data cannot be read.
    fn read_window(&self, window: &CellWindow) -> Result<Array2<f64>>;

    /// World-space bounding rectangle of the whole grid.
    fn extent(&self) -> Rect<f64> {
        let (rows, cols) = self.shape();
        let gt = self.transform();
        let corners = [
            gt.to_world(0.0, 0.0),
            gt.to_world(cols as f64, 0.0),
            gt.to_world(0.0, rows as f64),
            gt.to_world(cols as f64, rows as f64),
        ];
        let (mut min, mut max) = (corners[0], corners[0]);
        for c in &corners[1..] {
            min = Coord { x: min.x.min(c.x), y: min.y.min(c.y) };
            max = Coord { x: max.x.max(c.x), y: max.y.max(c.y) };
        }
        Rect::new(min, max)
    }

    /// One-line summary for logs and `inspect`.
    fn describe(&self) -> String {
        let (rows, cols) = self.shape();
        let gt = self.transform().to_gdal();
        let crs = self.epsg().map_or_else(|| "unknown CRS".to_string(), |code| format!("EPSG:{code}"));
        let no_data = self.no_data().map_or_else(|| "none".to_string(), |v| v.to_string());
        format!(
            "{rows}x{cols} cells, {crs}, pixel {}x{}, origin ({}, {}), no-data {no_data}",
            gt[1], gt[5], gt[0], gt[3],
        )
    }
}

/// Check that `window` lies inside a `(rows, cols)` grid.
pub(crate) fn check_window(window: &CellWindow, shape: (usize, usize)) -> Result<()> {
    if window.row_end() > shape.0 || window.col_end() > shape.1 {
        return Err(ZonalError::RasterUnavailable {
            window: *window,
            reason: format!("window exceeds the {}x{} grid", shape.0, shape.1),
        });
    }
    Ok(())
}

/// Open a raster file.
///
/// A directory resolves to the first `.tif`/`.tiff` file found beneath it.
pub fn open_raster(path: &Path) -> Result<Box<dyn RasterSource>> {
    if !path.exists() {
        return Err(ZonalError::FileNotFound(path.to_path_buf()));
    }

    let file = if path.is_dir() {
        find_file_with_extension(path, &["tif", "tiff"])?
            .ok_or_else(|| ZonalError::UnsupportedFormat(format!("no GeoTIFF found under {}", path.display())))?
    } else {
        path.to_path_buf()
    };

    match file.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("tif" | "tiff") => Ok(Box::new(GeoTiffRaster::open(&file)?)),
        _ => Err(ZonalError::UnsupportedFormat(format!("{}: expected a GeoTIFF (.tif/.tiff)", file.display()))),
    }
}
