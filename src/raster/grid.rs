use gridcover::{CellWindow, GeoTransform};
use ndarray::{s, Array2};

use crate::error::{Result, ZonalError};
use super::{check_window, RasterSource};

/// A raster held fully in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid {
    values: Array2<f64>,
    transform: GeoTransform,
    no_data: Option<f64>,
    epsg: Option<u32>,
}

impl RasterGrid {
    pub fn new(values: Array2<f64>, transform: GeoTransform, no_data: Option<f64>) -> Result<Self> {
        if values.is_empty() {
            return Err(ZonalError::InvalidConfiguration("raster grid has no cells".into()));
        }
        if !transform.is_invertible() {
            return Err(ZonalError::InvalidConfiguration("raster transform is not invertible".into()));
        }
        Ok(Self { values, transform, no_data, epsg: None })
    }

    pub fn with_epsg(mut self, epsg: u32) -> Self {
        self.epsg = Some(epsg);
        self
    }

    #[inline] pub fn values(&self) -> &Array2<f64> { &self.values }
}

impl RasterSource for RasterGrid {
    fn shape(&self) -> (usize, usize) { self.values.dim() }

    fn transform(&self) -> &GeoTransform { &self.transform }

    fn no_data(&self) -> Option<f64> { self.no_data }

    fn epsg(&self) -> Option<u32> { self.epsg }

    fn read_window(&self, window: &CellWindow) -> Result<Array2<f64>> {
        check_window(window, self.shape())?;
        Ok(self.values.slice(s![window.row_off..window.row_end(), window.col_off..window.col_end()]).to_owned())
    }
}
