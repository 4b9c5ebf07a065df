//! Single-band GeoTIFF rasters through the `tiff` crate.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use gridcover::{CellWindow, GeoTransform};
use ndarray::Array2;
use tiff::{
    decoder::{Decoder, DecodingResult, Limits},
    encoder::{colortype::Gray32Float, TiffEncoder},
    tags::Tag,
    ColorType,
};
use tracing::{debug, warn};

use crate::error::{Result, ZonalError};
use super::{check_window, RasterGrid, RasterSource};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE_KEY: u32 = 1024;
const GT_RASTER_TYPE_KEY: u32 = 1025;
const GEOGRAPHIC_TYPE_KEY: u32 = 2048;
const PROJECTED_CS_TYPE_KEY: u32 = 3072;
const RASTER_PIXEL_IS_POINT: u32 = 2;

type TiffDecoder = Decoder<BufReader<File>>;

/// Decoder lookups are keyed by the named `Tag` variants, never by `Tag::Unknown(code)`.
#[inline]
fn geo_tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// A GeoTIFF opened for windowed reading.
///
/// Only the strips or tiles that intersect a requested window are decoded.
/// Each concurrent reader takes its own decoder from an idle pool, opening
/// another file handle when the pool is empty.
pub struct GeoTiffRaster {
    path: PathBuf,
    rows: usize,
    cols: usize,
    transform: GeoTransform,
    no_data: Option<f64>,
    epsg: Option<u32>,
    /// Strip or tile size as `(width, height)` in cells.
    chunk: (usize, usize),
    idle: Mutex<Vec<TiffDecoder>>,
}

impl std::fmt::Debug for GeoTiffRaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoTiffRaster")
            .field("path", &self.path)
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("transform", &self.transform)
            .field("no_data", &self.no_data)
            .field("epsg", &self.epsg)
            .field("chunk", &self.chunk)
            .finish_non_exhaustive()
    }
}

fn unsupported(path: &Path, what: impl std::fmt::Display) -> ZonalError {
    ZonalError::UnsupportedFormat(format!("{}: {what}", path.display()))
}

impl GeoTiffRaster {
    /// Open a GeoTIFF and read its georeferencing. No pixel data is decoded.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ZonalError::FileNotFound(path.to_path_buf()));
        }
        let mut decoder = open_decoder(path)?;

        match decoder.colortype().map_err(|e| unsupported(path, e))? {
            ColorType::Gray(_) => {}
            other => return Err(unsupported(path, format!("expected a single-band image, found {other:?}"))),
        }

        let (width, height) = decoder.dimensions().map_err(|e| unsupported(path, e))?;
        let transform = read_transform(&mut decoder)
            .ok_or_else(|| unsupported(path, "missing GeoTIFF georeferencing tags"))?;
        if !transform.is_invertible() {
            return Err(unsupported(path, "georeferencing transform is not invertible"));
        }

        let keys = read_geo_keys(&mut decoder);
        if keys.iter().any(|&(key, value)| key == GT_RASTER_TYPE_KEY && value == RASTER_PIXEL_IS_POINT) {
            warn!("[raster::geotiff] {} declares PixelIsPoint; cells are treated as areas", path.display());
        }
        let epsg = lookup_key(&keys, PROJECTED_CS_TYPE_KEY).or_else(|| lookup_key(&keys, GEOGRAPHIC_TYPE_KEY));

        let no_data = decoder.get_tag_ascii_string(geo_tag(GDAL_NODATA)).ok()
            .and_then(|text| text.trim_matches(|c: char| c.is_whitespace() || c == '\0').parse::<f64>().ok());

        let (chunk_w, chunk_h) = decoder.chunk_dimensions();
        debug!(
            "[raster::geotiff] opened {} ({}x{}, chunks {}x{})",
            path.display(), height, width, chunk_w, chunk_h
        );

        Ok(Self {
            path: path.to_path_buf(),
            rows: height as usize,
            cols: width as usize,
            transform,
            no_data,
            epsg,
            chunk: (chunk_w as usize, chunk_h as usize),
            idle: Mutex::new(vec![decoder]),
        })
    }

    #[inline] pub fn path(&self) -> &Path { &self.path }

    fn checkout(&self) -> Result<TiffDecoder> {
        let pooled = self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop();
        match pooled {
            Some(decoder) => Ok(decoder),
            None => open_decoder(&self.path),
        }
    }

    /// Return a decoder after a successful read. Decoders that failed are dropped.
    fn checkin(&self, decoder: TiffDecoder) {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).push(decoder);
    }

    /// Decode chunk `index` and copy the part overlapping `window` into `out`.
    fn copy_chunk(
        &self,
        decoder: &mut TiffDecoder,
        index: usize,
        chunk_row: usize,
        chunk_col: usize,
        window: &CellWindow,
        out: &mut Array2<f64>,
    ) -> std::result::Result<(), String> {
        let (data_w, data_h) = decoder.chunk_data_dimensions(index as u32);
        let (data_w, data_h) = (data_w as usize, data_h as usize);
        let values = widen(decoder.read_chunk(index as u32).map_err(|e| e.to_string())?);
        if values.len() < data_w * data_h {
            return Err(format!("chunk {index} holds {} samples, expected {}", values.len(), data_w * data_h));
        }

        let (top, left) = (chunk_row * self.chunk.1, chunk_col * self.chunk.0);
        let rows = top.max(window.row_off)..(top + data_h).min(window.row_end());
        let cols = left.max(window.col_off)..(left + data_w).min(window.col_end());

        for row in rows {
            let src = (row - top) * data_w;
            for col in cols.clone() {
                out[[row - window.row_off, col - window.col_off]] = values[src + col - left];
            }
        }
        Ok(())
    }
}

impl RasterSource for GeoTiffRaster {
    fn shape(&self) -> (usize, usize) { (self.rows, self.cols) }

    fn transform(&self) -> &GeoTransform { &self.transform }

    fn no_data(&self) -> Option<f64> { self.no_data }

    fn epsg(&self) -> Option<u32> { self.epsg }

    fn read_window(&self, window: &CellWindow) -> Result<Array2<f64>> {
        check_window(window, self.shape())?;
        let mut out = Array2::zeros((window.rows, window.cols));
        if window.is_empty() {
            return Ok(out);
        }

        let unavailable = |reason: String| ZonalError::RasterUnavailable { window: *window, reason };
        let mut decoder = self.checkout().map_err(|e| unavailable(e.to_string()))?;

        let (chunk_w, chunk_h) = self.chunk;
        let across = self.cols.div_ceil(chunk_w);
        for chunk_row in window.row_off / chunk_h..=(window.row_end() - 1) / chunk_h {
            for chunk_col in window.col_off / chunk_w..=(window.col_end() - 1) / chunk_w {
                let index = chunk_row * across + chunk_col;
                self.copy_chunk(&mut decoder, index, chunk_row, chunk_col, window, &mut out)
                    .map_err(|reason| unavailable(format!("{}: {reason}", self.path.display())))?;
            }
        }
        self.checkin(decoder);
        Ok(out)
    }
}

fn open_decoder(path: &Path) -> Result<TiffDecoder> {
    let file = File::open(path)?;

    // County-sized windows of CONUS rasters decode whole strips; allow large buffers.
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024;
    limits.intermediate_buffer_size = 1024 * 1024 * 1024;
    limits.ifd_value_size = 64 * 1024 * 1024;

    Ok(Decoder::new(BufReader::new(file))
        .map_err(|e| unsupported(path, e))?
        .with_limits(limits))
}

/// Affine transform from ModelTransformation, or from a tiepoint plus pixel scale.
fn read_transform(decoder: &mut TiffDecoder) -> Option<GeoTransform> {
    if let Ok(m) = decoder.get_tag_f64_vec(geo_tag(MODEL_TRANSFORMATION)) {
        if m.len() >= 8 {
            return Some(GeoTransform::new(m[3], m[0], m[1], m[7], m[4], m[5]));
        }
    }

    let tiepoint = decoder.get_tag_f64_vec(geo_tag(MODEL_TIEPOINT)).ok()?;
    let scale = decoder.get_tag_f64_vec(geo_tag(MODEL_PIXEL_SCALE)).ok()?;
    if tiepoint.len() < 6 || scale.len() < 2 {
        return None;
    }
    // Tiepoint [i, j, k, x, y, z] ties raster point (i, j) to world (x, y).
    let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
    let (sx, sy) = (scale[0], scale[1]);
    Some(GeoTransform::north_up(x - i * sx, y + j * sy, sx, sy))
}

/// `(key, value)` pairs stored inline in the GeoKeyDirectory.
fn read_geo_keys(decoder: &mut TiffDecoder) -> Vec<(u32, u32)> {
    let Ok(dir) = decoder.get_tag_u32_vec(geo_tag(GEO_KEY_DIRECTORY)) else { return Vec::new() };
    if dir.len() < 4 {
        return Vec::new();
    }
    let count = dir[3] as usize;
    dir[4..].chunks_exact(4)
        .take(count)
        .filter(|entry| entry[1] == 0) // value held in the directory itself
        .map(|entry| (entry[0], entry[3]))
        .collect()
}

fn lookup_key(keys: &[(u32, u32)], key: u32) -> Option<u32> {
    keys.iter()
        .find(|&&(k, value)| k == key && value != 0 && value != 32767) // 32767 = user-defined
        .map(|&(_, value)| value)
}

fn widen(result: DecodingResult) -> Vec<f64> {
    match result {
        DecodingResult::F64(data) => data,
        DecodingResult::F32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::I8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f64).collect(),
    }
}

/// Write `grid` as a strip-organised float32 GeoTIFF.
///
/// North-up grids get a tiepoint and pixel scale, rotated grids a
/// ModelTransformation. The no-data value and EPSG code are written when set.
pub fn write_geotiff(path: &Path, grid: &RasterGrid, rows_per_strip: u32) -> Result<()> {
    let (rows, cols) = grid.shape();
    let io_err = |e: tiff::TiffError| ZonalError::Io(std::io::Error::other(e));

    let file = File::create(path)?;
    let mut encoder = TiffEncoder::new(file).map_err(io_err)?;
    let mut image = encoder.new_image::<Gray32Float>(cols as u32, rows as u32).map_err(io_err)?;
    image.rows_per_strip(rows_per_strip.max(1)).map_err(io_err)?;

    let gt = grid.transform().to_gdal();
    let dir = image.encoder();
    if gt[2] == 0.0 && gt[4] == 0.0 {
        dir.write_tag(geo_tag(MODEL_PIXEL_SCALE), &[gt[1], -gt[5], 0.0][..]).map_err(io_err)?;
        dir.write_tag(geo_tag(MODEL_TIEPOINT), &[0.0, 0.0, 0.0, gt[0], gt[3], 0.0][..]).map_err(io_err)?;
    } else {
        let matrix = [
            gt[1], gt[2], 0.0, gt[0],
            gt[4], gt[5], 0.0, gt[3],
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        dir.write_tag(geo_tag(MODEL_TRANSFORMATION), &matrix[..]).map_err(io_err)?;
    }

    let mut keys: Vec<u16> = vec![1, 1, 0, 0];
    let mut push_key = |key: u32, value: u16| keys.extend_from_slice(&[key as u16, 0, 1, value]);
    let epsg = grid.epsg().and_then(|code| u16::try_from(code).ok());
    push_key(GT_MODEL_TYPE_KEY, 1); // projected
    push_key(GT_RASTER_TYPE_KEY, 1); // PixelIsArea
    if let Some(code) = epsg {
        push_key(PROJECTED_CS_TYPE_KEY, code);
    }
    keys[3] = ((keys.len() - 4) / 4) as u16;
    dir.write_tag(geo_tag(GEO_KEY_DIRECTORY), &keys[..]).map_err(io_err)?;

    if let Some(no_data) = grid.no_data() {
        dir.write_tag(geo_tag(GDAL_NODATA), no_data.to_string().as_str()).map_err(io_err)?;
    }

    let data: Vec<f32> = grid.values().iter().map(|&v| v as f32).collect();
    image.write_data(&data).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn sample_grid(rows: usize, cols: usize) -> RasterGrid {
        let values = Array2::from_shape_fn((rows, cols), |(r, c)| (r * 100 + c) as f64);
        RasterGrid::new(values, GeoTransform::north_up(500.0, 900.0, 30.0, 30.0), Some(65535.0))
            .unwrap()
            .with_epsg(5070)
    }

    #[test]
    fn georeferencing_survives_a_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("carbon.tif");
        write_geotiff(&path, &sample_grid(5, 7), 2).unwrap();

        let raster = GeoTiffRaster::open(&path).unwrap();
        assert_eq!(raster.shape(), (5, 7));
        assert_eq!(raster.epsg(), Some(5070));
        assert_eq!(raster.no_data(), Some(65535.0));
        let gt = raster.transform().to_gdal();
        for (got, want) in gt.iter().zip([500.0, 30.0, 0.0, 900.0, 0.0, -30.0]) {
            assert_relative_eq!(*got, want);
        }
    }

    #[test]
    fn window_spanning_several_strips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strips.tif");
        let grid = sample_grid(10, 6);
        write_geotiff(&path, &grid, 3).unwrap();

        let raster = GeoTiffRaster::open(&path).unwrap();
        let window = CellWindow::new(2, 1, 6, 4);
        let got = raster.read_window(&window).unwrap();
        let want = grid.read_window(&window).unwrap();
        assert_eq!(got, want);
    }

    #[test]
    fn rotated_transform_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rotated.tif");
        let gt = GeoTransform::new(100.0, 0.8, -0.6, 50.0, 0.6, 0.8);
        let grid = RasterGrid::new(Array2::ones((2, 2)), gt, None).unwrap();
        write_geotiff(&path, &grid, 1).unwrap();

        let raster = GeoTiffRaster::open(&path).unwrap();
        assert_eq!(raster.no_data(), None);
        for (got, want) in raster.transform().to_gdal().iter().zip(gt.to_gdal()) {
            assert_relative_eq!(*got, want);
        }
    }

    #[test]
    fn read_outside_grid_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.tif");
        write_geotiff(&path, &sample_grid(3, 3), 3).unwrap();
        let raster = GeoTiffRaster::open(&path).unwrap();
        let err = raster.read_window(&CellWindow::new(2, 2, 2, 2)).unwrap_err();
        assert!(matches!(err, ZonalError::RasterUnavailable { .. }));
    }

    #[test]
    fn geo_tags_resolve_to_named_variants() {
        for code in [MODEL_PIXEL_SCALE, MODEL_TIEPOINT, MODEL_TRANSFORMATION, GEO_KEY_DIRECTORY, GDAL_NODATA] {
            assert_ne!(geo_tag(code), Tag::Unknown(code), "{code}");
            assert_eq!(geo_tag(code).to_u16(), code);
        }
    }

    /// Little-endian float32 TIFF in `tile` x `tile` tiles, edge tiles padded
    /// with zeros, georeferenced like [`sample_grid`].
    fn write_tiled(path: &Path, values: &Array2<f64>, tile: usize) {
        const ASCII: u16 = 2;
        const SHORT: u16 = 3;
        const LONG: u16 = 4;
        const DOUBLE: u16 = 12;

        let (rows, cols) = values.dim();
        let mut bytes = b"II\x2a\x00\0\0\0\0".to_vec();
        let mut offsets = Vec::new();
        for tile_row in 0..rows.div_ceil(tile) {
            for tile_col in 0..cols.div_ceil(tile) {
                offsets.push(bytes.len() as u32);
                for r in 0..tile {
                    for c in 0..tile {
                        let v = values.get((tile_row * tile + r, tile_col * tile + c)).copied().unwrap_or(0.0);
                        bytes.extend_from_slice(&(v as f32).to_le_bytes());
                    }
                }
            }
        }
        let counts = vec![(tile * tile * 4) as u32; offsets.len()];

        let shorts = |v: &[u16]| v.iter().flat_map(|x| x.to_le_bytes()).collect::<Vec<u8>>();
        let longs = |v: &[u32]| v.iter().flat_map(|x| x.to_le_bytes()).collect::<Vec<u8>>();
        let doubles = |v: &[f64]| v.iter().flat_map(|x| x.to_le_bytes()).collect::<Vec<u8>>();
        let n = offsets.len() as u32;
        let mut entries = vec![
            (256, LONG, 1, longs(&[cols as u32])),
            (257, LONG, 1, longs(&[rows as u32])),
            (258, SHORT, 1, shorts(&[32])),
            (259, SHORT, 1, shorts(&[1])),
            (262, SHORT, 1, shorts(&[1])),
            (277, SHORT, 1, shorts(&[1])),
            (322, SHORT, 1, shorts(&[tile as u16])),
            (323, SHORT, 1, shorts(&[tile as u16])),
            (324, LONG, n, longs(&offsets)),
            (325, LONG, n, longs(&counts)),
            (339, SHORT, 1, shorts(&[3])),
            (MODEL_PIXEL_SCALE, DOUBLE, 3, doubles(&[30.0, 30.0, 0.0])),
            (MODEL_TIEPOINT, DOUBLE, 6, doubles(&[0.0, 0.0, 0.0, 500.0, 900.0, 0.0])),
            (GEO_KEY_DIRECTORY, SHORT, 8, shorts(&[1, 1, 0, 1, 3072, 0, 1, 5070])),
            (GDAL_NODATA, ASCII, 6, b"65535\0".to_vec()),
        ];

        // Values longer than four bytes live after the tiles; the entry keeps their offset.
        for (_, _, _, payload) in entries.iter_mut() {
            if payload.len() > 4 {
                bytes.resize(bytes.len().next_multiple_of(8), 0);
                let at = bytes.len() as u32;
                bytes.append(payload);
                *payload = at.to_le_bytes().to_vec();
            } else {
                payload.resize(4, 0);
            }
        }

        let ifd = bytes.len() as u32;
        bytes[4..8].copy_from_slice(&ifd.to_le_bytes());
        bytes.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for (tag, kind, count, payload) in &entries {
            bytes.extend_from_slice(&tag.to_le_bytes());
            bytes.extend_from_slice(&kind.to_le_bytes());
            bytes.extend_from_slice(&count.to_le_bytes());
            bytes.extend_from_slice(payload);
        }
        bytes.extend_from_slice(&0u32.to_le_bytes());
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn windows_across_tile_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiled.tif");
        let grid = sample_grid(36, 40);
        write_tiled(&path, grid.values(), 16);

        let raster = GeoTiffRaster::open(&path).unwrap();
        assert_eq!(raster.shape(), (36, 40));
        assert_eq!(raster.chunk, (16, 16));
        assert_eq!(raster.epsg(), Some(5070));
        assert_eq!(raster.no_data(), Some(65535.0));

        // Interior crossing four tiles, the partial corner tile, and everything.
        for window in [CellWindow::new(10, 12, 20, 25), CellWindow::new(30, 30, 6, 10), CellWindow::new(0, 0, 36, 40)] {
            let got = raster.read_window(&window).unwrap();
            let want = grid.read_window(&window).unwrap();
            assert_eq!(got, want, "{window}");
        }
    }

    #[test]
    fn concurrent_reads_take_separate_decoders() {
        use rayon::prelude::*;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.tif");
        let grid = sample_grid(12, 9);
        write_geotiff(&path, &grid, 2).unwrap();
        let raster = GeoTiffRaster::open(&path).unwrap();

        let windows: Vec<_> = (0..10).map(|i| CellWindow::new(i, i % 5, 3, 4)).collect();
        let parallel: Vec<_> = windows.par_iter().map(|w| raster.read_window(w).unwrap()).collect();
        for (window, got) in windows.iter().zip(parallel) {
            assert_eq!(got, grid.read_window(window).unwrap());
        }

        let a = raster.checkout().unwrap();
        let b = raster.checkout().unwrap();
        raster.checkin(a);
        raster.checkin(b);
        assert!(raster.idle.lock().unwrap().len() >= 2);
    }

    #[test]
    fn plain_tiff_without_georeferencing_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.tif");
        {
            let file = File::create(&path).unwrap();
            let mut encoder = TiffEncoder::new(file).unwrap();
            encoder.write_image::<Gray32Float>(2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        }
        let err = GeoTiffRaster::open(&path).unwrap_err();
        assert!(matches!(err, ZonalError::UnsupportedFormat(_)));
    }
}
