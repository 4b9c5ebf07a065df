//! Format-specific reading and writing, organised by format.
//!
//! - `shp` - ESRI shapefile zones
//! - `geojson` - GeoJSON zones and result export
//! - `csv` - CSV result tables
//! - `parquet` - Parquet result tables (requires `parquet` feature)

pub mod geojson;
pub mod shp;

pub(crate) mod csv;

#[cfg(feature = "parquet")]
pub(crate) mod parquet;

use std::path::Path;

use crate::{
    common::fs::find_file_with_extension,
    error::{Result, ZonalError},
    zones::ZoneSet,
};

/// Load a zone set from a shapefile or GeoJSON file, chosen by extension.
///
/// A directory resolves to the first `.shp` beneath it, then the first
/// `.geojson`/`.json`.
pub fn load_zones(path: &Path, id_field: &str) -> Result<ZoneSet> {
    if !path.exists() {
        return Err(ZonalError::FileNotFound(path.to_path_buf()));
    }

    let file = if path.is_dir() {
        match find_file_with_extension(path, &["shp"])? {
            Some(file) => file,
            None => find_file_with_extension(path, &["geojson", "json"])?.ok_or_else(|| {
                ZonalError::UnsupportedFormat(format!("no shapefile or GeoJSON found under {}", path.display()))
            })?,
        }
    } else {
        path.to_path_buf()
    };

    match file.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("shp") => shp::read_zones(&file, id_field),
        Some("geojson" | "json") => geojson::read_zones(&file, id_field),
        _ => Err(ZonalError::UnsupportedFormat(format!(
            "{}: expected a shapefile (.shp) or GeoJSON (.geojson/.json)", file.display()
        ))),
    }
}
