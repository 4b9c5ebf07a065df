use std::{
    ffi::OsString,
    fmt, fs,
    io::{BufWriter, ErrorKind, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::{
    common::fs::ensure_dir_exists,
    error::{Result, ZonalError},
    io,
    zones::ZoneSet,
};
use super::{FileHash, ResultTable, TableManifest};

/// On-disk format of a result table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    Csv,
    Parquet,
    /// FeatureCollection with each zone's geometry.
    GeoJson,
}

impl TableFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableFormat::Csv => "csv",
            TableFormat::Parquet => "parquet",
            TableFormat::GeoJson => "geojson",
        }
    }

    /// Format implied by a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension().and_then(|e| e.to_str()).and_then(|e| e.parse().ok())
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(TableFormat::Csv),
            "parquet" | "pq" => Ok(TableFormat::Parquet),
            "geojson" | "json" => Ok(TableFormat::GeoJson),
            other => Err(format!("unknown table format '{other}' (expected csv, parquet or geojson)")),
        }
    }
}

/// Where a table was written.
#[derive(Debug, Clone, PartialEq)]
pub struct TableLocation {
    pub path: PathBuf,
    pub manifest: PathBuf,
    pub format: TableFormat,
    pub sha256: String,
}

/// `<output>.manifest.json` next to the output.
pub fn manifest_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".manifest.json");
    path.with_file_name(name)
}

/// Persist `table` at `path`, with a manifest sidecar.
///
/// The format is taken from `format`, else from the extension. Data is written
/// to a temporary file in the destination directory and renamed into place
/// only once complete, so a failed write leaves no partial output. An existing
/// output is replaced only when `overwrite` is set.
pub fn write_table(
    table: &ResultTable,
    zones: &ZoneSet,
    path: &Path,
    format: Option<TableFormat>,
    overwrite: bool,
) -> Result<TableLocation> {
    let format = format.or_else(|| TableFormat::from_path(path)).ok_or_else(|| {
        ZonalError::UnsupportedFormat(format!("{}: cannot infer table format from extension", path.display()))
    })?;
    if !overwrite && path.exists() {
        return Err(ZonalError::OutputExists(path.to_path_buf()));
    }

    let file_name = path.file_name().and_then(|n| n.to_str())
        .ok_or_else(|| ZonalError::InvalidConfiguration(format!("{}: not a file path", path.display())))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    ensure_dir_exists(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        match format {
            TableFormat::Csv => io::csv::write_csv(&mut table.to_dataframe()?, &mut writer)?,
            #[cfg(feature = "parquet")]
            TableFormat::Parquet => io::parquet::write_parquet(&mut table.to_dataframe()?, &mut writer)?,
            #[cfg(not(feature = "parquet"))]
            TableFormat::Parquet => {
                return Err(ZonalError::UnsupportedFormat("built without the `parquet` feature".into()));
            }
            TableFormat::GeoJson => io::geojson::write_features(table, zones, &mut writer)?,
        }
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;

    let hash = FileHash::of_file(tmp.path())?;
    let manifest = TableManifest::new(table, file_name, format.as_str(), hash.clone())?;
    let mut tmp_manifest = NamedTempFile::new_in(&dir)?;
    serde_json::to_writer_pretty(&mut tmp_manifest, &manifest)?;
    tmp_manifest.flush()?;

    let persisted = if overwrite { tmp.persist(path) } else { tmp.persist_noclobber(path) };
    persisted.map_err(|e| match e.error.kind() {
        ErrorKind::AlreadyExists => ZonalError::OutputExists(path.to_path_buf()),
        _ => ZonalError::Io(e.error),
    })?;

    let manifest_at = manifest_path(path);
    if let Err(e) = tmp_manifest.persist(&manifest_at) {
        // A table is only ever left behind together with its manifest.
        if let Err(remove) = fs::remove_file(path) {
            warn!("[table::write] could not remove {} after manifest failure: {remove}", path.display());
        }
        return Err(ZonalError::Io(e.error));
    }

    debug!("[table::write] manifest at {}", manifest_at.display());
    info!("[table::write] wrote {} rows to {} ({format})", table.len(), path.display());

    Ok(TableLocation { path: path.to_path_buf(), manifest: manifest_at, format, sha256: hash.sha256 })
}
