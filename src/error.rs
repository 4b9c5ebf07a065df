//! Error types for zonal aggregation.

use std::{fmt, path::PathBuf};

use gridcover::CellWindow;
use thiserror::Error;

use crate::zones::ZoneId;

/// Errors that can occur while loading inputs, aggregating, or persisting results.
#[derive(Debug, Error)]
pub enum ZonalError {
    /// The raster source could not supply values for a window. Fatal for the run.
    #[error("raster unavailable for window {window}: {reason}")]
    RasterUnavailable {
        /// Window that was requested.
        window: CellWindow,
        /// Underlying failure.
        reason: String,
    },

    /// A zone's geometry is degenerate. Recoverable: the zone yields a zero row.
    #[error("imprecise geometry for zone {zone}: {reason}")]
    ImpreciseGeometry {
        /// Zone whose geometry was rejected.
        zone: ZoneId,
        /// What made the geometry unusable.
        reason: String,
    },

    /// A result could not be joined to a zone. Signals a bookkeeping bug.
    #[error("identifier mismatch: {0}")]
    IdentifierMismatch(String),

    /// Missing or malformed configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An input path does not exist.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// An input exists but cannot be read as a supported format.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The polygon set is malformed (duplicate identifiers, schema mismatch).
    #[error("invalid zones: {0}")]
    InvalidZones(String),

    /// The output already exists and overwriting was not requested.
    #[error("output already exists: {} (pass --force to overwrite)", .0.display())]
    OutputExists(PathBuf),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Table construction or serialization error.
    #[error("table error: {0}")]
    Table(#[from] polars::prelude::PolarsError),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for zonal operations.
pub type Result<T> = std::result::Result<T, ZonalError>;

/// Stage of a pipeline run, used to attribute fatal errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configuration,
    RasterLoad,
    ZoneLoad,
    Aggregation,
    Persistence,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Configuration => "configuration",
            Stage::RasterLoad => "raster load",
            Stage::ZoneLoad => "zone load",
            Stage::Aggregation => "aggregation",
            Stage::Persistence => "persistence",
        })
    }
}

/// A fatal error tagged with the pipeline stage that raised it.
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: ZonalError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: ZonalError) -> Self {
        Self { stage, source }
    }
}

/// Attach a stage to a fallible result.
pub(crate) trait AtStage<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, PipelineError>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, PipelineError> {
        self.map_err(|e| PipelineError::new(stage, e))
    }
}
