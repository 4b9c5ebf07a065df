//! Zonal aggregation of gridded carbon density into per-region totals.
//!
//! A run reads a single-band raster ([`raster`]), a set of polygons with
//! identifiers and attributes ([`zones`]), sums the cleaned cell values under
//! each polygon ([`zonal`]), converts the sums, and persists one row per
//! polygon ([`table`]). [`pipeline::run`] wires the stages together.
//!
//! ```no_run
//! use carbontally::{pipeline::RunConfig, UnitConverter, ZonalConfig};
//!
//! let factor = UnitConverter::co2e_per_acre_to_carbon(900.0).factor();
//! let config = ZonalConfig::new(65535.0, 173.0, factor)?;
//! let run = RunConfig::new("carbon.tif", "tl_2023_us_county.shp", "carbon_by_county.csv", config);
//! let summary = carbontally::pipeline::run(&run)?;
//! println!("{} counties, {:.1} Mg C", summary.zones, summary.total_converted);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod common;

pub mod config;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod raster;
pub mod table;
pub mod zonal;
pub mod zones;

#[doc(inline)]
pub use config::{CleanerConfig, ZonalConfig, ZonalConfigFile};

#[doc(inline)]
pub use error::{PipelineError, Result, Stage, ZonalError};

#[doc(inline)]
pub use raster::{open_raster, RasterGrid, RasterSource};

#[doc(inline)]
pub use table::{write_table, OutputRow, ResultTable, TableFormat};

#[doc(inline)]
pub use zonal::{aggregate, AggregateOutput, CellCleaner, UnitConverter, ZonalStats};

#[doc(inline)]
pub use zones::{AttrValue, Zone, ZoneId, ZoneSet};

pub use gridcover::{CellWindow, CoveragePolicy, GeoTransform};
