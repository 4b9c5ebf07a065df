use std::path::PathBuf;

use carbontally::{pipeline::AttributeFilter, CoveragePolicy, TableFormat};

/// Zonal carbon totals CLI
#[derive(clap::Parser, Debug)]
#[command(name = "carbontally", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Sum a carbon raster over every zone and write one row per zone
    Run(RunArgs),

    /// Print a raster's size, georeferencing and no-data value
    Inspect(InspectArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Single-band GeoTIFF, or a directory containing one
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub raster: PathBuf,

    /// Zones as a shapefile or GeoJSON, or a directory containing one
    #[arg(long, value_hint = clap::ValueHint::AnyPath)]
    pub zones: PathBuf,

    /// Output table (.csv, .parquet or .geojson)
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: PathBuf,

    /// JSON configuration file; flags below override its values
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Raw value marking cells with no measurement, e.g. 65535
    #[arg(long, allow_negative_numbers = true)]
    pub no_data: Option<f64>,

    /// Largest raw value kept (inclusive), e.g. 173
    #[arg(long, allow_negative_numbers = true)]
    pub max_valid: Option<f64>,

    /// Multiplier applied to each zone's raw sum
    #[arg(long, conflicts_with = "pixel_area")]
    pub factor: Option<f64>,

    /// Cell area in square metres; converts CO2e per acre to carbon per cell
    #[arg(long)]
    pub pixel_area: Option<f64>,

    /// Which boundary cells count as inside a zone
    #[arg(long)]
    pub policy: Option<CoveragePolicy>,

    /// Zone attribute holding the identifier
    #[arg(long, default_value = carbontally::pipeline::RunConfig::DEFAULT_ID_FIELD)]
    pub id_field: String,

    /// Keep only zones whose FIELD is one of the values, e.g. STATEFP=26,27,55
    #[arg(long, value_name = "FIELD=VALUES")]
    pub filter: Option<AttributeFilter>,

    /// Attribute columns to leave out of the output (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub drop: Vec<String>,

    /// Leave out the TIGER/Line county bookkeeping columns
    #[arg(long)]
    pub drop_tiger_extras: bool,

    /// Output format; inferred from the output extension by default
    #[arg(long)]
    pub format: Option<TableFormat>,

    /// Replace an existing output
    #[arg(short, long)]
    pub force: bool,

    /// Aggregate zones on a single thread
    #[arg(long)]
    pub sequential: bool,

    /// Warn about zones whose interiors overlap
    #[arg(long)]
    pub check_overlaps: bool,

    /// Upper bound on cells decoded per raster read
    #[arg(long)]
    pub max_window_cells: Option<usize>,
}

#[derive(clap::Args, Debug)]
pub struct InspectArgs {
    /// Single-band GeoTIFF, or a directory containing one
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub raster: PathBuf,
}
