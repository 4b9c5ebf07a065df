//! One end-to-end run: raster load, zone load, aggregation, persistence.

use std::{
    fmt,
    path::PathBuf,
    str::FromStr,
};

use geo::Intersects;
use tracing::{info, info_span, warn};

use crate::{
    config::ZonalConfig,
    error::{AtStage, PipelineError, Stage, ZonalError},
    io::load_zones,
    raster::{open_raster, RasterSource},
    table::{write_table, TableFormat, TableLocation},
    zonal,
};

/// TIGER/Line county bookkeeping columns with no use downstream.
pub const TIGER_COUNTY_EXTRA_FIELDS: [&str; 13] = [
    "COUNTYNS", "GEOIDFQ", "LSAD", "MTFCC", "CSAFP", "CBSAFP", "CLASSFP",
    "METDIVFP", "FUNCSTAT", "ALAND", "AWATER", "INTPTLAT", "INTPTLON",
];

/// Keep only zones whose `field` is one of `values`, e.g. `STATEFP=26,27,55`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeFilter {
    pub field: String,
    pub values: Vec<String>,
}

impl FromStr for AttributeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, values) = s.split_once('=')
            .ok_or_else(|| format!("expected FIELD=value[,value...], got '{s}'"))?;
        let field = field.trim();
        let values: Vec<String> = values.split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .collect();
        if field.is_empty() || values.is_empty() {
            return Err(format!("expected FIELD=value[,value...], got '{s}'"));
        }
        Ok(Self { field: field.to_string(), values })
    }
}

impl fmt::Display for AttributeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.field, self.values.join(","))
    }
}

/// Inputs, outputs and options of a run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub raster: PathBuf,
    pub zones: PathBuf,
    pub output: PathBuf,
    /// Zone attribute holding the identifier.
    pub id_field: String,
    pub filter: Option<AttributeFilter>,
    /// Attribute columns removed before output; unknown names are ignored.
    pub drop_fields: Vec<String>,
    /// Output format; inferred from the output extension when `None`.
    pub format: Option<TableFormat>,
    pub overwrite: bool,
    /// Warn about zones whose interiors overlap (their shared cells count twice).
    pub check_overlaps: bool,
    pub zonal: ZonalConfig,
}

impl RunConfig {
    pub const DEFAULT_ID_FIELD: &'static str = "GEOID";

    pub fn new(raster: impl Into<PathBuf>, zones: impl Into<PathBuf>, output: impl Into<PathBuf>, zonal: ZonalConfig) -> Self {
        Self {
            raster: raster.into(),
            zones: zones.into(),
            output: output.into(),
            id_field: Self::DEFAULT_ID_FIELD.to_string(),
            filter: None,
            drop_fields: Vec::new(),
            format: None,
            overwrite: false,
            check_overlaps: false,
            zonal,
        }
    }

    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    pub fn with_filter(mut self, filter: AttributeFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_drop_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.drop_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_format(mut self, format: TableFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_overlap_check(mut self, check: bool) -> Self {
        self.check_overlaps = check;
        self
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub zones: usize,
    pub imprecise: usize,
    pub total_converted: f64,
    pub location: TableLocation,
}

/// Execute a full run.
///
/// Any fatal error is tagged with the stage that raised it, and nothing is
/// written to `config.output` in that case.
pub fn run(config: &RunConfig) -> Result<RunSummary, PipelineError> {
    let format = check_config(config).at(Stage::Configuration)?;

    let raster = {
        let _span = info_span!("raster_load").entered();
        let raster = open_raster(&config.raster).at(Stage::RasterLoad)?;
        info!("[pipeline] raster {}: {}", config.raster.display(), raster.describe());
        match raster.epsg() {
            Some(code) => info!("[pipeline] zones are expected in EPSG:{code}"),
            None => warn!("[pipeline] raster declares no CRS; zones are assumed to share its coordinates"),
        }
        let sentinel = config.zonal.cleaner.no_data_sentinel;
        if let Some(declared) = raster.no_data() {
            if declared != sentinel && !(declared.is_nan() && sentinel.is_nan()) {
                warn!("[pipeline] raster declares no-data {declared} but the configured sentinel is {sentinel}");
            }
        }
        raster
    };

    let zones = {
        let _span = info_span!("zone_load").entered();
        let mut zones = load_zones(&config.zones, &config.id_field).at(Stage::ZoneLoad)?;
        info!("[pipeline] loaded {} zones from {}", zones.len(), config.zones.display());

        if let Some(filter) = &config.filter {
            zones = zones.retain_matching(&filter.field, &filter.values).at(Stage::ZoneLoad)?;
            info!("[pipeline] {} zones match {filter}", zones.len());
        }
        if !config.drop_fields.is_empty() {
            let (kept, missing) = zones.drop_fields(&config.drop_fields).at(Stage::ZoneLoad)?;
            if !missing.is_empty() {
                warn!("[pipeline] fields not present, nothing dropped: {}", missing.join(", "));
            }
            zones = kept;
        }
        if zones.is_empty() {
            warn!("[pipeline] no zones to aggregate");
        }
        if let Some(bounds) = zones.bounds() {
            if !bounds.intersects(&raster.extent()) {
                warn!("[pipeline] zones do not overlap the raster extent; check that both share a CRS");
            }
        }
        if config.check_overlaps {
            let pairs = zones.overlapping_pairs();
            for (a, b) in pairs.iter().take(10) {
                warn!("[pipeline] zones {a} and {b} overlap; shared cells are counted in both");
            }
            if pairs.len() > 10 {
                warn!("[pipeline] ... {} overlapping pairs in total", pairs.len());
            }
        }
        zones
    };

    let table = {
        let _span = info_span!("aggregation").entered();
        zonal::aggregate(raster.as_ref(), &zones, &config.zonal)
            .at(Stage::Aggregation)?
            .into_table(&zones)
            .with_config(config.zonal.clone())
    };
    for line in table.preview(5) {
        info!("[pipeline] {line}");
    }
    if !table.imprecise().is_empty() {
        warn!("[pipeline] {} zones had unusable geometry and were reported as zero", table.imprecise().len());
    }

    let location = {
        let _span = info_span!("persistence").entered();
        write_table(&table, &zones, &config.output, Some(format), config.overwrite).at(Stage::Persistence)?
    };

    Ok(RunSummary {
        zones: table.len(),
        imprecise: table.imprecise().len(),
        total_converted: table.total_converted(),
        location,
    })
}

/// Validate options before touching any input, returning the output format.
fn check_config(config: &RunConfig) -> crate::error::Result<TableFormat> {
    config.zonal.validate()?;
    if config.id_field.trim().is_empty() {
        return Err(ZonalError::InvalidConfiguration("id field must not be empty".into()));
    }
    let format = config.format.or_else(|| TableFormat::from_path(&config.output)).ok_or_else(|| {
        ZonalError::UnsupportedFormat(format!(
            "{}: cannot infer output format; use .csv, .parquet or .geojson", config.output.display()
        ))
    })?;
    if !config.overwrite && config.output.exists() {
        return Err(ZonalError::OutputExists(config.output.clone()));
    }
    Ok(format)
}
