use anyhow::{Context, Result};
use carbontally::{
    pipeline::{self, RunConfig, TIGER_COUNTY_EXTRA_FIELDS},
    ZonalConfigFile,
};
use tracing::{info, warn};

use crate::cli::{Cli, RunArgs};

pub fn run(_cli: &Cli, args: &RunArgs) -> Result<()> {
    let file = match &args.config {
        Some(path) => ZonalConfigFile::read(path)
            .with_context(|| format!("reading configuration {}", path.display()))?,
        None => ZonalConfigFile::default(),
    };
    let overrides = ZonalConfigFile {
        no_data_sentinel: args.no_data,
        max_valid_threshold: args.max_valid,
        coverage_policy: args.policy,
        conversion_factor: args.factor,
        pixel_area_m2: args.pixel_area,
        parallel: args.sequential.then_some(false),
        max_window_cells: args.max_window_cells,
    };
    let zonal = file.merge(overrides).resolve().context("invalid configuration")?;
    info!(
        "[run] no-data {}, max valid {}, policy {}, factor {}",
        zonal.cleaner.no_data_sentinel, zonal.cleaner.max_valid_threshold, zonal.coverage_policy, zonal.conversion_factor
    );

    let mut config = RunConfig::new(&args.raster, &args.zones, &args.output, zonal)
        .with_id_field(&args.id_field)
        .with_drop_fields(args.drop.iter().cloned())
        .with_overwrite(args.force)
        .with_overlap_check(args.check_overlaps);
    if args.drop_tiger_extras {
        config = config.with_drop_fields(TIGER_COUNTY_EXTRA_FIELDS);
    }
    if let Some(filter) = &args.filter {
        config = config.with_filter(filter.clone());
    }
    if let Some(format) = args.format {
        config = config.with_format(format);
    }

    let summary = pipeline::run(&config)?;

    if summary.imprecise > 0 {
        warn!("[run] {} of {} zones reported as zero due to unusable geometry", summary.imprecise, summary.zones);
    }
    info!(
        "[run] {} zones, total {:.4}, written to {} (sha256 {})",
        summary.zones, summary.total_converted, summary.location.path.display(), summary.location.sha256
    );
    Ok(())
}
