use anyhow::{Context, Result};
use carbontally::{open_raster, RasterSource};

use crate::cli::{Cli, InspectArgs};

pub fn run(cli: &Cli, args: &InspectArgs) -> Result<()> {
    let raster = open_raster(&args.raster)
        .with_context(|| format!("opening raster {}", args.raster.display()))?;

    let (rows, cols) = raster.shape();
    let extent = raster.extent();
    println!("raster:     {}", args.raster.display());
    println!("size:       {rows} rows x {cols} cols");
    println!("crs:        {}", raster.epsg().map_or_else(|| "unknown".to_string(), |code| format!("EPSG:{code}")));
    println!("transform:  {:?}", raster.transform().to_gdal());
    println!("extent:     ({}, {}) - ({}, {})", extent.min().x, extent.min().y, extent.max().x, extent.max().y);
    println!("cell area:  {}", raster.transform().pixel_area());
    println!("no-data:    {}", raster.no_data().map_or_else(|| "none".to_string(), |v| v.to_string()));
    if cli.verbose > 0 {
        println!("summary:    {}", raster.describe());
    }
    Ok(())
}
