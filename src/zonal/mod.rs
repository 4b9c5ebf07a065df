//! Cell cleaning, per-zone aggregation and unit conversion.

mod aggregate;
mod cleaner;
mod stats;
mod units;

pub use aggregate::{ZonalAggregator, ZoneResult};
pub use cleaner::CellCleaner;
pub use stats::ZonalStats;
pub use units::{UnitConverter, CARBON_FRACTION_OF_CO2, SQUARE_METRES_PER_ACRE};

use tracing::info;

use crate::{
    config::ZonalConfig,
    error::Result,
    raster::RasterSource,
    table::{OutputRow, ResultTable},
    zones::{ZoneId, ZoneSet},
};

/// Rows produced by [`aggregate`], in zone-set order.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOutput {
    pub rows: Vec<OutputRow>,
    /// Zones reported with zero stats because their geometry was unusable.
    pub imprecise: Vec<ZoneId>,
}

impl AggregateOutput {
    /// Attach the schema of `zones` (which must be the set that was aggregated).
    pub fn into_table(self, zones: &ZoneSet) -> ResultTable {
        ResultTable::new(zones, self.rows).with_imprecise(self.imprecise)
    }
}

/// Aggregate `raster` over every zone and convert the sums.
///
/// Output is deterministic for identical inputs, whether or not the
/// aggregation runs in parallel.
pub fn aggregate(raster: &dyn RasterSource, zones: &ZoneSet, config: &ZonalConfig) -> Result<AggregateOutput> {
    config.validate()?;
    let converter = UnitConverter::new(config.conversion_factor);
    let results = ZonalAggregator::from_config(raster, config).aggregate(zones, config.parallel)?;
    let table = ResultTable::build(zones, &results, &converter)?;

    info!(
        "[zonal] aggregated {} zones ({} imprecise), converted total {:.4}",
        table.len(), table.imprecise().len(), table.total_converted()
    );

    let imprecise = table.imprecise().to_vec();
    Ok(AggregateOutput { rows: table.into_rows(), imprecise })
}
