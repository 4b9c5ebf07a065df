use geo::{Area, BoundingRect, MultiPolygon};
use gridcover::{rasterize, window_for_bounds, CoveragePolicy, RasterizeError};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::{
    config::ZonalConfig,
    error::{Result, ZonalError},
    raster::RasterSource,
    zones::{Zone, ZoneId, ZoneSet},
};
use super::{CellCleaner, ZonalStats};

/// Aggregate of one zone, tagged with its identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneResult {
    pub id: ZoneId,
    pub stats: ZonalStats,
    /// Set when the zone's geometry was unusable and a zero result was substituted.
    pub imprecise: Option<String>,
}

/// Reduces raster cells covered by each zone to [`ZonalStats`].
///
/// The raster is only read, never materialized as a whole: each zone reads its
/// bounding window in row bands of at most `max_window_cells` cells.
pub struct ZonalAggregator<'a> {
    raster: &'a dyn RasterSource,
    cleaner: CellCleaner,
    policy: CoveragePolicy,
    max_window_cells: usize,
}

impl<'a> ZonalAggregator<'a> {
    pub fn new(raster: &'a dyn RasterSource, cleaner: CellCleaner, policy: CoveragePolicy) -> Self {
        Self { raster, cleaner, policy, max_window_cells: ZonalConfig::DEFAULT_MAX_WINDOW_CELLS }
    }

    pub fn from_config(raster: &'a dyn RasterSource, config: &ZonalConfig) -> Self {
        Self::new(raster, CellCleaner::from(&config.cleaner), config.coverage_policy)
            .with_max_window_cells(config.max_window_cells)
    }

    pub fn with_max_window_cells(mut self, max_window_cells: usize) -> Self {
        self.max_window_cells = max_window_cells.max(1);
        self
    }

    /// Sum and count of the valid values under `zone`.
    ///
    /// Zones outside the raster extent yield zeros. Degenerate geometry fails
    /// with [`ZonalError::ImpreciseGeometry`]; read failures with
    /// [`ZonalError::RasterUnavailable`].
    pub fn aggregate_zone(&self, zone: &Zone) -> Result<ZonalStats> {
        let shape = usable_parts(zone)?;
        let (rows, cols) = self.raster.shape();
        let transform = self.raster.transform();

        let Some(bounds) = shape.bounding_rect() else { return Ok(ZonalStats::default()) };
        let Some(window) = window_for_bounds(transform, &bounds, rows, cols) else {
            debug!("[zonal] zone {} lies outside the raster", zone.id);
            return Ok(ZonalStats::default());
        };

        let mut stats = ZonalStats::default();
        for band in window.bands(self.max_window_cells) {
            let mask = rasterize(&shape, transform, band, self.policy).map_err(|e| match e {
                RasterizeError::NonFiniteCoordinate { .. } => ZonalError::ImpreciseGeometry {
                    zone: zone.id.clone(),
                    reason: e.to_string(),
                },
                RasterizeError::SingularTransform => ZonalError::RasterUnavailable {
                    window: band,
                    reason: e.to_string(),
                },
            })?;
            if mask.count() == 0 {
                continue;
            }

            let values = self.raster.read_window(&band)?;
            stats.merge(mask.cells()
                .map(|(row, col)| self.cleaner.clean(values[[row - band.row_off, col - band.col_off]]))
                .collect());
        }

        debug!(
            "[zonal] zone {}: {} cells in {}, sum {}, mean {:?}",
            zone.id, stats.count, window, stats.sum, stats.mean()
        );
        Ok(stats)
    }

    /// Aggregate every zone of `zones`, in set order.
    ///
    /// Imprecise zones are logged and reported with zero stats; any other
    /// error aborts the whole aggregation.
    pub fn aggregate(&self, zones: &ZoneSet, parallel: bool) -> Result<Vec<ZoneResult>> {
        if parallel {
            zones.zones().par_iter().map(|zone| self.zone_result(zone)).collect()
        } else {
            zones.iter().map(|zone| self.zone_result(zone)).collect()
        }
    }

    fn zone_result(&self, zone: &Zone) -> Result<ZoneResult> {
        match self.aggregate_zone(zone) {
            Ok(stats) => Ok(ZoneResult { id: zone.id.clone(), stats, imprecise: None }),
            Err(ZonalError::ImpreciseGeometry { zone: id, reason }) => {
                warn!("[zonal] zone {id}: {reason}; reporting zero");
                Ok(ZoneResult { id, stats: ZonalStats::default(), imprecise: Some(reason) })
            }
            Err(e) => Err(e),
        }
    }
}

/// Parts of `zone` with positive area. Fails if a vertex is not finite or no
/// part has any area.
fn usable_parts(zone: &Zone) -> Result<MultiPolygon<f64>> {
    let imprecise = |reason: &str| ZonalError::ImpreciseGeometry { zone: zone.id.clone(), reason: reason.into() };

    let finite = zone.shape.0.iter()
        .flat_map(|polygon| std::iter::once(polygon.exterior()).chain(polygon.interiors()))
        .flat_map(|ring| ring.0.iter())
        .all(|c| c.x.is_finite() && c.y.is_finite());
    if !finite {
        return Err(imprecise("geometry has a non-finite vertex"));
    }

    let parts: Vec<_> = zone.shape.0.iter()
        .filter(|polygon| polygon.unsigned_area() > 0.0)
        .cloned()
        .collect();
    if parts.is_empty() {
        return Err(imprecise("geometry has zero area"));
    }
    if parts.len() < zone.shape.0.len() {
        debug!("[zonal] zone {}: skipped {} zero-area part(s)", zone.id, zone.shape.0.len() - parts.len());
    }
    Ok(MultiPolygon(parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{raster::RasterGrid, zones::AttrValue};
    use geo::{polygon, LineString, Polygon};
    use gridcover::GeoTransform;
    use ndarray::array;

    fn raster() -> RasterGrid {
        let values = array![
            [10.0, 65535.0, 20.0, 200.0],
            [30.0, 40.0, 50.0, 60.0],
            [0.0, 0.0, 0.0, 0.0],
            [5.0, 5.0, 5.0, 5.0],
        ];
        // Top-left corner at the origin, rows running south.
        RasterGrid::new(values, GeoTransform::north_up(0.0, 0.0, 1.0, 1.0), Some(65535.0)).unwrap()
    }

    fn block(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        polygon![(x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1)].into()
    }

    fn zone(id: &str, shape: MultiPolygon<f64>) -> Zone {
        Zone::new(id, shape, vec![])
    }

    fn aggregator(raster: &RasterGrid) -> ZonalAggregator<'_> {
        ZonalAggregator::new(raster, CellCleaner::new(65535.0, 173.0), CoveragePolicy::CenterIn)
    }

    #[test]
    fn top_left_block_skips_the_sentinel() {
        let raster = raster();
        let stats = aggregator(&raster).aggregate_zone(&zone("tl", block(0.0, -2.0, 2.0, 0.0))).unwrap();
        assert_eq!(stats, ZonalStats { sum: 80.0, count: 3 });
    }

    #[test]
    fn top_right_block_clips_above_threshold() {
        let raster = raster();
        let stats = aggregator(&raster).aggregate_zone(&zone("tr", block(2.0, -2.0, 4.0, 0.0))).unwrap();
        assert_eq!(stats, ZonalStats { sum: 130.0, count: 3 });
    }

    #[test]
    fn zone_outside_the_raster_is_zero() {
        let raster = raster();
        let stats = aggregator(&raster).aggregate_zone(&zone("far", block(50.0, 50.0, 60.0, 60.0))).unwrap();
        assert_eq!(stats, ZonalStats::default());
        assert!(stats.sum.is_finite());
    }

    #[test]
    fn zone_clipped_by_the_raster_edge() {
        let raster = raster();
        // Bottom two rows plus a strip beyond the left edge.
        let stats = aggregator(&raster).aggregate_zone(&zone("edge", block(-3.0, -4.0, 4.0, -2.0))).unwrap();
        assert_eq!(stats, ZonalStats { sum: 20.0, count: 8 });
    }

    #[test]
    fn banded_reads_match_a_single_read() {
        let raster = raster();
        let whole = block(0.0, -4.0, 4.0, 0.0);
        let single = aggregator(&raster).aggregate_zone(&zone("all", whole.clone())).unwrap();
        let banded = aggregator(&raster).with_max_window_cells(3).aggregate_zone(&zone("all", whole)).unwrap();
        assert_eq!(single, banded);
        assert_eq!(single, ZonalStats { sum: 10.0 + 20.0 + 30.0 + 40.0 + 50.0 + 60.0 + 20.0, count: 14 });
    }

    #[test]
    fn zero_area_zone_is_imprecise() {
        let raster = raster();
        let line = Polygon::new(LineString::from(vec![(0.0, 0.0), (2.0, -2.0), (0.0, 0.0)]), vec![]);
        let err = aggregator(&raster).aggregate_zone(&zone("flat", MultiPolygon(vec![line]))).unwrap_err();
        assert!(matches!(err, ZonalError::ImpreciseGeometry { .. }));
    }

    #[test]
    fn zero_area_parts_are_ignored() {
        let raster = raster();
        let mut shape = block(0.0, -2.0, 2.0, 0.0);
        shape.0.push(Polygon::new(LineString::from(vec![(3.5, -3.5), (3.5, -3.5), (3.5, -3.5)]), vec![]));
        let stats = aggregator(&raster).aggregate_zone(&zone("tl", shape)).unwrap();
        assert_eq!(stats, ZonalStats { sum: 80.0, count: 3 });
    }

    #[test]
    fn imprecise_zones_become_zero_rows() {
        let raster = raster();
        let nan = Polygon::new(LineString::from(vec![(0.0, 0.0), (f64::NAN, -1.0), (1.0, -1.0), (0.0, 0.0)]), vec![]);
        let zones = ZoneSet::new("id", vec!["name".into()], vec![
            Zone::new("ok", block(0.0, -2.0, 2.0, 0.0), vec![AttrValue::Text("a".into())]),
            Zone::new("bad", MultiPolygon(vec![nan]), vec![AttrValue::Text("b".into())]),
        ]).unwrap();

        let results = aggregator(&raster).aggregate(&zones, false).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].stats, ZonalStats { sum: 80.0, count: 3 });
        assert_eq!(results[1].id, ZoneId::from("bad"));
        assert_eq!(results[1].stats, ZonalStats::default());
        assert!(results[1].imprecise.is_some());
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let raster = raster();
        let zones = ZoneSet::new("id", vec![], (0..4)
            .map(|i| {
                let (x, y) = ((i % 2) as f64 * 2.0, -((i / 2) as f64) * 2.0);
                zone(&format!("z{i}"), block(x, y - 2.0, x + 2.0, y))
            })
            .collect()).unwrap();

        let agg = aggregator(&raster);
        let sequential = agg.aggregate(&zones, false).unwrap();
        let parallel = agg.aggregate(&zones, true).unwrap();
        assert_eq!(sequential, parallel);
        let ids: Vec<_> = parallel.iter().map(|r| r.id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["z0", "z1", "z2", "z3"]);
    }

    #[test]
    fn all_touched_adds_partially_covered_cells() {
        let raster = raster();
        let small = block(0.6, -1.4, 1.4, -0.6); // around the shared corner of the top-left block
        let center = aggregator(&raster).aggregate_zone(&zone("s", small.clone())).unwrap();
        assert_eq!(center, ZonalStats::default());

        let touched = ZonalAggregator::new(&raster, CellCleaner::new(65535.0, 173.0), CoveragePolicy::AllTouched)
            .aggregate_zone(&zone("s", small))
            .unwrap();
        assert_eq!(touched, ZonalStats { sum: 80.0, count: 3 });
    }
}
