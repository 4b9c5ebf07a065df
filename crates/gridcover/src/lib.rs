//! # gridcover
//!
//! Polygon-to-grid coverage for rasters referenced by an affine transform.
//!
//! Given a `geo::MultiPolygon` in world coordinates and a raster grid described
//! by a [`GeoTransform`], [`rasterize`] decides which cells of a [`CellWindow`]
//! are covered by the polygon under a [`CoveragePolicy`]:
//!
//! - [`CoveragePolicy::CenterIn`]: a cell is covered when its center point is
//!   inside the polygon or on its boundary.
//! - [`CoveragePolicy::AllTouched`]: a cell is covered when its footprint
//!   meets the polygon interior or is crossed by the polygon boundary.
//!
//! Rings are mapped into pixel space before scanning, so rotated grids are
//! handled without approximation. Holes and multi-part polygons are supported;
//! ring winding does not matter (even-odd fill per part).
//!
//! ```
//! use geo::polygon;
//! use gridcover::{rasterize, window_for_bounds, CoveragePolicy, GeoTransform};
//! use geo::{BoundingRect, MultiPolygon};
//!
//! let transform = GeoTransform::north_up(0.0, 4.0, 1.0, 1.0);
//! let square: MultiPolygon<f64> = polygon![
//!     (x: 0.0, y: 4.0), (x: 2.0, y: 4.0), (x: 2.0, y: 2.0), (x: 0.0, y: 2.0),
//! ].into();
//!
//! let bounds = square.bounding_rect().unwrap();
//! let window = window_for_bounds(&transform, &bounds, 4, 4).unwrap();
//! let mask = rasterize(&square, &transform, window, CoveragePolicy::CenterIn).unwrap();
//! assert_eq!(mask.count(), 4);
//! ```

mod affine;
mod mask;
mod policy;
mod rasterize;
mod window;

pub use affine::GeoTransform;
pub use mask::CoverageMask;
pub use policy::{CoveragePolicy, ParsePolicyError};
pub use rasterize::{rasterize, RasterizeError};
pub use window::{window_for_bounds, CellWindow};
