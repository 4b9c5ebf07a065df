use geo::Coord;

/// Affine mapping between grid indices and world coordinates.
///
/// Coefficients follow the GDAL ordering:
///
/// ```text
/// x = origin_x + col * pixel_width     + row * row_rotation
/// y = origin_y + col * column_rotation + row * pixel_height
/// ```
///
/// `(col, row) = (0, 0)` is the outer corner of the first cell, so the center
/// of cell `(row, col)` sits at `(col + 0.5, row + 0.5)` in pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub column_rotation: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(
        origin_x: f64,
        pixel_width: f64,
        row_rotation: f64,
        origin_y: f64,
        column_rotation: f64,
        pixel_height: f64,
    ) -> Self {
        Self { origin_x, pixel_width, row_rotation, origin_y, column_rotation, pixel_height }
    }

    /// Unrotated transform for a north-up raster whose top-left corner is
    /// `(origin_x, origin_y)`. `pixel_height` is given as a positive size and
    /// stored negated (rows run southward).
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self::new(origin_x, pixel_width, 0.0, origin_y, 0.0, -pixel_height.abs())
    }

    /// Build from a GDAL-style six-element geotransform.
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self::new(gt[0], gt[1], gt[2], gt[3], gt[4], gt[5])
    }

    /// The GDAL-style six-element geotransform.
    pub fn to_gdal(&self) -> [f64; 6] {
        [self.origin_x, self.pixel_width, self.row_rotation, self.origin_y, self.column_rotation, self.pixel_height]
    }

    #[inline]
    pub fn determinant(&self) -> f64 {
        self.pixel_width * self.pixel_height - self.row_rotation * self.column_rotation
    }

    #[inline]
    pub fn is_invertible(&self) -> bool {
        let det = self.determinant();
        det.is_finite() && det != 0.0
    }

    /// World-space area of a single cell.
    #[inline]
    pub fn pixel_area(&self) -> f64 { self.determinant().abs() }

    /// World coordinate of a (possibly fractional) pixel-space position.
    #[inline]
    pub fn to_world(&self, col: f64, row: f64) -> Coord<f64> {
        Coord {
            x: self.origin_x + col * self.pixel_width + row * self.row_rotation,
            y: self.origin_y + col * self.column_rotation + row * self.pixel_height,
        }
    }

    /// World coordinate of the center of cell `(row, col)`.
    #[inline]
    pub fn cell_center(&self, row: usize, col: usize) -> Coord<f64> {
        self.to_world(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Pixel-space position `(x = col, y = row)` of a world coordinate.
    /// Returns `None` when the transform is singular.
    pub fn to_pixel(&self, x: f64, y: f64) -> Option<Coord<f64>> {
        let det = self.determinant();
        if !det.is_finite() || det == 0.0 {
            return None;
        }
        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        Some(Coord {
            x: (dx * self.pixel_height - dy * self.row_rotation) / det,
            y: (dy * self.pixel_width - dx * self.column_rotation) / det,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn north_up_negates_height() {
        let gt = GeoTransform::north_up(10.0, 20.0, 30.0, 30.0);
        assert_eq!(gt.pixel_height, -30.0);
        assert_eq!(gt.pixel_area(), 900.0);
    }

    #[test]
    fn world_and_pixel_are_inverse() {
        let gt = GeoTransform::new(500.0, 2.0, 0.5, 1000.0, -0.25, -3.0);
        let world = gt.to_world(7.25, 3.5);
        let pixel = gt.to_pixel(world.x, world.y).unwrap();
        assert!((pixel.x - 7.25).abs() < 1e-9);
        assert!((pixel.y - 3.5).abs() < 1e-9);
    }

    #[test]
    fn cell_center_is_half_a_cell_in() {
        let gt = GeoTransform::north_up(0.0, 0.0, 1.0, 1.0);
        assert_eq!(gt.cell_center(0, 0), Coord { x: 0.5, y: -0.5 });
        assert_eq!(gt.cell_center(2, 3), Coord { x: 3.5, y: -2.5 });
    }

    #[test]
    fn singular_transform_has_no_inverse() {
        let gt = GeoTransform::new(0.0, 1.0, 1.0, 0.0, 1.0, 1.0);
        assert!(!gt.is_invertible());
        assert!(gt.to_pixel(1.0, 1.0).is_none());
    }

    #[test]
    fn gdal_round_trip() {
        let gt = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(GeoTransform::from_gdal(gt).to_gdal(), gt);
    }
}
