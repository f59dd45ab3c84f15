//! Affine geotransformation for rasters

use serde::{Deserialize, Serialize};

/// Tolerance used when comparing transform coefficients.
const COEFF_TOLERANCE: f64 = 1e-9;

/// Affine transformation coefficients for georeferencing rasters.
///
/// Converts between pixel coordinates (col, row) and map coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// Everything downstream assumes north-up rasters: rotations are carried
/// for round-tripping but distances only use the pixel sizes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width
    pub pixel_width: f64,
    /// Pixel height (negative for north-up)
    pub pixel_height: f64,
    pub row_rotation: f64,
    pub col_rotation: f64,
}

impl GeoTransform {
    /// Create a north-up transform
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// Create from GDAL ordering `[origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]`
    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            origin_x: coeffs[0],
            pixel_width: coeffs[1],
            row_rotation: coeffs[2],
            origin_y: coeffs[3],
            col_rotation: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    /// Convert to GDAL ordering
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// Map coordinates of the centre of pixel (col, row)
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        let col_f = col as f64 + 0.5;
        let row_f = row as f64 + 0.5;
        (
            self.origin_x + col_f * self.pixel_width + row_f * self.row_rotation,
            self.origin_y + col_f * self.col_rotation + row_f * self.pixel_height,
        )
    }

    /// Fractional pixel coordinates (col, row) of a map position.
    ///
    /// Returns NaN for a degenerate transform.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;
        if det.abs() < 1e-12 {
            return (f64::NAN, f64::NAN);
        }

        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        (
            (self.pixel_height * dx - self.row_rotation * dy) / det,
            (-self.col_rotation * dx + self.pixel_width * dy) / det,
        )
    }

    /// Horizontal spacing between pixel centres in map units
    pub fn x_spacing(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Vertical spacing between pixel centres in map units
    pub fn y_spacing(&self) -> f64 {
        self.pixel_height.abs()
    }

    /// Whether two transforms describe the same pixel size.
    pub fn same_resolution(&self, other: &GeoTransform) -> bool {
        (self.pixel_width - other.pixel_width).abs() <= COEFF_TOLERANCE * self.x_spacing().max(1.0)
            && (self.pixel_height - other.pixel_height).abs()
                <= COEFF_TOLERANCE * self.y_spacing().max(1.0)
    }

    /// Whether two transforms describe exactly the same grid lattice and origin.
    pub fn same_grid(&self, other: &GeoTransform) -> bool {
        self.same_resolution(other)
            && (self.origin_x - other.origin_x).abs() <= COEFF_TOLERANCE * self.x_spacing().max(1.0)
            && (self.origin_y - other.origin_y).abs() <= COEFF_TOLERANCE * self.y_spacing().max(1.0)
            && (self.row_rotation - other.row_rotation).abs() <= COEFF_TOLERANCE
            && (self.col_rotation - other.col_rotation).abs() <= COEFF_TOLERANCE
    }

    /// Bounding box (min_x, min_y, max_x, max_y) of a raster of the given size
    pub fn bounds(&self, cols: usize, rows: usize) -> (f64, f64, f64, f64) {
        let corner = |col: usize, row: usize| {
            let (c, r) = (col as f64, row as f64);
            (
                self.origin_x + c * self.pixel_width + r * self.row_rotation,
                self.origin_y + c * self.col_rotation + r * self.pixel_height,
            )
        };
        let corners = [corner(0, 0), corner(cols, 0), corner(0, rows), corner(cols, rows)];

        corners.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), &(x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        )
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}
