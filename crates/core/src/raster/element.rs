//! Cell value types

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// No-data value assigned to rasters that arrive without one.
pub const DEFAULT_NODATA: f64 = -9999.0;

/// Trait for types that can be stored in a raster cell.
pub trait RasterElement:
    Copy + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Whether this type is a floating point type
    fn is_float() -> bool;

    /// Check if this value represents no-data
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    /// Widen to f64 (always succeeds for the implemented types)
    fn as_f64(self) -> f64 {
        NumCast::from(self).unwrap_or(f64::NAN)
    }

    /// Narrow from f64, rounding for integer types. `None` if out of range.
    fn from_f64(value: f64) -> Option<Self>;
}

macro_rules! impl_raster_element_int {
    ($($t:ty),*) => {$(
        impl RasterElement for $t {
            fn is_float() -> bool {
                false
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                nodata == Some(*self)
            }

            fn from_f64(value: f64) -> Option<Self> {
                NumCast::from(value.round())
            }
        }
    )*};
}

macro_rules! impl_raster_element_float {
    ($($t:ty),*) => {$(
        impl RasterElement for $t {
            fn is_float() -> bool {
                true
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                if self.is_nan() {
                    return true;
                }
                match nodata {
                    Some(nd) if nd.is_nan() => false,
                    Some(nd) => (self - nd).abs() <= <$t>::EPSILON * nd.abs().max(1.0),
                    None => false,
                }
            }

            fn from_f64(value: f64) -> Option<Self> {
                NumCast::from(value)
            }
        }
    )*};
}

impl_raster_element_int!(u8, u16, i16, u32, i32);
impl_raster_element_float!(f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_nodata_matches_sentinel_and_nan() {
        assert!((-9999.0f64).is_nodata(Some(-9999.0)));
        assert!(f32::NAN.is_nodata(None));
        assert!(!0.0f64.is_nodata(Some(-9999.0)));
    }

    #[test]
    fn test_int_rounding() {
        assert_eq!(i32::from_f64(6.5), Some(7));
        assert_eq!(i32::from_f64(-9999.0), Some(-9999));
        assert_eq!(u8::from_f64(300.0), None);
    }
}
