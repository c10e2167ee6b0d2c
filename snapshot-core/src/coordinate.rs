//! Fixed-precision geographic coordinates and bounding boxes.
//!
//! Snapshots store latitude and longitude as signed integers scaled by
//! `10^7`. [`Coordinate`] keeps that representation so values read back
//! from a snapshot compare exactly with the values written.

use geo::{Coord, Rect};
use thiserror::Error;

/// Scale applied to degrees before they are stored.
pub const COORDINATE_SCALE: f64 = 10_000_000.0;

const MAX_LATITUDE_E7: i32 = 900_000_000;
const MAX_LONGITUDE_E7: i32 = 1_800_000_000;

/// Errors returned when constructing a [`Coordinate`] or [`BoundingBox`].
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CoordinateError {
    /// Latitude was not finite or fell outside `[-90, 90]`.
    #[error("latitude {0} is outside [-90, 90]")]
    Latitude(f64),
    /// Longitude was not finite or fell outside `[-180, 180]`.
    #[error("longitude {0} is outside [-180, 180]")]
    Longitude(f64),
    /// A bounding box had a minimum corner above or right of its maximum.
    #[error("bounding box minimum ({min_lat}, {min_lon}) exceeds maximum ({max_lat}, {max_lon})")]
    InvertedBox {
        /// Southern edge in degrees.
        min_lat: f64,
        /// Western edge in degrees.
        min_lon: f64,
        /// Northern edge in degrees.
        max_lat: f64,
        /// Eastern edge in degrees.
        max_lon: f64,
    },
}

/// A WGS84 position stored as degrees scaled by `10^7`.
///
/// # Examples
///
/// ```
/// use snapshot_core::Coordinate;
///
/// # fn main() -> Result<(), snapshot_core::CoordinateError> {
/// let coordinate = Coordinate::from_degrees(51.5, -0.12)?;
/// assert_eq!(coordinate.lat_e7(), 515_000_000);
/// assert!((coordinate.longitude() + 0.12).abs() < 1e-7);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Coordinate {
    lat_e7: i32,
    lon_e7: i32,
}

impl Coordinate {
    /// Build a coordinate from degrees, rounding to the stored precision.
    pub fn from_degrees(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::Latitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::Longitude(longitude));
        }
        Ok(Self {
            lat_e7: scale(latitude),
            lon_e7: scale(longitude),
        })
    }

    /// Build a coordinate from already scaled values.
    pub fn from_scaled(lat_e7: i32, lon_e7: i32) -> Result<Self, CoordinateError> {
        if !(-MAX_LATITUDE_E7..=MAX_LATITUDE_E7).contains(&lat_e7) {
            return Err(CoordinateError::Latitude(unscale(lat_e7)));
        }
        if !(-MAX_LONGITUDE_E7..=MAX_LONGITUDE_E7).contains(&lon_e7) {
            return Err(CoordinateError::Longitude(unscale(lon_e7)));
        }
        Ok(Self { lat_e7, lon_e7 })
    }

    /// Scaled latitude.
    #[must_use]
    pub const fn lat_e7(&self) -> i32 {
        self.lat_e7
    }

    /// Scaled longitude.
    #[must_use]
    pub const fn lon_e7(&self) -> i32 {
        self.lon_e7
    }

    /// Latitude in degrees.
    #[must_use]
    pub fn latitude(&self) -> f64 {
        unscale(self.lat_e7)
    }

    /// Longitude in degrees.
    #[must_use]
    pub fn longitude(&self) -> f64 {
        unscale(self.lon_e7)
    }
}

impl From<Coordinate> for Coord<f64> {
    fn from(coordinate: Coordinate) -> Self {
        Coord {
            x: coordinate.longitude(),
            y: coordinate.latitude(),
        }
    }
}

impl TryFrom<Coord<f64>> for Coordinate {
    type Error = CoordinateError;

    fn try_from(coord: Coord<f64>) -> Result<Self, Self::Error> {
        Self::from_degrees(coord.y, coord.x)
    }
}

// Callers range-check degrees, so the scaled value always fits.
fn scale(degrees: f64) -> i32 {
    (degrees * COORDINATE_SCALE).round() as i32
}

fn unscale(scaled: i32) -> f64 {
    f64::from(scaled) / COORDINATE_SCALE
}

/// An inclusive latitude/longitude rectangle.
///
/// Boxes crossing the antimeridian are not supported; the western edge must
/// not exceed the eastern edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingBox {
    min: Coordinate,
    max: Coordinate,
}

impl BoundingBox {
    /// Build a box from its south-west and north-east corners.
    pub fn new(min: Coordinate, max: Coordinate) -> Result<Self, CoordinateError> {
        if min.lat_e7 > max.lat_e7 || min.lon_e7 > max.lon_e7 {
            return Err(CoordinateError::InvertedBox {
                min_lat: min.latitude(),
                min_lon: min.longitude(),
                max_lat: max.latitude(),
                max_lon: max.longitude(),
            });
        }
        Ok(Self { min, max })
    }

    /// Build a box from edges in degrees.
    pub fn from_degrees(
        min_lat: f64,
        min_lon: f64,
        max_lat: f64,
        max_lon: f64,
    ) -> Result<Self, CoordinateError> {
        Self::new(
            Coordinate::from_degrees(min_lat, min_lon)?,
            Coordinate::from_degrees(max_lat, max_lon)?,
        )
    }

    /// South-west corner.
    #[must_use]
    pub const fn min(&self) -> Coordinate {
        self.min
    }

    /// North-east corner.
    #[must_use]
    pub const fn max(&self) -> Coordinate {
        self.max
    }

    /// Whether `coordinate` lies inside the box, edges included.
    #[must_use]
    pub const fn contains(&self, coordinate: &Coordinate) -> bool {
        coordinate.lat_e7 >= self.min.lat_e7
            && coordinate.lat_e7 <= self.max.lat_e7
            && coordinate.lon_e7 >= self.min.lon_e7
            && coordinate.lon_e7 <= self.max.lon_e7
    }

    /// Grow the box so it covers `coordinate`.
    #[must_use]
    pub fn including(self, coordinate: Coordinate) -> Self {
        Self {
            min: Coordinate {
                lat_e7: self.min.lat_e7.min(coordinate.lat_e7),
                lon_e7: self.min.lon_e7.min(coordinate.lon_e7),
            },
            max: Coordinate {
                lat_e7: self.max.lat_e7.max(coordinate.lat_e7),
                lon_e7: self.max.lon_e7.max(coordinate.lon_e7),
            },
        }
    }

    /// Degenerate box covering a single point.
    #[must_use]
    pub const fn point(coordinate: Coordinate) -> Self {
        Self {
            min: coordinate,
            max: coordinate,
        }
    }
}

impl From<BoundingBox> for Rect<f64> {
    fn from(bbox: BoundingBox) -> Self {
        Rect::new(Coord::from(bbox.min), Coord::from(bbox.max))
    }
}

impl TryFrom<Rect<f64>> for BoundingBox {
    type Error = CoordinateError;

    fn try_from(rect: Rect<f64>) -> Result<Self, Self::Error> {
        Self::new(
            Coordinate::try_from(rect.min())?,
            Coordinate::try_from(rect.max())?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 0.0, 0, 0)]
    #[case(51.507_350_9, -0.127_758_3, 515_073_509, -1_277_583)]
    #[case(-90.0, 180.0, -900_000_000, 1_800_000_000)]
    fn degrees_scale_to_integers(
        #[case] lat: f64,
        #[case] lon: f64,
        #[case] lat_e7: i32,
        #[case] lon_e7: i32,
    ) {
        let coordinate = Coordinate::from_degrees(lat, lon).expect("valid coordinate");
        assert_eq!(coordinate.lat_e7(), lat_e7);
        assert_eq!(coordinate.lon_e7(), lon_e7);
    }

    #[rstest]
    #[case(90.000_1, 0.0)]
    #[case(f64::NAN, 0.0)]
    fn latitude_out_of_range_is_rejected(#[case] lat: f64, #[case] lon: f64) {
        assert!(matches!(
            Coordinate::from_degrees(lat, lon),
            Err(CoordinateError::Latitude(_))
        ));
    }

    #[rstest]
    fn longitude_out_of_range_is_rejected() {
        assert!(matches!(
            Coordinate::from_degrees(0.0, -180.5),
            Err(CoordinateError::Longitude(_))
        ));
        assert!(matches!(
            Coordinate::from_scaled(0, 1_800_000_001),
            Err(CoordinateError::Longitude(_))
        ));
    }

    #[rstest]
    fn geo_coord_uses_longitude_as_x() {
        let coordinate = Coordinate::from_degrees(10.0, 20.0).expect("valid coordinate");
        let coord = Coord::from(coordinate);
        assert!((coord.x - 20.0).abs() < 1e-9);
        assert!((coord.y - 10.0).abs() < 1e-9);
    }

    #[rstest]
    fn box_contains_its_edges() {
        let bbox = BoundingBox::from_degrees(0.0, 0.0, 1.0, 1.0).expect("valid box");
        let corner = Coordinate::from_degrees(1.0, 0.0).expect("valid coordinate");
        let outside = Coordinate::from_degrees(1.000_000_1, 0.5).expect("valid coordinate");
        assert!(bbox.contains(&corner));
        assert!(!bbox.contains(&outside));
    }

    #[rstest]
    fn inverted_box_is_rejected() {
        assert!(matches!(
            BoundingBox::from_degrees(1.0, 0.0, 0.0, 1.0),
            Err(CoordinateError::InvertedBox { .. })
        ));
    }

    #[rstest]
    fn including_grows_the_box() {
        let origin = Coordinate::from_degrees(0.0, 0.0).expect("valid coordinate");
        let far = Coordinate::from_degrees(-2.0, 3.0).expect("valid coordinate");
        let bbox = BoundingBox::point(origin).including(far);
        assert_eq!(bbox.min().lat_e7(), -20_000_000);
        assert_eq!(bbox.max().lon_e7(), 30_000_000);
    }
}
