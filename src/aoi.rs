//! Area-of-interest geometry.
//!
//! Every raster source is queried over the same AOI: the request point
//! buffered to a fixed radius and bounded to a lat/lon rectangle. The
//! rectangle is derived here so the Earth Engine expression graphs can use a
//! plain `BBox` instead of a server-side buffer round trip.

use chrono::{Duration, Utc};

/// Meters per degree of latitude (WGS84 mean).
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Half-width in degrees of the approximate field-boundary square.
const BOUNDARY_OFFSET_DEG: f64 = 0.0005;

/// Lat/lon bounding rectangle, degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

/// The bounded spatial region queried for a field-health request.
#[derive(Debug, Clone, Copy)]
pub struct Aoi {
    pub lat: f64,
    pub lon: f64,
    pub bounds: BoundingBox,
}

impl Aoi {
    /// Buffer `(lat, lon)` by `radius_meters` and bound to a rectangle.
    ///
    /// The longitude span widens toward the poles with `1/cos(lat)`; at the
    /// poles the cosine is clamped to keep the box finite.
    pub fn new(lat: f64, lon: f64, radius_meters: f64) -> Self {
        let dlat = radius_meters / METERS_PER_DEGREE;
        let cos_lat = lat.to_radians().cos().abs().max(1e-6);
        let dlon = radius_meters / (METERS_PER_DEGREE * cos_lat);

        Aoi {
            lat,
            lon,
            bounds: BoundingBox {
                west: lon - dlon,
                south: lat - dlat,
                east: lon + dlon,
                north: lat + dlat,
            },
        }
    }

    /// Approximate field boundary shown on the map: a fixed ±0.0005° square
    /// around the point, corners in `[lat, lon]` order (SW, NW, NE, SE).
    /// Not derived from any actual field geometry.
    pub fn field_boundary(&self) -> [[f64; 2]; 4] {
        let d = BOUNDARY_OFFSET_DEG;
        [
            [self.lat - d, self.lon - d],
            [self.lat + d, self.lon - d],
            [self.lat + d, self.lon + d],
            [self.lat - d, self.lon + d],
        ]
    }
}

/// Trailing scene-selection window ending now, as epoch milliseconds
/// `(start, end)`.
pub fn trailing_window(days: i64) -> (i64, i64) {
    let end = Utc::now();
    let start = end - Duration::days(days);
    (start.timestamp_millis(), end.timestamp_millis())
}
