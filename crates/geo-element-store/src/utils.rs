//! Utility functions for projection clamping and fixed-point coordinate conversion

use std::f64::consts::PI;

/// Maximum latitude that can be represented in Web Mercator
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Minimum latitude that can be represented in Web Mercator
pub const MIN_LATITUDE: f64 = -MAX_LATITUDE;

pub const MAX_LONGITUDE: f64 = 180.0;
pub const MIN_LONGITUDE: f64 = -180.0;

/// Scale factor of the fixed-point representation used by the clipper (7 decimal digits)
pub const COORDINATE_SCALE: f64 = 1e7;

/// Clamp a latitude into the range where the Mercator projection stays finite
#[inline(always)]
pub fn clamp_latitude(lat: f64) -> f64 {
    lat.clamp(MIN_LATITUDE, MAX_LATITUDE)
}

#[inline(always)]
pub fn clamp_longitude(lon: f64) -> f64 {
    lon.clamp(MIN_LONGITUDE, MAX_LONGITUDE)
}

/// Convert a longitude in degrees to the normalized Mercator x in `[0, 1]`
#[inline(always)]
pub fn longitude_to_unit_x(lon: f64) -> f64 {
    (clamp_longitude(lon) + 180.0) / 360.0
}

/// Convert a latitude in degrees to the normalized Mercator y in `[0, 1]`
///
/// `0` is the northern edge of the projection, `1` the southern one.
#[inline(always)]
pub fn latitude_to_unit_y(lat: f64) -> f64 {
    let lat_rad = clamp_latitude(lat).to_radians();
    (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0
}

/// Inverse of [`longitude_to_unit_x`]
#[inline(always)]
pub fn unit_x_to_longitude(x: f64) -> f64 {
    x * 360.0 - 180.0
}

/// Inverse of [`latitude_to_unit_y`]
#[inline(always)]
pub fn unit_y_to_latitude(y: f64) -> f64 {
    (PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees()
}

/// Convert degrees to the fixed-point integer representation
#[inline(always)]
pub fn to_fixed(degrees: f64) -> i64 {
    (degrees * COORDINATE_SCALE).round() as i64
}

/// Convert a fixed-point integer back to degrees
#[inline(always)]
pub fn from_fixed(value: i64) -> f64 {
    value as f64 / COORDINATE_SCALE
}
