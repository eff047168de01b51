//! Sky Coordinates
//!
//! Topocentric horizontal coordinates for an observer on the WGS84 ellipsoid,
//! a low-precision solar ephemeris, great-circle separation in alt-az space and
//! the solar proximity zones derived from it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod horizontal;
pub mod solar;
pub mod zone;

pub use horizontal::to_horizontal;
pub use solar::{angular_separation, greenwich_mean_sidereal_deg, julian_date, sun_position};
pub use zone::{classify_zone, SafetyThresholds, SafetyZone};

pub const FEET_TO_METERS: f64 = 0.3048;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinateError {
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
    #[error("Degenerate geometry: {0}")]
    Degenerate(String),
}

pub type Result<T> = std::result::Result<T, CoordinateError>;

/// A point above the WGS84 ellipsoid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Geographic {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
}

impl Geographic {
    pub fn new(latitude: f64, longitude: f64, altitude_m: f64) -> Self {
        Self { latitude, longitude, altitude_m }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(self.latitude.is_finite() && self.longitude.is_finite() && self.altitude_m.is_finite()) {
            return Err(CoordinateError::InvalidCoordinates(format!(
                "non-finite position ({}, {}, {} m)",
                self.latitude, self.longitude, self.altitude_m
            )));
        }
        if self.latitude.abs() > 90.0 {
            return Err(CoordinateError::InvalidCoordinates(format!(
                "latitude {} outside [-90, 90]",
                self.latitude
            )));
        }
        Ok(())
    }
}

/// Fixed observing site, loaded once from configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observer {
    #[serde(default)]
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub elevation_m: f64,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Observer {
    pub fn new(latitude: f64, longitude: f64, elevation_m: f64) -> Self {
        Self {
            name: String::new(),
            latitude,
            longitude,
            elevation_m,
            timezone: default_timezone(),
        }
    }

    pub fn location(&self) -> Geographic {
        Geographic::new(self.latitude, self.longitude, self.elevation_m)
    }
}

/// Altitude above the horizon and azimuth clockwise from true north, degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct HorizontalPosition {
    pub altitude: f64,
    pub azimuth: f64,
}

impl HorizontalPosition {
    pub fn new(altitude: f64, azimuth: f64) -> Self {
        Self {
            altitude,
            azimuth: normalize_azimuth(azimuth),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.altitude.is_finite() && self.azimuth.is_finite()
    }
}

/// Wrap an azimuth into [0, 360).
pub fn normalize_azimuth(azimuth: f64) -> f64 {
    let wrapped = azimuth.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Signed shortest rotation from `from` to `to`, in (-180, 180].
pub fn azimuth_delta(from: f64, to: f64) -> f64 {
    let delta = (to - from).rem_euclid(360.0);
    if delta > 180.0 {
        delta - 360.0
    } else {
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_azimuth() {
        assert_eq!(normalize_azimuth(370.0), 10.0);
        assert_eq!(normalize_azimuth(-10.0), 350.0);
        assert_eq!(normalize_azimuth(360.0), 0.0);
        assert!(normalize_azimuth(-1e-18) < 360.0);
    }

    #[test]
    fn test_azimuth_delta_takes_short_way() {
        assert!((azimuth_delta(350.0, 10.0) - 20.0).abs() < 1e-9);
        assert!((azimuth_delta(10.0, 350.0) + 20.0).abs() < 1e-9);
        assert_eq!(azimuth_delta(0.0, 180.0), 180.0);
        assert_eq!(azimuth_delta(180.0, 0.0), 180.0);
    }

    #[test]
    fn test_latitude_out_of_range_rejected() {
        let p = Geographic::new(91.0, 0.0, 0.0);
        assert!(matches!(p.validate(), Err(CoordinateError::InvalidCoordinates(_))));
    }

    mod proptests {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(256))]

            #[test]
            fn test_azimuth_delta_range(from in -720.0f64..720.0, to in -720.0f64..720.0) {
                let d = azimuth_delta(from, to);
                prop_assert!(d > -180.0 && d <= 180.0);
                let landed = normalize_azimuth(from + d);
                let target = normalize_azimuth(to);
                let miss = (landed - target).abs();
                prop_assert!(miss < 1e-6 || (360.0 - miss) < 1e-6);
            }
        }
    }
}
