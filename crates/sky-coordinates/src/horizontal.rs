//! Geodetic to topocentric transforms
//!
//! Both observer and target are Earth-fixed, so the conversion is a pure
//! geometric one: WGS84 geodetic -> ECEF -> local East-North-Up frame.

use chrono::{DateTime, Utc};
use nalgebra::{Matrix3, Vector3};

use crate::{normalize_azimuth, CoordinateError, Geographic, HorizontalPosition, Observer, Result};

const WGS84_A_M: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257223563;

/// Below this slant range the bearing is meaningless.
const MIN_RANGE_M: f64 = 1.0;

/// WGS84 geodetic position to Earth-centred Earth-fixed metres.
pub fn geodetic_to_ecef(pos: &Geographic) -> Vector3<f64> {
    let lat = pos.latitude.to_radians();
    let lon = pos.longitude.to_radians();
    let e2 = WGS84_F * (2.0 - WGS84_F);

    let n = WGS84_A_M / (1.0 - e2 * lat.sin().powi(2)).sqrt();

    Vector3::new(
        (n + pos.altitude_m) * lat.cos() * lon.cos(),
        (n + pos.altitude_m) * lat.cos() * lon.sin(),
        (n * (1.0 - e2) + pos.altitude_m) * lat.sin(),
    )
}

/// Rotation taking ECEF offsets into the observer's East-North-Up frame.
fn enu_rotation(latitude_deg: f64, longitude_deg: f64) -> Matrix3<f64> {
    let (sin_lat, cos_lat) = latitude_deg.to_radians().sin_cos();
    let (sin_lon, cos_lon) = longitude_deg.to_radians().sin_cos();

    Matrix3::new(
        -sin_lon, cos_lon, 0.0,
        -sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat,
        cos_lat * cos_lon, cos_lat * sin_lon, sin_lat,
    )
}

/// Project `target` into the observer's sky.
///
/// The instant is accepted so every projection in a tick shares one
/// timestamp; Earth-fixed targets do not depend on it.
pub fn to_horizontal(
    observer: &Observer,
    target: &Geographic,
    _at: DateTime<Utc>,
) -> Result<HorizontalPosition> {
    let site = observer.location();
    site.validate()?;
    target.validate()?;

    let offset = geodetic_to_ecef(target) - geodetic_to_ecef(&site);
    let range = offset.norm();
    if range < MIN_RANGE_M {
        return Err(CoordinateError::Degenerate(format!(
            "target within {:.2} m of observer",
            range
        )));
    }

    let enu = enu_rotation(site.latitude, site.longitude) * offset;
    let (east, north, up) = (enu.x, enu.y, enu.z);

    let azimuth = normalize_azimuth(east.atan2(north).to_degrees());
    let altitude = up.atan2(east.hypot(north)).to_degrees();

    if !(azimuth.is_finite() && altitude.is_finite()) {
        return Err(CoordinateError::Degenerate(format!(
            "non-finite bearing for target ({}, {})",
            target.latitude, target.longitude
        )));
    }

    Ok(HorizontalPosition { altitude, azimuth })
}

/// Slant range in metres between observer and target.
pub fn slant_range_m(observer: &Observer, target: &Geographic) -> f64 {
    (geodetic_to_ecef(target) - geodetic_to_ecef(&observer.location())).norm()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> Observer {
        Observer::new(40.0, -75.0, 100.0)
    }

    #[test]
    fn test_target_due_north_has_zero_azimuth() {
        let target = Geographic::new(40.1, -75.0, 3000.0);
        let pos = to_horizontal(&site(), &target, Utc::now()).unwrap();
        assert!(pos.azimuth < 0.5 || pos.azimuth > 359.5, "az {}", pos.azimuth);
        assert!(pos.altitude > 0.0 && pos.altitude < 90.0);
    }

    #[test]
    fn test_target_due_east_has_ninety_azimuth() {
        let target = Geographic::new(40.0, -74.9, 3000.0);
        let pos = to_horizontal(&site(), &target, Utc::now()).unwrap();
        assert!((pos.azimuth - 90.0).abs() < 0.5, "az {}", pos.azimuth);
    }

    #[test]
    fn test_overhead_target_is_at_zenith() {
        let target = Geographic::new(40.0, -75.0, 10_100.0);
        let pos = to_horizontal(&site(), &target, Utc::now()).unwrap();
        assert!((pos.altitude - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_same_point_is_degenerate() {
        let observer = site();
        let err = to_horizontal(&observer, &observer.location(), Utc::now()).unwrap_err();
        assert!(matches!(err, CoordinateError::Degenerate(_)));
    }

    #[test]
    fn test_nan_target_is_rejected() {
        let target = Geographic::new(f64::NAN, -75.0, 1000.0);
        let err = to_horizontal(&site(), &target, Utc::now()).unwrap_err();
        assert!(matches!(err, CoordinateError::InvalidCoordinates(_)));
    }

    #[test]
    fn test_observer_at_pole_still_resolves() {
        let pole = Observer::new(90.0, 0.0, 0.0);
        let target = Geographic::new(89.9, 0.0, 5000.0);
        let pos = to_horizontal(&pole, &target, Utc::now()).unwrap();
        assert!(pos.is_finite());
        assert!(pos.altitude > 0.0);
    }

    #[test]
    fn test_slant_range_of_overhead_target() {
        let target = Geographic::new(40.0, -75.0, 1100.0);
        assert!((slant_range_m(&site(), &target) - 1000.0).abs() < 1e-3);
    }
}
