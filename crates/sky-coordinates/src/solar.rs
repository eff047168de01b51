//! Low-precision solar ephemeris (NOAA solar calculator series)
//!
//! Good to roughly an arcminute for current epochs, which is far inside the
//! separation margins the safety monitor works with.

use chrono::{DateTime, Utc};

use crate::{normalize_azimuth, HorizontalPosition, Observer, Result};

/// Sun counts as up once its upper limb clears the refracted horizon.
pub const SUN_HORIZON_DEG: f64 = -0.833;

const J2000_JD: f64 = 2_451_545.0;
const UNIX_EPOCH_JD: f64 = 2_440_587.5;

pub fn julian_date(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 86_400_000.0 + UNIX_EPOCH_JD
}

/// Greenwich mean sidereal time, degrees in [0, 360).
pub fn greenwich_mean_sidereal_deg(at: DateTime<Utc>) -> f64 {
    let jd = julian_date(at);
    let t = (jd - J2000_JD) / 36_525.0;
    let gmst = 280.460_618_37 + 360.985_647_366_29 * (jd - J2000_JD) + 0.000_387_933 * t * t
        - t * t * t / 38_710_000.0;
    gmst.rem_euclid(360.0)
}

/// Apparent right ascension and declination of the sun, degrees.
fn equatorial(at: DateTime<Utc>) -> (f64, f64) {
    let t = (julian_date(at) - J2000_JD) / 36_525.0;

    let mean_longitude = (280.466_46 + t * (36_000.769_83 + t * 0.000_303_2)).rem_euclid(360.0);
    let mean_anomaly = (357.529_11 + t * (35_999.050_29 - 0.000_153_7 * t)).to_radians();

    let center = mean_anomaly.sin() * (1.914_602 - t * (0.004_817 + 0.000_014 * t))
        + (2.0 * mean_anomaly).sin() * (0.019_993 - 0.000_101 * t)
        + (3.0 * mean_anomaly).sin() * 0.000_289;

    let omega = (125.04 - 1_934.136 * t).to_radians();
    let apparent_longitude = (mean_longitude + center - 0.005_69 - 0.004_78 * omega.sin()).to_radians();

    let mean_obliquity =
        23.0 + (26.0 + (21.448 - t * (46.815 + t * (0.000_59 - t * 0.001_813))) / 60.0) / 60.0;
    let obliquity = (mean_obliquity + 0.002_56 * omega.cos()).to_radians();

    let ra = (obliquity.cos() * apparent_longitude.sin())
        .atan2(apparent_longitude.cos())
        .to_degrees()
        .rem_euclid(360.0);
    let dec = (obliquity.sin() * apparent_longitude.sin()).asin().to_degrees();

    (ra, dec)
}

/// Refraction in degrees for an apparent altitude, zero near the zenith and
/// once the sun is well below the horizon.
fn refraction_deg(altitude: f64) -> f64 {
    if altitude <= SUN_HORIZON_DEG || altitude >= 85.0 {
        return 0.0;
    }
    let arcsec = if altitude > 5.0 {
        let tan = altitude.to_radians().tan();
        58.1 / tan - 0.07 / tan.powi(3) + 0.000_086 / tan.powi(5)
    } else if altitude > -0.575 {
        1_735.0 + altitude * (-518.2 + altitude * (103.4 + altitude * (-12.79 + altitude * 0.711)))
    } else {
        0.0
    };
    arcsec / 3_600.0
}

/// Sun's horizontal position for the observer at `at`, refraction included.
pub fn sun_position(observer: &Observer, at: DateTime<Utc>) -> Result<HorizontalPosition> {
    observer.location().validate()?;

    let (ra, dec) = equatorial(at);
    let local_sidereal = greenwich_mean_sidereal_deg(at) + observer.longitude;
    let hour_angle = (local_sidereal - ra).to_radians();

    let lat = observer.latitude.to_radians();
    let dec = dec.to_radians();

    let sin_alt = lat.sin() * dec.sin() + lat.cos() * dec.cos() * hour_angle.cos();
    let altitude = sin_alt.clamp(-1.0, 1.0).asin().to_degrees();

    let azimuth = (-dec.cos() * hour_angle.sin())
        .atan2(dec.sin() * lat.cos() - dec.cos() * lat.sin() * hour_angle.cos())
        .to_degrees();

    Ok(HorizontalPosition {
        altitude: altitude + refraction_deg(altitude),
        azimuth: normalize_azimuth(azimuth),
    })
}

pub fn is_above_horizon(sun: &HorizontalPosition) -> bool {
    sun.altitude > SUN_HORIZON_DEG
}

/// Great-circle separation between two alt-az points, degrees in [0, 180].
///
/// Uses the Vincenty form, which stays well conditioned for both tiny and
/// near-antipodal separations.
pub fn angular_separation(a: &HorizontalPosition, b: &HorizontalPosition) -> f64 {
    let (alt1, alt2) = (a.altitude.to_radians(), b.altitude.to_radians());
    let d_az = (b.azimuth - a.azimuth).to_radians();

    let cross = alt2.cos() * d_az.sin();
    let along = alt1.cos() * alt2.sin() - alt1.sin() * alt2.cos() * d_az.cos();
    let sin_dist = cross.hypot(along);
    let cos_dist = alt1.sin() * alt2.sin() + alt1.cos() * alt2.cos() * d_az.cos();

    sin_dist.atan2(cos_dist).to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn greenwich() -> Observer {
        Observer::new(51.4769, -0.0005, 46.0)
    }

    #[test]
    fn test_julian_date_at_j2000() {
        let at = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        assert!((julian_date(at) - J2000_JD).abs() < 1e-9);
    }

    #[test]
    fn test_gmst_at_j2000() {
        let at = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        assert!((greenwich_mean_sidereal_deg(at) - 280.46061837).abs() < 1e-6);
    }

    #[test]
    fn test_solstice_noon_at_greenwich() {
        let at = Utc.with_ymd_and_hms(2024, 6, 20, 12, 2, 0).unwrap();
        let sun = sun_position(&greenwich(), at).unwrap();
        assert!((sun.altitude - 61.95).abs() < 0.5, "alt {}", sun.altitude);
        assert!((sun.azimuth - 180.0).abs() < 2.0, "az {}", sun.azimuth);
        assert!(is_above_horizon(&sun));
    }

    #[test]
    fn test_equinox_sun_overhead_at_equator() {
        let at = Utc.with_ymd_and_hms(2024, 3, 20, 12, 7, 0).unwrap();
        let sun = sun_position(&Observer::new(0.0, 0.0, 0.0), at).unwrap();
        assert!(sun.altitude > 88.0, "alt {}", sun.altitude);
    }

    #[test]
    fn test_midnight_sun_below_horizon() {
        let at = Utc.with_ymd_and_hms(2024, 6, 20, 0, 0, 0).unwrap();
        let sun = sun_position(&Observer::new(51.0, 0.0, 0.0), at).unwrap();
        assert!(sun.altitude < 0.0);
        assert!(!is_above_horizon(&sun));
    }

    #[test]
    fn test_morning_sun_is_in_the_east() {
        let at = Utc.with_ymd_and_hms(2024, 6, 20, 7, 0, 0).unwrap();
        let sun = sun_position(&greenwich(), at).unwrap();
        assert!(sun.azimuth > 45.0 && sun.azimuth < 135.0, "az {}", sun.azimuth);
    }

    #[test]
    fn test_separation_across_north() {
        let a = HorizontalPosition::new(0.0, 350.0);
        let b = HorizontalPosition::new(0.0, 10.0);
        assert!((angular_separation(&a, &b) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_separation_on_horizon() {
        let a = HorizontalPosition::new(0.0, 0.0);
        let b = HorizontalPosition::new(0.0, 90.0);
        assert!((angular_separation(&a, &b) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_separation_shrinks_near_zenith() {
        let a = HorizontalPosition::new(89.0, 0.0);
        let b = HorizontalPosition::new(89.0, 180.0);
        assert!((angular_separation(&a, &b) - 2.0).abs() < 1e-9);
    }

    mod proptests {
        use super::super::*;
        use proptest::prelude::*;

        fn horizontal() -> impl Strategy<Value = HorizontalPosition> {
            (-90.0f64..=90.0, 0.0f64..360.0).prop_map(|(alt, az)| HorizontalPosition::new(alt, az))
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(256))]

            #[test]
            fn test_separation_identity(a in horizontal()) {
                prop_assert!(angular_separation(&a, &a).abs() < 1e-9);
            }

            #[test]
            fn test_separation_symmetric(a in horizontal(), b in horizontal()) {
                let ab = angular_separation(&a, &b);
                let ba = angular_separation(&b, &a);
                prop_assert!((ab - ba).abs() < 1e-9);
                prop_assert!((0.0..=180.0).contains(&ab));
            }
        }
    }
}
