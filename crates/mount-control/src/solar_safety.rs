//! Solar Safety Monitor
//!
//! Two layers of protection against pointing the optics at the sun:
//!
//! - [`precheck`] runs synchronously before a tracking session starts and
//!   refuses targets inside the minimum separation unless a solar filter is
//!   both declared installed and actually selected on the wheel.
//! - [`Tracker::solar_tick`] runs on its own timer, recomputes the sun and
//!   the separation to the tracked target, engages the dark filter in the
//!   warning band and forces a stop inside the minimum separation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sky_coordinates::{
    angular_separation, classify_zone, solar, CoordinateError, HorizontalPosition, Observer,
    SafetyZone,
};
use tracing::{debug, error, info, warn};

use crate::config::SolarConfig;
use crate::error::SolarRefusal;
use crate::state::Episode;
use crate::tracking::{StopReason, Tracker};

/// Source of the sun's horizontal position.
pub trait Ephemeris: Send + Sync {
    fn sun(&self, observer: &Observer, at: DateTime<Utc>) -> Result<HorizontalPosition, CoordinateError>;
}

/// NOAA low-precision series from `sky_coordinates`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowPrecisionSun;

impl Ephemeris for LowPrecisionSun {
    fn sun(&self, observer: &Observer, at: DateTime<Utc>) -> Result<HorizontalPosition, CoordinateError> {
        solar::sun_position(observer, at)
    }
}

/// Outcome of a passed precheck.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SolarAssessment {
    pub sun: HorizontalPosition,
    pub separation_deg: f64,
    pub zone: SafetyZone,
    pub sun_up: bool,
}

/// Decide whether a target may be tracked given the sun's position.
///
/// `filter_slot` is the last slot read back from the wheel; `None` means the
/// wheel position is unknown and is treated as a mismatch.
pub fn precheck(
    config: &SolarConfig,
    sun: &HorizontalPosition,
    target: &HorizontalPosition,
    filter_slot: Option<u8>,
) -> Result<SolarAssessment, SolarRefusal> {
    let separation_deg = angular_separation(sun, target);
    let zone = classify_zone(separation_deg, &config.thresholds);
    let sun_up = solar::is_above_horizon(sun);
    let assessment = SolarAssessment {
        sun: *sun,
        separation_deg,
        zone,
        sun_up,
    };

    if !sun_up {
        return Ok(assessment);
    }

    info!(
        "Solar check: {:.1}° separation (Sun: Az {:.1}° Alt {:.1}°)",
        separation_deg, sun.azimuth, sun.altitude
    );

    let min_deg = config.thresholds.min_separation_deg;
    if separation_deg < min_deg {
        if !config.solar_filter_installed {
            return Err(SolarRefusal::NoFilter { separation_deg, min_deg });
        }
        if filter_slot != Some(config.solar_filter_slot) {
            return Err(SolarRefusal::FilterMismatch {
                separation_deg,
                actual: filter_slot,
                required: config.solar_filter_slot,
            });
        }
        warn!("Solar filter active - tracking {:.1}° from sun", separation_deg);
        return Ok(assessment);
    }

    match zone {
        SafetyZone::Warning => warn!(
            "WARNING: target {:.1}° from sun - consider aborting",
            separation_deg
        ),
        SafetyZone::Caution => warn!(
            "CAUTION: target {:.1}° from sun - monitor carefully",
            separation_deg
        ),
        _ => {}
    }

    Ok(assessment)
}

/// What a monitor tick has to do about the current separation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Enforcement {
    None,
    Stop,
    DarkFilterThenStop,
}

pub(crate) fn enforcement(
    config: &SolarConfig,
    zone: SafetyZone,
    dark_filter_active: bool,
    filter_available: bool,
) -> Enforcement {
    match zone {
        SafetyZone::Critical => Enforcement::Stop,
        SafetyZone::Warning if config.auto_dark_filter && filter_available && !dark_filter_active => {
            Enforcement::DarkFilterThenStop
        }
        _ => Enforcement::None,
    }
}

impl Tracker {
    /// One pass of the solar monitor.
    pub async fn solar_tick(&self) {
        let inner = &self.inner;
        let now = Utc::now();

        let sun = match inner.ephemeris.sun(&inner.observer, now) {
            Ok(sun) => sun,
            Err(e) => {
                error!("Sun position unavailable: {}", e);
                return;
            }
        };

        let filter_slot = match inner.device.current_filter_position().await {
            Ok(slot) => Some(slot),
            Err(e) => {
                debug!("Filter wheel position unavailable: {}", e);
                None
            }
        };

        let tracked = {
            let tracking = inner.tracking.read().await;
            tracking
                .target()
                .map(|t| (tracking.episode(), t.icao.clone(), t.position))
        };

        let measured = tracked.as_ref().map(|(_, _, position)| {
            let separation = angular_separation(&sun, position);
            (separation, classify_zone(separation, &inner.config.solar.thresholds))
        });

        let dark_filter_active = {
            let mut state = inner.solar.write().await;
            state.sun = Some(sun);
            state.separation_deg = measured.map(|(s, _)| s);
            state.zone = measured.map(|(_, z)| z);
            state.filter_slot = filter_slot;
            state.updated_at = Some(now);
            state.dark_filter_active
        };

        let config = &inner.config.solar;
        let (Some((episode, icao, _)), Some((separation, zone))) = (tracked, measured) else {
            return;
        };
        if !config.enabled {
            return;
        }

        match enforcement(config, zone, dark_filter_active, filter_slot.is_some()) {
            Enforcement::Stop => {
                error!(
                    "CRITICAL: {} is {:.1}° from sun (minimum {:.1}°) - EMERGENCY STOP",
                    icao, separation, config.thresholds.min_separation_deg
                );
                self.stop_episode(Some(episode), StopReason::SolarCritical).await;
            }
            Enforcement::DarkFilterThenStop => {
                warn!("Solar proximity {:.1}° - engaging dark filter", separation);
                match inner.device.engage_dark_filter().await {
                    Ok(()) => {
                        if self.mark_dark_filter(episode).await {
                            info!("Dark filter engaged");
                        }
                    }
                    Err(e) => error!("Failed to engage dark filter: {}", e),
                }
                self.stop_episode(Some(episode), StopReason::DarkFilter).await;
            }
            Enforcement::None => {
                if zone == SafetyZone::Caution {
                    warn!("CAUTION: {} is {:.1}° from sun", icao, separation);
                }
            }
        }
    }

    /// Latch the dark-filter flag for `episode`. A session started after the
    /// filter command was issued keeps its cleared flag.
    pub(crate) async fn mark_dark_filter(&self, episode: Episode) -> bool {
        let tracking = self.inner.tracking.read().await;
        if !tracking.is_current(episode) {
            return false;
        }
        self.inner.solar.write().await.dark_filter_active = true;
        true
    }
}

#[cfg(test)]
pub(crate) mod fixed {
    use std::sync::Mutex;

    use super::*;

    /// Ephemeris pinned to a settable position.
    #[derive(Debug)]
    pub struct FixedSun(Mutex<HorizontalPosition>);

    impl FixedSun {
        pub fn new(position: HorizontalPosition) -> Self {
            Self(Mutex::new(position))
        }

        pub fn set(&self, position: HorizontalPosition) {
            *self.0.lock().unwrap() = position;
        }
    }

    impl Ephemeris for FixedSun {
        fn sun(&self, _: &Observer, _: DateTime<Utc>) -> Result<HorizontalPosition, CoordinateError> {
            Ok(*self.0.lock().unwrap())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::filter_slots;
    use sky_coordinates::SafetyThresholds;

    fn config(min: f64, installed: bool) -> SolarConfig {
        SolarConfig {
            thresholds: SafetyThresholds {
                min_separation_deg: min,
                warning_deg: min + 10.0,
                caution_deg: min + 20.0,
            },
            solar_filter_installed: installed,
            ..Default::default()
        }
    }

    #[test]
    fn test_sun_below_horizon_always_passes() {
        let sun = HorizontalPosition::new(-10.0, 100.0);
        let target = HorizontalPosition::new(-8.0, 100.0);
        let result = precheck(&config(15.0, false), &sun, &target, None).unwrap();
        assert!(!result.sun_up);
    }

    #[test]
    fn test_too_close_without_filter_refused() {
        let sun = HorizontalPosition::new(43.0, 100.0);
        let target = HorizontalPosition::new(40.0, 100.0);
        let err = precheck(&config(15.0, false), &sun, &target, None).unwrap_err();
        assert!(matches!(err, SolarRefusal::NoFilter { .. }));
    }

    #[test]
    fn test_installed_filter_must_be_selected() {
        let sun = HorizontalPosition::new(43.0, 100.0);
        let target = HorizontalPosition::new(40.0, 100.0);
        let cfg = config(15.0, true);

        let err = precheck(&cfg, &sun, &target, Some(filter_slots::UV_IR_CUT)).unwrap_err();
        assert!(matches!(err, SolarRefusal::FilterMismatch { actual: Some(0), .. }));

        let err = precheck(&cfg, &sun, &target, None).unwrap_err();
        assert!(matches!(err, SolarRefusal::FilterMismatch { actual: None, .. }));

        let ok = precheck(&cfg, &sun, &target, Some(filter_slots::SOLAR)).unwrap();
        assert_eq!(ok.zone, SafetyZone::Critical);
    }

    #[test]
    fn test_warning_band_allowed() {
        let sun = HorizontalPosition::new(60.0, 100.0);
        let target = HorizontalPosition::new(40.0, 100.0);
        let ok = precheck(&config(15.0, false), &sun, &target, None).unwrap();
        assert_eq!(ok.zone, SafetyZone::Warning);
        assert!((ok.separation_deg - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_critical_takes_precedence_over_dark_filter() {
        let cfg = SolarConfig::default();
        assert_eq!(enforcement(&cfg, SafetyZone::Critical, false, true), Enforcement::Stop);
        assert_eq!(
            enforcement(&cfg, SafetyZone::Warning, false, true),
            Enforcement::DarkFilterThenStop
        );
        assert_eq!(enforcement(&cfg, SafetyZone::Warning, true, true), Enforcement::None);
        assert_eq!(enforcement(&cfg, SafetyZone::Warning, false, false), Enforcement::None);
        assert_eq!(enforcement(&cfg, SafetyZone::Caution, false, true), Enforcement::None);
    }

    #[test]
    fn test_dark_filter_policy_can_be_disabled() {
        let cfg = SolarConfig {
            auto_dark_filter: false,
            ..Default::default()
        };
        assert_eq!(enforcement(&cfg, SafetyZone::Warning, false, true), Enforcement::None);
    }
}
