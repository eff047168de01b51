//! Control configuration
//!
//! All fields carry defaults tuned for a Seestar-class alt-az mount tracking
//! terrestrial traffic, so a partial JSON document is enough.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sky_coordinates::SafetyThresholds;
use tracing::warn;

use crate::error::ConfigError;

/// Filter wheel slot conventions for the Seestar wheel.
pub mod filter_slots {
    pub const UV_IR_CUT: u8 = 0;
    pub const DUO_BAND: u8 = 1;
    pub const DARK: u8 = 2;
    pub const SOLAR: u8 = 3;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControlConfig {
    pub envelope: AltitudeWindow,
    /// Device maximum axis rate, degrees per second
    pub max_rate_deg_s: f64,
    pub tracking: TrackingTiming,
    pub solar: SolarConfig,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            envelope: AltitudeWindow::default(),
            max_rate_deg_s: 6.0,
            tracking: TrackingTiming::default(),
            solar: SolarConfig::default(),
        }
    }
}

/// Altitude operating window in degrees. Alt-az forks hit the tripod above ~80°.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AltitudeWindow {
    pub min_altitude_deg: f64,
    pub max_altitude_deg: f64,
}

impl AltitudeWindow {
    pub fn contains(&self, altitude: f64) -> bool {
        altitude >= self.min_altitude_deg && altitude <= self.max_altitude_deg
    }
}

impl Default for AltitudeWindow {
    fn default() -> Self {
        Self {
            min_altitude_deg: 0.0,
            max_altitude_deg: 80.0,
        }
    }
}

/// Longest intercept the watcher will wait before going continuous.
pub const MAX_INTERCEPT_TIMEOUT_S: f64 = 600.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackingTiming {
    /// Aircraft feed refresh, also the Continuous-mode rate tick
    pub refresh_interval_ms: u64,
    pub mount_poll_interval_ms: u64,
    pub intercept_poll_interval_ms: u64,
    pub intercept_threshold_deg: f64,
    pub intercept_timeout_s: f64,
}

impl TrackingTiming {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn mount_poll_interval(&self) -> Duration {
        Duration::from_millis(self.mount_poll_interval_ms)
    }

    pub fn intercept_poll_interval(&self) -> Duration {
        Duration::from_millis(self.intercept_poll_interval_ms)
    }

    pub fn intercept_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.intercept_timeout_s)
    }
}

impl Default for TrackingTiming {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 2_000,
            mount_poll_interval_ms: 500,
            intercept_poll_interval_ms: 100,
            intercept_threshold_deg: 0.1,
            intercept_timeout_s: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolarConfig {
    pub enabled: bool,
    #[serde(flatten)]
    pub thresholds: SafetyThresholds,
    pub solar_filter_installed: bool,
    pub auto_dark_filter: bool,
    pub solar_filter_slot: u8,
    pub monitor_interval_ms: u64,
}

impl SolarConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}

impl Default for SolarConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            thresholds: SafetyThresholds::default(),
            solar_filter_installed: false,
            auto_dark_filter: true,
            solar_filter_slot: filter_slots::SOLAR,
            monitor_interval_ms: 10_000,
        }
    }
}

impl ControlConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.envelope;
        if !(w.min_altitude_deg.is_finite() && w.max_altitude_deg.is_finite())
            || w.min_altitude_deg >= w.max_altitude_deg
            || w.min_altitude_deg < -90.0
            || w.max_altitude_deg > 90.0
        {
            return Err(ConfigError::Invalid(format!(
                "altitude window {}..{} is not a valid range",
                w.min_altitude_deg, w.max_altitude_deg
            )));
        }

        if !(self.max_rate_deg_s.is_finite() && self.max_rate_deg_s > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "max rate must be positive, got {}",
                self.max_rate_deg_s
            )));
        }

        let t = &self.tracking;
        if t.refresh_interval_ms == 0
            || t.mount_poll_interval_ms == 0
            || t.intercept_poll_interval_ms == 0
            || self.solar.monitor_interval_ms == 0
        {
            return Err(ConfigError::Invalid("tick intervals must be non-zero".into()));
        }
        if !(t.intercept_threshold_deg > 0.0) || !(t.intercept_timeout_s > 0.0) {
            return Err(ConfigError::Invalid(
                "intercept threshold and timeout must be positive".into(),
            ));
        }
        if !(t.intercept_timeout_s <= MAX_INTERCEPT_TIMEOUT_S) {
            return Err(ConfigError::Invalid(format!(
                "intercept timeout {}s exceeds {}s",
                t.intercept_timeout_s, MAX_INTERCEPT_TIMEOUT_S
            )));
        }

        let th = &self.solar.thresholds;
        if !(th.min_separation_deg.is_finite() && th.min_separation_deg >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "minimum solar separation must be non-negative, got {}",
                th.min_separation_deg
            )));
        }
        if !th.is_ordered() {
            warn!(
                "Solar bands not ordered (min {:.1}°, warning {:.1}°, caution {:.1}°); wider bands will be shadowed",
                th.min_separation_deg, th.warning_deg, th.caution_deg
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ControlConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_rate_deg_s, 6.0);
        assert_eq!(config.tracking.intercept_timeout(), Duration::from_secs(30));
        assert_eq!(config.solar.solar_filter_slot, filter_slots::SOLAR);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: ControlConfig = serde_json::from_str(
            r#"{"envelope": {"max_altitude_deg": 85.0}, "solar": {"min_separation_deg": 15.0}}"#,
        )
        .unwrap();
        assert_eq!(config.envelope.min_altitude_deg, 0.0);
        assert_eq!(config.envelope.max_altitude_deg, 85.0);
        assert_eq!(config.solar.thresholds.min_separation_deg, 15.0);
        assert_eq!(config.solar.thresholds.warning_deg, 20.0);
        assert!(config.solar.enabled);
    }

    #[test]
    fn test_inverted_window_rejected() {
        let mut config = ControlConfig::default();
        config.envelope.min_altitude_deg = 50.0;
        config.envelope.max_altitude_deg = 20.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_rate_rejected() {
        let config = ControlConfig {
            max_rate_deg_s: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unbounded_intercept_timeout_rejected() {
        let config: ControlConfig =
            serde_json::from_str(r#"{"tracking": {"intercept_timeout_s": 1e300}}"#).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ControlConfig::default();
        config.tracking.intercept_timeout_s = f64::INFINITY;
        assert!(config.validate().is_err());

        config.tracking.intercept_timeout_s = MAX_INTERCEPT_TIMEOUT_S;
        assert!(config.validate().is_ok());
        assert_eq!(config.tracking.intercept_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn test_window_is_inclusive() {
        let w = AltitudeWindow::default();
        assert!(w.contains(0.0));
        assert!(w.contains(80.0));
        assert!(!w.contains(80.1));
        assert!(!w.contains(-0.1));
    }
}
