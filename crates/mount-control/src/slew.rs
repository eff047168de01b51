//! Slew and Rate Controller
//!
//! Converts position error into per-axis angular rates for the mount's
//! velocity mode, and models rate-limited absolute slews for the simulator.

use serde::{Deserialize, Serialize};
use sky_coordinates::{azimuth_delta, normalize_azimuth, HorizontalPosition};

use crate::error::RateError;

/// Per-axis rate command, degrees per second.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct AxisRates {
    pub altitude: f64,
    pub azimuth: f64,
}

/// Rates that carry `current` to `desired` in `elapsed_s`, each axis clamped
/// to `±max_rate_deg_s`. Azimuth takes the shorter way round.
pub fn compute_rates(
    current: &HorizontalPosition,
    desired: &HorizontalPosition,
    elapsed_s: f64,
    max_rate_deg_s: f64,
) -> Result<AxisRates, RateError> {
    debug_assert!(elapsed_s > 0.0, "elapsed time must be positive, got {elapsed_s}");
    if !(elapsed_s > 0.0) || !elapsed_s.is_finite() {
        return Err(RateError::NonPositiveElapsed(elapsed_s));
    }
    if !(max_rate_deg_s > 0.0) || !max_rate_deg_s.is_finite() {
        return Err(RateError::InvalidRateLimit(max_rate_deg_s));
    }
    if !(current.is_finite() && desired.is_finite()) {
        return Err(RateError::NonFinitePosition);
    }

    let az_delta = azimuth_delta(current.azimuth, desired.azimuth);
    let alt_delta = desired.altitude - current.altitude;

    Ok(AxisRates {
        altitude: (alt_delta / elapsed_s).clamp(-max_rate_deg_s, max_rate_deg_s),
        azimuth: (az_delta / elapsed_s).clamp(-max_rate_deg_s, max_rate_deg_s),
    })
}

/// True when both axis errors are under `threshold_deg`, azimuth compared
/// across the 0/360 seam.
pub fn within_threshold(
    current: &HorizontalPosition,
    target: &HorizontalPosition,
    threshold_deg: f64,
) -> bool {
    let az_err = azimuth_delta(current.azimuth, target.azimuth).abs();
    let alt_err = (current.altitude - target.altitude).abs();

    az_err < threshold_deg && alt_err < threshold_deg
}

/// Rate-limited absolute slew model.
#[derive(Debug, Clone, Copy)]
pub struct SlewProfile {
    max_rate_deg_s: f64,
}

impl SlewProfile {
    pub fn new(max_rate_deg_s: f64) -> Self {
        Self { max_rate_deg_s }
    }

    /// Advance `current` toward `target` by at most `max_rate * delta_s` per axis.
    pub fn step(
        &self,
        current: &HorizontalPosition,
        target: &HorizontalPosition,
        delta_s: f64,
    ) -> HorizontalPosition {
        let max_delta = self.max_rate_deg_s * delta_s.max(0.0);

        let az_step = azimuth_delta(current.azimuth, target.azimuth).clamp(-max_delta, max_delta);
        let alt_step = (target.altitude - current.altitude).clamp(-max_delta, max_delta);

        HorizontalPosition {
            altitude: (current.altitude + alt_step).clamp(-90.0, 90.0),
            azimuth: normalize_azimuth(current.azimuth + az_step),
        }
    }
}
