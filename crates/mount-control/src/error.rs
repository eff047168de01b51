//! Error types for mount control

use sky_coordinates::CoordinateError;
use thiserror::Error;

/// Failure reported by a mount or filter-wheel driver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Device not connected")]
    NotConnected,
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Device rejected command (code {code}): {message}")]
    Rejected { code: i32, message: String },
    #[error("Unexpected device value: {0}")]
    UnexpectedValue(String),
    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("Feed unavailable: {0}")]
    Unavailable(String),
    #[error("Malformed feed data: {0}")]
    Malformed(String),
}

/// Input-contract violations of the rate controller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateError {
    #[error("Elapsed time must be positive, got {0} s")]
    NonPositiveElapsed(f64),
    #[error("Rate limit must be positive and finite, got {0} deg/s")]
    InvalidRateLimit(f64),
    #[error("Non-finite position")]
    NonFinitePosition,
}

/// Why a solar precheck refused to start tracking.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolarRefusal {
    #[error("Target {separation_deg:.1}° from sun (minimum {min_deg:.1}°) and no solar filter installed")]
    NoFilter { separation_deg: f64, min_deg: f64 },
    #[error("Target {separation_deg:.1}° from sun but filter wheel reports slot {actual:?}, solar filter is slot {required}")]
    FilterMismatch {
        separation_deg: f64,
        actual: Option<u8>,
        required: u8,
    },
}

#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Aircraft {0} not in current snapshot")]
    UnknownAircraft(String),
    #[error("Target altitude {altitude:.1}° outside operating window {min:.0}°-{max:.0}°")]
    OutOfEnvelope { altitude: f64, min: f64, max: f64 },
    #[error("Solar safety: {0}")]
    SolarRefused(#[from] SolarRefusal),
    #[error("Coordinate error: {0}")]
    Coordinates(#[from] CoordinateError),
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("Rate controller: {0}")]
    Rate(#[from] RateError),
}

pub type Result<T> = std::result::Result<T, TrackingError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
