//! Mount Control
//!
//! Aircraft tracking for motorized alt-az telescope mounts with solar
//! proximity protection.
//!
//! - [`slew`]: rate controller and slew model
//! - [`tracking`]: Idle / Intercept / Continuous state machine and its periodic tasks
//! - [`solar_safety`]: precheck and monitor keeping the optics off the sun
//! - [`device`] / [`feed`]: seams to the mount driver and the aircraft source
//! - [`sim`]: in-process mount for dry runs and tests

pub mod config;
pub mod device;
pub mod error;
pub mod feed;
pub mod sim;
pub mod slew;
pub mod solar_safety;
pub mod state;
pub mod tracking;

pub use config::{filter_slots, AltitudeWindow, ControlConfig, SolarConfig, TrackingTiming};
pub use device::{Axis, MountDevice};
pub use error::{ConfigError, DeviceError, FeedError, RateError, SolarRefusal, TrackingError};
pub use feed::{AircraftFeed, AircraftRecord, StaticFeed};
pub use sim::{MountCommand, SimulatedMount};
pub use slew::{compute_rates, within_threshold, AxisRates, SlewProfile};
pub use solar_safety::{precheck, Ephemeris, LowPrecisionSun, SolarAssessment};
pub use state::{
    AircraftView, MountStatus, SkySnapshot, SolarState, TrackedTarget, TrackingMode,
    TrackingSnapshot,
};
pub use tracking::{StopReason, Tracker};

pub use sky_coordinates;
