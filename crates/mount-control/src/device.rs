//! Mount device interface
//!
//! Drivers (Alpaca over HTTP, the in-process simulator) implement
//! [`MountDevice`]. Every call can fail and reports failure as a
//! [`DeviceError`] value. Slews are asynchronous on the device side:
//! `slew_to_alt_az` returns once the command is accepted and completion is
//! observed by polling position.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// Mount axis, numbered as on the wire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Axis {
    Azimuth = 0,
    Altitude = 1,
}

impl Axis {
    pub fn id(self) -> u8 {
        self as u8
    }
}

#[async_trait]
pub trait MountDevice: Send + Sync {
    /// Human-readable driver name for logs.
    fn name(&self) -> &str;

    async fn altitude(&self) -> Result<f64, DeviceError>;

    async fn azimuth(&self) -> Result<f64, DeviceError>;

    async fn is_slewing(&self) -> Result<bool, DeviceError>;

    /// Start an absolute slew. Returns when the device has accepted it.
    async fn slew_to_alt_az(&self, altitude: f64, azimuth: f64) -> Result<(), DeviceError>;

    /// Drive one axis at a constant rate in degrees per second. Zero stops it.
    async fn move_axis(&self, axis: Axis, rate_deg_s: f64) -> Result<(), DeviceError>;

    async fn stop_axes(&self) -> Result<(), DeviceError>;

    async fn abort_slew(&self) -> Result<(), DeviceError>;

    /// Slot currently selected on the filter wheel.
    async fn current_filter_position(&self) -> Result<u8, DeviceError>;

    async fn engage_dark_filter(&self) -> Result<(), DeviceError>;
}
