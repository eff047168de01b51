//! Simulated Mount
//!
//! In-process alt-az mount for dry runs and tests. Absolute slews follow the
//! rate-limited [`SlewProfile`]; axis rates are integrated against the tokio
//! clock, so paused-time tests see deterministic motion.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use sky_coordinates::{normalize_azimuth, HorizontalPosition};
use tokio::time::Instant;

use crate::config::filter_slots;
use crate::device::{Axis, MountDevice};
use crate::error::DeviceError;
use crate::slew::{AxisRates, SlewProfile};

/// Commands kept in the journal; older entries are dropped.
pub const JOURNAL_CAPACITY: usize = 1024;

/// Command accepted by the simulator, in arrival order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MountCommand {
    SlewToAltAz { altitude: f64, azimuth: f64 },
    MoveAxis { axis: Axis, rate: f64 },
    StopAxes,
    AbortSlew,
    EngageDarkFilter,
}

#[derive(Debug)]
struct SimState {
    position: HorizontalPosition,
    slew_target: Option<HorizontalPosition>,
    rates: AxisRates,
    last_update: Instant,
    filter_slot: Option<u8>,
    fail_slews: bool,
    fail_motion: bool,
    journal: VecDeque<MountCommand>,
}

impl SimState {
    fn record(&mut self, command: MountCommand) {
        if self.journal.len() == JOURNAL_CAPACITY {
            self.journal.pop_front();
        }
        self.journal.push_back(command);
    }

    fn advance(&mut self, profile: &SlewProfile) {
        let now = Instant::now();
        let dt = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.last_update = now;
        if dt <= 0.0 {
            return;
        }

        if let Some(target) = self.slew_target {
            self.position = profile.step(&self.position, &target, dt);
            if self.position == target {
                self.slew_target = None;
            }
        } else {
            self.position = HorizontalPosition {
                altitude: (self.position.altitude + self.rates.altitude * dt).clamp(-90.0, 90.0),
                azimuth: normalize_azimuth(self.position.azimuth + self.rates.azimuth * dt),
            };
        }
    }
}

#[derive(Debug)]
pub struct SimulatedMount {
    profile: SlewProfile,
    max_rate_deg_s: f64,
    state: Mutex<SimState>,
}

impl SimulatedMount {
    pub fn new(start: HorizontalPosition, max_rate_deg_s: f64) -> Self {
        Self {
            profile: SlewProfile::new(max_rate_deg_s),
            max_rate_deg_s,
            state: Mutex::new(SimState {
                position: start,
                slew_target: None,
                rates: AxisRates::default(),
                last_update: Instant::now(),
                filter_slot: None,
                fail_slews: false,
                fail_motion: false,
                journal: VecDeque::with_capacity(64),
            }),
        }
    }

    /// Fit a filter wheel, starting at `slot`.
    pub fn with_filter_wheel(self, slot: u8) -> Self {
        self.state().filter_slot = Some(slot);
        self
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advanced(&self) -> MutexGuard<'_, SimState> {
        let mut state = self.state();
        state.advance(&self.profile);
        state
    }

    pub fn fail_slews(&self, fail: bool) {
        self.state().fail_slews = fail;
    }

    pub fn fail_motion(&self, fail: bool) {
        self.state().fail_motion = fail;
    }

    pub fn position(&self) -> HorizontalPosition {
        self.advanced().position
    }

    /// The most recent [`JOURNAL_CAPACITY`] commands, oldest first.
    pub fn journal(&self) -> Vec<MountCommand> {
        self.state().journal.iter().copied().collect()
    }

    pub fn count(&self, matches: impl Fn(&MountCommand) -> bool) -> usize {
        self.state().journal.iter().filter(|c| matches(c)).count()
    }
}

#[async_trait]
impl MountDevice for SimulatedMount {
    fn name(&self) -> &str {
        "simulator"
    }

    async fn altitude(&self) -> Result<f64, DeviceError> {
        Ok(self.advanced().position.altitude)
    }

    async fn azimuth(&self) -> Result<f64, DeviceError> {
        Ok(self.advanced().position.azimuth)
    }

    async fn is_slewing(&self) -> Result<bool, DeviceError> {
        Ok(self.advanced().slew_target.is_some())
    }

    async fn slew_to_alt_az(&self, altitude: f64, azimuth: f64) -> Result<(), DeviceError> {
        let mut state = self.advanced();
        if state.fail_slews {
            return Err(DeviceError::Rejected {
                code: 0x401,
                message: "slew rejected by simulator".into(),
            });
        }
        if !(-90.0..=90.0).contains(&altitude) || !azimuth.is_finite() {
            return Err(DeviceError::Rejected {
                code: 0x402,
                message: format!("target Alt {} Az {} out of range", altitude, azimuth),
            });
        }
        state.rates = AxisRates::default();
        state.slew_target = Some(HorizontalPosition::new(altitude, azimuth));
        state.record(MountCommand::SlewToAltAz { altitude, azimuth });
        Ok(())
    }

    async fn move_axis(&self, axis: Axis, rate_deg_s: f64) -> Result<(), DeviceError> {
        let mut state = self.advanced();
        if state.fail_motion {
            return Err(DeviceError::Transport("simulated link drop".into()));
        }
        if !rate_deg_s.is_finite() || rate_deg_s.abs() > self.max_rate_deg_s {
            return Err(DeviceError::Rejected {
                code: 0x402,
                message: format!("rate {} exceeds {} deg/s", rate_deg_s, self.max_rate_deg_s),
            });
        }
        state.slew_target = None;
        match axis {
            Axis::Altitude => state.rates.altitude = rate_deg_s,
            Axis::Azimuth => state.rates.azimuth = rate_deg_s,
        }
        state.record(MountCommand::MoveAxis { axis, rate: rate_deg_s });
        Ok(())
    }

    async fn stop_axes(&self) -> Result<(), DeviceError> {
        let mut state = self.advanced();
        state.rates = AxisRates::default();
        state.record(MountCommand::StopAxes);
        Ok(())
    }

    async fn abort_slew(&self) -> Result<(), DeviceError> {
        let mut state = self.advanced();
        state.slew_target = None;
        state.record(MountCommand::AbortSlew);
        Ok(())
    }

    async fn current_filter_position(&self) -> Result<u8, DeviceError> {
        self.state()
            .filter_slot
            .ok_or(DeviceError::Unsupported("filter wheel"))
    }

    async fn engage_dark_filter(&self) -> Result<(), DeviceError> {
        let mut state = self.state();
        if state.filter_slot.is_none() {
            return Err(DeviceError::Unsupported("filter wheel"));
        }
        state.filter_slot = Some(filter_slots::DARK);
        state.record(MountCommand::EngageDarkFilter);
        Ok(())
    }
}
