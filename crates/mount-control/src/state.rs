//! Shared state aggregates
//!
//! Each aggregate sits behind its own lock inside the tracker. The types here
//! only enforce their own invariants; locking and device I/O live in
//! [`crate::tracking`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sky_coordinates::{to_horizontal, HorizontalPosition, Observer, SafetyZone};
use tracing::debug;

use crate::feed::AircraftRecord;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrackingMode {
    /// No target, no motion outstanding
    Idle,
    /// Absolute slew toward the target is in flight
    Intercept,
    /// Rate-following the target
    Continuous,
}

/// The aircraft being followed. Kinematics are for display only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedTarget {
    pub icao: String,
    pub callsign: String,
    pub position: HorizontalPosition,
    pub ground_speed_kts: f64,
    pub track_deg: f64,
}

impl TrackedTarget {
    pub fn from_view(view: &AircraftView) -> Self {
        Self {
            icao: view.record.icao.clone(),
            callsign: view.record.callsign.clone(),
            position: view.horizontal,
            ground_speed_kts: view.record.ground_speed_kts,
            track_deg: view.record.track_deg,
        }
    }
}

/// Sequence number of one Start..Stop tracking session.
pub type Episode = u64;

/// Tracking intent. Mutated only through the methods below, which keep the
/// invariant that a target and commanded position exist exactly when the
/// mode is not Idle.
#[derive(Debug, Clone)]
pub struct TrackingState {
    mode: TrackingMode,
    target: Option<TrackedTarget>,
    commanded: Option<HorizontalPosition>,
    episode: Episode,
}

impl Default for TrackingState {
    fn default() -> Self {
        Self {
            mode: TrackingMode::Idle,
            target: None,
            commanded: None,
            episode: 0,
        }
    }
}

impl TrackingState {
    pub fn mode(&self) -> TrackingMode {
        self.mode
    }

    pub fn target(&self) -> Option<&TrackedTarget> {
        self.target.as_ref()
    }

    pub fn commanded(&self) -> Option<HorizontalPosition> {
        self.commanded
    }

    pub fn episode(&self) -> Episode {
        self.episode
    }

    pub fn is_active(&self) -> bool {
        self.mode != TrackingMode::Idle
    }

    /// True when `episode` is the session currently in force.
    pub fn is_current(&self, episode: Episode) -> bool {
        self.is_active() && self.episode == episode
    }

    /// Idle -> Intercept. Returns the new episode number.
    pub fn begin_intercept(&mut self, target: TrackedTarget) -> Episode {
        self.episode += 1;
        self.commanded = Some(target.position);
        self.target = Some(target);
        self.mode = TrackingMode::Intercept;
        self.episode
    }

    /// Intercept -> Continuous, if `episode` is still intercepting.
    pub fn promote(&mut self, episode: Episode) -> bool {
        if self.mode == TrackingMode::Intercept && self.episode == episode {
            self.mode = TrackingMode::Continuous;
            true
        } else {
            false
        }
    }

    /// Refresh the target from a new snapshot.
    ///
    /// In Continuous mode the new position becomes the commanded one and the
    /// previous commanded position is returned so the caller can derive rates
    /// from a single consistent pair. In Intercept only the display copy is
    /// refreshed.
    pub fn advance(&mut self, episode: Episode, view: &AircraftView) -> Option<HorizontalPosition> {
        if !self.is_current(episode) {
            return None;
        }
        self.target = Some(TrackedTarget::from_view(view));
        if self.mode == TrackingMode::Continuous {
            self.commanded.replace(view.horizontal)
        } else {
            None
        }
    }

    /// Back to Idle. With `Some(episode)` only that session is ended.
    /// Returns the mode that was left, or `None` if nothing changed.
    pub fn reset(&mut self, episode: Option<Episode>) -> Option<TrackingMode> {
        if !self.is_active() {
            return None;
        }
        if let Some(ep) = episode {
            if ep != self.episode {
                return None;
            }
        }
        let previous = self.mode;
        self.mode = TrackingMode::Idle;
        self.target = None;
        self.commanded = None;
        Some(previous)
    }

    pub fn snapshot(&self) -> TrackingSnapshot {
        TrackingSnapshot {
            mode: self.mode,
            target: self.target.clone(),
            commanded: self.commanded,
        }
    }
}

/// Read-only copy of tracking state for observers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingSnapshot {
    pub mode: TrackingMode,
    pub target: Option<TrackedTarget>,
    pub commanded: Option<HorizontalPosition>,
}

/// Output of the solar monitor's last tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SolarState {
    pub sun: Option<HorizontalPosition>,
    pub separation_deg: Option<f64>,
    pub zone: Option<SafetyZone>,
    /// Sticky until the next tracking session starts
    pub dark_filter_active: bool,
    /// Last filter wheel slot read back from the device
    pub filter_slot: Option<u8>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// An aircraft record projected into the observer's sky.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AircraftView {
    #[serde(flatten)]
    pub record: AircraftRecord,
    pub horizontal: HorizontalPosition,
}

/// Every visible aircraft projected at one instant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkySnapshot {
    pub aircraft: Vec<AircraftView>,
    pub taken_at: DateTime<Utc>,
}

impl Default for SkySnapshot {
    fn default() -> Self {
        Self {
            aircraft: Vec::new(),
            taken_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl SkySnapshot {
    /// Project every record at `taken_at`. Records that cannot be projected
    /// are dropped from the snapshot.
    pub fn from_records(observer: &Observer, records: Vec<AircraftRecord>, taken_at: DateTime<Utc>) -> Self {
        let aircraft = records
            .into_iter()
            .filter_map(|record| match to_horizontal(observer, &record.geographic(), taken_at) {
                Ok(horizontal) => Some(AircraftView { record, horizontal }),
                Err(e) => {
                    debug!("Skipping {}: {}", record.icao, e);
                    None
                }
            })
            .collect();

        Self { aircraft, taken_at }
    }

    pub fn find(&self, icao: &str) -> Option<&AircraftView> {
        self.aircraft
            .iter()
            .find(|view| view.record.icao.eq_ignore_ascii_case(icao))
    }
}

/// Last polled mount position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MountStatus {
    pub position: Option<HorizontalPosition>,
    pub slewing: bool,
    pub connected: bool,
    pub updated_at: Option<DateTime<Utc>>,
}
