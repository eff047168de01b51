//! Tracking Loop
//!
//! Owns tracking intent and sequences Idle -> Intercept -> Continuous.
//!
//! State lives in separate aggregates, each behind its own `RwLock`; no lock
//! is held across device I/O. Motion commands go through a single gate so a
//! stop can never be overtaken by a rate command computed before it, and
//! every deferred action carries the episode number of the session that
//! produced it so stale work is dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sky_coordinates::{HorizontalPosition, Observer};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::ControlConfig;
use crate::device::{Axis, MountDevice};
use crate::error::{ConfigError, DeviceError, FeedError, Result, TrackingError};
use crate::feed::AircraftFeed;
use crate::slew::{compute_rates, within_threshold};
use crate::solar_safety::{precheck, Ephemeris};
use crate::state::{
    Episode, MountStatus, SkySnapshot, SolarState, TrackedTarget, TrackingMode, TrackingSnapshot,
    TrackingState,
};

/// Why a tracking session ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    Operator,
    TargetLost,
    OutOfEnvelope,
    SolarCritical,
    DarkFilter,
    DeviceFault,
    ControlFault,
    Retarget,
    Shutdown,
}

pub(crate) struct Inner {
    pub(crate) observer: Observer,
    pub(crate) config: ControlConfig,
    pub(crate) device: Arc<dyn MountDevice>,
    pub(crate) feed: Arc<dyn AircraftFeed>,
    pub(crate) ephemeris: Arc<dyn Ephemeris>,

    pub(crate) tracking: RwLock<TrackingState>,
    pub(crate) solar: RwLock<SolarState>,
    pub(crate) sky: RwLock<Arc<SkySnapshot>>,
    pub(crate) mount: RwLock<MountStatus>,

    /// Serializes motion commands to the device
    motion: Mutex<()>,
    /// Serializes start requests
    session: Mutex<()>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

/// Cheaply cloneable handle to the tracking subsystem.
#[derive(Clone)]
pub struct Tracker {
    pub(crate) inner: Arc<Inner>,
}

impl Tracker {
    pub fn new(
        observer: Observer,
        config: ControlConfig,
        device: Arc<dyn MountDevice>,
        feed: Arc<dyn AircraftFeed>,
        ephemeris: Arc<dyn Ephemeris>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(Inner {
                observer,
                config,
                device,
                feed,
                ephemeris,
                tracking: RwLock::new(TrackingState::default()),
                solar: RwLock::new(SolarState::default()),
                sky: RwLock::new(Arc::new(SkySnapshot::default())),
                mount: RwLock::new(MountStatus::default()),
                motion: Mutex::new(()),
                session: Mutex::new(()),
                watcher: Mutex::new(None),
                shutdown,
            }),
        })
    }

    pub fn config(&self) -> &ControlConfig {
        &self.inner.config
    }

    pub fn observer(&self) -> &Observer {
        &self.inner.observer
    }

    pub async fn tracking(&self) -> TrackingSnapshot {
        self.inner.tracking.read().await.snapshot()
    }

    pub async fn solar(&self) -> SolarState {
        self.inner.solar.read().await.clone()
    }

    pub async fn sky(&self) -> Arc<SkySnapshot> {
        self.inner.sky.read().await.clone()
    }

    pub async fn mount(&self) -> MountStatus {
        self.inner.mount.read().await.clone()
    }

    /// Begin tracking `icao` from the latest snapshot.
    ///
    /// Guards, in order: aircraft present, altitude inside the operating
    /// window, solar precheck. On pass the intercept slew is issued and only
    /// once the device accepts it does the state enter Intercept.
    pub async fn start_tracking(&self, icao: &str) -> Result<TrackedTarget> {
        let inner = &self.inner;
        let _session = inner.session.lock().await;

        let sky = self.sky().await;
        let view = sky
            .find(icao)
            .cloned()
            .ok_or_else(|| TrackingError::UnknownAircraft(icao.to_string()))?;

        if inner.tracking.read().await.is_active() {
            self.stop_tracking(StopReason::Retarget).await;
        }

        let position = view.horizontal;
        let window = &inner.config.envelope;
        if !window.contains(position.altitude) {
            warn!(
                "Refusing {}: altitude {:.1}° out of range ({:.0}°-{:.0}°)",
                view.record.icao, position.altitude, window.min_altitude_deg, window.max_altitude_deg
            );
            return Err(TrackingError::OutOfEnvelope {
                altitude: position.altitude,
                min: window.min_altitude_deg,
                max: window.max_altitude_deg,
            });
        }

        if inner.config.solar.enabled {
            self.solar_precheck(&position).await?;
        }

        let target = TrackedTarget::from_view(&view);
        let episode = {
            let _gate = inner.motion.lock().await;
            if let Err(e) = inner.device.slew_to_alt_az(position.altitude, position.azimuth).await {
                error!(
                    "Intercept slew to Az {:.1}° Alt {:.1}° failed: {}",
                    position.azimuth, position.altitude, e
                );
                return Err(e.into());
            }
            let mut tracking = inner.tracking.write().await;
            inner.solar.write().await.dark_filter_active = false;
            tracking.begin_intercept(target.clone())
        };

        info!(
            "Intercepting {} ({}) at Az {:.1}° Alt {:.1}°",
            target.callsign, target.icao, position.azimuth, position.altitude
        );

        let watcher = tokio::spawn(self.clone().watch_intercept(episode));
        if let Some(stale) = inner.watcher.lock().await.replace(watcher) {
            stale.abort();
        }

        Ok(target)
    }

    async fn solar_precheck(&self, target: &HorizontalPosition) -> Result<()> {
        let inner = &self.inner;
        let sun = inner.ephemeris.sun(&inner.observer, Utc::now())?;

        let filter_slot = if inner.config.solar.solar_filter_installed {
            match inner.device.current_filter_position().await {
                Ok(slot) => {
                    inner.solar.write().await.filter_slot = Some(slot);
                    Some(slot)
                }
                Err(e) => {
                    warn!("Filter wheel position unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };

        precheck(&inner.config.solar, &sun, target, filter_slot).map_err(|refusal| {
            error!("SOLAR DANGER - tracking blocked: {}", refusal);
            TrackingError::from(refusal)
        })?;
        Ok(())
    }

    /// Stop whatever session is active. Idempotent: returns `false` and
    /// issues nothing if already Idle.
    pub async fn stop_tracking(&self, reason: StopReason) -> bool {
        self.stop_episode(None, reason).await
    }

    /// Stop `episode` if it is still the current session, or any session
    /// when `None`.
    pub(crate) async fn stop_episode(&self, episode: Option<Episode>, reason: StopReason) -> bool {
        let inner = &self.inner;

        let Some(previous) = inner.tracking.write().await.reset(episode) else {
            return false;
        };

        match reason {
            StopReason::Operator | StopReason::Retarget | StopReason::Shutdown => {
                info!("Tracking stopped ({:?})", reason)
            }
            StopReason::TargetLost | StopReason::OutOfEnvelope | StopReason::DarkFilter => {
                warn!("Tracking stopped ({:?})", reason)
            }
            StopReason::SolarCritical | StopReason::DeviceFault | StopReason::ControlFault => {
                error!("Tracking stopped ({:?})", reason)
            }
        }

        if let Some(watcher) = inner.watcher.lock().await.take() {
            watcher.abort();
        }

        let slew_in_flight = previous == TrackingMode::Intercept || inner.mount.read().await.slewing;

        let _gate = inner.motion.lock().await;
        if let Err(e) = inner.device.stop_axes().await {
            error!("Failed to stop axes: {}", e);
        }
        if slew_in_flight {
            if let Err(e) = inner.device.abort_slew().await {
                error!("Failed to abort slew: {}", e);
            }
        }

        true
    }

    /// Poll the device until it reaches the commanded position or the
    /// intercept timeout expires, then hand over to Continuous.
    async fn watch_intercept(self, episode: Episode) {
        let timing = &self.inner.config.tracking;
        let deadline = Instant::now() + timing.intercept_timeout();
        let mut ticker = time::interval(timing.intercept_poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown = self.inner.shutdown.subscribe();

        loop {
            let stop = tokio::select! {
                _ = ticker.tick() => false,
                _ = shutdown.wait_for(|stop| *stop) => true,
            };
            if stop {
                return;
            }

            let commanded = {
                let tracking = self.inner.tracking.read().await;
                if !tracking.is_current(episode) {
                    return;
                }
                tracking.commanded()
            };
            let Some(commanded) = commanded else { return };

            if Instant::now() >= deadline {
                warn!(
                    "Intercept did not settle within {:.0}s, proceeding to continuous tracking",
                    timing.intercept_timeout_s
                );
                break;
            }

            match self.poll_mount().await {
                Ok(position) if within_threshold(&position, &commanded, timing.intercept_threshold_deg) => {
                    info!(
                        "Intercept complete at Az {:.2}° Alt {:.2}°",
                        position.azimuth, position.altitude
                    );
                    break;
                }
                Ok(_) => {}
                Err(e) => warn!("Intercept position poll failed: {}", e),
            }
        }

        let mut tracking = self.inner.tracking.write().await;
        if tracking.promote(episode) {
            if let Some(target) = tracking.target() {
                info!("Tracking {} ({}) continuously", target.callsign, target.icao);
            }
        }
    }

    /// Read position and slew flag from the device into [`MountStatus`].
    pub async fn poll_mount(&self) -> std::result::Result<HorizontalPosition, DeviceError> {
        let device = &self.inner.device;
        let polled = async {
            let altitude = device.altitude().await?;
            let azimuth = device.azimuth().await?;
            let slewing = device.is_slewing().await?;
            Ok::<_, DeviceError>((HorizontalPosition::new(altitude, azimuth), slewing))
        }
        .await;

        let mut status = self.inner.mount.write().await;
        match polled {
            Ok((position, slewing)) => {
                status.position = Some(position);
                status.slewing = slewing;
                status.connected = true;
                status.updated_at = Some(Utc::now());
                Ok(position)
            }
            Err(e) => {
                status.connected = false;
                Err(e)
            }
        }
    }

    /// Pull a fresh snapshot from the feed, publish it, and run one tracking tick.
    pub async fn refresh(&self) -> std::result::Result<(), FeedError> {
        let records = self.inner.feed.snapshot().await?;
        let snapshot = Arc::new(SkySnapshot::from_records(&self.inner.observer, records, Utc::now()));
        *self.inner.sky.write().await = snapshot.clone();
        self.tracking_tick(&snapshot).await;
        Ok(())
    }

    async fn tracking_tick(&self, snapshot: &SkySnapshot) {
        let inner = &self.inner;

        let (episode, icao) = {
            let tracking = inner.tracking.read().await;
            match tracking.target() {
                Some(target) => (tracking.episode(), target.icao.clone()),
                None => return,
            }
        };

        let Some(view) = snapshot.find(&icao) else {
            warn!("Lost {}: absent from feed snapshot", icao);
            self.stop_episode(Some(episode), StopReason::TargetLost).await;
            return;
        };

        let window = &inner.config.envelope;
        if !window.contains(view.horizontal.altitude) {
            warn!(
                "{} at altitude {:.1}° left operating window ({:.0}°-{:.0}°)",
                icao, view.horizontal.altitude, window.min_altitude_deg, window.max_altitude_deg
            );
            self.stop_episode(Some(episode), StopReason::OutOfEnvelope).await;
            return;
        }

        let Some(previous) = inner.tracking.write().await.advance(episode, view) else {
            return;
        };

        let elapsed_s = inner.config.tracking.refresh_interval().as_secs_f64();
        let rates = match compute_rates(&previous, &view.horizontal, elapsed_s, inner.config.max_rate_deg_s) {
            Ok(rates) => rates,
            Err(e) => {
                error!("Rate computation for {} failed: {}", icao, e);
                self.stop_episode(Some(episode), StopReason::ControlFault).await;
                return;
            }
        };

        let sent = {
            let _gate = inner.motion.lock().await;
            if !inner.tracking.read().await.is_current(episode) {
                return;
            }
            debug!(
                "{}: Alt {:+.3}°/s Az {:+.3}°/s toward Az {:.2}° Alt {:.2}°",
                icao, rates.altitude, rates.azimuth, view.horizontal.azimuth, view.horizontal.altitude
            );
            match inner.device.move_axis(Axis::Altitude, rates.altitude).await {
                Ok(()) => inner.device.move_axis(Axis::Azimuth, rates.azimuth).await,
                Err(e) => Err(e),
            }
        };

        if let Err(e) = sent {
            error!("Rate command for {} failed: {}", icao, e);
            self.stop_episode(Some(episode), StopReason::DeviceFault).await;
        }
    }

    fn spawn_periodic<F, Fut>(&self, name: &'static str, period: Duration, tick: F) -> JoinHandle<()>
    where
        F: Fn(Tracker) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let tracker = self.clone();
        let mut shutdown = self.inner.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                let stop = tokio::select! {
                    _ = ticker.tick() => false,
                    _ = shutdown.wait_for(|stop| *stop) => true,
                };
                if stop {
                    break;
                }
                tick(tracker.clone()).await;
            }
            debug!("{} task stopped", name);
        })
    }

    /// Start the feed refresh, mount poll and solar monitor tasks.
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        let config = &self.inner.config;
        vec![
            self.spawn_periodic("feed", config.tracking.refresh_interval(), |t| async move {
                if let Err(e) = t.refresh().await {
                    warn!("Aircraft feed refresh failed: {}", e);
                }
            }),
            self.spawn_periodic("mount-poll", config.tracking.mount_poll_interval(), |t| async move {
                if let Err(e) = t.poll_mount().await {
                    warn!("Mount position poll failed: {}", e);
                }
            }),
            self.spawn_periodic("solar-monitor", config.solar.monitor_interval(), |t| async move {
                t.solar_tick().await;
            }),
        ]
    }

    /// Stop tracking and signal every periodic task to exit.
    pub async fn shutdown(&self) {
        self.stop_tracking(StopReason::Shutdown).await;
        self.inner.shutdown.send_replace(true);
        if let Some(watcher) = self.inner.watcher.lock().await.take() {
            watcher.abort();
        }
    }
}
