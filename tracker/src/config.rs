//! Service configuration
//!
//! JSON file (optional) -> environment overrides -> CLI flags, later wins.

use std::path::{Path, PathBuf};

use alpaca_client::AlpacaConfig;
use anyhow::{Context, Result};
use mount_control::sky_coordinates::Observer;
use mount_control::ControlConfig;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BIND: &str = "0.0.0.0:18700";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub observer: Observer,
    pub alpaca: AlpacaConfig,
    pub control: ControlConfig,
    pub feed: FeedSource,
    pub server: ServerConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            observer: Observer::new(0.0, 0.0, 0.0),
            alpaca: AlpacaConfig::default(),
            control: ControlConfig::default(),
            feed: FeedSource::default(),
            server: ServerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedSource {
    /// JSON array of aircraft records, re-read every refresh
    File { path: PathBuf },
    /// airplanes.live point query around the observer
    AirplanesLive { base_url: String, radius_nm: f64 },
}

impl Default for FeedSource {
    fn default() -> Self {
        FeedSource::AirplanesLive {
            base_url: "https://api.airplanes.live/v2".to_string(),
            radius_nm: 25.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

impl TrackerConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => TrackerConfig::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.control.validate()?;
        Ok(config)
    }

    /// Apply `TRACKER_*` overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("TRACKER_MOUNT_URL") {
            self.alpaca.base_url = url;
        }
        if let Some(bind) = lookup("TRACKER_BIND") {
            self.server.bind = bind;
        }
        if let Some(lat) = lookup("TRACKER_OBSERVER_LAT") {
            self.observer.latitude = lat
                .parse()
                .with_context(|| format!("TRACKER_OBSERVER_LAT={lat}"))?;
        }
        if let Some(lon) = lookup("TRACKER_OBSERVER_LON") {
            self.observer.longitude = lon
                .parse()
                .with_context(|| format!("TRACKER_OBSERVER_LON={lon}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_file_config_parses() {
        let raw = r#"{
            "observer": {"name": "Backyard", "latitude": 35.1, "longitude": -80.8, "elevation_m": 230},
            "alpaca": {"base_url": "http://seestar.local:5555"},
            "control": {"envelope": {"min_altitude_deg": 15.0}},
            "feed": {"kind": "file", "path": "aircraft.json"}
        }"#;
        let config: TrackerConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.observer.name, "Backyard");
        assert_eq!(config.observer.timezone, "UTC");
        assert_eq!(config.alpaca.device_number, 0);
        assert_eq!(config.control.envelope.min_altitude_deg, 15.0);
        assert_eq!(config.control.envelope.max_altitude_deg, 80.0);
        assert_eq!(config.feed, FeedSource::File { path: "aircraft.json".into() });
        assert_eq!(config.server.bind, DEFAULT_BIND);
    }

    #[test]
    fn test_example_config_is_valid() {
        let config: TrackerConfig =
            serde_json::from_str(include_str!("../tracker.example.json")).unwrap();
        config.control.validate().unwrap();
        assert_eq!(config.control.solar.thresholds.caution_deg, 30.0);
        assert_eq!(config.control.solar.monitor_interval_ms, 10_000);
        assert!(matches!(config.feed, FeedSource::AirplanesLive { radius_nm, .. } if radius_nm == 25.0));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TRACKER_MOUNT_URL", "http://10.0.0.5:11111"),
            ("TRACKER_OBSERVER_LAT", "51.5"),
            ("TRACKER_OBSERVER_LON", "-0.12"),
        ]);
        let mut config = TrackerConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.alpaca.base_url, "http://10.0.0.5:11111");
        assert_eq!(config.observer.latitude, 51.5);
        assert_eq!(config.observer.longitude, -0.12);
        assert_eq!(config.server.bind, DEFAULT_BIND);
    }

    #[test]
    fn test_bad_override_is_an_error() {
        let mut config = TrackerConfig::default();
        let err = config
            .apply_overrides(|key| (key == "TRACKER_OBSERVER_LAT").then(|| "north".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("TRACKER_OBSERVER_LAT"));
    }
}
