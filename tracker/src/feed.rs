//! Aircraft feed sources
//!
//! | Source | Data | Auth |
//! |--------|------|------|
//! | JSON file | `Vec<AircraftRecord>` | None |
//! | airplanes.live | ADS-B point query | None |

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use mount_control::{AircraftFeed, AircraftRecord, FeedError};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Re-reads a JSON array of records on every snapshot.
pub struct JsonFileFeed {
    path: PathBuf,
}

impl JsonFileFeed {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl AircraftFeed for JsonFileFeed {
    async fn snapshot(&self) -> Result<Vec<AircraftRecord>, FeedError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| FeedError::Unavailable(format!("{}: {}", self.path.display(), e)))?;
        serde_json::from_str(&raw).map_err(|e| FeedError::Malformed(e.to_string()))
    }
}

/// airplanes.live point query centred on the observer.
pub struct AirplanesLiveFeed {
    http: reqwest::Client,
    base_url: String,
    latitude: f64,
    longitude: f64,
    radius_nm: f64,
}

/// API caps the query radius.
const MAX_RADIUS_NM: f64 = 250.0;

impl AirplanesLiveFeed {
    pub fn new(base_url: String, latitude: f64, longitude: f64, radius_nm: f64) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url,
            latitude,
            longitude,
            radius_nm: radius_nm.min(MAX_RADIUS_NM),
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/point/{:.4}/{:.4}/{:.0}",
            self.base_url.trim_end_matches('/'),
            self.latitude,
            self.longitude,
            self.radius_nm
        )
    }
}

#[derive(Debug, Deserialize)]
struct LiveResponse {
    #[serde(default)]
    ac: Vec<LiveAircraft>,
    /// Server time, ms since the epoch
    now: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct LiveAircraft {
    hex: String,
    flight: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    /// Feet, or the string "ground"
    alt_baro: Option<Value>,
    alt_geom: Option<f64>,
    gs: Option<f64>,
    track: Option<f64>,
    baro_rate: Option<f64>,
    /// Seconds since last message
    seen: Option<f64>,
}

impl LiveAircraft {
    fn altitude_ft(&self) -> Option<f64> {
        if let Some(geom) = self.alt_geom {
            return Some(geom);
        }
        match self.alt_baro.as_ref()? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) if s == "ground" => Some(0.0),
            _ => None,
        }
    }

    fn into_record(self, now: DateTime<Utc>) -> Option<AircraftRecord> {
        let (latitude, longitude) = (self.lat?, self.lon?);
        let altitude_ft = self.altitude_ft()?;
        let age = TimeDelta::milliseconds((self.seen.unwrap_or(0.0) * 1000.0) as i64);

        Some(AircraftRecord {
            icao: self.hex.trim().to_lowercase(),
            callsign: self.flight.unwrap_or_default().trim().to_string(),
            latitude,
            longitude,
            altitude_ft,
            ground_speed_kts: self.gs.unwrap_or(0.0),
            track_deg: self.track.unwrap_or(0.0),
            vertical_rate_fpm: self.baro_rate.unwrap_or(0.0),
            last_seen: now - age,
        })
    }
}

fn parse_live(body: LiveResponse) -> Vec<AircraftRecord> {
    let now = body
        .now
        .and_then(|ms| DateTime::<Utc>::from_timestamp_millis(ms as i64))
        .unwrap_or_else(Utc::now);
    let total = body.ac.len();
    let records: Vec<_> = body
        .ac
        .into_iter()
        .filter_map(|ac| ac.into_record(now))
        .collect();
    if records.len() < total {
        debug!("Dropped {} aircraft without position or altitude", total - records.len());
    }
    records
}

#[async_trait]
impl AircraftFeed for AirplanesLiveFeed {
    async fn snapshot(&self) -> Result<Vec<AircraftRecord>, FeedError> {
        let response = self
            .http
            .get(self.url())
            .send()
            .await
            .map_err(|e| FeedError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FeedError::Unavailable(format!(
                "airplanes.live returned status: {}",
                response.status()
            )));
        }

        let body: LiveResponse = response
            .json()
            .await
            .map_err(|e| FeedError::Malformed(e.to_string()))?;
        Ok(parse_live(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "ac": [
            {"hex": "A1B2C3", "flight": "UAL123  ", "lat": 35.2, "lon": -80.9,
             "alt_baro": 12000, "alt_geom": 12350, "gs": 310.5, "track": 45.0, "baro_rate": -640, "seen": 1.5},
            {"hex": "abcdef", "flight": "N123AB", "lat": 35.21, "lon": -80.94, "alt_baro": "ground", "gs": 12.0},
            {"hex": "000001", "alt_baro": 9000},
            {"hex": "000002", "lat": 35.0, "lon": -80.0}
        ],
        "now": 1718884920000,
        "total": 4
    }"#;

    #[test]
    fn test_live_response_conversion() {
        let body: LiveResponse = serde_json::from_str(SAMPLE).unwrap();
        let records = parse_live(body);
        assert_eq!(records.len(), 2);

        let ual = &records[0];
        assert_eq!(ual.icao, "a1b2c3");
        assert_eq!(ual.callsign, "UAL123");
        assert_eq!(ual.altitude_ft, 12350.0);
        assert_eq!(ual.vertical_rate_fpm, -640.0);
        assert_eq!(ual.last_seen.timestamp_millis(), 1718884920000 - 1500);

        let ground = &records[1];
        assert_eq!(ground.altitude_ft, 0.0);
        assert_eq!(ground.track_deg, 0.0);
    }

    #[test]
    fn test_point_url_and_radius_cap() {
        let feed = AirplanesLiveFeed::new("https://api.airplanes.live/v2/".into(), 35.12346, -80.5, 400.0).unwrap();
        assert_eq!(feed.url(), "https://api.airplanes.live/v2/point/35.1235/-80.5000/250");
    }

    #[tokio::test]
    async fn test_file_feed_reads_records() {
        let path = std::env::temp_dir().join(format!("tracker-feed-{}.json", std::process::id()));
        let records = vec![AircraftRecord {
            icao: "a00001".into(),
            callsign: "TEST1".into(),
            latitude: 35.0,
            longitude: -80.0,
            altitude_ft: 5000.0,
            ground_speed_kts: 200.0,
            track_deg: 90.0,
            vertical_rate_fpm: 0.0,
            last_seen: Utc::now(),
        }];
        tokio::fs::write(&path, serde_json::to_string(&records).unwrap()).await.unwrap();

        let feed = JsonFileFeed::new(path.clone());
        assert_eq!(feed.snapshot().await.unwrap(), records);

        tokio::fs::write(&path, "not json").await.unwrap();
        assert!(matches!(feed.snapshot().await, Err(FeedError::Malformed(_))));
        tokio::fs::remove_file(&path).await.unwrap();
    }
}
