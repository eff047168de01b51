//! Aircraft position feed

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sky_coordinates::{Geographic, FEET_TO_METERS};
use tokio::sync::RwLock;

use crate::error::FeedError;

/// One aircraft as reported by the feed. Altitude in feet as broadcast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AircraftRecord {
    pub icao: String,
    #[serde(default)]
    pub callsign: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_ft: f64,
    #[serde(default)]
    pub ground_speed_kts: f64,
    #[serde(default)]
    pub track_deg: f64,
    #[serde(default)]
    pub vertical_rate_fpm: f64,
    pub last_seen: DateTime<Utc>,
}

impl AircraftRecord {
    pub fn geographic(&self) -> Geographic {
        Geographic::new(self.latitude, self.longitude, self.altitude_ft * FEET_TO_METERS)
    }
}

/// Point-in-time read of the aircraft currently visible.
#[async_trait]
pub trait AircraftFeed: Send + Sync {
    async fn snapshot(&self) -> Result<Vec<AircraftRecord>, FeedError>;
}

/// In-memory feed whose contents are replaced wholesale.
#[derive(Debug, Default)]
pub struct StaticFeed {
    records: RwLock<Vec<AircraftRecord>>,
}

impl StaticFeed {
    pub fn new(records: Vec<AircraftRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn replace(&self, records: Vec<AircraftRecord>) {
        *self.records.write().await = records;
    }
}

#[async_trait]
impl AircraftFeed for StaticFeed {
    async fn snapshot(&self) -> Result<Vec<AircraftRecord>, FeedError> {
        Ok(self.records.read().await.clone())
    }
}
