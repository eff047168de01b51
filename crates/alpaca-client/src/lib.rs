//! Alpaca Client
//!
//! [`MountDevice`] over the ASCOM Alpaca REST protocol.
//!
//! | Call | Method | Endpoint |
//! |------|--------|----------|
//! | position, slewing | GET | `/api/v1/telescope/{n}/{altitude,azimuth,slewing}` |
//! | absolute slew | PUT | `/api/v1/telescope/{n}/slewtoaltazasync` |
//! | axis rate | PUT | `/api/v1/telescope/{n}/moveaxis` |
//! | abort | PUT | `/api/v1/telescope/{n}/abortslew` |
//! | filter slot | GET/PUT | `/api/v1/filterwheel/{n}/position` |

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mount_control::{filter_slots, Axis, DeviceError, MountDevice};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub mod response;

pub use response::AlpacaResponse;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlpacaConfig {
    pub base_url: String,
    pub device_number: u32,
    /// Filter wheel device number, if one is fitted
    pub filter_wheel: Option<u32>,
    pub client_id: u32,
    pub timeout_s: u64,
}

impl Default for AlpacaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11111".to_string(),
            device_number: 0,
            filter_wheel: Some(0),
            client_id: 1,
            timeout_s: 10,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum DeviceKind {
    Telescope,
    FilterWheel,
}

impl DeviceKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Telescope => "telescope",
            Self::FilterWheel => "filterwheel",
        }
    }
}

pub struct AlpacaMount {
    http: reqwest::Client,
    config: AlpacaConfig,
    transaction: AtomicU32,
    connected: AtomicBool,
}

impl AlpacaMount {
    pub fn new(config: AlpacaConfig) -> Result<Self, DeviceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_s))
            .build()
            .map_err(|e| DeviceError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            config,
            transaction: AtomicU32::new(1),
            connected: AtomicBool::new(false),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn url(&self, kind: DeviceKind, endpoint: &str) -> Result<String, DeviceError> {
        let number = match kind {
            DeviceKind::Telescope => self.config.device_number,
            DeviceKind::FilterWheel => self
                .config
                .filter_wheel
                .ok_or(DeviceError::Unsupported("filter wheel"))?,
        };
        Ok(format!(
            "{}/api/v1/{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            kind.as_str(),
            number,
            endpoint
        ))
    }

    fn ids<'a>(&self) -> [(&'a str, String); 2] {
        let txn = self.transaction.fetch_add(1, Ordering::Relaxed);
        [
            ("ClientID", self.config.client_id.to_string()),
            ("ClientTransactionID", txn.to_string()),
        ]
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<AlpacaResponse<T>, DeviceError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DeviceError::Rejected {
                code: i32::from(status.as_u16()),
                message,
            });
        }
        response
            .json::<AlpacaResponse<T>>()
            .await
            .map_err(|e| DeviceError::UnexpectedValue(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, kind: DeviceKind, endpoint: &str) -> Result<T, DeviceError> {
        let url = self.url(kind, endpoint)?;
        let response = self
            .http
            .get(&url)
            .query(&self.ids())
            .send()
            .await
            .map_err(|e| DeviceError::Transport(e.to_string()))?;
        Self::decode::<T>(response).await?.into_value()
    }

    async fn put(&self, kind: DeviceKind, endpoint: &str, params: &[(&str, String)]) -> Result<(), DeviceError> {
        let url = self.url(kind, endpoint)?;
        let mut form: Vec<(&str, String)> = params.to_vec();
        form.extend(self.ids());

        debug!("PUT {} {:?}", url, form);
        let response = self
            .http
            .put(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| DeviceError::Transport(e.to_string()))?;
        Self::decode::<serde_json::Value>(response).await?.into_unit()
    }

    fn ensure_connected(&self) -> Result<(), DeviceError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(DeviceError::NotConnected)
        }
    }

    /// Connect the telescope and, best effort, the filter wheel.
    pub async fn connect(&self) -> Result<(), DeviceError> {
        self.put(DeviceKind::Telescope, "connected", &[("Connected", "true".into())])
            .await?;
        self.connected.store(true, Ordering::Release);
        info!("Connected to Alpaca telescope at {}", self.config.base_url);

        if self.config.filter_wheel.is_some() {
            match self
                .put(DeviceKind::FilterWheel, "connected", &[("Connected", "true".into())])
                .await
            {
                Ok(()) => info!("Filter wheel connected"),
                Err(e) => warn!("Filter wheel unavailable: {}", e),
            }
        }
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<(), DeviceError> {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        if self.config.filter_wheel.is_some() {
            if let Err(e) = self
                .put(DeviceKind::FilterWheel, "connected", &[("Connected", "false".into())])
                .await
            {
                warn!("Filter wheel disconnect failed: {}", e);
            }
        }
        self.put(DeviceKind::Telescope, "connected", &[("Connected", "false".into())])
            .await
    }

    pub async fn set_filter_position(&self, slot: u8) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        self.put(DeviceKind::FilterWheel, "position", &[("Position", slot.to_string())])
            .await
    }
}

#[async_trait]
impl MountDevice for AlpacaMount {
    fn name(&self) -> &str {
        &self.config.base_url
    }

    async fn altitude(&self) -> Result<f64, DeviceError> {
        self.ensure_connected()?;
        self.get(DeviceKind::Telescope, "altitude").await
    }

    async fn azimuth(&self) -> Result<f64, DeviceError> {
        self.ensure_connected()?;
        self.get(DeviceKind::Telescope, "azimuth").await
    }

    async fn is_slewing(&self) -> Result<bool, DeviceError> {
        self.ensure_connected()?;
        self.get(DeviceKind::Telescope, "slewing").await
    }

    async fn slew_to_alt_az(&self, altitude: f64, azimuth: f64) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        self.put(
            DeviceKind::Telescope,
            "slewtoaltazasync",
            &[
                ("Azimuth", format!("{:.6}", azimuth)),
                ("Altitude", format!("{:.6}", altitude)),
            ],
        )
        .await
    }

    async fn move_axis(&self, axis: Axis, rate_deg_s: f64) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        self.put(
            DeviceKind::Telescope,
            "moveaxis",
            &[("Axis", axis.id().to_string()), ("Rate", format!("{:.6}", rate_deg_s))],
        )
        .await
    }

    async fn stop_axes(&self) -> Result<(), DeviceError> {
        // Both axes are always attempted; the first failure is reported.
        let azimuth = self.move_axis(Axis::Azimuth, 0.0).await;
        let altitude = self.move_axis(Axis::Altitude, 0.0).await;
        azimuth.and(altitude)
    }

    async fn abort_slew(&self) -> Result<(), DeviceError> {
        self.ensure_connected()?;
        self.put(DeviceKind::Telescope, "abortslew", &[]).await
    }

    async fn current_filter_position(&self) -> Result<u8, DeviceError> {
        self.ensure_connected()?;
        let slot: i32 = self.get(DeviceKind::FilterWheel, "position").await?;
        // -1 while the wheel is moving
        u8::try_from(slot).map_err(|_| DeviceError::UnexpectedValue(format!("filter position {}", slot)))
    }

    async fn engage_dark_filter(&self) -> Result<(), DeviceError> {
        self.set_filter_position(filter_slots::DARK).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::routing::get;
    use axum::{Form, Json, Router};
    use serde_json::{json, Value};

    type Journal = Arc<Mutex<Vec<(String, HashMap<String, String>)>>>;

    async fn query(Path((device, _n, endpoint)): Path<(String, u32, String)>) -> Json<Value> {
        let value = match (device.as_str(), endpoint.as_str()) {
            ("telescope", "altitude") => json!(41.25),
            ("telescope", "azimuth") => json!(101.5),
            ("telescope", "slewing") => json!(false),
            ("filterwheel", "position") => json!(-1),
            _ => {
                return Json(json!({"ErrorNumber": 1024, "ErrorMessage": "Not implemented", "Value": null}))
            }
        };
        Json(json!({"Value": value, "ErrorNumber": 0, "ErrorMessage": "", "ClientTransactionID": 1, "ServerTransactionID": 1}))
    }

    async fn command(
        State(journal): State<Journal>,
        Path((device, _n, endpoint)): Path<(String, u32, String)>,
        Form(form): Form<HashMap<String, String>>,
    ) -> Json<Value> {
        journal.lock().unwrap().push((format!("{}/{}", device, endpoint), form));
        Json(json!({"ErrorNumber": 0, "ErrorMessage": "", "ClientTransactionID": 1, "ServerTransactionID": 1}))
    }

    async fn serve() -> (String, Journal) {
        let journal: Journal = Arc::default();
        let app = Router::new()
            .route("/api/v1/:device/:n/:endpoint", get(query).put(command))
            .with_state(journal.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), journal)
    }

    async fn connected_mount() -> (AlpacaMount, Journal) {
        let (base_url, journal) = serve().await;
        let mount = AlpacaMount::new(AlpacaConfig {
            base_url,
            client_id: 42,
            ..Default::default()
        })
        .unwrap();
        mount.connect().await.unwrap();
        (mount, journal)
    }

    #[tokio::test]
    async fn test_queries_require_connection() {
        let mount = AlpacaMount::new(AlpacaConfig::default()).unwrap();
        assert_eq!(mount.altitude().await, Err(DeviceError::NotConnected));
    }

    #[tokio::test]
    async fn test_position_queries() {
        let (mount, _) = connected_mount().await;
        assert_eq!(mount.altitude().await.unwrap(), 41.25);
        assert_eq!(mount.azimuth().await.unwrap(), 101.5);
        assert!(!mount.is_slewing().await.unwrap());
    }

    #[tokio::test]
    async fn test_slew_form_carries_ids() {
        let (mount, journal) = connected_mount().await;
        mount.slew_to_alt_az(40.0, 100.0).await.unwrap();

        let journal = journal.lock().unwrap();
        let (endpoint, form) = journal.last().unwrap();
        assert_eq!(endpoint, "telescope/slewtoaltazasync");
        assert_eq!(form["Altitude"], "40.000000");
        assert_eq!(form["Azimuth"], "100.000000");
        assert_eq!(form["ClientID"], "42");
        assert!(form.contains_key("ClientTransactionID"));
    }

    #[tokio::test]
    async fn test_stop_axes_zeroes_both_axes() {
        let (mount, journal) = connected_mount().await;
        mount.stop_axes().await.unwrap();

        let journal = journal.lock().unwrap();
        let moves: Vec<_> = journal
            .iter()
            .filter(|(endpoint, _)| endpoint == "telescope/moveaxis")
            .map(|(_, form)| (form["Axis"].clone(), form["Rate"].clone()))
            .collect();
        assert_eq!(
            moves,
            vec![
                ("0".to_string(), "0.000000".to_string()),
                ("1".to_string(), "0.000000".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_moving_filter_wheel_is_unexpected() {
        let (mount, _) = connected_mount().await;
        assert!(matches!(
            mount.current_filter_position().await,
            Err(DeviceError::UnexpectedValue(_))
        ));
    }

    #[tokio::test]
    async fn test_dark_filter_selects_slot_two() {
        let (mount, journal) = connected_mount().await;
        mount.engage_dark_filter().await.unwrap();
        let journal = journal.lock().unwrap();
        let (endpoint, form) = journal.last().unwrap();
        assert_eq!(endpoint, "filterwheel/position");
        assert_eq!(form["Position"], "2");
    }

    #[tokio::test]
    async fn test_device_error_surfaces() {
        let (mount, _) = connected_mount().await;
        let err = mount.get::<f64>(DeviceKind::Telescope, "declination").await.unwrap_err();
        assert!(matches!(err, DeviceError::Rejected { code: 1024, .. }));
    }
}
