use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mount_control::{
    MountStatus, SkySnapshot, SolarState, StopReason, TrackedTarget, Tracker, TrackingError,
    TrackingSnapshot,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub tracker: Tracker,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub tracking: TrackingSnapshot,
    pub solar: SolarState,
    pub mount: MountStatus,
}

#[derive(Deserialize)]
pub struct StartRequest {
    pub icao: String,
}

#[derive(Serialize)]
pub struct StopResponse {
    pub stopped: bool,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Tracking(#[from] TrackingError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::Tracking(err) = &self;
        let status = match err {
            TrackingError::UnknownAircraft(_) => StatusCode::NOT_FOUND,
            TrackingError::OutOfEnvelope { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            TrackingError::SolarRefused(_) => StatusCode::CONFLICT,
            TrackingError::Device(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/status", get(status))
        .route("/aircraft", get(aircraft))
        .route("/tracking/start", post(start_tracking))
        .route("/tracking/stop", post(stop_tracking))
        .with_state(state);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "tracker-gateway",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let tracker = &state.tracker;
    Json(StatusResponse {
        tracking: tracker.tracking().await,
        solar: tracker.solar().await,
        mount: tracker.mount().await,
    })
}

async fn aircraft(State(state): State<AppState>) -> Json<SkySnapshot> {
    Json(state.tracker.sky().await.as_ref().clone())
}

async fn start_tracking(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<Json<TrackedTarget>, ApiError> {
    let target = state.tracker.start_tracking(&req.icao).await?;
    Ok(Json(target))
}

async fn stop_tracking(State(state): State<AppState>) -> Json<StopResponse> {
    let stopped = state.tracker.stop_tracking(StopReason::Operator).await;
    Json(StopResponse { stopped })
}
