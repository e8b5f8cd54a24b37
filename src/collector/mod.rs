//! HTTP collector receiving tracked points from devices.

pub mod store;

pub use store::{PgTrackStore, TrackStore};

use crate::error::ValidationError;
use crate::models::point::iso_millis;
use crate::models::{TrackAccepted, TrackPayload, TrackingPointInsert, TracksResponse};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TrackStore>,
}

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for CollectorError {
    fn into_response(self) -> Response {
        let (status, label) = match &self {
            CollectorError::Invalid(_) => (StatusCode::BAD_REQUEST, "Invalid payload"),
            CollectorError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
        };
        let body = json!({ "error": label, "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Routes are mounted under `/api`, matching the agent's default collector URL.
pub fn router(store: Arc<dyn TrackStore>) -> Router {
    let api = Router::new()
        .route("/track", post(track_handler))
        .route("/status", get(status_handler))
        .route("/tracks/:session_id", get(tracks_handler))
        .with_state(AppState { store });
    Router::new().nest("/api", api)
}

async fn track_handler(
    State(state): State<AppState>,
    payload: Result<Json<TrackPayload>, JsonRejection>,
) -> Result<Json<TrackAccepted>, CollectorError> {
    let Json(payload) = payload.map_err(|rejection| {
        warn!("Rejected malformed track payload: {}", rejection.body_text());
        ValidationError(rejection.body_text())
    })?;
    if let Err(e) = payload.validate() {
        warn!("Rejected track payload: {}", e);
        return Err(e.into());
    }

    let rows: Vec<TrackingPointInsert> = payload
        .points
        .iter()
        .map(|point| TrackingPointInsert::from_point(&payload.session_id, point))
        .collect();

    let inserted = state.store.insert_points(&rows).await.map_err(|e| {
        error!("Failed to store points for {}: {}", payload.session_id, e);
        CollectorError::from(e)
    })?;
    info!(
        "Stored {} points for session {}",
        inserted, payload.session_id
    );

    Ok(Json(TrackAccepted {
        success: true,
        inserted,
        session_id: payload.session_id,
    }))
}

async fn status_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": iso_millis::format(&Utc::now()),
    }))
}

async fn tracks_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<TracksResponse>, CollectorError> {
    let points = state.store.points_for_session(&session_id).await?;
    Ok(Json(TracksResponse { session_id, points }))
}
