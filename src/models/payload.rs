use crate::error::ValidationError;
use crate::models::point::LocationPoint;
use serde::{Deserialize, Serialize};

/// Batch body of `POST /track`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPayload {
    pub session_id: String,
    pub points: Vec<LocationPoint>,
}

impl TrackPayload {
    pub fn new(session_id: impl Into<String>, points: Vec<LocationPoint>) -> Self {
        Self {
            session_id: session_id.into(),
            points,
        }
    }

    /// Rejects batches the collector must not accept.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.session_id.trim().is_empty() {
            return Err(ValidationError("sessionId must not be blank".to_string()));
        }
        if self.points.is_empty() {
            return Err(ValidationError("points must not be empty".to_string()));
        }
        for (i, p) in self.points.iter().enumerate() {
            if !p.latitude.is_finite() || !(-90.0..=90.0).contains(&p.latitude) {
                return Err(ValidationError(format!(
                    "points[{}].latitude out of range: {}",
                    i, p.latitude
                )));
            }
            if !p.longitude.is_finite() || !(-180.0..=180.0).contains(&p.longitude) {
                return Err(ValidationError(format!(
                    "points[{}].longitude out of range: {}",
                    i, p.longitude
                )));
            }
        }
        Ok(())
    }
}

/// Response body of a successful `POST /track`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackAccepted {
    pub success: bool,
    pub inserted: usize,
    pub session_id: String,
}

/// Response body of `GET /tracks/{sessionId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracksResponse {
    pub session_id: String,
    pub points: Vec<LocationPoint>,
}
