use crate::error::DeliveryError;
use crate::models::{TrackAccepted, TrackPayload};
use async_trait::async_trait;
use tracing::debug;

/// Network send primitive used by the sync engine.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers one batch. Any non-2xx answer is a failure.
    async fn send(&self, payload: &TrackPayload) -> Result<(), DeliveryError>;
}

/// Collector client over HTTP.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// `base_url` is the collector API root, e.g. `http://localhost:3000/api`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn track_url(&self) -> String {
        format!("{}/track", self.base_url)
    }

    pub fn status_url(&self) -> String {
        format!("{}/status", self.base_url)
    }

    /// Liveness check against `GET /status`.
    pub async fn probe(&self) -> bool {
        match self.client.get(self.status_url()).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Collector probe failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: &TrackPayload) -> Result<(), DeliveryError> {
        let resp = self
            .client
            .post(self.track_url())
            .json(payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        match resp.json::<TrackAccepted>().await {
            Ok(accepted) => debug!(
                "Collector accepted {} points for {}",
                accepted.inserted, accepted.session_id
            ),
            Err(e) => debug!("Collector answered {} with unexpected body: {}", status, e),
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::LocationPoint;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    /// Serves `router` on an ephemeral port and returns its API root.
    pub(crate) async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/api", addr)
    }

    fn payload() -> TrackPayload {
        let point = LocationPoint {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
            latitude: -23.5505,
            longitude: -46.6333,
            accuracy: Some(10.0),
            heading: None,
            speed: None,
            is_offline_buffer: false,
        };
        TrackPayload::new("s1", vec![point])
    }

    #[test]
    fn test_urls_ignore_trailing_slash() {
        let transport = HttpTransport::new("http://localhost:3000/api/");
        assert_eq!(transport.track_url(), "http://localhost:3000/api/track");
        assert_eq!(transport.status_url(), "http://localhost:3000/api/status");
    }

    #[tokio::test]
    async fn test_unreachable_collector_is_transport_error() {
        let transport = HttpTransport::new("http://127.0.0.1:9");
        let err = transport.send(&payload()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Transport(_)));
        assert!(!transport.probe().await);
    }

    #[tokio::test]
    async fn test_error_status_carries_body() {
        let router = Router::new()
            .route(
                "/api/track",
                post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "database is down") }),
            )
            .route("/api/status", get(|| async { Json(json!({ "status": "ok" })) }));
        let transport = HttpTransport::new(serve(router).await);

        let err = transport.send(&payload()).await.unwrap_err();

        assert_eq!(
            err,
            DeliveryError::Status {
                status: 500,
                body: "database is down".to_string()
            }
        );
        assert!(transport.probe().await);
    }

    #[tokio::test]
    async fn test_accepted_batch_is_ok() {
        let router = Router::new().route(
            "/api/track",
            post(|Json(body): Json<TrackPayload>| async move {
                Json(json!({
                    "success": true,
                    "inserted": body.points.len(),
                    "sessionId": body.session_id
                }))
            }),
        );
        let transport = HttpTransport::new(serve(router).await);

        transport.send(&payload()).await.unwrap();
        assert!(!transport.probe().await);
    }
}
