use crate::models::point::LocationPoint;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Row of the collector's `tracking_points` table.
///
/// Optional point fields live in the `metadata` bag so new wire fields do
/// not need a migration.
#[derive(Debug, Clone, FromRow)]
pub struct TrackingPointRecord {
    pub id: Uuid,
    pub session_id: String,
    pub recorded_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub metadata: Option<Json<Value>>,
}

/// Insert form of a tracking point (id and received_at are generated).
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingPointInsert {
    pub session_id: String,
    pub recorded_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub metadata: Value,
}

impl TrackingPointInsert {
    pub fn from_point(session_id: &str, point: &LocationPoint) -> Self {
        let mut metadata = Map::new();
        metadata.insert("speed".to_string(), option_to_value(point.speed));
        metadata.insert("heading".to_string(), option_to_value(point.heading));
        metadata.insert(
            "isOfflineBuffer".to_string(),
            Value::Bool(point.is_offline_buffer),
        );

        Self {
            session_id: session_id.to_string(),
            recorded_at: point.timestamp,
            latitude: point.latitude,
            longitude: point.longitude,
            accuracy: point.accuracy,
            metadata: Value::Object(metadata),
        }
    }
}

impl TrackingPointRecord {
    pub fn to_location_point(&self) -> LocationPoint {
        let metadata = self.metadata.as_ref().map(|m| &m.0);
        let field = |name: &str| metadata.and_then(|m| m.get(name));

        LocationPoint {
            timestamp: self.recorded_at,
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.accuracy,
            heading: field("heading").and_then(Value::as_f64),
            speed: field("speed").and_then(Value::as_f64),
            is_offline_buffer: field("isOfflineBuffer")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}

fn option_to_value(v: Option<f64>) -> Value {
    v.and_then(|f| serde_json::Number::from_f64(f).map(Value::Number))
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(metadata: Option<Value>) -> TrackingPointRecord {
        TrackingPointRecord {
            id: Uuid::new_v4(),
            session_id: "test-session".to_string(),
            recorded_at: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
            received_at: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 1).unwrap(),
            latitude: -23.5505,
            longitude: -46.6333,
            accuracy: None,
            metadata: metadata.map(Json),
        }
    }

    #[test]
    fn test_insert_folds_optionals_into_metadata() {
        let point = LocationPoint {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
            latitude: -23.5505,
            longitude: -46.6333,
            accuracy: Some(10.0),
            heading: None,
            speed: Some(5.5),
            is_offline_buffer: true,
        };
        let insert = TrackingPointInsert::from_point("s1", &point);
        assert_eq!(insert.accuracy, Some(10.0));
        assert_eq!(
            insert.metadata,
            json!({ "speed": 5.5, "heading": null, "isOfflineBuffer": true })
        );
    }

    #[test]
    fn test_record_maps_back() {
        let point = record(Some(json!({ "speed": 5, "heading": 90, "isOfflineBuffer": false })))
            .to_location_point();
        assert_eq!(point.speed, Some(5.0));
        assert_eq!(point.heading, Some(90.0));
        assert!(!point.is_offline_buffer);
    }

    #[test]
    fn test_missing_metadata_yields_nulls() {
        let point = record(None).to_location_point();
        assert_eq!(point.speed, None);
        assert_eq!(point.heading, None);
        assert_eq!(point.accuracy, None);
        assert!(!point.is_offline_buffer);
    }
}
