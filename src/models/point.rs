use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single GPS observation as it travels over the wire.
///
/// Optional fields are `None` when the source did not report them and are
/// serialised as `null`, never as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPoint {
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    #[serde(default)]
    pub is_offline_buffer: bool,
}

impl LocationPoint {
    /// Copy of this point flagged as delivered from the offline buffer.
    pub fn as_offline_buffer(&self) -> Self {
        Self {
            is_offline_buffer: true,
            ..self.clone()
        }
    }

    /// Compares the geographic and time content, ignoring the buffer flag.
    pub fn same_fix(&self, other: &LocationPoint) -> bool {
        self.timestamp == other.timestamp
            && self.latitude == other.latitude
            && self.longitude == other.longitude
            && self.accuracy == other.accuracy
            && self.heading == other.heading
            && self.speed == other.speed
    }
}

/// A point held in the durable queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPoint {
    pub id: Uuid,
    #[serde(with = "iso_millis")]
    pub stored_at: DateTime<Utc>,
    #[serde(flatten)]
    pub point: LocationPoint,
}

/// ISO-8601 with millisecond precision and a `Z` suffix on output, any
/// RFC 3339 timestamp on input.
pub mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(dt))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> LocationPoint {
        LocationPoint {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
            latitude: -23.5505,
            longitude: -46.6333,
            accuracy: Some(10.0),
            heading: None,
            speed: None,
            is_offline_buffer: false,
        }
    }

    #[test]
    fn test_serializes_wire_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "timestamp": "2024-01-15T10:30:00.000Z",
                "latitude": -23.5505,
                "longitude": -46.6333,
                "accuracy": 10.0,
                "heading": null,
                "speed": null,
                "isOfflineBuffer": false
            })
        );
    }

    #[test]
    fn test_missing_optionals_are_none() {
        let point: LocationPoint = serde_json::from_str(
            r#"{"timestamp":"2024-01-15T07:30:00-03:00","latitude":1.5,"longitude":2.5}"#,
        )
        .unwrap();
        assert_eq!(point.timestamp, sample().timestamp);
        assert_eq!(point.accuracy, None);
        assert_eq!(point.speed, None);
        assert!(!point.is_offline_buffer);
    }

    #[test]
    fn test_offline_copy_keeps_fix() {
        let point = sample();
        let buffered = point.as_offline_buffer();
        assert!(buffered.is_offline_buffer);
        assert!(buffered.same_fix(&point));
        assert!(!point.is_offline_buffer);
    }

    #[test]
    fn test_stored_point_flattens() {
        let stored = StoredPoint {
            id: Uuid::nil(),
            stored_at: Utc.with_ymd_and_hms(2024, 1, 15, 10, 31, 0).unwrap(),
            point: sample().as_offline_buffer(),
        };
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["storedAt"], "2024-01-15T10:31:00.000Z");
        assert_eq!(json["latitude"], -23.5505);
        assert_eq!(json["isOfflineBuffer"], true);
    }
}
