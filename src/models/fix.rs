use serde::{Deserialize, Deserializer};

/// A raw position report as delivered by a device or driver.
///
/// `timestamp` is the device clock in epoch milliseconds. Numeric fields
/// accept either JSON numbers or numeric strings, since several GPS
/// firmwares emit everything quoted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawFix {
    #[serde(deserialize_with = "parse_i64")]
    pub timestamp: i64,
    #[serde(alias = "lat", deserialize_with = "parse_f64")]
    pub latitude: f64,
    #[serde(alias = "lng", alias = "lon", deserialize_with = "parse_f64")]
    pub longitude: f64,
    #[serde(default, deserialize_with = "parse_f64_option")]
    pub accuracy: Option<f64>,
    #[serde(default, alias = "course", deserialize_with = "parse_f64_option")]
    pub heading: Option<f64>,
    #[serde(default, deserialize_with = "parse_f64_option")]
    pub speed: Option<f64>,
}

impl RawFix {
    pub fn new(timestamp: i64, latitude: f64, longitude: f64) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
            accuracy: None,
            heading: None,
            speed: None,
        }
    }
}

/// Error report from a position source, using the numeric codes of the
/// W3C geolocation API (1 denied, 2 unavailable, 3 timeout).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceError {
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

impl SourceError {
    pub const PERMISSION_DENIED: u16 = 1;
    pub const POSITION_UNAVAILABLE: u16 = 2;
    pub const TIMEOUT: u16 = 3;

    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// One line of a newline-delimited fix feed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FeedLine {
    Error { error: SourceError },
    Fix(RawFix),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrFloat {
    String(String),
    Float(f64),
}

fn parse_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match StringOrFloat::deserialize(deserializer)? {
        StringOrFloat::Float(f) => Ok(f),
        StringOrFloat::String(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
    }
}

fn parse_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = parse_f64(deserializer)?;
    if !value.is_finite() {
        return Err(serde::de::Error::custom("timestamp is not a finite number"));
    }
    Ok(value as i64)
}

fn parse_f64_option<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v: Option<StringOrFloat> = Option::deserialize(deserializer)?;
    match v {
        Some(StringOrFloat::Float(f)) => Ok(Some(f)),
        Some(StringOrFloat::String(s)) => {
            if s.trim().is_empty() {
                Ok(None)
            } else {
                s.trim().parse::<f64>().map(Some).map_err(serde::de::Error::custom)
            }
        }
        None => Ok(None),
    }
}
