use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer};

use crate::error::{Result, SpanTreeError};

/// Parses a wire timestamp string into UNIX seconds.
///
/// Accepts RFC 3339 as well as naive ISO-8601 date-times, which are taken to
/// be UTC.
pub fn parse_timestamp_str(input: &str) -> Result<f64> {
    let dt = match input.parse::<NaiveDateTime>() {
        Ok(naive) => naive.and_utc(),
        Err(_) => DateTime::parse_from_rfc3339(input)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| SpanTreeError::Parse(format!("invalid timestamp {input}: {e}")))?,
    };
    Ok(datetime_to_seconds(dt))
}

pub fn datetime_to_seconds(dt: DateTime<Utc>) -> f64 {
    let micros = (f64::from(dt.timestamp_subsec_nanos()) / 1_000f64).round();
    dt.timestamp() as f64 + (micros / 1_000_000f64)
}

pub fn seconds_to_rfc3339(secs: f64) -> Option<String> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1_000_000_000f64).round().min(999_999_999f64) as u32;
    DateTime::<Utc>::from_timestamp(whole as i64, nanos)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| SpanTreeError::Parse(format!("invalid duration {input}: {e}")))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Seconds(f64),
    Text(String),
}

pub(crate) fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match WireTimestamp::deserialize(deserializer)? {
        WireTimestamp::Seconds(secs) => Ok(secs),
        WireTimestamp::Text(text) => parse_timestamp_str(&text).map_err(serde::de::Error::custom),
    }
}

pub(crate) fn deserialize_opt_timestamp<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<WireTimestamp>::deserialize(deserializer)? {
        None => Ok(None),
        Some(WireTimestamp::Seconds(secs)) => Ok(Some(secs)),
        Some(WireTimestamp::Text(text)) => parse_timestamp_str(&text)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
