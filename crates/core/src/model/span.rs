use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::time::deserialize_timestamp;

/// One timed unit of work within a trace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Span {
    pub span_id: String,
    #[serde(default)]
    pub parent_span_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(rename = "op", default, deserialize_with = "null_as_default")]
    pub operation: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub start_timestamp: f64,
    #[serde(
        rename = "timestamp",
        alias = "end_timestamp",
        deserialize_with = "deserialize_timestamp"
    )]
    pub end_timestamp: f64,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: BTreeMap<String, serde_json::Value>,
}

impl Span {
    pub fn new(
        span_id: impl Into<String>,
        parent_span_id: Option<&str>,
        operation: impl Into<String>,
        start_timestamp: f64,
        end_timestamp: f64,
    ) -> Self {
        Self {
            span_id: span_id.into(),
            parent_span_id: parent_span_id.map(str::to_string),
            trace_id: None,
            operation: operation.into(),
            description: None,
            status: None,
            start_timestamp,
            end_timestamp,
            tags: BTreeMap::new(),
            data: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn duration_secs(&self) -> f64 {
        (self.end_timestamp - self.start_timestamp).max(0.0)
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_secs() * 1_000.0
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Tag values arrive as strings, numbers or booleans; `null` tags are dropped.
fn deserialize_tags<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect())
}
