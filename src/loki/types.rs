//! Loki records and HTTP API response shapes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One log line with its stream labels.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub labels: BTreeMap<String, String>,
    pub line: String,
}

/// One point of a metric series.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

/// Optional bounds of a query; Loki applies its own defaults to missing ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// `start`/`end` query parameters as unix nanoseconds.
    pub(crate) fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(2);
        if let Some(start) = self.start.and_then(|t| t.timestamp_nanos_opt()) {
            params.push(("start", start.to_string()));
        }
        if let Some(end) = self.end.and_then(|t| t.timestamp_nanos_opt()) {
            params.push(("end", end.to_string()));
        }
        params
    }
}

/// `{"status": "...", "data": ...}` envelope of every API answer.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    pub status: String,
    pub data: T,
}

/// `data` of a `query_range` answer; `result` depends on `resultType`.
#[derive(Debug, Deserialize)]
pub(crate) struct QueryData {
    #[serde(rename = "resultType")]
    pub result_type: String,
    pub result: serde_json::Value,
}

/// One entry of a `streams` result. Entries are `[ns, line]`, optionally
/// followed by structured metadata.
#[derive(Debug, Deserialize)]
pub(crate) struct Stream {
    #[serde(default)]
    pub stream: BTreeMap<String, String>,
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}

/// One entry of a `matrix` result. Points are `[unix_seconds, "value"]`.
#[derive(Debug, Deserialize)]
pub(crate) struct Series {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    #[serde(default)]
    pub values: Vec<(f64, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_time_range_params_are_nanoseconds() {
        let range = TimeRange::new(Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()), None);
        assert_eq!(
            range.params(),
            vec![("start", "1704067200000000000".to_string())]
        );
        assert!(TimeRange::default().params().is_empty());
    }

    #[test]
    fn test_stream_tolerates_structured_metadata() {
        let stream: Stream = serde_json::from_str(
            r#"{"stream":{"job":"api"},"values":[["1","a"],["2","b",{"trace_id":"x"}]]}"#,
        )
        .unwrap();
        assert_eq!(stream.values.len(), 2);
        assert_eq!(stream.values[1].len(), 3);
    }
}
