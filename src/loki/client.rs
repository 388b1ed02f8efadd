//! Loki HTTP API client.

use async_trait::async_trait;
use chrono::DateTime;
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::MAX_ERROR_BODY_CHARS;
use crate::error_handling::LokiError;
use crate::loki::types::{
    ApiResponse, LogRecord, MetricSample, QueryData, Series, Stream, TimeRange,
};

/// Read access to a label-indexed log store.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Succeeds when the store reports itself ready.
    async fn ready(&self) -> Result<(), LokiError>;

    async fn labels(&self) -> Result<Vec<String>, LokiError>;

    async fn label_values(&self, label: &str) -> Result<Vec<String>, LokiError>;

    /// Most recent `limit` log lines matching `query`.
    async fn query_logs(
        &self,
        query: &str,
        range: &TimeRange,
        limit: u32,
    ) -> Result<Vec<LogRecord>, LokiError>;

    /// Samples of a metric query evaluated every `step`.
    async fn query_metrics(
        &self,
        query: &str,
        range: &TimeRange,
        step: &str,
    ) -> Result<Vec<MetricSample>, LokiError>;
}

/// [`LogStore`] over the Loki HTTP API.
#[derive(Debug, Clone)]
pub struct LokiClient {
    http: Client,
    base: Url,
}

fn truncate(mut body: String) -> String {
    if let Some((cut, _)) = body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        body.truncate(cut);
        body.push_str("...");
    }
    body
}

impl LokiClient {
    /// `http` carries the timeout; `base_url` may include a path prefix.
    pub fn new(http: Client, base_url: &str) -> Result<Self, LokiError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: Url,
        params: &[(&str, String)],
    ) -> Result<T, LokiError> {
        debug!("GET {}", url);
        let response = self.http.get(url).query(params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LokiError::Status {
                status: status.as_u16(),
                body: truncate(body),
            });
        }
        let envelope: ApiResponse<T> = response.json().await?;
        if envelope.status != "success" {
            return Err(LokiError::Malformed(format!(
                "status '{}'",
                envelope.status
            )));
        }
        Ok(envelope.data)
    }

    async fn query_range(
        &self,
        mut params: Vec<(&str, String)>,
        range: &TimeRange,
    ) -> Result<QueryData, LokiError> {
        params.extend(range.params());
        let url = self.base.join("loki/api/v1/query_range")?;
        self.get(url, &params).await
    }
}

fn parse_stream_entry(
    entry: &[serde_json::Value],
) -> Result<(DateTime<chrono::Utc>, String), LokiError> {
    let (Some(ts), Some(line)) = (entry.first(), entry.get(1)) else {
        return Err(LokiError::Malformed(format!(
            "log entry with {} element(s)",
            entry.len()
        )));
    };
    let ts = ts
        .as_str()
        .ok_or_else(|| LokiError::InvalidTimestamp(ts.to_string()))?;
    let nanos: i64 = ts
        .parse()
        .map_err(|_| LokiError::InvalidTimestamp(ts.to_string()))?;
    let line = line
        .as_str()
        .ok_or_else(|| LokiError::Malformed("log line is not a string".to_string()))?;
    Ok((DateTime::from_timestamp_nanos(nanos), line.to_string()))
}

/// Flattens a `streams` result.
pub(crate) fn streams_to_records(data: QueryData) -> Result<Vec<LogRecord>, LokiError> {
    if data.result_type != "streams" {
        return Err(LokiError::Malformed(format!(
            "expected a streams result, got '{}' (is this a metric query? use --loki-metrics)",
            data.result_type
        )));
    }
    let streams: Vec<Stream> = serde_json::from_value(data.result)
        .map_err(|e| LokiError::Malformed(e.to_string()))?;
    let mut records = Vec::new();
    for stream in streams {
        for entry in &stream.values {
            let (timestamp, line) = parse_stream_entry(entry)?;
            records.push(LogRecord {
                timestamp,
                labels: stream.stream.clone(),
                line,
            });
        }
    }
    Ok(records)
}

/// Flattens a `matrix` result.
pub(crate) fn matrix_to_samples(data: QueryData) -> Result<Vec<MetricSample>, LokiError> {
    if data.result_type != "matrix" {
        return Err(LokiError::Malformed(format!(
            "expected a matrix result, got '{}' (is this a log query? use --loki-query)",
            data.result_type
        )));
    }
    let series: Vec<Series> = serde_json::from_value(data.result)
        .map_err(|e| LokiError::Malformed(e.to_string()))?;
    let mut samples = Vec::new();
    for s in series {
        for (seconds, raw) in &s.values {
            let timestamp = DateTime::from_timestamp_millis((seconds * 1000.0).round() as i64)
                .ok_or_else(|| LokiError::InvalidTimestamp(seconds.to_string()))?;
            let value: f64 = raw
                .parse()
                .map_err(|_| LokiError::Malformed(format!("sample value '{}'", raw)))?;
            samples.push(MetricSample {
                timestamp,
                labels: s.metric.clone(),
                value,
            });
        }
    }
    Ok(samples)
}

#[async_trait]
impl LogStore for LokiClient {
    async fn ready(&self) -> Result<(), LokiError> {
        let url = self.base.join("ready")?;
        debug!("GET {}", url);
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(LokiError::Status {
                status: status.as_u16(),
                body: truncate(response.text().await.unwrap_or_default()),
            })
        }
    }

    async fn labels(&self) -> Result<Vec<String>, LokiError> {
        let url = self.base.join("loki/api/v1/labels")?;
        self.get(url, &[]).await
    }

    async fn label_values(&self, label: &str) -> Result<Vec<String>, LokiError> {
        let mut url = self.base.join("loki/api/v1/label/")?;
        url.path_segments_mut()
            .map_err(|_| LokiError::Malformed(format!("cannot build a URL from {}", self.base)))?
            .pop_if_empty()
            .push(label)
            .push("values");
        self.get(url, &[]).await
    }

    async fn query_logs(
        &self,
        query: &str,
        range: &TimeRange,
        limit: u32,
    ) -> Result<Vec<LogRecord>, LokiError> {
        let params = vec![
            ("query", query.to_string()),
            ("limit", limit.to_string()),
            ("direction", "backward".to_string()),
        ];
        let records = streams_to_records(self.query_range(params, range).await?)?;
        debug!("Loki returned {} log line(s)", records.len());
        Ok(records)
    }

    async fn query_metrics(
        &self,
        query: &str,
        range: &TimeRange,
        step: &str,
    ) -> Result<Vec<MetricSample>, LokiError> {
        let params = vec![("query", query.to_string()), ("step", step.to_string())];
        let samples = matrix_to_samples(self.query_range(params, range).await?)?;
        debug!("Loki returned {} metric sample(s)", samples.len());
        Ok(samples)
    }
}
