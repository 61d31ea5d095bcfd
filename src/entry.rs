use chrono::{DateTime, Utc};
use hyper::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::Level;

/// One structured record of a complete request/response cycle.
///
/// Construction is two-phase: the request-side fields are filled when the
/// request arrives, `status`, `latency` and the response-side captures only
/// after the downstream handler returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub request_id: String,
    pub method: String,
    pub uri: String,
    pub status: u16,
    #[serde(with = "crate::codec::duration_string")]
    pub latency: Duration,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub request_headers: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_body: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub response_headers: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub response_body: String,
    pub client_ip: String,
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stack_trace: String,
}

impl LogEntry {
    /// Classify the entry's severity from its contents.
    ///
    /// A non-empty `error` makes the entry `Error`; everything else is `Info`.
    pub fn classify(&self) -> Level {
        if self.error.is_empty() {
            Level::Info
        } else {
            Level::Error
        }
    }
}

/// Snapshot an HTTP header map as name -> list of values.
///
/// Values that are not valid UTF-8 are skipped rather than failing the capture.
pub fn headers_map(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers.iter() {
        if let Ok(value_str) = value.to_str() {
            map.entry(name.as_str().to_string())
                .or_default()
                .push(value_str.to_string());
        }
    }
    map
}
