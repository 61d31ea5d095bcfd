use anyhow::{anyhow, Result};
use chrono::SecondsFormat;
use std::fmt::Write as FmtWrite;
use std::time::Duration;

use crate::entry::LogEntry;

/// Serialize an entry as a single newline-terminated JSON line.
///
/// Empty optional captures (headers, bodies, error, stack) are omitted from
/// the output entirely.
pub fn encode_json(entry: &LogEntry) -> serde_json::Result<Vec<u8>> {
    let mut line = serde_json::to_vec(entry)?;
    line.push(b'\n');
    Ok(line)
}

/// Parse a JSON line produced by [`encode_json`] back into an entry.
pub fn decode_json(line: &str) -> serde_json::Result<LogEntry> {
    serde_json::from_str(line.trim_end())
}

/// Serialize an entry in the fixed-field human-readable format.
///
/// Layout: `[RFC3339 timestamp] request_id method uri status latency`,
/// followed by `Error:` and `Stack:` lines only when present. Field values
/// are not escaped, so a value containing a newline corrupts line framing.
/// Callers that need machine-parseable output should use JSON instead.
pub fn encode_text(entry: &LogEntry) -> Vec<u8> {
    let mut out = String::with_capacity(128);
    let _ = writeln!(
        out,
        "[{}] {} {} {} {} {}",
        entry.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        entry.request_id,
        entry.method,
        entry.uri,
        entry.status,
        format_duration(entry.latency),
    );
    if !entry.error.is_empty() {
        let _ = writeln!(out, "Error: {}", entry.error);
        if !entry.stack_trace.is_empty() {
            let _ = writeln!(out, "Stack: {}", entry.stack_trace);
        }
    }
    out.into_bytes()
}

/// Render a duration as a compact unit-suffixed string, e.g. `145ms` or `1.5s`.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        format!("{}ns", nanos)
    } else if nanos < 1_000_000 {
        format_scaled(nanos as f64 / 1_000.0, "µs")
    } else if nanos < 1_000_000_000 {
        format_scaled(nanos as f64 / 1_000_000.0, "ms")
    } else {
        format_scaled(nanos as f64 / 1_000_000_000.0, "s")
    }
}

fn format_scaled(value: f64, unit: &str) -> String {
    let rendered = format!("{:.3}", value);
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{}{}", rendered, unit)
}

/// Parse a duration string produced by [`format_duration`].
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    // "ns" before "s", "µs"/"us"/"ms" before "s"
    const UNITS: [(&str, f64); 5] = [
        ("ns", 1.0),
        ("µs", 1_000.0),
        ("us", 1_000.0),
        ("ms", 1_000_000.0),
        ("s", 1_000_000_000.0),
    ];
    for (suffix, scale) in UNITS {
        if let Some(number) = s.strip_suffix(suffix) {
            let value: f64 = number
                .trim()
                .parse()
                .map_err(|_| anyhow!("invalid duration value: {}", s))?;
            if value < 0.0 {
                return Err(anyhow!("negative duration: {}", s));
            }
            return Ok(Duration::from_nanos((value * scale).round() as u64));
        }
    }
    Err(anyhow!("invalid duration string: {}", s))
}

/// Serde adapter storing a `Duration` as its compact string form.
pub mod duration_string {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
