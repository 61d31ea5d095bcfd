use anyhow::Result;
use lazy_static::lazy_static;
use prometheus::{register_int_counter, Encoder, IntCounter, TextEncoder};

lazy_static! {
    pub static ref ENTRIES_WRITTEN: IntCounter = register_int_counter!(
        "reqtrail_entries_written_total",
        "Log entries appended to the rotating sink"
    )
    .unwrap();
    pub static ref ENTRIES_DROPPED: IntCounter = register_int_counter!(
        "reqtrail_entries_dropped_total",
        "Log entries discarded below the configured level or on serialization failure"
    )
    .unwrap();
    pub static ref SINK_ERRORS: IntCounter = register_int_counter!(
        "reqtrail_sink_errors_total",
        "Sink write and rotation failures"
    )
    .unwrap();
}

pub fn export_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_contains_registered_counters() {
        ENTRIES_WRITTEN.inc();
        let exported = export_metrics().unwrap();
        assert!(exported.contains("reqtrail_entries_written_total"));
    }
}
