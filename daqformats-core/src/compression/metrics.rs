//! Per-event compression metrics
//!
//! Records are built in memory while a compressor runs and serialised by the
//! caller (the CLI writes them as JSON).

use super::config::CompressorConfig;
use crate::format::EventHeader;
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Event header fields rendered as strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderSnapshot {
    pub marker: String,
    pub event_tag: String,
    pub trigger_bits: String,
    pub version_number: String,
    pub compression_code: String,
    pub header_size: String,
    pub payload_size: String,
    pub fragment_count: String,
    pub run_number: String,
    pub event_id: String,
    pub event_counter: String,
    pub bc_id: String,
    pub status: String,
    pub timestamp: String,
}

impl From<&EventHeader> for HeaderSnapshot {
    fn from(header: &EventHeader) -> Self {
        Self {
            marker: header.marker.to_string(),
            event_tag: header.event_tag.to_string(),
            trigger_bits: header.trigger_bits.to_string(),
            version_number: header.version.to_string(),
            compression_code: header.compression_code.to_string(),
            header_size: header.header_size.to_string(),
            payload_size: header.payload_size.to_string(),
            fragment_count: header.fragment_count.to_string(),
            run_number: header.run_number.to_string(),
            event_id: header.event_id.to_string(),
            event_counter: header.event_counter.to_string(),
            bc_id: header.bc_id.to_string(),
            status: header.status.to_string(),
            timestamp: header.timestamp.to_string(),
        }
    }
}

/// One compress or decompress call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetrics {
    pub event_header: HeaderSnapshot,
    pub input_size: usize,
    pub output_size: usize,
    /// Input size over output size
    pub compression_ratio: f64,
    /// Microseconds spent in the backend
    pub time_taken: u64,
    pub input_crc32: u32,
    pub output_crc32: u32,
}

impl EventMetrics {
    pub fn new(header: &EventHeader, input: &[u8], output: &[u8], elapsed: Duration) -> Self {
        Self {
            event_header: HeaderSnapshot::from(header),
            input_size: input.len(),
            output_size: output.len(),
            compression_ratio: ratio(input.len(), output.len()),
            time_taken: elapsed.as_micros() as u64,
            input_crc32: crc32fast::hash(input),
            output_crc32: crc32fast::hash(output),
        }
    }
}

/// Run-level log: metadata plus one record per event, in call order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsLog {
    pub run_id: Uuid,
    pub file_name: String,
    pub date: String,
    pub compressor: String,
    pub config: CompressorConfig,
    pub event_count: usize,
    pub evdata: Vec<EventMetrics>,
}

impl MetricsLog {
    pub fn new(
        label: impl Into<String>,
        compressor: impl Into<String>,
        config: CompressorConfig,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            file_name: label.into(),
            date: Utc::now().to_rfc3339(),
            compressor: compressor.into(),
            config,
            event_count: 0,
            evdata: Vec::new(),
        }
    }

    pub fn record(&mut self, metrics: EventMetrics) {
        self.evdata.push(metrics);
        self.event_count = self.evdata.len();
    }

    pub fn events(&self) -> &[EventMetrics] {
        &self.evdata
    }

    pub fn is_empty(&self) -> bool {
        self.evdata.is_empty()
    }

    /// Totals over all records
    pub fn summary(&self) -> MetricsSummary {
        let total_input: usize = self.evdata.iter().map(|m| m.input_size).sum();
        let total_output: usize = self.evdata.iter().map(|m| m.output_size).sum();
        MetricsSummary {
            events: self.evdata.len(),
            total_input,
            total_output,
            ratio: ratio(total_input, total_output),
            total_time: self.evdata.iter().map(|m| m.time_taken).sum(),
        }
    }
}

/// Aggregate view of a [`MetricsLog`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub events: usize,
    pub total_input: usize,
    pub total_output: usize,
    pub ratio: f64,
    /// Microseconds
    pub total_time: u64,
}

fn ratio(input: usize, output: usize) -> f64 {
    if output == 0 {
        0.0
    } else {
        input as f64 / output as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Event;

    #[test]
    fn test_event_metrics() {
        let event = Event::new(1, 5, 9);
        let elapsed = Duration::from_micros(250);
        let metrics = EventMetrics::new(event.header(), &[0u8; 400], &[1u8; 100], elapsed);
        assert_eq!(metrics.input_size, 400);
        assert_eq!(metrics.output_size, 100);
        assert_eq!(metrics.compression_ratio, 4.0);
        assert_eq!(metrics.time_taken, 250);
        assert_eq!(metrics.input_crc32, crc32fast::hash(&[0u8; 400]));
        assert_eq!(metrics.event_header.event_counter, "9");
        assert_eq!(metrics.event_header.bc_id, "65535");
    }

    #[test]
    fn test_summary() {
        let header = Event::new(0, 1, 1).header().clone();
        let mut log = MetricsLog::new("run", "Zlib", CompressorConfig::new());
        assert!(log.is_empty());
        log.record(EventMetrics::new(&header, &[0; 300], &[0; 100], Duration::from_micros(10)));
        log.record(EventMetrics::new(&header, &[0; 100], &[0; 100], Duration::from_micros(5)));

        let summary = log.summary();
        assert_eq!(log.event_count, 2);
        assert_eq!(summary.events, 2);
        assert_eq!(summary.total_input, 400);
        assert_eq!(summary.total_output, 200);
        assert_eq!(summary.ratio, 2.0);
        assert_eq!(summary.total_time, 15);
    }

    #[test]
    fn test_json_layout() {
        let header = Event::new(0, 1, 1).header().clone();
        let config = CompressorConfig::new().with("compressionLevel", "3");
        let mut log = MetricsLog::new("physics_run", "Zlib", config);
        log.record(EventMetrics::new(&header, &[0; 10], &[0; 5], Duration::ZERO));

        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["fileName"], "physics_run");
        assert_eq!(json["compressor"], "Zlib");
        assert_eq!(json["eventCount"], 1);
        assert_eq!(json["config"]["compressionLevel"], "3");
        let record = &json["evdata"][0];
        assert_eq!(record["inputSize"], 10);
        assert_eq!(record["outputSize"], 5);
        assert_eq!(record["eventHeader"]["eventCounter"], "1");
        assert!(record["inputCrc32"].is_u64());
    }
}
