#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Run-scoped metrics aggregation for the geocoding pipeline.
//!
//! A single [`RunAnalytics`] instance is created per run, passed `&mut` into
//! the resolver and batch processor, and flushed to a timestamped JSON
//! report when the run ends. There is exactly one writer for the lifetime
//! of a run, so every operation is a plain increment.
//!
//! Losing a report is never fatal: [`RunAnalytics::finalize`] logs write
//! failures instead of raising them.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use thiserror::Error;

/// Directory run reports are written to.
pub const ANALYTICS_DIR: &str = "analytics";

/// Classification of everything that can go wrong during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// An input file could not be parsed as a record sequence.
    #[serde(rename = "file_read_error")]
    FileRead,
    /// A record lacked one of the fields required for geocoding.
    #[serde(rename = "missing_fields")]
    MissingFields,
    /// Transport-level failure calling the geocoding API.
    #[serde(rename = "network_error")]
    Network,
    /// Any other unexpected failure during resolution.
    #[serde(rename = "geocoding_error")]
    Geocoding,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileRead => write!(f, "file_read_error"),
            Self::MissingFields => write!(f, "missing_fields"),
            Self::Network => write!(f, "network_error"),
            Self::Geocoding => write!(f, "geocoding_error"),
        }
    }
}

/// One recorded error, kept verbatim for the end-of-run report.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    /// Taxonomy bucket for this error.
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Identifier of the item that triggered the error, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    /// When the error was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Length bucket of a normalized address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthBucket {
    /// Up to 50 characters.
    Short,
    /// 51 to 100 characters.
    Medium,
    /// 101 to 150 characters.
    Long,
    /// More than 150 characters.
    VeryLong,
}

impl LengthBucket {
    /// Buckets a normalized address length.
    #[must_use]
    pub const fn classify(len: usize) -> Self {
        if len <= 50 {
            Self::Short
        } else if len <= 100 {
            Self::Medium
        } else if len <= 150 {
            Self::Long
        } else {
            Self::VeryLong
        }
    }
}

/// Counts of normalized addresses per length bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AddressLengthDistribution {
    /// Addresses up to 50 characters.
    pub short: u64,
    /// Addresses of 51 to 100 characters.
    pub medium: u64,
    /// Addresses of 101 to 150 characters.
    pub long: u64,
    /// Addresses of more than 150 characters.
    pub very_long: u64,
}

/// Read-only copy of all counters at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Records discovered across all parsed input files.
    pub total_items_identified: u64,
    /// Geocoding requests issued.
    pub requests_count: u64,
    /// Requests that yielded coordinates.
    pub successfully_geocoded: u64,
    /// Requests that yielded no coordinates.
    pub failed_geocodes: u64,
    /// Requests per state code.
    pub state_distribution: BTreeMap<String, u64>,
    /// Successes per state code.
    pub geocoded_by_state: BTreeMap<String, u64>,
    /// Failures per state code.
    pub failed_by_state: BTreeMap<String, u64>,
    /// Failures per transport/parse error category.
    pub error_types: BTreeMap<String, u64>,
    /// Normalized address lengths.
    pub address_length_distribution: AddressLengthDistribution,
}

/// Start/end stamps of a run.
#[derive(Debug, Clone, Serialize)]
pub struct ReportTimestamps {
    /// When [`RunAnalytics::start`] was called, if it was.
    pub start: Option<DateTime<Utc>>,
    /// When the report was produced.
    pub end: DateTime<Utc>,
    /// Wall-clock duration between the two, in seconds.
    pub duration_seconds: f64,
}

/// Item-level quality metrics.
#[derive(Debug, Clone, Serialize)]
pub struct DataMetrics {
    /// Records discovered across all parsed input files.
    pub total_items_identified: u64,
    /// Requests that yielded coordinates.
    pub successfully_geocoded: u64,
    /// Requests that yielded no coordinates.
    pub failed_geocodes: u64,
    /// Percentage of identified records successfully geocoded.
    pub success_rate: f64,
}

/// Throughput metrics.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    /// Seconds of run time per successfully geocoded record.
    pub average_time_per_item: f64,
    /// Geocoding requests issued.
    pub requests_count: u64,
    /// Resident-memory growth over the run, in MB, where measurable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_used_mb: Option<f64>,
}

/// Per-state and per-error breakdown of geocoding outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct GeocodingBreakdown {
    /// Requests per state code.
    pub state_distribution: BTreeMap<String, u64>,
    /// Successes per state code.
    pub geocoded_by_state: BTreeMap<String, u64>,
    /// Failures per state code.
    pub failed_by_state: BTreeMap<String, u64>,
    /// Failures per transport/parse error category.
    pub error_types: BTreeMap<String, u64>,
    /// Normalized address lengths.
    pub address_length_distribution: AddressLengthDistribution,
}

/// The durable end-of-run report.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Name of the component that produced this report.
    pub component: String,
    /// Run timing.
    pub timestamp: ReportTimestamps,
    /// Item-level quality metrics.
    pub data_metrics: DataMetrics,
    /// Throughput metrics.
    pub performance_metrics: PerformanceMetrics,
    /// Per-state and per-error breakdown.
    pub geocoding: GeocodingBreakdown,
    /// Every error recorded during the run, in order.
    pub errors: Vec<ErrorEvent>,
}

/// Failure to persist a run report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Report serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Accumulates metrics for one batch run.
#[derive(Debug)]
pub struct RunAnalytics {
    component: String,
    started: Option<Instant>,
    started_at: Option<DateTime<Utc>>,
    initial_memory_mb: Option<f64>,
    total_items_identified: u64,
    successfully_geocoded: u64,
    failed_geocodes: u64,
    requests_count: u64,
    state_distribution: BTreeMap<String, u64>,
    geocoded_by_state: BTreeMap<String, u64>,
    failed_by_state: BTreeMap<String, u64>,
    error_types: BTreeMap<String, u64>,
    length_distribution: AddressLengthDistribution,
    errors: Vec<ErrorEvent>,
}

impl RunAnalytics {
    /// Creates an empty aggregator for the named component.
    #[must_use]
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            started: None,
            started_at: None,
            initial_memory_mb: None,
            total_items_identified: 0,
            successfully_geocoded: 0,
            failed_geocodes: 0,
            requests_count: 0,
            state_distribution: BTreeMap::new(),
            geocoded_by_state: BTreeMap::new(),
            failed_by_state: BTreeMap::new(),
            error_types: BTreeMap::new(),
            length_distribution: AddressLengthDistribution::default(),
            errors: Vec::new(),
        }
    }

    /// Stamps the start of the run for duration and memory accounting.
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
        self.started_at = Some(Utc::now());
        self.initial_memory_mb = process_rss_mb();
    }

    /// Adds `count` newly discovered records.
    pub fn record_identified(&mut self, count: u64) {
        self.total_items_identified += count;
    }

    /// Counts one geocoding request.
    pub fn record_request(&mut self) {
        self.requests_count += 1;
    }

    /// Counts one request against the given state.
    pub fn record_state_seen(&mut self, state: &str) {
        *self.state_distribution.entry(state.to_string()).or_default() += 1;
    }

    /// Counts one successful geocode for the given state.
    pub fn record_success(&mut self, state: &str) {
        self.successfully_geocoded += 1;
        *self.geocoded_by_state.entry(state.to_string()).or_default() += 1;
    }

    /// Counts one failed geocode for the given state.
    pub fn record_failure(&mut self, state: &str) {
        self.failed_geocodes += 1;
        *self.failed_by_state.entry(state.to_string()).or_default() += 1;
    }

    /// Counts one failure in the given error category.
    pub fn record_error_type(&mut self, category: &str) {
        *self.error_types.entry(category.to_string()).or_default() += 1;
    }

    /// Counts one normalized address in its length bucket.
    pub fn record_address_length(&mut self, bucket: LengthBucket) {
        match bucket {
            LengthBucket::Short => self.length_distribution.short += 1,
            LengthBucket::Medium => self.length_distribution.medium += 1,
            LengthBucket::Long => self.length_distribution.long += 1,
            LengthBucket::VeryLong => self.length_distribution.very_long += 1,
        }
    }

    /// Appends an error event to the run's error list.
    pub fn record_error(
        &mut self,
        kind: ErrorKind,
        message: impl Into<String>,
        item_id: Option<String>,
    ) {
        self.errors.push(ErrorEvent {
            kind,
            message: message.into(),
            item_id,
            timestamp: Utc::now(),
        });
    }

    /// Returns a read-only copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_items_identified: self.total_items_identified,
            requests_count: self.requests_count,
            successfully_geocoded: self.successfully_geocoded,
            failed_geocodes: self.failed_geocodes,
            state_distribution: self.state_distribution.clone(),
            geocoded_by_state: self.geocoded_by_state.clone(),
            failed_by_state: self.failed_by_state.clone(),
            error_types: self.error_types.clone(),
            address_length_distribution: self.length_distribution,
        }
    }

    /// Computes the end-of-run report without persisting it.
    #[must_use]
    pub fn report(&self) -> RunReport {
        let duration = self
            .started
            .map_or(0.0, |started| started.elapsed().as_secs_f64());

        #[allow(clippy::cast_precision_loss)]
        let success_rate = if self.total_items_identified > 0 {
            round2(self.successfully_geocoded as f64 / self.total_items_identified as f64 * 100.0)
        } else {
            0.0
        };

        #[allow(clippy::cast_precision_loss)]
        let average_time_per_item = if self.successfully_geocoded > 0 {
            round2(duration / self.successfully_geocoded as f64)
        } else {
            0.0
        };

        let memory_used_mb = match (self.initial_memory_mb, process_rss_mb()) {
            (Some(initial), Some(current)) => Some(round2(current - initial)),
            _ => None,
        };

        RunReport {
            component: self.component.clone(),
            timestamp: ReportTimestamps {
                start: self.started_at,
                end: Utc::now(),
                duration_seconds: round2(duration),
            },
            data_metrics: DataMetrics {
                total_items_identified: self.total_items_identified,
                successfully_geocoded: self.successfully_geocoded,
                failed_geocodes: self.failed_geocodes,
                success_rate,
            },
            performance_metrics: PerformanceMetrics {
                average_time_per_item,
                requests_count: self.requests_count,
                memory_used_mb,
            },
            geocoding: GeocodingBreakdown {
                state_distribution: self.state_distribution.clone(),
                geocoded_by_state: self.geocoded_by_state.clone(),
                failed_by_state: self.failed_by_state.clone(),
                error_types: self.error_types.clone(),
                address_length_distribution: self.length_distribution,
            },
            errors: self.errors.clone(),
        }
    }

    /// Writes the run report to [`ANALYTICS_DIR`].
    ///
    /// Write failures are logged, never raised: losing a report must not
    /// abort a batch run.
    pub fn finalize(&self) {
        self.finalize_to(Path::new(ANALYTICS_DIR));
    }

    /// Writes the run report to `dir` as `{component}_{YYYYMMDD_HHMMSS}.json`.
    pub fn finalize_to(&self, dir: &Path) {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("{}_{stamp}.json", self.component));
        match write_report(&self.report(), dir, &path) {
            Ok(()) => log::info!("Analytics saved to {}", path.display()),
            Err(e) => log::error!("Failed to save analytics to {}: {e}", path.display()),
        }
    }
}

fn write_report(report: &RunReport, dir: &Path, path: &Path) -> Result<(), ReportError> {
    fs::create_dir_all(dir)?;
    fs::write(path, serde_json::to_string_pretty(report)?)?;
    Ok(())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Resident set size of the current process in MB, where the platform
/// exposes it.
#[cfg(target_os = "linux")]
fn process_rss_mb() -> Option<f64> {
    let status = fs::read_to_string("/proc/self/status").ok()?;
    let vm_rss = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kb: f64 = vm_rss.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / 1024.0)
}

#[cfg(not(target_os = "linux"))]
fn process_rss_mb() -> Option<f64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_length_buckets_at_boundaries() {
        assert_eq!(LengthBucket::classify(0), LengthBucket::Short);
        assert_eq!(LengthBucket::classify(50), LengthBucket::Short);
        assert_eq!(LengthBucket::classify(51), LengthBucket::Medium);
        assert_eq!(LengthBucket::classify(100), LengthBucket::Medium);
        assert_eq!(LengthBucket::classify(101), LengthBucket::Long);
        assert_eq!(LengthBucket::classify(150), LengthBucket::Long);
        assert_eq!(LengthBucket::classify(151), LengthBucket::VeryLong);
    }

    #[test]
    fn accumulates_per_state_counters() {
        let mut analytics = RunAnalytics::new("test");
        analytics.record_state_seen("SP");
        analytics.record_state_seen("SP");
        analytics.record_state_seen("RJ");
        analytics.record_success("SP");
        analytics.record_failure("RJ");
        analytics.record_failure("RJ");

        let snapshot = analytics.snapshot();
        assert_eq!(snapshot.state_distribution["SP"], 2);
        assert_eq!(snapshot.state_distribution["RJ"], 1);
        assert_eq!(snapshot.geocoded_by_state["SP"], 1);
        assert_eq!(snapshot.failed_by_state["RJ"], 2);
        assert_eq!(snapshot.successfully_geocoded, 1);
        assert_eq!(snapshot.failed_geocodes, 2);
    }

    #[test]
    fn accumulates_length_distribution() {
        let mut analytics = RunAnalytics::new("test");
        analytics.record_address_length(LengthBucket::Short);
        analytics.record_address_length(LengthBucket::Short);
        analytics.record_address_length(LengthBucket::VeryLong);

        let dist = analytics.snapshot().address_length_distribution;
        assert_eq!(dist.short, 2);
        assert_eq!(dist.medium, 0);
        assert_eq!(dist.very_long, 1);
    }

    #[test]
    fn computes_rounded_success_rate() {
        let mut analytics = RunAnalytics::new("test");
        analytics.record_identified(3);
        analytics.record_success("SP");
        analytics.record_success("SP");
        analytics.record_failure("SP");

        let report = analytics.report();
        assert!((report.data_metrics.success_rate - 66.67).abs() < 1e-9);
    }

    #[test]
    fn success_rate_is_zero_without_items() {
        let analytics = RunAnalytics::new("test");
        let report = analytics.report();
        assert!(report.data_metrics.success_rate.abs() < 1e-9);
        assert!(report.performance_metrics.average_time_per_item.abs() < 1e-9);
    }

    #[test]
    fn report_without_start_has_zero_duration() {
        let analytics = RunAnalytics::new("test");
        let report = analytics.report();
        assert!(report.timestamp.start.is_none());
        assert!(report.timestamp.duration_seconds.abs() < 1e-9);
    }

    #[test]
    fn error_kinds_serialize_to_taxonomy_names() {
        assert_eq!(
            serde_json::to_value(ErrorKind::FileRead).unwrap(),
            serde_json::json!("file_read_error")
        );
        assert_eq!(
            serde_json::to_value(ErrorKind::MissingFields).unwrap(),
            serde_json::json!("missing_fields")
        );
        assert_eq!(
            serde_json::to_value(ErrorKind::Network).unwrap(),
            serde_json::json!("network_error")
        );
        assert_eq!(
            serde_json::to_value(ErrorKind::Geocoding).unwrap(),
            serde_json::json!("geocoding_error")
        );
    }

    #[test]
    fn records_error_events_in_order() {
        let mut analytics = RunAnalytics::new("test");
        analytics.record_error(ErrorKind::MissingFields, "first", None);
        analytics.record_error(ErrorKind::Network, "second", Some("a.json".to_string()));

        let report = analytics.report();
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].kind, ErrorKind::MissingFields);
        assert_eq!(report.errors[1].kind, ErrorKind::Network);
        assert_eq!(report.errors[1].item_id.as_deref(), Some("a.json"));
    }

    #[test]
    fn finalize_writes_timestamped_report() {
        let dir = std::env::temp_dir().join("imovel_geo_analytics_test_finalize");
        let _ = fs::remove_dir_all(&dir);

        let mut analytics = RunAnalytics::new("geocoding_service");
        analytics.start();
        analytics.record_identified(1);
        analytics.record_success("SP");
        analytics.finalize_to(&dir);

        let entries: Vec<_> = fs::read_dir(&dir).unwrap().filter_map(Result::ok).collect();
        assert_eq!(entries.len(), 1);

        let name = entries[0].file_name().into_string().unwrap();
        assert!(name.starts_with("geocoding_service_"));
        assert!(name.ends_with(".json"));

        let body: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(entries[0].path()).unwrap()).unwrap();
        assert_eq!(body["component"], "geocoding_service");
        assert_eq!(body["data_metrics"]["total_items_identified"], 1);
        assert_eq!(body["geocoding"]["geocoded_by_state"]["SP"], 1);

        let _ = fs::remove_dir_all(&dir);
    }
}
