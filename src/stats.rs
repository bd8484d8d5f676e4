use crate::error::ReportError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestOutcome {
    Success { status: u16 },
    Failure { status: u16 },
    Error { error: String },
}

impl RequestOutcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, RequestOutcome::Success { .. })
    }
}

#[derive(Debug, Clone)]
pub struct RequestRecord {
    /// Request name, e.g. `GET /sql/test/select/flight`
    pub name: String,
    pub outcome: RequestOutcome,
    pub latency_ms: u64,
}

/// Thread-safe statistics tracker
#[derive(Clone)]
pub struct Stats {
    inner: Arc<Mutex<StatsInner>>,
}

struct StatsInner {
    start_time: DateTime<Utc>,
    endpoints: BTreeMap<String, EndpointStats>,
    task_iterations: BTreeMap<String, u64>,

    // Failure reasons histogram, keyed by "<request name>: <reason>"
    error_reasons: BTreeMap<String, u64>,
}

#[derive(Default, Clone)]
struct EndpointStats {
    requests: u64,
    failures: u64,
    latency: LatencyHistogram,
}

/// Latency counts bucketed by rounded milliseconds.
///
/// Exact below 100ms, rounded to 10ms below 1s and to 100ms above, so the
/// bucket count stays small however long a run lasts.
#[derive(Default, Clone)]
struct LatencyHistogram {
    count: u64,
    sum_ms: u64,
    min_ms: u64,
    max_ms: u64,
    buckets: BTreeMap<u64, u64>,
}

impl LatencyHistogram {
    fn record(&mut self, latency_ms: u64) {
        if self.count == 0 || latency_ms < self.min_ms {
            self.min_ms = latency_ms;
        }
        self.max_ms = self.max_ms.max(latency_ms);
        self.count += 1;
        self.sum_ms = self.sum_ms.saturating_add(latency_ms);
        *self.buckets.entry(bucket(latency_ms)).or_insert(0) += 1;
    }

    fn merge(&mut self, other: &LatencyHistogram) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 || other.min_ms < self.min_ms {
            self.min_ms = other.min_ms;
        }
        self.max_ms = self.max_ms.max(other.max_ms);
        self.count += other.count;
        self.sum_ms = self.sum_ms.saturating_add(other.sum_ms);
        for (&bucket, &count) in &other.buckets {
            *self.buckets.entry(bucket).or_insert(0) += count;
        }
    }

    fn percentile(&self, p: f64) -> u64 {
        if self.count == 0 {
            return 0;
        }
        let idx = (((self.count as f64) * p).floor() as u64).min(self.count - 1);
        let mut seen = 0;
        for (&bucket, &count) in &self.buckets {
            seen += count;
            if seen > idx {
                return bucket.clamp(self.min_ms, self.max_ms);
            }
        }
        self.max_ms
    }

    fn summary(&self) -> LatencySummary {
        if self.count == 0 {
            return LatencySummary::default();
        }
        LatencySummary {
            avg_ms: self.sum_ms / self.count,
            min_ms: self.min_ms,
            max_ms: self.max_ms,
            p50_ms: self.percentile(0.5),
            p95_ms: self.percentile(0.95),
            p99_ms: self.percentile(0.99),
        }
    }
}

fn bucket(latency_ms: u64) -> u64 {
    match latency_ms {
        0..=99 => latency_ms,
        100..=999 => (latency_ms + 5) / 10 * 10,
        _ => (latency_ms + 50) / 100 * 100,
    }
}

impl StatsInner {
    fn new() -> Self {
        Self {
            start_time: Utc::now(),
            endpoints: BTreeMap::new(),
            task_iterations: BTreeMap::new(),
            error_reasons: BTreeMap::new(),
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StatsInner::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatsInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a completed request
    pub fn record(&self, record: RequestRecord) {
        let mut inner = self.lock();

        let reason = match &record.outcome {
            RequestOutcome::Success { .. } => None,
            RequestOutcome::Failure { status } => Some(format!("{}: HTTP {}", record.name, status)),
            RequestOutcome::Error { error } => Some(format!("{}: {}", record.name, error)),
        };
        if let Some(reason) = reason {
            *inner.error_reasons.entry(reason).or_insert(0) += 1;
        }

        let endpoint = inner.endpoints.entry(record.name).or_default();
        endpoint.requests += 1;
        if record.outcome.is_failure() {
            endpoint.failures += 1;
        }
        endpoint.latency.record(record.latency_ms);
    }

    /// Record one completed iteration of the named task
    pub fn record_iteration(&self, task: &str) {
        let mut inner = self.lock();
        *inner.task_iterations.entry(task.to_string()).or_insert(0) += 1;
    }

    /// Get a snapshot of current statistics
    pub fn snapshot(&self) -> StatsSnapshot {
        // Copy the bounded state out so recording is not blocked while summarising
        let (start_time, endpoint_stats, task_iterations, error_reasons) = {
            let inner = self.lock();
            (
                inner.start_time,
                inner.endpoints.clone(),
                inner.task_iterations.clone(),
                inner.error_reasons.clone(),
            )
        };

        let elapsed_seconds = (Utc::now() - start_time).num_milliseconds().max(0) as f64 / 1000.0;
        let per_second = |count: u64| {
            if elapsed_seconds > 0.0 {
                count as f64 / elapsed_seconds
            } else {
                0.0
            }
        };

        let mut all_latency = LatencyHistogram::default();
        let mut endpoints = BTreeMap::new();
        let mut total_requests = 0;
        let mut total_failures = 0;

        for (name, endpoint) in endpoint_stats {
            all_latency.merge(&endpoint.latency);

            total_requests += endpoint.requests;
            total_failures += endpoint.failures;

            endpoints.insert(
                name,
                EndpointSnapshot {
                    requests: endpoint.requests,
                    failures: endpoint.failures,
                    failure_ratio: ratio(endpoint.failures, endpoint.requests),
                    requests_per_second: per_second(endpoint.requests),
                    latency: endpoint.latency.summary(),
                },
            );
        }

        StatsSnapshot {
            started_at: start_time,
            elapsed_seconds,
            iterations: task_iterations.values().sum(),
            task_iterations,
            total_requests,
            total_failures,
            requests_per_second: per_second(total_requests),
            latency: all_latency.summary(),
            endpoints,
            error_reasons,
        }
    }

    /// Reset all statistics and restart the clock
    pub fn reset(&self) {
        *self.lock() = StatsInner::new();
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LatencySummary {
    pub avg_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointSnapshot {
    pub requests: u64,
    pub failures: u64,
    pub failure_ratio: f64,
    pub requests_per_second: f64,
    pub latency: LatencySummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub elapsed_seconds: f64,
    pub iterations: u64,
    pub task_iterations: BTreeMap<String, u64>,
    pub total_requests: u64,
    pub total_failures: u64,
    pub requests_per_second: f64,
    pub latency: LatencySummary,
    pub endpoints: BTreeMap<String, EndpointSnapshot>,
    pub error_reasons: BTreeMap<String, u64>,
}

impl StatsSnapshot {
    /// Requests recorded under `name`, zero if never seen
    pub fn requests_for(&self, name: &str) -> u64 {
        self.endpoints.get(name).map_or(0, |e| e.requests)
    }

    /// Print statistics in a readable format
    pub fn print(&self, is_final: bool) {
        let header = if is_final {
            "=== FINAL STATISTICS ==="
        } else {
            "=== PROGRESS ==="
        };

        println!("\n{}", header);
        println!("Elapsed: {:.1}s", self.elapsed_seconds);
        println!("Iterations: {}", self.iterations);
        println!("Total Requests: {}", self.total_requests);
        println!("Requests/sec: {:.2}", self.requests_per_second);
        println!();

        if !self.endpoints.is_empty() {
            println!(
                "{:<36} {:>9} {:>8} {:>8} {:>7} {:>7} {:>7} {:>7}",
                "Name", "Requests", "Failures", "Req/s", "Avg", "P50", "P95", "P99"
            );
            for (name, endpoint) in &self.endpoints {
                println!(
                    "{:<36} {:>9} {:>8} {:>8.2} {:>5}ms {:>5}ms {:>5}ms {:>5}ms",
                    name,
                    endpoint.requests,
                    endpoint.failures,
                    endpoint.requests_per_second,
                    endpoint.latency.avg_ms,
                    endpoint.latency.p50_ms,
                    endpoint.latency.p95_ms,
                    endpoint.latency.p99_ms,
                );
            }
            println!();
        }

        if self.total_requests > 0 {
            let success_rate = (1.0 - ratio(self.total_failures, self.total_requests)) * 100.0;
            println!("Failures: {}", self.total_failures);
            println!("Success Rate: {:.2}%", success_rate);
            println!();
            println!("Latency:");
            println!("  Average: {}ms", self.latency.avg_ms);
            println!("  Min/Max: {}ms / {}ms", self.latency.min_ms, self.latency.max_ms);
            println!("  P50: {}ms", self.latency.p50_ms);
            println!("  P95: {}ms", self.latency.p95_ms);
            println!("  P99: {}ms", self.latency.p99_ms);
            println!();
        }

        if !self.error_reasons.is_empty() {
            println!("Error Breakdown:");
            let mut reasons: Vec<_> = self.error_reasons.iter().collect();
            reasons.sort_by_key(|(_, count)| std::cmp::Reverse(*count));
            for (reason, count) in reasons {
                println!("  {}: {}", reason, count);
            }
            println!();
        }

        if is_final {
            println!("=======================\n");
        }
    }

    /// Write the snapshot as pretty-printed JSON
    pub fn write_json(&self, path: &Path) -> Result<(), ReportError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, outcome: RequestOutcome, latency_ms: u64) -> RequestRecord {
        RequestRecord {
            name: name.to_string(),
            outcome,
            latency_ms,
        }
    }

    #[test]
    fn test_stats_recording() {
        let stats = Stats::new();

        stats.record(record("GET /flight", RequestOutcome::Success { status: 200 }, 100));
        stats.record(record("GET /account", RequestOutcome::Success { status: 200 }, 200));
        stats.record_iteration("pair");

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.total_failures, 0);
        assert_eq!(snapshot.iterations, 1);
        assert_eq!(snapshot.requests_for("GET /flight"), 1);
        assert_eq!(snapshot.requests_for("GET /account"), 1);
        assert_eq!(snapshot.requests_for("GET /missing"), 0);
        assert_eq!(snapshot.latency.avg_ms, 150);
        assert_eq!(snapshot.latency.min_ms, 100);
        assert_eq!(snapshot.latency.max_ms, 200);
        assert!(snapshot.error_reasons.is_empty());
    }

    #[test]
    fn test_failures_and_error_breakdown() {
        let stats = Stats::new();

        stats.record(record("GET /flight", RequestOutcome::Failure { status: 500 }, 5));
        stats.record(record("GET /flight", RequestOutcome::Failure { status: 500 }, 5));
        stats.record(record(
            "GET /account",
            RequestOutcome::Error {
                error: "connection refused".to_string(),
            },
            1,
        ));
        stats.record(record("GET /account", RequestOutcome::Success { status: 204 }, 3));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_requests, 4);
        assert_eq!(snapshot.total_failures, 3);
        assert_eq!(snapshot.endpoints["GET /flight"].failures, 2);
        assert_eq!(snapshot.endpoints["GET /flight"].failure_ratio, 1.0);
        assert_eq!(snapshot.endpoints["GET /account"].failure_ratio, 0.5);
        assert_eq!(snapshot.error_reasons["GET /flight: HTTP 500"], 2);
        assert_eq!(snapshot.error_reasons["GET /account: connection refused"], 1);
    }

    #[test]
    fn test_percentiles() {
        let mut histogram = LatencyHistogram::default();
        for latency_ms in 1..=100 {
            histogram.record(latency_ms);
        }
        let summary = histogram.summary();
        assert_eq!(summary.avg_ms, 50);
        assert_eq!(summary.p50_ms, 51);
        assert_eq!(summary.p95_ms, 96);
        assert_eq!(summary.p99_ms, 100);
        assert_eq!(LatencyHistogram::default().summary(), LatencySummary::default());
    }

    #[test]
    fn test_bucket_rounding() {
        assert_eq!(bucket(0), 0);
        assert_eq!(bucket(99), 99);
        assert_eq!(bucket(104), 100);
        assert_eq!(bucket(105), 110);
        assert_eq!(bucket(999), 1000);
        assert_eq!(bucket(1_249), 1_200);
        assert_eq!(bucket(1_250), 1_300);
    }

    #[test]
    fn test_latency_state_stays_bounded() {
        let stats = Stats::new();
        for i in 0..200_000u64 {
            stats.record(record(
                "GET /flight",
                RequestOutcome::Success { status: 200 },
                i % 5_000,
            ));
        }

        let buckets = stats.lock().endpoints["GET /flight"].latency.buckets.len();
        assert!(buckets <= 100 + 90 + 41, "{} buckets", buckets);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_requests, 200_000);
        assert_eq!(snapshot.latency.min_ms, 0);
        assert_eq!(snapshot.latency.max_ms, 4_999);
        assert_eq!(snapshot.latency.p50_ms, 2_500);
        assert!(snapshot.latency.p99_ms <= 4_999);
    }

    #[test]
    fn test_aggregate_merges_endpoints() {
        let stats = Stats::new();
        stats.record(record("GET /flight", RequestOutcome::Success { status: 200 }, 10));
        stats.record(record("GET /account", RequestOutcome::Success { status: 200 }, 30));
        stats.record(record("GET /account", RequestOutcome::Success { status: 200 }, 1_240));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.latency.min_ms, 10);
        assert_eq!(snapshot.latency.max_ms, 1_240);
        assert_eq!(snapshot.latency.avg_ms, 426);
        assert_eq!(snapshot.latency.p50_ms, 30);
        // 1240 lands in the 1200 bucket
        assert_eq!(snapshot.latency.p99_ms, 1_200);
        assert_eq!(snapshot.endpoints["GET /account"].latency.max_ms, 1_240);
    }

    #[test]
    fn test_reset() {
        let stats = Stats::new();
        stats.record(record("GET /flight", RequestOutcome::Success { status: 200 }, 1));
        stats.record_iteration("pair");
        stats.reset();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.iterations, 0);
        assert!(snapshot.endpoints.is_empty());
    }

    #[test]
    fn test_write_json() {
        let stats = Stats::new();
        stats.record(record("GET /flight", RequestOutcome::Success { status: 200 }, 12));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        stats.snapshot().write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["total_requests"], 1);
        assert_eq!(value["endpoints"]["GET /flight"]["latency"]["max_ms"], 12);
    }
}
