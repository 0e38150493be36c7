use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use crate::workloads::StatementClass;

/// Label used for errors raised while opening a VU's connection.
pub const CONNECT_QUERY_TYPE: &str = "connect";

/// Longest statement duration tracked exactly; slower ones saturate.
const MAX_TRACKED_US: u64 = 60 * 60 * 1_000_000;

/// One statement attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricRecord {
    pub class: StatementClass,
    pub name: &'static str,
    pub duration: Duration,
    pub outcome: Result<(), String>,
}

impl MetricRecord {
    pub fn success(class: StatementClass, name: &'static str, duration: Duration) -> Self {
        MetricRecord {
            class,
            name,
            duration,
            outcome: Ok(()),
        }
    }

    pub fn failure(
        class: StatementClass,
        name: &'static str,
        duration: Duration,
        error: String,
    ) -> Self {
        MetricRecord {
            class,
            name,
            duration,
            outcome: Err(error),
        }
    }
}

/// Append-only destination for metric records, shared by all VUs.
pub trait MetricSink: Send + Sync {
    fn record(&self, record: MetricRecord);

    fn record_connect_failure(&self, error: String);
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct TrendKey {
    query_type: StatementClass,
    query_name: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ErrorKey {
    query_type: &'static str,
    query_name: &'static str,
    error: String,
}

/// Microsecond latencies, 3 significant figures, 1us to one hour.
fn latency_histogram() -> Histogram<u64> {
    Histogram::new_with_bounds(1, MAX_TRACKED_US, 3).expect("constant histogram bounds are valid")
}

struct Series {
    all: Histogram<u64>,
    trend: BTreeMap<TrendKey, Histogram<u64>>,
    errors: BTreeMap<ErrorKey, u64>,
}

impl Default for Series {
    fn default() -> Self {
        Series {
            all: latency_histogram(),
            trend: BTreeMap::new(),
            errors: BTreeMap::new(),
        }
    }
}

/// In-process metric store: a duration trend per `{query_type, query_name}`,
/// an error counter per `{query_type, query_name, error}`, a success rate and
/// per-class operation counters.
pub struct Metrics {
    series: Mutex<Series>,
    passes: AtomicU64,
    fails: AtomicU64,
    operations: [AtomicU64; 4],
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            series: Mutex::new(Series::default()),
            passes: AtomicU64::new(0),
            fails: AtomicU64::new(0),
            operations: Default::default(),
        }
    }

    fn class_index(class: StatementClass) -> usize {
        match class {
            StatementClass::Select => 0,
            StatementClass::Insert => 1,
            StatementClass::Update => 2,
            StatementClass::Delete => 3,
        }
    }

    pub fn summary(&self) -> Summary {
        let series = self.series.lock();
        let passes = self.passes.load(Ordering::Relaxed);
        let fails = self.fails.load(Ordering::Relaxed);

        let trends = series
            .trend
            .iter()
            .map(|(key, hist)| TrendSummary::from_histogram(key, hist))
            .collect();

        let errors: Vec<ErrorCount> = series
            .errors
            .iter()
            .map(|(k, count)| ErrorCount {
                query_type: k.query_type,
                query_name: k.query_name,
                error: k.error.clone(),
                count: *count,
            })
            .collect();

        let operations = StatementClass::ALL
            .iter()
            .map(|c| (*c, self.operations[Self::class_index(*c)].load(Ordering::Relaxed)))
            .collect();

        Summary {
            statements: series.all.len(),
            successes: passes,
            failures: fails,
            success_rate: rate(passes, fails),
            errors_total: errors.iter().map(|e| e.count).sum(),
            p95_ms: percentile_ms(&series.all, 95.0),
            p99_ms: percentile_ms(&series.all, 99.0),
            operations,
            errors,
            trends,
            durations: series.all.clone(),
        }
    }
}

impl MetricSink for Metrics {
    fn record(&self, record: MetricRecord) {
        let us = record.duration.as_micros().min(u128::from(MAX_TRACKED_US)) as u64;
        let mut series = self.series.lock();
        series.all.saturating_record(us);
        series
            .trend
            .entry(TrendKey {
                query_type: record.class,
                query_name: record.name,
            })
            .or_insert_with(latency_histogram)
            .saturating_record(us);
        match record.outcome {
            Ok(()) => {
                self.passes.fetch_add(1, Ordering::Relaxed);
                self.operations[Self::class_index(record.class)].fetch_add(1, Ordering::Relaxed);
            }
            Err(error) => {
                self.fails.fetch_add(1, Ordering::Relaxed);
                *series
                    .errors
                    .entry(ErrorKey {
                        query_type: record.class.as_str(),
                        query_name: record.name,
                        error,
                    })
                    .or_default() += 1;
            }
        }
    }

    fn record_connect_failure(&self, error: String) {
        self.fails.fetch_add(1, Ordering::Relaxed);
        *self
            .series
            .lock()
            .errors
            .entry(ErrorKey {
                query_type: CONNECT_QUERY_TYPE,
                query_name: CONNECT_QUERY_TYPE,
                error,
            })
            .or_default() += 1;
    }
}

fn rate(passes: u64, fails: u64) -> Option<f64> {
    let total = passes + fails;
    if total == 0 {
        return None;
    }
    Some(passes as f64 / total as f64)
}

fn us_to_ms(us: f64) -> f64 {
    us / 1000.0
}

/// `p` in 0..=100, to the histogram's precision.
pub fn percentile_ms(hist: &Histogram<u64>, p: f64) -> Option<f64> {
    if hist.is_empty() {
        return None;
    }
    let us = hist.value_at_quantile(p / 100.0);
    Some(us_to_ms(hist.median_equivalent(us) as f64))
}

#[derive(Clone, Debug, Serialize)]
pub struct TrendSummary {
    pub query_type: StatementClass,
    pub query_name: &'static str,
    pub count: u64,
    pub avg_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

impl TrendSummary {
    fn from_histogram(key: &TrendKey, hist: &Histogram<u64>) -> Self {
        TrendSummary {
            query_type: key.query_type,
            query_name: key.query_name,
            count: hist.len(),
            avg_ms: us_to_ms(hist.mean()),
            p95_ms: percentile_ms(hist, 95.0).unwrap_or_default(),
            p99_ms: percentile_ms(hist, 99.0).unwrap_or_default(),
            max_ms: us_to_ms(hist.median_equivalent(hist.max()) as f64),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ErrorCount {
    pub query_type: &'static str,
    pub query_name: &'static str,
    pub error: String,
    pub count: u64,
}

/// Aggregated view of everything recorded so far.
#[derive(Clone, Debug, Serialize)]
pub struct Summary {
    pub statements: u64,
    pub successes: u64,
    pub failures: u64,
    pub success_rate: Option<f64>,
    pub errors_total: u64,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub operations: BTreeMap<StatementClass, u64>,
    pub errors: Vec<ErrorCount>,
    pub trends: Vec<TrendSummary>,
    #[serde(skip)]
    durations: Histogram<u64>,
}

impl Summary {
    /// Percentile over every recorded statement duration.
    pub fn percentile_ms(&self, p: f64) -> Option<f64> {
        percentile_ms(&self.durations, p)
    }
}
