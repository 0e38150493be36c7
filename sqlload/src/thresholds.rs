use serde::{Deserialize, Serialize};
use toml::Table;

use crate::config::ConfigError;
use crate::metrics::Summary;

/// Pass/fail criterion over the end-of-run summary. Thresholds never stop a
/// run; they only decide its verdict.
#[derive(Clone, Debug, PartialEq)]
pub enum Threshold {
    /// Percentile of all statement durations must stay below `max_ms`.
    DurationPercentile { percentile: f64, max_ms: f64 },
    SuccessRateAbove(f64),
    ErrorsBelow(u64),
}

impl Threshold {
    pub fn describe(&self) -> String {
        match self {
            Threshold::DurationPercentile { percentile, max_ms } => {
                format!("query_duration p({})<{}", percentile, max_ms)
            }
            Threshold::SuccessRateAbove(min) => format!("query_success_rate rate>{}", min),
            Threshold::ErrorsBelow(max) => format!("query_errors count<{}", max),
        }
    }

    /// Metrics without samples cannot violate a threshold.
    pub fn evaluate(&self, summary: &Summary) -> ThresholdOutcome {
        let (observed, passed) = match self {
            Threshold::DurationPercentile { percentile, max_ms } => {
                let observed = summary.percentile_ms(*percentile);
                (observed, observed.map_or(true, |v| v < *max_ms))
            }
            Threshold::SuccessRateAbove(min) => (
                summary.success_rate,
                summary.success_rate.map_or(true, |v| v > *min),
            ),
            Threshold::ErrorsBelow(max) => (
                Some(summary.errors_total as f64),
                summary.errors_total < *max,
            ),
        };
        ThresholdOutcome {
            threshold: self.describe(),
            observed,
            passed,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ThresholdOutcome {
    pub threshold: String,
    pub observed: Option<f64>,
    pub passed: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct Verdict {
    pub outcomes: Vec<ThresholdOutcome>,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }
}

#[derive(Clone, Debug)]
pub struct Thresholds {
    thresholds: Vec<Threshold>,
}

impl Thresholds {
    pub fn new(thresholds: Vec<Threshold>) -> Self {
        Thresholds { thresholds }
    }

    pub fn parse(props: &Table) -> Result<Self, ConfigError> {
        let props: ThresholdProperties = props.clone().try_into()?;
        Ok(Thresholds::new(vec![
            Threshold::DurationPercentile {
                percentile: 95.0,
                max_ms: props.p95_ms,
            },
            Threshold::DurationPercentile {
                percentile: 99.0,
                max_ms: props.p99_ms,
            },
            Threshold::SuccessRateAbove(props.min_success_rate),
            Threshold::ErrorsBelow(props.max_errors),
        ]))
    }

    pub fn evaluate(&self, summary: &Summary) -> Verdict {
        Verdict {
            outcomes: self.thresholds.iter().map(|t| t.evaluate(summary)).collect(),
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds::new(vec![
            Threshold::DurationPercentile {
                percentile: 95.0,
                max_ms: default_p95_ms(),
            },
            Threshold::DurationPercentile {
                percentile: 99.0,
                max_ms: default_p99_ms(),
            },
            Threshold::SuccessRateAbove(default_min_success_rate()),
            Threshold::ErrorsBelow(default_max_errors()),
        ])
    }
}

#[derive(Deserialize, Debug)]
struct ThresholdProperties {
    #[serde(rename = "p95ms", default = "default_p95_ms")]
    p95_ms: f64,

    #[serde(rename = "p99ms", default = "default_p99_ms")]
    p99_ms: f64,

    #[serde(rename = "minsuccessrate", default = "default_min_success_rate")]
    min_success_rate: f64,

    #[serde(rename = "maxerrors", default = "default_max_errors")]
    max_errors: u64,
}

fn default_p95_ms() -> f64 {
    500.0
}
fn default_p99_ms() -> f64 {
    1000.0
}
fn default_min_success_rate() -> f64 {
    0.95
}
fn default_max_errors() -> u64 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricRecord, MetricSink, Metrics};
    use crate::workloads::StatementClass;
    use std::time::Duration;

    fn summary(ok: u64, failed: u64, latency_ms: u64) -> Summary {
        let m = Metrics::new();
        for _ in 0..ok {
            m.record(MetricRecord::success(
                StatementClass::Select,
                "count_all",
                Duration::from_millis(latency_ms),
            ));
        }
        for _ in 0..failed {
            m.record(MetricRecord::failure(
                StatementClass::Update,
                "update_missing_table",
                Duration::from_millis(latency_ms),
                "missing".into(),
            ));
        }
        m.summary()
    }

    #[test]
    fn healthy_run_passes() {
        let v = Thresholds::default().evaluate(&summary(990, 10, 20));
        assert!(v.passed(), "{:?}", v);
        assert_eq!(v.outcomes.len(), 4);
    }

    #[test]
    fn slow_run_fails_latency_only() {
        let v = Thresholds::default().evaluate(&summary(100, 0, 700));
        let failed: Vec<_> = v.outcomes.iter().filter(|o| !o.passed).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].threshold, "query_duration p(95)<500");
    }

    #[test]
    fn error_budget_and_rate() {
        let v = Thresholds::default().evaluate(&summary(1000, 100, 1));
        let failed: Vec<_> = v
            .outcomes
            .iter()
            .filter(|o| !o.passed)
            .map(|o| o.threshold.as_str())
            .collect();
        assert_eq!(
            failed,
            vec!["query_success_rate rate>0.95", "query_errors count<100"]
        );
        assert!(!v.passed());
    }

    #[test]
    fn arbitrary_percentiles() {
        let t = Threshold::DurationPercentile {
            percentile: 50.0,
            max_ms: 25.0,
        };
        let o = t.evaluate(&summary(10, 0, 30));
        assert!((o.observed.unwrap() - 30.0).abs() < 0.05);
        assert!(!o.passed);
    }

    #[test]
    fn empty_run_has_nothing_to_violate() {
        assert!(Thresholds::default().evaluate(&summary(0, 0, 0)).passed());
    }

    #[test]
    fn properties_override_limits() {
        let props: Table = "maxerrors = 5\np95ms = 10.0\n".parse().unwrap();
        let v = Thresholds::parse(&props).unwrap().evaluate(&summary(50, 5, 20));
        assert!(!v.outcomes[0].passed);
        assert!(v.outcomes[1].passed);
        assert!(!v.outcomes[3].passed);
    }
}
