use std::time::{Duration, Instant};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::Rng;
use serde::Deserialize;
use toml::Table;
use tracing::{trace, warn};

use crate::config::{parse_duration, ConfigError};
use crate::db::{Param, QueryResult, DB};
use crate::generators::{Constant, Discrete, Generator, NameGenerator, UniformDuration, UniformInt};
use crate::metrics::{MetricRecord, MetricSink};
use crate::workloads::patterns::{self, ParamSpec, StatementPattern};
use crate::workloads::{StatementClass, Workload};

/// Fixed statement mix: 60% reads, 15% inserts, 15% updates, 10% deletes.
pub static CLASS_WEIGHTS: Lazy<Discrete<StatementClass>> = Lazy::new(|| {
    Discrete::new(vec![
        (0.60, StatementClass::Select),
        (0.15, StatementClass::Insert),
        (0.15, StatementClass::Update),
        (0.10, StatementClass::Delete),
    ])
});

/// Reads, writes and deliberate failures against a two-table schema.
///
/// Inserts and updates each issue a second statement against `missingtable`,
/// a table that must not exist, so the error path always carries traffic.
/// Those attempts are named `*_missing_table` in metrics.
pub struct MixedWorkload {
    props: WorkloadProperties,

    reads: Vec<StatementPattern>,
    insert: StatementPattern,
    insert_missing: StatementPattern,
    update: StatementPattern,
    update_missing: StatementPattern,
    delete: StatementPattern,

    key_generator: UniformInt,
    name_generator: NameGenerator,
    name_filter: Constant<String>,
    think_time: UniformDuration,
}

#[async_trait]
impl Workload for MixedWorkload {
    fn new(props: &Table) -> Result<Self, ConfigError> {
        let props: WorkloadProperties = props.clone().try_into()?;
        if props.max_key < 1 {
            return Err(ConfigError::Invalid {
                name: "maxkey",
                value: props.max_key.to_string(),
            });
        }
        let think_min = parse_duration(&props.think_min)?;
        let think_max = parse_duration(&props.think_max)?;
        if think_min >= think_max {
            return Err(ConfigError::Invalid {
                name: "thinkmax",
                value: props.think_max.clone(),
            });
        }

        let table = &props.table;
        Ok(MixedWorkload {
            reads: patterns::read_patterns(table, &props.join_table, &props.join_key),
            insert: patterns::insert_pattern("insert_row", table),
            insert_missing: patterns::insert_pattern("insert_missing_table", &props.missing_table),
            update: patterns::update_pattern("update_row", table),
            update_missing: patterns::update_pattern("update_missing_table", &props.missing_table),
            delete: patterns::delete_pattern("delete_row", table),
            key_generator: UniformInt::new(1, props.max_key),
            name_generator: NameGenerator::new(props.max_key),
            name_filter: Constant::new(props.name_filter.clone()),
            think_time: UniformDuration::new(think_min, think_max),
            props,
        })
    }

    async fn do_transaction<T: DB>(
        &self,
        db: &mut T,
        rng: &mut StdRng,
        sink: &dyn MetricSink,
    ) -> StatementClass {
        let class = CLASS_WEIGHTS.next(rng);
        self.run_class(class, db, rng, sink).await;
        class
    }

    fn think_time(&self, rng: &mut StdRng) -> Duration {
        self.think_time.next(rng)
    }
}

impl MixedWorkload {
    pub fn props(&self) -> &WorkloadProperties {
        &self.props
    }

    pub fn reads(&self) -> &[StatementPattern] {
        &self.reads
    }

    /// Number of statement attempts one iteration of `class` makes.
    pub fn attempts(class: StatementClass) -> usize {
        match class {
            StatementClass::Insert | StatementClass::Update => 2,
            StatementClass::Select | StatementClass::Delete => 1,
        }
    }

    pub async fn run_class<T: DB>(
        &self,
        class: StatementClass,
        db: &mut T,
        rng: &mut StdRng,
        sink: &dyn MetricSink,
    ) {
        match class {
            StatementClass::Select => {
                let pattern = &self.reads[rng.gen_range(0..self.reads.len())];
                self.execute(pattern, db, rng, sink).await;
            }
            StatementClass::Insert => {
                self.execute(&self.insert, db, rng, sink).await;
                self.execute(&self.insert_missing, db, rng, sink).await;
            }
            StatementClass::Update => {
                self.execute(&self.update, db, rng, sink).await;
                self.execute(&self.update_missing, db, rng, sink).await;
            }
            StatementClass::Delete => {
                self.execute(&self.delete, db, rng, sink).await;
            }
        }
    }

    /// Runs one pattern and records its metric. `None` means the statement
    /// failed; the failure is logged and recorded, not returned.
    pub async fn execute<T: DB>(
        &self,
        pattern: &StatementPattern,
        db: &mut T,
        rng: &mut StdRng,
        sink: &dyn MetricSink,
    ) -> Option<QueryResult> {
        let params = self.params(pattern.params, rng);
        let start = Instant::now();
        let result = match pattern.class {
            StatementClass::Select => db.query(&pattern.sql, &params).await,
            _ => db.execute(&pattern.sql, &params).await,
        };
        let duration = start.elapsed();

        match result {
            Ok(r) => {
                trace!(
                    pattern = pattern.name,
                    rows = r.rows,
                    affected = r.rows_affected,
                    "statement ok"
                );
                sink.record(MetricRecord::success(pattern.class, pattern.name, duration));
                Some(r)
            }
            Err(err) => {
                warn!(
                    pattern = pattern.name,
                    query_type = %pattern.class,
                    error = %err,
                    "statement failed"
                );
                sink.record(MetricRecord::failure(
                    pattern.class,
                    pattern.name,
                    duration,
                    err.to_string(),
                ));
                None
            }
        }
    }

    fn params(&self, spec: ParamSpec, rng: &mut StdRng) -> Vec<Param> {
        match spec {
            ParamSpec::None => Vec::new(),
            ParamSpec::Key => vec![Param::Int(self.key_generator.next(rng))],
            ParamSpec::NameFilter => vec![Param::Text(self.name_filter.next(rng))],
            ParamSpec::Name => vec![Param::Text(self.name_generator.next(rng))],
            ParamSpec::NameAndKey => {
                let name = self.name_generator.next(rng);
                vec![Param::Text(name), Param::Int(self.key_generator.next(rng))]
            }
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct WorkloadProperties {
    #[serde(default = "default_table")]
    pub table: String,

    #[serde(rename = "jointable", default = "default_join_table")]
    pub join_table: String,

    #[serde(rename = "joinkey", default = "default_join_key")]
    pub join_key: String,

    #[serde(rename = "missingtable", default = "default_missing_table")]
    pub missing_table: String,

    #[serde(rename = "maxkey", default = "default_max_key")]
    pub max_key: i64,

    #[serde(rename = "namefilter", default = "default_name_filter")]
    pub name_filter: String,

    #[serde(rename = "thinkmin", default = "default_think_min")]
    pub think_min: String,

    #[serde(rename = "thinkmax", default = "default_think_max")]
    pub think_max: String,
}

fn default_table() -> String {
    "customers".to_string()
}
fn default_join_table() -> String {
    "orders".to_string()
}
fn default_join_key() -> String {
    "customer_id".to_string()
}
fn default_missing_table() -> String {
    "competitor".to_string()
}
fn default_max_key() -> i64 {
    1000
}
fn default_name_filter() -> String {
    "%a%".to_string()
}
fn default_think_min() -> String {
    "500ms".to_string()
}
fn default_think_max() -> String {
    "2500ms".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Connector, MemoryConnector, MemoryStore};
    use crate::metrics::Metrics;
    use rand::SeedableRng;

    fn workload() -> MixedWorkload {
        MixedWorkload::new(&Table::new()).unwrap()
    }

    fn store() -> MemoryStore {
        let s = MemoryStore::new("super_awesome_application");
        s.create_table("customers", 4);
        s.create_table("orders", 6);
        s
    }

    #[test]
    fn class_weights_sum_to_one() {
        let w = CLASS_WEIGHTS.weights();
        let classes: Vec<_> = w.iter().map(|(_, c)| **c).collect();
        assert_eq!(classes, StatementClass::ALL.to_vec());
        let sum: f64 = w.iter().map(|(w, _)| w).sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert_eq!(CLASS_WEIGHTS.total_weight(), 1.0);
    }

    #[test]
    fn class_mix_follows_weights() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut counts = [0u32; 4];
        let n = 100_000;
        for _ in 0..n {
            let c = CLASS_WEIGHTS.next(&mut rng);
            counts[StatementClass::ALL.iter().position(|x| *x == c).unwrap()] += 1;
        }
        for (i, expected) in [0.60, 0.15, 0.15, 0.10].iter().enumerate() {
            let observed = counts[i] as f64 / n as f64;
            assert!((observed - expected).abs() < 0.01, "{} vs {}", observed, expected);
        }
    }

    #[test]
    fn properties_override_tables() {
        let props: Table = "table = \"players\"\nmissingtable = \"ghost\"\nmaxkey = 10\n"
            .parse()
            .unwrap();
        let w = MixedWorkload::new(&props).unwrap();
        assert_eq!(w.insert.sql, "INSERT INTO players (name) VALUES (?)");
        assert_eq!(w.update_missing.sql, "UPDATE ghost SET name = ? WHERE id = ?");
        assert!(w.reads()[0].sql.contains("FROM players"));
    }

    #[test]
    fn rejects_inverted_think_time() {
        let props: Table = "thinkmin = \"3s\"\nthinkmax = \"1s\"\n".parse().unwrap();
        assert!(MixedWorkload::new(&props).is_err());
    }

    #[test]
    fn think_time_within_bounds() {
        let w = workload();
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..1000 {
            let d = w.think_time(&mut rng);
            assert!(d >= Duration::from_millis(500) && d < Duration::from_millis(2500));
        }
    }

    #[tokio::test]
    async fn every_iteration_records_its_attempts() {
        let w = workload();
        let mut db = MemoryConnector::new(store()).connect().await.unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        for class in StatementClass::ALL {
            let metrics = Metrics::new();
            w.run_class(class, &mut db, &mut rng, &metrics).await;
            let summary = metrics.summary();
            assert_eq!(
                summary.statements as usize,
                MixedWorkload::attempts(class),
                "{}",
                class
            );
        }
    }

    #[tokio::test]
    async fn writes_pair_a_real_statement_with_a_missing_table() {
        let w = workload();
        let mut db = MemoryConnector::new(store()).connect().await.unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let metrics = Metrics::new();
        w.run_class(StatementClass::Insert, &mut db, &mut rng, &metrics).await;
        w.run_class(StatementClass::Update, &mut db, &mut rng, &metrics).await;

        let summary = metrics.summary();
        assert_eq!(summary.statements, 4);
        assert_eq!(summary.failures, 2);
        assert_eq!(summary.operations[&StatementClass::Insert], 1);
        assert_eq!(summary.operations[&StatementClass::Update], 1);
        let failed: Vec<_> = summary
            .errors
            .iter()
            .map(|e| (e.query_type, e.query_name))
            .collect();
        assert_eq!(
            failed,
            vec![
                ("insert", "insert_missing_table"),
                ("update", "update_missing_table")
            ]
        );
        assert!(summary.success_rate.unwrap() < 1.0);
    }

    #[tokio::test]
    async fn point_lookups_on_small_table_are_not_errors() {
        let w = workload();
        let mut db = MemoryConnector::new(store()).connect().await.unwrap();
        let mut rng = StdRng::seed_from_u64(77);
        let metrics = Metrics::new();
        let lookup = w.reads().iter().find(|p| p.name == "select_by_id").unwrap();
        let mut empty = 0;
        for _ in 0..200 {
            let r = w.execute(lookup, &mut db, &mut rng, &metrics).await;
            if r.expect("lookup should succeed").rows == 0 {
                empty += 1;
            }
        }
        assert!(empty > 150);
        let summary = metrics.summary();
        assert_eq!(summary.errors_total, 0);
        assert_eq!(summary.success_rate, Some(1.0));
    }

    #[tokio::test]
    async fn reads_are_repeatable() {
        let w = workload();
        let s = store();
        let mut db = MemoryConnector::new(s.clone()).connect().await.unwrap();
        let metrics = Metrics::new();
        for pattern in w.reads() {
            let first = w
                .execute(pattern, &mut db, &mut StdRng::seed_from_u64(3), &metrics)
                .await
                .unwrap();
            let second = w
                .execute(pattern, &mut db, &mut StdRng::seed_from_u64(3), &metrics)
                .await
                .unwrap();
            assert_eq!(first, second, "{}", pattern.name);
        }
        assert_eq!(s.row_count("customers"), Some(4));
        assert_eq!(s.row_count("orders"), Some(6));
    }
}
