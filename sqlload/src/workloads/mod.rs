use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use serde::Serialize;
use toml::Table;

use crate::config::ConfigError;
use crate::db::DB;
use crate::metrics::MetricSink;

mod mixed;
mod patterns;
pub use mixed::{MixedWorkload, WorkloadProperties};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementClass {
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementClass {
    pub const ALL: [StatementClass; 4] = [
        StatementClass::Select,
        StatementClass::Insert,
        StatementClass::Update,
        StatementClass::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StatementClass::Select => "select",
            StatementClass::Insert => "insert",
            StatementClass::Update => "update",
            StatementClass::Delete => "delete",
        }
    }
}

impl fmt::Display for StatementClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait Workload: 'static + std::marker::Send + std::marker::Sync {
    fn new(props: &Table) -> Result<Self, ConfigError>
    where
        Self: Sized;

    /// One iteration: pick a statement class, run its statements, record one
    /// metric per statement attempt. Statement failures never escape.
    async fn do_transaction<T: DB>(
        &self,
        db: &mut T,
        rng: &mut StdRng,
        sink: &dyn MetricSink,
    ) -> StatementClass;

    fn think_time(&self, rng: &mut StdRng) -> Duration;
}
