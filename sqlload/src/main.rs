mod client;
mod config;
mod db;
mod generators;
mod metrics;
mod report;
mod runner;
mod schedule;
mod thresholds;
mod workloads;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::Local;
use clap::Parser;
use toml::Table;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::{ConfigError, CoreProperties, RunConfig};
use db::{Connector, MemoryConnector, MemoryStore, MySqlConnector};
use metrics::Metrics;
use runner::Runner;
use schedule::Schedule;
use thresholds::Thresholds;
use workloads::{MixedWorkload, Workload, WorkloadProperties};

/// Exit code for a completed run whose thresholds failed.
const THRESHOLDS_FAILED: u8 = 99;

#[derive(Parser, Debug)]
#[command(name = "sqlload", about = "Synthetic SQL workload driver")]
struct Args {
    /// Property file (TOML). May be repeated; later files override earlier ones.
    #[arg(short = 'P', value_name = "FILE")]
    property_files: Vec<PathBuf>,

    /// Single property override, applied after all property files.
    #[arg(short = 'p', value_name = "KEY=VALUE")]
    properties: Vec<String>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let props = load_properties(&args.property_files, &args.properties)?;
    let core_props = CoreProperties::parse(props.clone())?;
    let config = RunConfig::from_env().context("reading run configuration")?;
    let schedule = core_props.schedule()?;
    let tick = core_props.tick()?;
    let thresholds = Thresholds::parse(&props)?;

    let workload = match &*core_props.workload {
        "mixed" => MixedWorkload::new(&props)?,
        other => {
            return Err(ConfigError::Unknown {
                kind: "workload",
                value: other.to_string(),
            }
            .into())
        }
    };

    let passed = match &*core_props.db {
        "mysql" => {
            let connector = MySqlConnector::new(&config);
            run(
                connector,
                workload,
                &config,
                &core_props,
                schedule,
                tick,
                thresholds,
            )
            .await?
        }
        "memory" => {
            let store = sample_store(&config, workload.props(), core_props.memory_rows);
            let connector = MemoryConnector::new(store);
            run(
                connector,
                workload,
                &config,
                &core_props,
                schedule,
                tick,
                thresholds,
            )
            .await?
        }
        other => {
            return Err(ConfigError::Unknown {
                kind: "db",
                value: other.to_string(),
            }
            .into())
        }
    };

    if passed {
        Ok(ExitCode::SUCCESS)
    } else {
        error!("thresholds failed");
        Ok(ExitCode::from(THRESHOLDS_FAILED))
    }
}

async fn run<C: Connector, U: Workload>(
    connector: C,
    workload: U,
    config: &RunConfig,
    core_props: &CoreProperties,
    schedule: Schedule,
    tick: Duration,
    thresholds: Thresholds,
) -> anyhow::Result<bool> {
    report::print_config_banner(config, &schedule);

    if let Err(err) = db::probe(&connector).await {
        error!(error = %err, "database unreachable, aborting before the first stage");
        return Err(err).context(format!(
            "pre-flight connection to {} failed",
            config.masked_connection_string()
        ));
    }
    info!("pre-flight connection ok");

    let metrics = Arc::new(Metrics::new());
    let started_at = Local::now();
    let stats = Runner::new(
        Arc::new(connector),
        Arc::new(workload),
        metrics.clone(),
        schedule,
        tick,
        core_props.seed,
    )
    .run()
    .await;
    let ended_at = Local::now();

    let summary = metrics.summary();
    let verdict = thresholds.evaluate(&summary);
    report::print_summary(started_at, ended_at, &stats, &summary, &verdict);
    if let Some(path) = &core_props.summary_export {
        report::export_summary(
            Path::new(path),
            started_at,
            ended_at,
            &stats,
            &summary,
            &verdict,
        )?;
        info!(path = %path, "summary exported");
    }

    Ok(verdict.passed())
}

/// Dry-run database: the workload's two tables with `rows` rows each and no
/// `missingtable`.
fn sample_store(config: &RunConfig, props: &WorkloadProperties, rows: i64) -> MemoryStore {
    let store = MemoryStore::new(&config.database);
    store.create_table(&props.table, rows);
    store.create_table(&props.join_table, rows);
    store
}

/// Merges `-P` files in order, then applies `-p` overrides. Override values
/// are typed as integer, float, bool, then string.
fn load_properties(files: &[PathBuf], overrides: &[String]) -> anyhow::Result<Table> {
    let mut ret = Table::new();
    for path in files {
        let toml_text = std::fs::read_to_string(path)
            .with_context(|| format!("reading property file {}", path.display()))?;
        let tbl = toml_text
            .parse::<Table>()
            .with_context(|| format!("parsing property file {}", path.display()))?;
        ret.extend(tbl);
    }

    for kv in overrides {
        let Some((k, v)) = kv.split_once('=') else {
            bail!("property override {:?} is not KEY=VALUE", kv);
        };
        ret.insert(k.to_string(), typed_value(v));
    }
    Ok(ret)
}

fn typed_value(v: &str) -> toml::Value {
    if let Ok(t0) = v.parse::<i64>() {
        toml::Value::from(t0)
    } else if let Ok(t1) = v.parse::<f64>() {
        toml::Value::from(t1)
    } else if let Ok(t2) = v.to_ascii_lowercase().parse::<bool>() {
        toml::Value::from(t2)
    } else {
        toml::Value::from(v)
    }
}
