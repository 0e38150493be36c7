use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::debug;

use crate::config::RunConfig;
use crate::metrics::Summary;
use crate::runner::RunStats;
use crate::schedule::Schedule;
use crate::thresholds::Verdict;

const RULE: &str = "==========================================================";

pub fn print_config_banner(config: &RunConfig, schedule: &Schedule) {
    println!("{}", RULE);
    println!("  sqlload configuration");
    println!("{}", RULE);
    println!("  host:              {}", config.host);
    println!("  port:              {}", config.port);
    println!("  schema:            {}", config.database);
    println!("  user:              {}", config.user);
    println!("  connection:        {}", config.masked_connection_string());
    debug!(connection = %config.connection_string(), "unmasked connection string");
    println!(
        "  total duration:    {}",
        humantime::format_duration(schedule.total_duration())
    );
    println!("  max vus:           {}", schedule.max_vus());
    if config.cloud_enabled() {
        println!(
            "  cloud project:     {} ({})",
            config.cloud_project_id, config.cloud_region
        );
    } else {
        println!("  cloud project:     disabled");
    }
    println!("{}", RULE);
}

pub fn print_summary(
    started_at: DateTime<Local>,
    ended_at: DateTime<Local>,
    stats: &RunStats,
    summary: &Summary,
    verdict: &Verdict,
) {
    let ms = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{:.2}ms", v));
    println!("{}", RULE);
    println!("  sqlload summary");
    println!("{}", RULE);
    println!("  started:           {}", started_at.to_rfc3339());
    println!("  ended:             {}", ended_at.to_rfc3339());
    println!(
        "  vus:               {} spawned, {} max",
        stats.vus_spawned, stats.vus_max
    );
    println!("  iterations:        {}", stats.iterations);
    println!("  statements:        {}", summary.statements);
    for (class, count) in &summary.operations {
        println!("    {:<8}         {}", class.as_str(), count);
    }
    println!(
        "  success rate:      {}",
        summary
            .success_rate
            .map_or_else(|| "-".to_string(), |r| format!("{:.2}%", r * 100.0))
    );
    println!("  p(95):             {}", ms(summary.p95_ms));
    println!("  p(99):             {}", ms(summary.p99_ms));
    println!("  errors:            {}", summary.errors_total);
    for e in &summary.errors {
        println!(
            "    {}/{}: {} x {}",
            e.query_type, e.query_name, e.count, e.error
        );
    }
    println!("  thresholds:");
    for o in &verdict.outcomes {
        println!(
            "    [{}] {}",
            if o.passed { "pass" } else { "FAIL" },
            o.threshold
        );
    }
    println!(
        "  verdict:           {}",
        if verdict.passed() { "passed" } else { "failed" }
    );
    println!("{}", RULE);
}

#[derive(Serialize)]
struct RunReport<'a> {
    started_at: DateTime<Local>,
    ended_at: DateTime<Local>,
    vus_spawned: u64,
    vus_max: u64,
    iterations: u64,
    summary: &'a Summary,
    verdict: &'a Verdict,
    passed: bool,
}

pub fn export_summary(
    path: &Path,
    started_at: DateTime<Local>,
    ended_at: DateTime<Local>,
    stats: &RunStats,
    summary: &Summary,
    verdict: &Verdict,
) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let report = RunReport {
        started_at,
        ended_at,
        vus_spawned: stats.vus_spawned,
        vus_max: stats.vus_max,
        iterations: stats.iterations,
        summary,
        verdict,
        passed: verdict.passed(),
    };
    serde_json::to_writer_pretty(BufWriter::new(file), &report)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
