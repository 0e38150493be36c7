use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use toml::Table;

use crate::schedule::{Schedule, Stage};

const DEFAULT_CLOUD_REGION: &str = "amazon:us:ashburn";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("invalid properties: {0}")]
    Properties(#[from] toml::de::Error),

    #[error("invalid duration {value:?}: {source}")]
    Duration {
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("schedule needs at least one stage")]
    EmptySchedule,

    #[error("stage {0} has a zero duration")]
    ZeroDuration(usize),

    #[error("unknown {kind} {value:?}")]
    Unknown { kind: &'static str, value: String },
}

/// Connection and reporting settings, read once from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// 0 disables cloud reporting.
    pub cloud_project_id: u64,
    pub cloud_region: String,
}

impl RunConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let port = required("DB_PORT")?;
        let port = port
            .parse::<u16>()
            .map_err(|_| ConfigError::Invalid {
                name: "DB_PORT",
                value: port.clone(),
            })?;
        let cloud_project_id = match lookup("CLOUD_PROJECT_ID").filter(|v| !v.is_empty()) {
            Some(v) => v.parse::<u64>().map_err(|_| ConfigError::Invalid {
                name: "CLOUD_PROJECT_ID",
                value: v.clone(),
            })?,
            None => 0,
        };
        Ok(RunConfig {
            host: required("DB_HOST")?,
            port,
            user: required("DB_USER")?,
            password: required("DB_PASSWORD")?,
            database: required("DB_DATABASE")?,
            cloud_project_id,
            cloud_region: lookup("CLOUD_REGION")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_CLOUD_REGION.to_string()),
        })
    }

    /// `user:password@host:port/schema`
    pub fn connection_string(&self) -> String {
        format!(
            "{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }

    pub fn masked_connection_string(&self) -> String {
        format!(
            "{}:***@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }

    pub fn cloud_enabled(&self) -> bool {
        self.cloud_project_id != 0
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct StageProperties {
    pub duration: String,
    pub target: u64,
}

/// Run-level properties, from `-P` files and `-p` overrides.
#[derive(Deserialize, Clone, Debug)]
pub struct CoreProperties {
    #[serde(default = "default_workload")]
    pub workload: String,

    #[serde(default = "default_db")]
    pub db: String,

    #[serde(default = "default_tick")]
    pub tick: String,

    #[serde(rename = "startvus", default)]
    pub start_vus: u64,

    pub seed: Option<u64>,

    #[serde(rename = "summaryexport")]
    pub summary_export: Option<String>,

    #[serde(rename = "memoryrows", default = "default_memory_rows")]
    pub memory_rows: i64,

    pub stages: Option<Vec<StageProperties>>,
}

impl CoreProperties {
    pub fn parse(props: Table) -> Result<Self, ConfigError> {
        Ok(props.try_into()?)
    }

    /// Scheduler resolution. Must be non-zero.
    pub fn tick(&self) -> Result<Duration, ConfigError> {
        let tick = parse_duration(&self.tick)?;
        if tick.is_zero() {
            return Err(ConfigError::Invalid {
                name: "tick",
                value: self.tick.clone(),
            });
        }
        Ok(tick)
    }

    /// Stages from the properties, or the 60 minute reference schedule.
    pub fn schedule(&self) -> Result<Schedule, ConfigError> {
        match &self.stages {
            None => Ok(Schedule::reference()),
            Some(stages) => {
                let stages = stages
                    .iter()
                    .map(|s| {
                        Ok(Stage {
                            duration: parse_duration(&s.duration)?,
                            target: s.target,
                        })
                    })
                    .collect::<Result<Vec<_>, ConfigError>>()?;
                Schedule::new(self.start_vus, stages)
            }
        }
    }
}

pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|source| ConfigError::Duration {
        value: value.to_string(),
        source,
    })
}

fn default_workload() -> String {
    "mixed".to_string()
}
fn default_db() -> String {
    "mysql".to_string()
}
fn default_tick() -> String {
    "1s".to_string()
}
fn default_memory_rows() -> i64 {
    4
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    const FULL: &[(&str, &str)] = &[
        ("DB_HOST", "mysql"),
        ("DB_PORT", "3306"),
        ("DB_USER", "app"),
        ("DB_PASSWORD", "s3cret"),
        ("DB_DATABASE", "super_awesome_application"),
    ];

    #[test]
    fn reads_required_variables() {
        let cfg = RunConfig::from_lookup(env(FULL)).unwrap();
        assert_eq!(cfg.port, 3306);
        assert_eq!(
            cfg.connection_string(),
            "app:s3cret@mysql:3306/super_awesome_application"
        );
        assert_eq!(
            cfg.masked_connection_string(),
            "app:***@mysql:3306/super_awesome_application"
        );
        assert!(!cfg.cloud_enabled());
        assert_eq!(cfg.cloud_region, DEFAULT_CLOUD_REGION);
    }

    #[test]
    fn every_connection_field_is_required() {
        for (missing, _) in FULL {
            let pairs: Vec<_> = FULL.iter().copied().filter(|(k, _)| k != missing).collect();
            match RunConfig::from_lookup(env(&pairs)) {
                Err(ConfigError::Missing(name)) => assert_eq!(name, *missing),
                other => panic!("expected missing {}, got {:?}", missing, other),
            }
        }
        let mut pairs = FULL.to_vec();
        pairs[3] = ("DB_PASSWORD", "");
        assert!(matches!(
            RunConfig::from_lookup(env(&pairs)),
            Err(ConfigError::Missing("DB_PASSWORD"))
        ));
    }

    #[test]
    fn rejects_bad_port_and_project() {
        let mut pairs = FULL.to_vec();
        pairs[1] = ("DB_PORT", "mysql");
        assert!(matches!(
            RunConfig::from_lookup(env(&pairs)),
            Err(ConfigError::Invalid { name: "DB_PORT", .. })
        ));
        let mut pairs = FULL.to_vec();
        pairs.push(("CLOUD_PROJECT_ID", "abc"));
        assert!(RunConfig::from_lookup(env(&pairs)).is_err());
        let mut pairs = FULL.to_vec();
        pairs.push(("CLOUD_PROJECT_ID", "3712"));
        assert!(RunConfig::from_lookup(env(&pairs)).unwrap().cloud_enabled());
    }

    #[test]
    fn stages_parse_from_properties() {
        let props: Table = r#"
            db = "memory"
            [[stages]]
            duration = "10s"
            target = 1
            [[stages]]
            duration = "1m 30s"
            target = 0
        "#
        .parse()
        .unwrap();
        let core = CoreProperties::parse(props).unwrap();
        assert_eq!(core.db, "memory");
        assert_eq!(core.workload, "mixed");
        let schedule = core.schedule().unwrap();
        assert_eq!(schedule.total_duration(), Duration::from_secs(100));
        assert_eq!(schedule.max_vus(), 1);
    }

    #[test]
    fn default_schedule_is_reference() {
        let core = CoreProperties::parse(Table::new()).unwrap();
        assert_eq!(core.schedule().unwrap(), Schedule::reference());
        assert_eq!(core.tick().unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn zero_tick_is_rejected() {
        let props: Table = "tick = \"0s\"\n".parse().unwrap();
        let core = CoreProperties::parse(props).unwrap();
        assert!(matches!(
            core.tick(),
            Err(ConfigError::Invalid { name: "tick", .. })
        ));
    }

    #[test]
    fn bad_stage_duration_is_reported() {
        let props: Table = "[[stages]]\nduration = \"soon\"\ntarget = 3\n".parse().unwrap();
        let core = CoreProperties::parse(props).unwrap();
        assert!(matches!(core.schedule(), Err(ConfigError::Duration { .. })));
    }
}
