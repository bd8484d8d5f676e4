//! Run configuration for the load generator.
//!
//! Settings come from three places, highest precedence first:
//! - command line flags (some also readable from the environment, e.g. `TARGET_HOST`),
//! - an optional TOML file (`loadtest.toml` or `CONFIG_FILE`),
//! - built-in defaults.
//!
//! A missing config file is not an error; a malformed one is.

use crate::error::ConfigError;
use anyhow::{Context, Result};
use clap::Parser;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const DEFAULT_USERS: usize = 1;
const DEFAULT_SPAWN_RATE: f64 = 1.0;
const DEFAULT_STATS_INTERVAL_SECONDS: u64 = 2;

/// SimpleDb SQL select load generator
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "simpledb-loadtest")]
#[command(about = "Load test the SimpleDb /sql/test/select/flight and /sql/test/select/account endpoints")]
pub struct CliArgs {
    /// Base URL of the target service (e.g., http://localhost:8080)
    #[arg(long, env = "TARGET_HOST")]
    pub host: Option<String>,

    /// Number of concurrent virtual users
    #[arg(long, short = 'u')]
    pub users: Option<usize>,

    /// Virtual users started per second during ramp-up (0 = all at once)
    #[arg(long, short = 'r')]
    pub spawn_rate: Option<f64>,

    /// Stop after this many seconds (conflicts with --iterations)
    #[arg(long, conflicts_with = "iterations")]
    pub run_time_seconds: Option<u64>,

    /// Stop after this many task iterations across all users (conflicts with --run-time-seconds)
    #[arg(long, conflicts_with = "run_time_seconds")]
    pub iterations: Option<u64>,

    /// Minimum pause between two iterations of one user, in milliseconds
    #[arg(long)]
    pub wait_min_ms: Option<u64>,

    /// Maximum pause between two iterations of one user, in milliseconds
    #[arg(long)]
    pub wait_max_ms: Option<u64>,

    /// Per-request timeout in seconds (unset = no timeout)
    #[arg(long)]
    pub request_timeout_seconds: Option<u64>,

    /// Print progress every N seconds
    #[arg(long)]
    pub stats_interval_seconds: Option<u64>,

    /// Path to the TOML config file
    #[arg(long, env = "CONFIG_FILE", default_value = "loadtest.toml")]
    pub config: PathBuf,

    /// Write the final statistics as JSON to this path
    #[arg(long)]
    pub report_json: Option<PathBuf>,

    /// Process exit code when at least one request failed
    #[arg(long, default_value = "1")]
    pub exit_code_on_error: i32,
}

/// Contents of the optional TOML config file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FileConfig {
    pub target: TargetSection,
    pub users: UsersSection,
    pub run: RunSection,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetSection {
    /// Base URL of the target service.
    pub host: Option<String>,
    /// Per-request timeout in seconds.
    pub request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UsersSection {
    /// Number of concurrent virtual users.
    pub count: Option<usize>,
    /// Users started per second during ramp-up.
    pub spawn_rate: Option<f64>,
    pub wait_min_ms: Option<u64>,
    pub wait_max_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RunSection {
    pub run_time_seconds: Option<u64>,
    pub iterations: Option<u64>,
    pub stats_interval_seconds: Option<u64>,
}

impl FileConfig {
    /// Load configuration from a TOML file.
    ///
    /// If the file doesn't exist, returns the default configuration.
    /// If the file exists but is malformed, returns an error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        config::Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()
    }
}

/// Where requests go and how long each may take.
#[derive(Debug, Clone)]
pub struct TargetSettings {
    pub base_url: Url,
    pub request_timeout: Option<Duration>,
}

/// When a load test ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCondition {
    /// Stop once this much time has passed since the run started.
    RunTime(Duration),
    /// Stop once this many task iterations have been claimed across all users.
    Iterations(u64),
    /// Run until the shutdown signal fires.
    Interrupted,
}

/// Pause a virtual user takes between two iterations, sampled uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaitTime {
    min_ms: u64,
    max_ms: u64,
}

impl WaitTime {
    pub const NONE: WaitTime = WaitTime { min_ms: 0, max_ms: 0 };

    pub fn between(min_ms: u64, max_ms: u64) -> Result<Self, ConfigError> {
        if min_ms > max_ms {
            return Err(ConfigError::InvalidSetting {
                name: "wait_min_ms",
                reason: format!("{} is greater than wait_max_ms {}", min_ms, max_ms),
            });
        }
        Ok(Self { min_ms, max_ms })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min_ms == self.max_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms))
    }
}

/// How virtual users are scheduled.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub users: usize,
    /// Users per second; `0.0` starts every user immediately.
    pub spawn_rate: f64,
    pub stop: StopCondition,
    pub wait: WaitTime,
    pub stats_interval: Duration,
}

impl RunSettings {
    /// Pause between two user starts; `None` starts every user immediately.
    pub fn spawn_delay(&self) -> Option<Duration> {
        if self.spawn_rate > 0.0 {
            Duration::try_from_secs_f64(1.0 / self.spawn_rate).ok()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub target: TargetSettings,
    pub run: RunSettings,
    pub report_json: Option<PathBuf>,
    pub exit_code_on_error: i32,
}

impl Config {
    /// Parse the command line, read the config file and resolve both.
    ///
    /// `.env` should already be loaded so `TARGET_HOST` and `CONFIG_FILE` are visible.
    pub fn load() -> Result<Self> {
        let cli = CliArgs::parse();
        let file = FileConfig::from_file(&cli.config)
            .with_context(|| format!("Failed to read config file {}", cli.config.display()))?;

        Ok(Self::resolve(cli, file)?)
    }

    /// Merge CLI arguments over file settings and validate the result.
    pub fn resolve(cli: CliArgs, file: FileConfig) -> Result<Self, ConfigError> {
        let host = cli
            .host
            .or(file.target.host)
            .ok_or(ConfigError::MissingHost)?;
        let base_url = parse_base_url(&host)?;

        let request_timeout = cli
            .request_timeout_seconds
            .or(file.target.request_timeout_seconds)
            .map(|secs| non_zero("request_timeout_seconds", secs).map(Duration::from_secs))
            .transpose()?;

        let users = cli.users.or(file.users.count).unwrap_or(DEFAULT_USERS);
        if users == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "users",
                reason: "at least one virtual user is required".to_string(),
            });
        }

        let spawn_rate = cli
            .spawn_rate
            .or(file.users.spawn_rate)
            .unwrap_or(DEFAULT_SPAWN_RATE);
        if !spawn_rate.is_finite() || spawn_rate < 0.0 {
            return Err(ConfigError::InvalidSetting {
                name: "spawn_rate",
                reason: format!("{} is not a non-negative number", spawn_rate),
            });
        }
        if spawn_rate > 0.0 && Duration::try_from_secs_f64(1.0 / spawn_rate).is_err() {
            return Err(ConfigError::InvalidSetting {
                name: "spawn_rate",
                reason: format!("{} is too small to space out user starts", spawn_rate),
            });
        }

        let stop = if cli.run_time_seconds.is_some() || cli.iterations.is_some() {
            stop_condition(cli.run_time_seconds, cli.iterations)?
        } else {
            stop_condition(file.run.run_time_seconds, file.run.iterations)?
        };

        let wait = WaitTime::between(
            cli.wait_min_ms.or(file.users.wait_min_ms).unwrap_or(0),
            cli.wait_max_ms.or(file.users.wait_max_ms).unwrap_or(0),
        )?;

        let stats_interval = Duration::from_secs(non_zero(
            "stats_interval_seconds",
            cli.stats_interval_seconds
                .or(file.run.stats_interval_seconds)
                .unwrap_or(DEFAULT_STATS_INTERVAL_SECONDS),
        )?);

        Ok(Self {
            target: TargetSettings {
                base_url,
                request_timeout,
            },
            run: RunSettings {
                users,
                spawn_rate,
                stop,
                wait,
                stats_interval,
            },
            report_json: cli.report_json,
            exit_code_on_error: cli.exit_code_on_error,
        })
    }
}

/// Parse and check the base URL every request path is appended to.
pub fn parse_base_url(host: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(host.trim()).map_err(|source| ConfigError::InvalidHost {
        host: host.to_string(),
        source,
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(ConfigError::HostHasQuery(host.to_string()));
    }

    Ok(url)
}

fn stop_condition(
    run_time_seconds: Option<u64>,
    iterations: Option<u64>,
) -> Result<StopCondition, ConfigError> {
    match (run_time_seconds, iterations) {
        (Some(_), Some(_)) => Err(ConfigError::ConflictingStopConditions),
        (Some(secs), None) => Ok(StopCondition::RunTime(Duration::from_secs(non_zero(
            "run_time_seconds",
            secs,
        )?))),
        (None, Some(total)) => Ok(StopCondition::Iterations(non_zero("iterations", total)?)),
        (None, None) => Ok(StopCondition::Interrupted),
    }
}

fn non_zero(name: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidSetting {
            name,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
