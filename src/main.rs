//! SimpleDb select load generator entrypoint.
//!
//! Spawns virtual users that each GET `/sql/test/select/flight` and then
//! `/sql/test/select/account` against the configured target, printing
//! progress and final latency statistics.
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `TARGET_HOST` base URL of the service under test
//! - `CONFIG_FILE` path to the TOML config (default `loadtest.toml`)
//! - `RUST_LOG`, `LOG_FORMAT` control logging

use anyhow::{Context, Result};
use dotenvy::dotenv;
use simpledb_loadtest::config::Config;
use simpledb_loadtest::runner::LoadTest;
use simpledb_loadtest::scenario;
use simpledb_loadtest::sig_down::SigDown;
use simpledb_loadtest::telemetry::Telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env variables
    dotenv().ok();

    let _telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let config = Config::load()?;
    let registry = scenario::registry()?;

    let sig_down = SigDown::try_new().context("Failed to install signal handlers")?;
    let test = LoadTest::new(config.clone(), registry)?;
    let snapshot = test.run(sig_down.cancellation_token()).await?;

    if let Some(path) = &config.report_json {
        snapshot
            .write_json(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        tracing::info!(path = %path.display(), "JSON report written");
    }

    if snapshot.total_failures > 0 && config.exit_code_on_error != 0 {
        tracing::warn!(
            failures = snapshot.total_failures,
            exit_code = config.exit_code_on_error,
            "requests failed during the run"
        );
        std::process::exit(config.exit_code_on_error);
    }

    Ok(())
}
