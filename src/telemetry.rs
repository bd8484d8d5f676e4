//! Structured logging setup.
//!
//! `RUST_LOG` selects the filter (default `info`). `LOG_FORMAT=json`
//! switches the output to one JSON object per line.

use tracing_subscriber::EnvFilter;

pub struct Telemetry {
    name: &'static str,
    version: &'static str,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            name: "simpledb-loadtest",
            version: "unknown",
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    /// Install the global subscriber. A second call keeps the first subscriber.
    pub fn register(self) -> Self {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let json = std::env::var("LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let installed = if json {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .try_init()
        } else {
            tracing_subscriber::fmt().with_env_filter(filter).try_init()
        };

        if let Err(e) = installed {
            tracing::debug!(error = %e, "tracing subscriber already installed");
        }

        tracing::info!(name = self.name, version = self.version, "telemetry registered");
        self
    }
}
