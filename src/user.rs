//! Virtual users and the per-request instrumentation they apply.

use crate::client::TargetClient;
use crate::stats::{RequestOutcome, RequestRecord, Stats};
use std::error::Error as _;
use std::time::Instant;

/// One simulated client. Requests it sends are timed and recorded in the shared [`Stats`].
pub struct VirtualUser {
    id: usize,
    client: TargetClient,
    stats: Stats,
}

impl VirtualUser {
    pub fn new(id: usize, client: TargetClient, stats: Stats) -> Self {
        Self { id, client, stats }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// GET `path` on the target and record the outcome under `"GET <path>"`.
    ///
    /// 4xx and 5xx responses count as failures, as do transport errors.
    /// Nothing is retried and the body is not inspected.
    pub async fn get(&self, path: &str) -> RequestOutcome {
        let start = Instant::now();
        let outcome = match self.client.get(path).await {
            Ok(status) if status.is_client_error() || status.is_server_error() => {
                RequestOutcome::Failure {
                    status: status.as_u16(),
                }
            }
            Ok(status) => RequestOutcome::Success {
                status: status.as_u16(),
            },
            Err(e) => {
                tracing::debug!(user_id = self.id, path, error = %e, "request failed");
                RequestOutcome::Error {
                    error: describe_error(&e),
                }
            }
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        self.stats.record(RequestRecord {
            name: format!("GET {}", path),
            outcome: outcome.clone(),
            latency_ms,
        });

        outcome
    }
}

/// Failure kind followed by the source chain, e.g.
/// `connect: client error (Connect): tcp connect error: Connection refused (os error 111)`.
///
/// The request URL is left out so errors group by endpoint name only.
fn describe_error(e: &reqwest::Error) -> String {
    let kind = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connect"
    } else if e.is_body() || e.is_decode() {
        "body"
    } else {
        "request"
    };

    let mut message = kind.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
