//! Shutdown signal handling.
//!
//! Ctrl+C (and SIGTERM on unix) cancel a [`CancellationToken`] that the
//! load test runner watches. Virtual users finish their current iteration
//! and then stop.

use tokio_util::sync::CancellationToken;

pub struct SigDown {
    cancellation_token: CancellationToken,
}

impl SigDown {
    /// Install the signal listeners. Must be called inside a tokio runtime.
    pub fn try_new() -> Result<Self, std::io::Error> {
        let cancellation_token = CancellationToken::new();
        let signals = Signals::try_new()?;

        let token = cancellation_token.clone();
        tokio::spawn(async move {
            signals.recv().await;
            tracing::info!("Shutdown signal received, stopping virtual users");
            token.cancel();
        });

        Ok(Self { cancellation_token })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}

#[cfg(unix)]
struct Signals {
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn try_new() -> Result<Self, std::io::Error> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(mut self) {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = self.terminate.recv() => {}
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn try_new() -> Result<Self, std::io::Error> {
        Ok(Self)
    }

    async fn recv(self) {
        tokio::signal::ctrl_c().await.ok();
    }
}
