use crate::client::TargetClient;
use crate::config::{Config, StopCondition, WaitTime};
use crate::error::{LoadTestError, RegistryError};
use crate::stats::{Stats, StatsSnapshot};
use crate::task::TaskRegistry;
use crate::user::VirtualUser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

pub struct LoadTest {
    config: Config,
    registry: Arc<TaskRegistry>,
    stats: Stats,
}

impl LoadTest {
    pub fn new(config: Config, registry: TaskRegistry) -> Result<Self, LoadTestError> {
        if registry.is_empty() {
            return Err(RegistryError::Empty.into());
        }

        Ok(Self {
            config,
            registry: Arc::new(registry),
            stats: Stats::new(),
        })
    }

    /// Run the load test until its stop condition is met or `shutdown` is cancelled.
    ///
    /// Prints progress every stats interval and the final statistics on return.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<StatsSnapshot, LoadTestError> {
        let run = &self.config.run;
        let tasks: Vec<&str> = self.registry.names().collect();

        tracing::info!(
            target_url = %self.config.target.base_url,
            users = run.users,
            spawn_rate = run.spawn_rate,
            ?tasks,
            "starting load test"
        );
        match run.stop {
            StopCondition::RunTime(duration) => {
                tracing::info!(run_time_seconds = duration.as_secs(), "stopping after run time")
            }
            StopCondition::Iterations(total) => {
                tracing::info!(iterations = total, "stopping after iteration count")
            }
            StopCondition::Interrupted => tracing::info!("running until interrupted (Ctrl+C)"),
        }

        // One client per user, built before anything is spawned
        let clients = (0..run.users)
            .map(|_| TargetClient::new(&self.config.target))
            .collect::<Result<Vec<_>, _>>()?;

        self.stats.reset();

        let stop = shutdown.child_token();
        let iterations = Arc::new(AtomicU64::new(0));
        let iteration_limit = match run.stop {
            StopCondition::Iterations(total) => Some(total),
            _ => None,
        };

        // Spawn stats printer
        let printer = {
            let stats = self.stats.clone();
            let stop = stop.clone();
            let interval = run.stats_interval;
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = sleep(interval) => stats.snapshot().print(false),
                    }
                }
            })
        };

        if let StopCondition::RunTime(duration) = run.stop {
            let stop = stop.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = stop.cancelled() => {}
                    _ = sleep(duration) => {
                        tracing::info!("run time elapsed, stopping virtual users");
                        stop.cancel();
                    }
                }
            });
        }

        // Ramp up virtual users
        let spawn_delay = run.spawn_delay();
        let mut handles = Vec::with_capacity(run.users);

        for (user_id, client) in clients.into_iter().enumerate() {
            if stop.is_cancelled() {
                break;
            }

            let user = VirtualUser::new(user_id, client, self.stats.clone());
            handles.push(tokio::spawn(user_loop(
                user,
                Arc::clone(&self.registry),
                stop.clone(),
                Arc::clone(&iterations),
                iteration_limit,
                run.wait,
            )));
            tracing::debug!(user_id, "virtual user spawned");

            if let Some(delay) = spawn_delay {
                if user_id + 1 < run.users {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = sleep(delay) => {}
                    }
                }
            }
        }
        tracing::info!(spawned = handles.len(), "ramp-up finished");

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "virtual user task failed");
            }
        }

        stop.cancel();
        printer.await.ok();

        let snapshot = self.stats.snapshot();
        tracing::info!(
            iterations = snapshot.iterations,
            total_requests = snapshot.total_requests,
            failures = snapshot.total_failures,
            "load test finished"
        );
        snapshot.print(true);

        Ok(snapshot)
    }
}

async fn user_loop(
    user: VirtualUser,
    registry: Arc<TaskRegistry>,
    stop: CancellationToken,
    iterations: Arc<AtomicU64>,
    iteration_limit: Option<u64>,
    wait: WaitTime,
) {
    let mut rng = StdRng::from_entropy();

    loop {
        if stop.is_cancelled() {
            break;
        }

        // Claim an iteration slot before running
        if let Some(total) = iteration_limit {
            if iterations.fetch_add(1, Ordering::Relaxed) >= total {
                break;
            }
        }

        let Some(entry) = registry.choose(&mut rng) else {
            break;
        };
        entry.task().run(&user).await;
        user.stats().record_iteration(entry.name());

        let pause = wait.sample(&mut rng);
        if !pause.is_zero() {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = sleep(pause) => {}
            }
        }
    }

    tracing::debug!(user_id = user.id(), "virtual user stopped");
}
