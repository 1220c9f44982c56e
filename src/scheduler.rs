use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Fixed-interval jobs with a shared stop signal.
///
/// Each firing runs as its own task, so a slow run does not hold back the
/// next one (runs may overlap). On shutdown the timers stop and in-flight
/// runs are awaited.
pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    loops: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            loops: Vec::new(),
        }
    }

    /// Runs `job` every `period`, the first time after `first_delay`.
    pub fn every<F, Fut>(&mut self, name: &'static str, period: Duration, first_delay: Duration, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + first_delay, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut in_flight = JoinSet::new();

            tracing::debug!(job = name, period_ms = period.as_millis() as u64, "Scheduled job started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        in_flight.spawn(job());
                    }
                    Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                        if let Err(err) = result {
                            tracing::error!(job = name, error = %err, "Scheduled run panicked");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            if !in_flight.is_empty() {
                tracing::info!(job = name, pending = in_flight.len(), "Waiting for in-flight runs");
            }
            while let Some(result) = in_flight.join_next().await {
                if let Err(err) = result {
                    tracing::error!(job = name, error = %err, "Scheduled run panicked");
                }
            }

            tracing::debug!(job = name, "Scheduled job stopped");
        });

        self.loops.push((name, handle));
    }

    /// Stops every timer and waits for running jobs to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for (name, handle) in self.loops {
            if let Err(err) = handle.await {
                tracing::error!(job = name, error = %err, "Scheduler loop ended abnormally");
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
