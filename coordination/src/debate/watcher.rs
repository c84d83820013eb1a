//! Round watcher — runs the engine sweep on a fixed interval.

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::engine::SharedDebateEngine;

/// Background task that applies round timeouts and review windows.
pub struct RoundWatcher {
    engine: SharedDebateEngine,
    interval: Duration,
    cancel: CancellationToken,
}

impl RoundWatcher {
    /// Watcher using the engine's configured sweep interval.
    pub fn new(engine: SharedDebateEngine) -> Self {
        let interval = engine.config().sweep_interval;
        Self::with_interval(engine, interval)
    }

    pub fn with_interval(engine: SharedDebateEngine, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the watcher when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until cancelled.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "Round watcher started");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("Round watcher stopped");
                    return;
                }
                _ = ticker.tick() => {
                    match self.engine.sweep(Utc::now()).await {
                        Ok(report) if report.is_empty() => debug!("Sweep found nothing to do"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Sweep failed"),
                    }
                }
            }
        }
    }

    /// Spawn onto the current runtime.
    pub fn spawn(self) -> (JoinHandle<()>, CancellationToken) {
        let token = self.cancellation_token();
        (tokio::spawn(self.run()), token)
    }
}
