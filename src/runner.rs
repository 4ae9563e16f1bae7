//! One request loop for one connection of one task.

use std::sync::Arc;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tracing::trace;

use crate::client::Transport;
use crate::config::TaskDescriptor;
use crate::lifecycle::{CancellationToken, StartSignal};
use crate::metrics::{
    GaugeGuard, ACTIVE_CONNECTIONS, CONCURRENT_REQUESTS, REQUEST_DURATION_SECONDS,
    REQUEST_ERRORS_BY_CATEGORY, REQUEST_OUTCOMES, REQUEST_TOTAL,
};
use crate::stats::StatCounter;

/// Start offsets that spread `connections` loops evenly over one `interval`.
///
/// `offset_i = (interval / connections) * i`, with the division truncated to
/// whole nanoseconds.
pub fn connection_offsets(interval: Duration, connections: usize) -> Vec<Duration> {
    if connections == 0 {
        return Vec::new();
    }
    let step = interval.as_nanos() / connections as u128;
    (0..connections as u128)
        .map(|i| Duration::from_nanos(u64::try_from(step * i).unwrap_or(u64::MAX)))
        .collect()
}

/// Everything one runner needs; built by the owning task group.
pub struct RequestRunner {
    pub connection_id: usize,
    pub task: Arc<TaskDescriptor>,
    pub offset: Duration,
    pub start: StartSignal,
    pub cancel: CancellationToken,
    pub stats: Arc<StatCounter>,
    pub transport: Arc<dyn Transport>,
}

impl RequestRunner {
    /// Runs until cancelled.
    ///
    /// Cancellation is checked while waiting for the gate, during the offset
    /// sleep and between ticks. A request in progress is finished first.
    pub async fn run(self) {
        let mut start = self.start.clone();
        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            opened = start.wait() => opened,
        };
        if !opened {
            return;
        }

        let _active = GaugeGuard::track(&ACTIVE_CONNECTIONS);
        self.request_loop().await;

        trace!(
            connection = self.connection_id,
            url = %self.task.url,
            "Connection stopped"
        );
    }

    async fn request_loop(&self) {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            _ = time::sleep(self.offset) => {}
        }

        // Priming request, not tied to the ticker.
        self.fire().await;

        let interval = self.task.interval;
        let start = Instant::now()
            .checked_add(interval)
            .unwrap_or_else(Instant::now);
        let mut ticker = time::interval_at(start, interval);
        // Ticks missed behind a slow request are dropped; at most one fires late.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => self.fire().await,
            }
        }
    }

    async fn fire(&self) {
        let key = self.task.body.as_str();

        REQUEST_TOTAL.inc();
        let _in_flight = GaugeGuard::track(&CONCURRENT_REQUESTS);
        let started = Instant::now();

        match self.transport.send(&self.task.url, key).await {
            Ok(()) => {
                self.stats.increment_success(key);
                REQUEST_OUTCOMES.with_label_values(&["success"]).inc();
            }
            Err(e) => {
                self.stats.increment_error(key);
                REQUEST_OUTCOMES.with_label_values(&["error"]).inc();
                REQUEST_ERRORS_BY_CATEGORY
                    .with_label_values(&[e.category.label()])
                    .inc();
            }
        }

        REQUEST_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());
    }
}
