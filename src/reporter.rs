use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};

use crate::lifecycle::CancellationToken;
use crate::stats::{StatCount, StatCounter};

/// Renders one line per key: `<key>\tsuccess: <n>\terrors: <n>`.
pub fn format_stat_line(key: &str, count: &StatCount) -> String {
    format!(
        "{}\tsuccess: {}\terrors: {}",
        key, count.successes, count.errors
    )
}

pub fn render_snapshot(snapshot: &BTreeMap<String, StatCount>) -> Vec<String> {
    snapshot
        .iter()
        .map(|(key, count)| format_stat_line(key, count))
        .collect()
}

/// Periodically prints a [`StatCounter`] snapshot until cancelled.
pub struct Reporter<W> {
    stats: Arc<StatCounter>,
    period: Duration,
    out: W,
}

impl Reporter<std::io::Stderr> {
    pub fn to_stderr(stats: Arc<StatCounter>, period: Duration) -> Self {
        Self::new(stats, period, std::io::stderr())
    }
}

impl<W: Write> Reporter<W> {
    pub fn new(stats: Arc<StatCounter>, period: Duration, out: W) -> Self {
        Self { stats, period, out }
    }

    /// Prints every `period`, starting one period from now. Stops as soon as
    /// `cancel` fires; no final snapshot is flushed.
    pub async fn run(mut self, cancel: CancellationToken) -> W {
        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.out,
                _ = ticker.tick() => self.report(),
            }
        }
    }

    fn report(&mut self) {
        for line in render_snapshot(&self.stats.snapshot()) {
            // Console output is best effort.
            let _ = writeln!(self.out, "{}", line);
        }
    }
}
