//! Top-level lifecycle: launch every task group behind one start gate, run
//! until a shutdown signal, then drain against a deadline and a second signal.

use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{self, Duration};
use tracing::{error, info, warn};

use crate::client::Transport;
use crate::config::{Config, ConfigError, TaskDescriptor, MAX_INTERVAL};
use crate::errors::LoaderError;
use crate::lifecycle::{CancellationToken, StartGate};
use crate::reporter::Reporter;
use crate::signals::ShutdownSignal;
use crate::stats::StatCounter;
use crate::task_group::TaskGroup;

pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Why a shutdown did not complete cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcedReason {
    SecondSignal,
    TimeLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Loading,
    Launching,
    Running,
    ShuttingDown,
    CleanShutdown,
    ForcedShutdown(ForcedReason),
}

impl LifecyclePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecyclePhase::CleanShutdown | LifecyclePhase::ForcedShutdown(_)
        )
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecyclePhase::Loading => f.write_str("loading"),
            LifecyclePhase::Launching => f.write_str("launching"),
            LifecyclePhase::Running => f.write_str("running"),
            LifecyclePhase::ShuttingDown => f.write_str("shutting down"),
            LifecyclePhase::CleanShutdown => f.write_str("clean shutdown"),
            LifecyclePhase::ForcedShutdown(ForcedReason::SecondSignal) => {
                f.write_str("forced shutdown (second signal)")
            }
            LifecyclePhase::ForcedShutdown(ForcedReason::TimeLimit) => {
                f.write_str("forced shutdown (time limit)")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// How long draining may take after the first signal.
    pub shutdown_timeout: Duration,
    /// How often the stat lines are printed.
    pub report_interval: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            report_interval: DEFAULT_REPORT_INTERVAL,
        }
    }
}

/// Outcome of a clean shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub task_groups: usize,
    pub connections_stopped: usize,
}

pub struct Orchestrator {
    tasks: Vec<Arc<TaskDescriptor>>,
    stats: Arc<StatCounter>,
    transport: Arc<dyn Transport>,
    settings: OrchestratorSettings,
    phase_tx: watch::Sender<LifecyclePhase>,
}

impl Orchestrator {
    /// Fails with [`LoaderError::NoTasks`] if `config` has nothing to run.
    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        settings: OrchestratorSettings,
    ) -> Result<Self, LoaderError> {
        if config.tasks.is_empty() {
            return Err(LoaderError::NoTasks);
        }
        // Descriptors built in code skip file validation; the ticker needs a usable period.
        if let Some((idx, _)) = config.tasks.iter().enumerate().find(|(_, t)| {
            t.connections == 0 || t.interval.is_zero() || t.interval > MAX_INTERVAL
        }) {
            return Err(ConfigError::Validation(format!(
                "task {} needs at least one connection and an interval between 1ns and {:?}",
                idx, MAX_INTERVAL
            ))
            .into());
        }

        let (phase_tx, _) = watch::channel(LifecyclePhase::Loading);
        Ok(Self {
            tasks: config.tasks.into_iter().map(Arc::new).collect(),
            stats: Arc::new(StatCounter::new()),
            transport,
            settings,
            phase_tx,
        })
    }

    /// The counters this run writes to.
    pub fn stats(&self) -> Arc<StatCounter> {
        Arc::clone(&self.stats)
    }

    pub fn phase(&self) -> watch::Receiver<LifecyclePhase> {
        self.phase_tx.subscribe()
    }

    fn set_phase(&self, phase: LifecyclePhase) {
        self.phase_tx.send_replace(phase);
    }

    /// Runs the load until the first signal, then drains.
    ///
    /// Returns an error if a second signal arrives or the shutdown timeout
    /// elapses before every connection has stopped.
    pub async fn run(
        self,
        mut signals: mpsc::Receiver<ShutdownSignal>,
    ) -> Result<ShutdownReport, LoaderError> {
        self.set_phase(LifecyclePhase::Launching);

        let gate = StartGate::new();
        let cancel = CancellationToken::new();
        let mut groups = JoinSet::new();

        for (task_id, task) in self.tasks.iter().enumerate() {
            let group = TaskGroup::spawn(
                task_id,
                Arc::clone(task),
                &gate,
                cancel.clone(),
                Arc::clone(&self.stats),
                Arc::clone(&self.transport),
            );
            groups.spawn(group.run());
        }
        let task_groups = groups.len();
        let connections: usize = self.tasks.iter().map(|t| t.connections).sum();

        gate.open();
        self.set_phase(LifecyclePhase::Running);
        info!(
            tasks = task_groups,
            connections = connections,
            "All tasks launched, load started"
        );

        let reporter = Reporter::to_stderr(Arc::clone(&self.stats), self.settings.report_interval);
        tokio::spawn(reporter.run(cancel.clone()));

        match signals.recv().await {
            Some(signal) => info!(
                signal = ?signal,
                "Signal received, initializing clean shutdown..."
            ),
            None => warn!("Signal source closed, initializing clean shutdown..."),
        }
        self.set_phase(LifecyclePhase::ShuttingDown);
        cancel.cancel();

        info!(
            timeout = ?self.settings.shutdown_timeout,
            "Waiting for clean shutdown..."
        );

        let drain = async {
            let mut stopped = 0;
            while let Some(result) = groups.join_next().await {
                match result {
                    Ok(n) => stopped += n,
                    Err(e) => error!(error = %e, "Task group failed"),
                }
            }
            stopped
        };

        // Remaining groups (and their runners) are aborted when `groups` drops.
        tokio::select! {
            Some(signal) = signals.recv() => {
                self.set_phase(LifecyclePhase::ForcedShutdown(ForcedReason::SecondSignal));
                warn!(signal = ?signal, "Second signal received during shutdown");
                Err(LoaderError::SecondSignal)
            }
            _ = time::sleep(self.settings.shutdown_timeout) => {
                self.set_phase(LifecyclePhase::ForcedShutdown(ForcedReason::TimeLimit));
                warn!(timeout = ?self.settings.shutdown_timeout, "Shutdown time limit reached");
                Err(LoaderError::ShutdownTimeout(self.settings.shutdown_timeout))
            }
            connections_stopped = drain => {
                self.set_phase(LifecyclePhase::CleanShutdown);
                info!(connections = connections_stopped, "shutdown completed");
                Ok(ShutdownReport {
                    task_groups,
                    connections_stopped,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::TransportError;
    use async_trait::async_trait;

    struct AlwaysOk;

    #[async_trait]
    impl Transport for AlwaysOk {
        async fn send(&self, _url: &str, _body: &str) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[test]
    fn empty_config_is_rejected() {
        let result = Orchestrator::new(
            Config::default(),
            Arc::new(AlwaysOk),
            OrchestratorSettings::default(),
        );
        assert!(matches!(result, Err(LoaderError::NoTasks)));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = Config {
            tasks: vec![TaskDescriptor::new(1, Duration::ZERO, "http://x/q", "A")],
        };
        let result = Orchestrator::new(config, Arc::new(AlwaysOk), OrchestratorSettings::default());
        assert!(matches!(
            result,
            Err(LoaderError::Config(ConfigError::Validation(_)))
        ));
    }

    #[test]
    fn oversized_interval_is_rejected() {
        let config = Config {
            tasks: vec![TaskDescriptor::new(1, Duration::MAX, "http://x/q", "A")],
        };
        let result = Orchestrator::new(config, Arc::new(AlwaysOk), OrchestratorSettings::default());
        assert!(matches!(
            result,
            Err(LoaderError::Config(ConfigError::Validation(_)))
        ));
    }

    #[test]
    fn default_settings() {
        let settings = OrchestratorSettings::default();
        assert_eq!(settings.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(settings.report_interval, Duration::from_secs(1));
    }

    #[test]
    fn starts_in_loading_phase() {
        let orchestrator =
            Orchestrator::new(Config::demo(), Arc::new(AlwaysOk), OrchestratorSettings::default())
                .unwrap();
        assert_eq!(*orchestrator.phase().borrow(), LifecyclePhase::Loading);
    }

    #[test]
    fn terminal_phases() {
        assert!(LifecyclePhase::CleanShutdown.is_terminal());
        assert!(LifecyclePhase::ForcedShutdown(ForcedReason::TimeLimit).is_terminal());
        assert!(!LifecyclePhase::ShuttingDown.is_terminal());
        assert_eq!(
            LifecyclePhase::ForcedShutdown(ForcedReason::SecondSignal).to_string(),
            "forced shutdown (second signal)"
        );
    }
}
