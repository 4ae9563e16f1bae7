use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::client::Transport;
use crate::config::TaskDescriptor;
use crate::lifecycle::{CancellationToken, StartGate};
use crate::runner::{connection_offsets, RequestRunner};
use crate::stats::StatCounter;

/// Supervises every runner of one task.
pub struct TaskGroup {
    task_id: usize,
    runners: JoinSet<()>,
    cancel: CancellationToken,
}

impl TaskGroup {
    /// Spawns one runner per connection. They all park on the gate.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        task_id: usize,
        task: Arc<TaskDescriptor>,
        gate: &StartGate,
        cancel: CancellationToken,
        stats: Arc<StatCounter>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let mut runners = JoinSet::new();

        for (connection_id, offset) in connection_offsets(task.interval, task.connections)
            .into_iter()
            .enumerate()
        {
            let runner = RequestRunner {
                connection_id,
                task: Arc::clone(&task),
                offset,
                start: gate.subscribe(),
                cancel: cancel.clone(),
                stats: Arc::clone(&stats),
                transport: Arc::clone(&transport),
            };
            runners.spawn(runner.run());
        }

        debug!(
            task_id = task_id,
            connections = task.connections,
            url = %task.url,
            "Task group launched"
        );

        Self {
            task_id,
            runners,
            cancel,
        }
    }

    /// Number of runners not yet joined.
    pub fn live_runners(&self) -> usize {
        self.runners.len()
    }

    /// Waits for cancellation, then for every runner to return.
    ///
    /// No timeout of its own. Dropping the returned future (or the group)
    /// aborts whatever runners are still alive.
    pub async fn run(mut self) -> usize {
        self.cancel.cancelled().await;

        let mut stopped = 0;
        while let Some(result) = self.runners.join_next().await {
            if let Err(e) = result {
                warn!(task_id = self.task_id, error = %e, "Connection task failed");
            }
            stopped += 1;
        }

        debug!(
            task_id = self.task_id,
            stopped = stopped,
            "Task group drained"
        );
        stopped
    }
}
