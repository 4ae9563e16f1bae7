//! Shared lifecycle signals: the start gate and the cancellation token.

use tokio::sync::watch;

pub use tokio_util::sync::CancellationToken;

/// Broadcast-once gate that holds every runner back until all of them exist.
///
/// Opening is idempotent and irreversible. Any number of [`StartSignal`]s can
/// observe it without consuming it.
#[derive(Debug)]
pub struct StartGate {
    tx: watch::Sender<bool>,
}

impl StartGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// A reader handle for one waiter.
    pub fn subscribe(&self) -> StartSignal {
        StartSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for StartGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Reader side of a [`StartGate`].
#[derive(Debug, Clone)]
pub struct StartSignal {
    rx: watch::Receiver<bool>,
}

impl StartSignal {
    /// Resolves once the gate is open.
    ///
    /// Returns `false` if the gate was dropped without ever opening.
    pub async fn wait(&mut self) -> bool {
        self.rx.wait_for(|open| *open).await.is_ok()
    }
}
