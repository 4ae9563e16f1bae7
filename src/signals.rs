//! Forwards process interrupt/terminate signals to the orchestrator.

use std::io;
use tokio::sync::mpsc;
use tracing::debug;

/// Which signal arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

/// Installs the handlers, then spawns a task that forwards every
/// SIGINT/SIGTERM, not just the first.
///
/// Handler installation errors are returned here rather than surfacing later
/// as a closed channel. Must be called from within a tokio runtime.
pub fn listen() -> io::Result<mpsc::Receiver<ShutdownSignal>> {
    let (tx, rx) = mpsc::channel(4);
    let handlers = Handlers::install()?;
    tokio::spawn(handlers.forward(tx));
    Ok(rx)
}

#[cfg(unix)]
struct Handlers {
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Handlers {
    fn install() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }

    async fn forward(mut self, tx: mpsc::Sender<ShutdownSignal>) {
        loop {
            let caught = tokio::select! {
                Some(()) = self.sigint.recv() => ShutdownSignal::Interrupt,
                Some(()) = self.sigterm.recv() => ShutdownSignal::Terminate,
                else => return,
            };
            debug!(signal = ?caught, "Shutdown signal caught");
            if tx.send(caught).await.is_err() {
                return;
            }
        }
    }
}

#[cfg(windows)]
struct Handlers {
    ctrl_c: tokio::signal::windows::CtrlC,
}

#[cfg(windows)]
impl Handlers {
    fn install() -> io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    async fn forward(mut self, tx: mpsc::Sender<ShutdownSignal>) {
        while self.ctrl_c.recv().await.is_some() {
            debug!(signal = ?ShutdownSignal::Interrupt, "Shutdown signal caught");
            if tx.send(ShutdownSignal::Interrupt).await.is_err() {
                return;
            }
        }
    }
}
