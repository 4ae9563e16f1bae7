//! Scripted transports shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::time::{Duration, Instant};

use rust_loader::client::{Transport, TransportError};
use rust_loader::config::{Config, TaskDescriptor};
use rust_loader::errors::ErrorCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    /// Never returns, like a target that accepts the connection and goes silent.
    Hang,
}

/// Counts calls, records when each was issued and how many are in flight.
pub struct FakeTransport {
    behavior: Behavior,
    delay: Option<Duration>,
    stall: Option<(usize, Duration)>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    issued_at: Mutex<Vec<Instant>>,
}

impl FakeTransport {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            delay: None,
            stall: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            issued_at: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Behavior::Succeed)
    }

    pub fn failing() -> Self {
        Self::new(Behavior::Fail)
    }

    pub fn hanging() -> Self {
        Self::new(Behavior::Hang)
    }

    /// Each call takes `delay` before completing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Only the `nth` call (1-based) takes `delay` before completing.
    pub fn with_stalled_call(mut self, nth: usize, delay: Duration) -> Self {
        self.stall = Some((nth, delay));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn issued_at(&self) -> Vec<Instant> {
        self.issued_at.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, _url: &str, _body: &str) -> Result<(), TransportError> {
        self.issued_at.lock().unwrap().push(Instant::now());
        let nth = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        if self.behavior == Behavior::Hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((stalled, delay)) = self.stall {
            if nth == stalled {
                tokio::time::sleep(delay).await;
            }
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Fail => Err(TransportError::new(
                ErrorCategory::NetworkError,
                "connection refused",
            )),
            _ => Ok(()),
        }
    }
}

pub fn task(connections: usize, interval_ms: u64, body: &str) -> TaskDescriptor {
    TaskDescriptor::new(
        connections,
        Duration::from_millis(interval_ms),
        "http://x/q",
        body,
    )
}

pub fn config(tasks: Vec<TaskDescriptor>) -> Config {
    Config { tasks }
}
