//! Concurrent HTTP load generator.
//!
//! Each configured task runs `connections` independent request loops, staggered
//! across the task's interval and released together by one start gate. Results
//! are tallied per request body and printed once a second until shutdown.

pub mod client;
pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod metrics;
pub mod orchestrator;
pub mod reporter;
pub mod runner;
pub mod signals;
pub mod stats;
pub mod task_group;
pub mod utils;
