//! Error taxonomy for the loader.
//!
//! Per-request failures never surface here: they are absorbed into the
//! [`StatCounter`](crate::stats::StatCounter) and only show up in aggregate.
//! Everything in [`LoaderError`] ends the process with a non-zero status.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

/// Fatal errors that escalate to the process boundary.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("error loading config: {0}")]
    Config(#[from] ConfigError),

    #[error("No tasks found in config")]
    NoTasks,

    #[error("second signal received, initializing hard shutdown")]
    SecondSignal,

    #[error("time limit reached, initializing hard shutdown (waited {0:?})")]
    ShutdownTimeout(Duration),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoaderError {
    /// Whether this error ended a run that had already started shutting down.
    pub fn is_forced_shutdown(&self) -> bool {
        matches!(
            self,
            LoaderError::SecondSignal | LoaderError::ShutdownTimeout(_)
        )
    }
}

/// Categories of transport failures, used as metric labels.
///
/// Response status codes are never inspected, so there is no client/server
/// error split here: only the ways the outbound call itself can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Request timeout errors
    TimeoutError,

    /// Network connectivity errors (DNS, connection refused, etc.)
    NetworkError,

    /// TLS/SSL certificate errors
    TlsError,

    /// Other/unknown errors
    OtherError,
}

impl ErrorCategory {
    /// Categorize a reqwest error.
    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            ErrorCategory::TimeoutError
        } else if error.is_connect() || error.is_request() || error.is_body() {
            ErrorCategory::NetworkError
        } else {
            Self::from_message(&error.to_string())
        }
    }

    /// Fallback classification based on the error text.
    pub fn from_message(message: &str) -> Self {
        let error_msg = message.to_lowercase();

        if error_msg.contains("certificate") || error_msg.contains("tls") || error_msg.contains("ssl")
        {
            ErrorCategory::TlsError
        } else if error_msg.contains("timeout") || error_msg.contains("timed out") {
            ErrorCategory::TimeoutError
        } else if error_msg.contains("dns")
            || error_msg.contains("resolve")
            || error_msg.contains("connect")
        {
            ErrorCategory::NetworkError
        } else {
            ErrorCategory::OtherError
        }
    }

    /// Get the Prometheus label for this error category.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::TimeoutError => "timeout_error",
            ErrorCategory::NetworkError => "network_error",
            ErrorCategory::TlsError => "tls_error",
            ErrorCategory::OtherError => "other_error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_reasons_have_distinct_messages() {
        let second = LoaderError::SecondSignal.to_string();
        let timeout = LoaderError::ShutdownTimeout(Duration::from_secs(30)).to_string();

        assert!(second.contains("second signal"));
        assert!(timeout.contains("time limit reached"));
        assert_ne!(second, timeout);
    }

    #[test]
    fn only_shutdown_failures_are_forced() {
        assert!(LoaderError::SecondSignal.is_forced_shutdown());
        assert!(LoaderError::ShutdownTimeout(Duration::ZERO).is_forced_shutdown());
        assert!(!LoaderError::NoTasks.is_forced_shutdown());
    }

    #[test]
    fn categorizes_by_message() {
        assert_eq!(
            ErrorCategory::from_message("invalid peer certificate"),
            ErrorCategory::TlsError
        );
        assert_eq!(
            ErrorCategory::from_message("operation timed out"),
            ErrorCategory::TimeoutError
        );
        assert_eq!(
            ErrorCategory::from_message("dns error: failed to lookup"),
            ErrorCategory::NetworkError
        );
        assert_eq!(
            ErrorCategory::from_message("something odd"),
            ErrorCategory::OtherError
        );
    }

    #[test]
    fn labels_are_snake_case() {
        assert_eq!(ErrorCategory::TimeoutError.label(), "timeout_error");
        assert_eq!(ErrorCategory::OtherError.to_string(), "other_error");
    }
}
