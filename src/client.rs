use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::errors::ErrorCategory;

/// A failed outbound call. Only the transport failing counts; the response
/// status and body are never looked at.
#[derive(Error, Debug)]
#[error("{category}: {message}")]
pub struct TransportError {
    pub category: ErrorCategory,
    pub message: String,
}

impl TransportError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self::new(ErrorCategory::from_reqwest_error(&e), e.to_string())
    }
}

/// The outbound unary call each runner issues once per tick.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, url: &str, body: &str) -> Result<(), TransportError>;
}

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum idle connections to keep per host
    pub max_idle_per_host: usize,

    /// How long idle connections stay in the pool before cleanup
    pub idle_timeout: Duration,

    /// TCP keepalive duration
    pub tcp_keepalive: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 32,
            idle_timeout: Duration::from_secs(90),
            tcp_keepalive: Some(Duration::from_secs(60)),
        }
    }
}

impl PoolConfig {
    /// Apply this configuration to a reqwest ClientBuilder.
    pub fn apply_to_builder(&self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        let mut builder = builder
            .pool_max_idle_per_host(self.max_idle_per_host)
            .pool_idle_timeout(self.idle_timeout);

        if let Some(keepalive) = self.tcp_keepalive {
            builder = builder.tcp_keepalive(keepalive);
        }

        builder
    }
}

/// Configuration for building the HTTP client.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Per-request timeout; `None` lets a slow target hold a runner indefinitely.
    pub request_timeout: Option<Duration>,
    pub pool: PoolConfig,
}

/// reqwest-backed [`Transport`] that POSTs the body to the URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Builds a reqwest HTTP client with the specified configuration.
    pub fn build(config: &ClientConfig) -> Result<Self, reqwest::Error> {
        let mut builder = config.pool.apply_to_builder(reqwest::Client::builder());
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        info!(
            max_idle_per_host = config.pool.max_idle_per_host,
            idle_timeout = ?config.pool.idle_timeout,
            request_timeout = ?config.request_timeout,
            "HTTP client configured"
        );

        Ok(Self::new(builder.build()?))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, url: &str, body: &str) -> Result<(), TransportError> {
        let mut response = self.client.post(url).body(body.to_owned()).send().await?;

        // Drain and drop the body so the connection goes back to the pool.
        while let Ok(Some(_chunk)) = response.chunk().await {}

        Ok(())
    }
}
