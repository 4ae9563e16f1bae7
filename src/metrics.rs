use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use prometheus::{Encoder, Gauge, Histogram, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::env;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

lazy_static::lazy_static! {
    pub static ref METRIC_NAMESPACE: String =
        env::var("METRIC_NAMESPACE").unwrap_or_else(|_| "rust_loader".to_string());

    pub static ref REQUEST_TOTAL: IntCounter =
        IntCounter::with_opts(
            Opts::new("requests_total", "Total number of HTTP requests issued")
                .namespace(METRIC_NAMESPACE.as_str())
        ).expect("valid requests_total metric");

    pub static ref REQUEST_OUTCOMES: IntCounterVec =
        IntCounterVec::new(
            Opts::new("request_outcomes_total", "Completed requests by outcome")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["outcome"]  // outcome: success, error
        ).expect("valid request_outcomes_total metric");

    pub static ref REQUEST_ERRORS_BY_CATEGORY: IntCounterVec =
        IntCounterVec::new(
            Opts::new("request_errors_by_category_total", "Failed requests by transport error category")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["category"]
        ).expect("valid request_errors_by_category_total metric");

    pub static ref CONCURRENT_REQUESTS: Gauge =
        Gauge::with_opts(
            Opts::new("concurrent_requests", "Number of HTTP requests currently in flight")
                .namespace(METRIC_NAMESPACE.as_str())
        ).expect("valid concurrent_requests metric");

    pub static ref ACTIVE_CONNECTIONS: Gauge =
        Gauge::with_opts(
            Opts::new("active_connections", "Number of request loops currently running")
                .namespace(METRIC_NAMESPACE.as_str())
        ).expect("valid active_connections metric");

    pub static ref REQUEST_DURATION_SECONDS: Histogram =
        Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "request_duration_seconds",
                "HTTP request latencies in seconds."
            ).namespace(METRIC_NAMESPACE.as_str())
        ).expect("valid request_duration_seconds metric");
}

/// Increments a gauge for as long as it is held.
///
/// The decrement happens on drop, so an aborted task or a request future
/// dropped mid-call still releases its count.
#[must_use = "the gauge is decremented as soon as the guard is dropped"]
pub struct GaugeGuard {
    gauge: Gauge,
}

impl GaugeGuard {
    pub fn track(gauge: &Gauge) -> Self {
        gauge.inc();
        Self {
            gauge: gauge.clone(),
        }
    }
}

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

/// Registers all metrics with the given registry.
pub fn register_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(REQUEST_TOTAL.clone()))?;
    registry.register(Box::new(REQUEST_OUTCOMES.clone()))?;
    registry.register(Box::new(REQUEST_ERRORS_BY_CATEGORY.clone()))?;
    registry.register(Box::new(CONCURRENT_REQUESTS.clone()))?;
    registry.register(Box::new(ACTIVE_CONNECTIONS.clone()))?;
    registry.register(Box::new(REQUEST_DURATION_SECONDS.clone()))?;
    Ok(())
}

/// Encodes every metric in the registry in the Prometheus text format.
pub fn gather_metrics_string(registry: &Registry) -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!(error = %e, "Metrics output was not UTF-8");
        String::from("# ERROR ENCODING METRICS TO UTF-8")
    })
}

async fn metrics_handler(
    _req: Request<Body>,
    registry: Registry,
) -> Result<Response<Body>, hyper::Error> {
    let mut response = Response::new(Body::from(gather_metrics_string(&registry)));
    if let Ok(content_type) = TextEncoder::new()
        .format_type()
        .parse::<hyper::header::HeaderValue>()
    {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, content_type);
    }
    Ok(response)
}

/// Serves the registry over HTTP until `cancel` fires.
pub async fn start_metrics_server(port: u16, registry: Registry, cancel: CancellationToken) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let make_svc = make_service_fn(move |_conn| {
        let registry = registry.clone();
        async move {
            Ok::<_, hyper::Error>(service_fn(move |req| {
                metrics_handler(req, registry.clone())
            }))
        }
    });

    let server = match Server::try_bind(&addr) {
        Ok(builder) => builder.serve(make_svc),
        Err(e) => {
            error!(port = port, error = %e, "Failed to bind metrics server");
            return;
        }
    };
    info!(port = port, addr = %addr, "Metrics server listening");

    if let Err(e) = server
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
    {
        error!(error = %e, "Metrics server error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_metrics_show_up_in_output() {
        let registry = Registry::new();
        register_metrics(&registry).unwrap();
        REQUEST_TOTAL.inc();
        REQUEST_OUTCOMES.with_label_values(&["success"]).inc();

        let output = gather_metrics_string(&registry);

        assert!(output.contains("rust_loader_requests_total"), "{}", output);
        assert!(output.contains("outcome=\"success\""), "{}", output);
    }

    #[test]
    fn gauge_guard_releases_on_drop() {
        let gauge = Gauge::new("guarded", "test gauge").unwrap();
        {
            let _outer = GaugeGuard::track(&gauge);
            let _inner = GaugeGuard::track(&gauge);
            assert_eq!(gauge.get(), 2.0);
        }
        assert_eq!(gauge.get(), 0.0);
    }

    #[tokio::test]
    async fn gauge_guard_releases_when_task_is_aborted() {
        let gauge = Gauge::new("aborted", "test gauge").unwrap();
        let held = gauge.clone();
        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            let _guard = GaugeGuard::track(&held);
            let _ = entered_tx.send(());
            std::future::pending::<()>().await;
        });

        entered_rx.await.unwrap();
        assert_eq!(gauge.get(), 1.0);

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert_eq!(gauge.get(), 0.0);
    }

    #[test]
    fn double_registration_is_an_error() {
        let registry = Registry::new();
        register_metrics(&registry).unwrap();
        assert!(register_metrics(&registry).is_err());
    }
}
