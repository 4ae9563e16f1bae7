use clap::{Parser, Subcommand};
use prometheus::Registry;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rust_loader::client::{ClientConfig, HttpTransport, PoolConfig};
use rust_loader::config::Config;
use rust_loader::errors::LoaderError;
use rust_loader::lifecycle::CancellationToken;
use rust_loader::metrics::{register_metrics, start_metrics_server};
use rust_loader::orchestrator::{Orchestrator, OrchestratorSettings};
use rust_loader::signals;
use rust_loader::utils::parse_duration_string;

/// Issues repeated POST requests against the configured targets until interrupted.
#[derive(Parser, Debug)]
#[command(name = "rust_loader", version)]
struct Cli {
    /// YAML task config file
    #[arg(short, long, env = "LOADER_CONFIG")]
    config: Option<PathBuf>,

    /// How long to wait for connections to stop after the first signal
    #[arg(long, env = "LOADER_SHUTDOWN_TIMEOUT", default_value = "30s", value_parser = parse_duration_string)]
    shutdown_timeout: Duration,

    /// How often per-body stats are printed
    #[arg(long, env = "LOADER_REPORT_INTERVAL", default_value = "1s", value_parser = parse_duration_string)]
    report_interval: Duration,

    /// Per-request timeout (none by default)
    #[arg(long, env = "LOADER_REQUEST_TIMEOUT", value_parser = parse_duration_string)]
    request_timeout: Option<Duration>,

    /// Serve Prometheus metrics on this port
    #[arg(long, env = "LOADER_METRICS_PORT")]
    metrics_port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Generate load (default)
    Run,
    /// Print the loaded config, or a sample one if none was given
    Config,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_banner() {
    eprintln!(
        "Version: {}  Build Time: {}\n",
        env!("CARGO_PKG_VERSION"),
        env!("LOADER_BUILD_TIME")
    );
}

fn print_config(config: Config) -> Result<(), LoaderError> {
    let config = if config.is_empty() {
        eprintln!("no config provided, printing a sample config\n");
        Config::demo()
    } else {
        config
    };

    let yaml = config.to_yaml()?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(yaml.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

async fn run_load(config: Config, cli: &Cli) -> Result<(), LoaderError> {
    let client_config = ClientConfig {
        request_timeout: cli.request_timeout,
        pool: PoolConfig::default(),
    };
    let settings = OrchestratorSettings {
        shutdown_timeout: cli.shutdown_timeout,
        report_interval: cli.report_interval,
    };

    config.log_summary();
    let transport = Arc::new(HttpTransport::build(&client_config)?);
    let orchestrator = Orchestrator::new(config, transport, settings)?;
    let signals = signals::listen()?;

    let metrics_cancel = CancellationToken::new();
    if let Some(port) = cli.metrics_port {
        let registry = Registry::new();
        register_metrics(&registry)?;
        tokio::spawn(start_metrics_server(port, registry, metrics_cancel.clone()));
    }

    let result = orchestrator.run(signals).await;
    metrics_cancel.cancel();
    result.map(|_| ())
}

async fn run(cli: Cli) -> Result<(), LoaderError> {
    let config = match &cli.config {
        Some(path) => {
            eprintln!("loading config from {}", path.display());
            Config::from_file(path)?
        }
        None => Config::default(),
    };

    print_banner();

    match cli.command.unwrap_or(Command::Run) {
        Command::Config => print_config(config),
        Command::Run => {
            if config.is_empty() {
                return Err(LoaderError::NoTasks);
            }
            run_load(config, &cli).await
        }
    }
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!(error = %e, forced = e.is_forced_shutdown(), "Loader exited with error");
        std::process::exit(1);
    }
}
