mod collector_loop;
mod collectors;
mod config;
mod http;
mod metrics;
mod snapshot;
mod stats;
mod timer;
mod transport;

use axum::serve;
use clap::Parser;
use collector_loop::{CollectorLoop, HandlerError};
use collectors::system::SystemProvider;
use config::Config;
use metrics::Metrics;
use snapshot::Snapshot;
use stats::CpuMeanTracker;
use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use transport::{HttpSink, LogSink, SnapshotSink};

#[derive(Parser, Debug)]
#[command(name = "hostmon")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
    /// Log snapshots instead of sending them.
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    log_file: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let loaded = Config::load_from_file(&cli.config);
    let log_file = cli
        .log_file
        .clone()
        .or_else(|| loaded.as_ref().ok().and_then(|cfg| cfg.log_file.clone()));
    init_tracing(log_file.as_deref());

    let cfg = match loaded {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let api_key = match cfg.resolve_api_key() {
        Some(key) => key,
        None if cli.dry_run => String::new(),
        None => {
            error!(
                env = %cfg.api_key_env,
                "no API key: set the environment variable or api_key in config"
            );
            std::process::exit(1);
        }
    };

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "failed to initialize metrics");
            std::process::exit(1);
        }
    };

    let provider = Arc::new(SystemProvider::new());
    let built = if cli.dry_run {
        build_loop(LogSink, &cfg, api_key, provider, metrics.clone())
    } else {
        let sink = HttpSink::new(cfg.request_timeout());
        build_loop(sink, &cfg, api_key, provider, metrics.clone())
    };
    let collector = match built {
        Ok(collector) => Arc::new(collector),
        Err(err) => {
            error!(error = %err, "failed to create collector loop");
            std::process::exit(1);
        }
    };

    info!(
        period_minutes = cfg.period_minutes,
        server_url = %cfg.server_url,
        dry_run = cli.dry_run,
        "starting hostmon"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let http_task = cfg.listen.clone().map(|listen| {
        let metrics = metrics.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let addr: SocketAddr = match listen.parse() {
                Ok(addr) => addr,
                Err(err) => {
                    error!(error = %err, listen = %listen, "invalid listen address");
                    return;
                }
            };
            let listener = match TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(err) => {
                    error!(error = %err, "failed to start HTTP server");
                    return;
                }
            };

            let server = serve(listener, http::build_router(metrics)).with_graceful_shutdown(
                async move {
                    let _ = shutdown_rx.changed().await;
                },
            );
            if let Err(err) = server.await {
                error!(error = %err, "HTTP server error");
            }
        })
    });

    let worker = {
        let collector = collector.clone();
        tokio::task::spawn_blocking(move || collector.run())
    };

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to wait for Ctrl+C");
    }
    info!("Ctrl+C received, shutting down");

    // stop() is a no-op until run() has started, so keep asking until the worker is gone
    collector.stop();
    while !worker.is_finished() {
        tokio::time::sleep(Duration::from_millis(100)).await;
        collector.stop();
    }
    let _ = worker.await;

    let _ = shutdown_tx.send(true);
    if let Some(task) = http_task {
        let _ = task.await;
    }
}

/// Wires a sink into the collector loop. Runs on the blocking worker thread,
/// so the async send is driven to completion with the runtime handle.
fn build_loop<S: SnapshotSink + 'static>(
    sink: S,
    cfg: &Config,
    api_key: String,
    provider: Arc<SystemProvider>,
    metrics: Arc<Metrics>,
) -> Result<CollectorLoop<SystemProvider>, collector_loop::CollectorError> {
    let runtime = tokio::runtime::Handle::current();
    let url = cfg.server_url.clone();
    let cpu_mean = CpuMeanTracker::new();

    CollectorLoop::new(
        cfg.period(),
        provider,
        move |snapshot: &Snapshot, payload: &str| -> Result<(), HandlerError> {
            metrics.observe_snapshot(snapshot);
            let result = runtime.block_on(sink.send(&url, payload, &api_key));
            metrics.inc_send(result.is_ok());
            result?;
            if let Some(mean) = cpu_mean.record(snapshot.cpu_percent()) {
                metrics.set_cpu_mean(mean);
            }
            Ok(())
        },
    )
}

fn init_tracing(log_file: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(true);

    let Some(path) = log_file else {
        builder.init();
        return;
    };
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => builder.with_ansi(false).with_writer(Mutex::new(file)).init(),
        Err(err) => {
            builder.init();
            error!(error = %err, path, "failed to open log file, logging to stderr");
        }
    }
}
