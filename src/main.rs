use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use webhook_batcher::app::AppState;
use webhook_batcher::config::{BatcherCfg, Overrides};
use webhook_batcher::coordinator::{CoordinatorError, FlushCoordinator};
use webhook_batcher::forwarder::Forwarder;
use webhook_batcher::readiness::{start_sink_probe, Readiness};
use webhook_batcher::sink::HttpSink;
use webhook_batcher::store::PayloadStore;
use webhook_batcher::{http, logging};

/// Buffers JSON events received over HTTP and forwards them in batches.
#[derive(Debug, Parser)]
#[command(name = "batcher", version)]
struct Cli {
    /// Extra config file layered over `batcher.toml`.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    http_bind: Option<SocketAddr>,
    /// Sink URL batches are posted to.
    #[arg(long)]
    post_endpoint: Option<String>,
    /// Print the effective bind address and exit.
    #[arg(long)]
    print_bind: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::from_filename("config.env");

    let overrides = Overrides {
        http_bind: cli.http_bind,
        post_endpoint: cli.post_endpoint,
    };
    let cfg = BatcherCfg::load(cli.config, &overrides).context("failed to load configuration")?;
    cfg.validate().context("invalid configuration")?;

    if cli.print_bind {
        println!("{}", cfg.http.bind);
        return Ok(());
    }

    logging::init(cfg.log.format);
    run(Arc::new(cfg)).await
}

async fn run(cfg: Arc<BatcherCfg>) -> anyhow::Result<()> {
    let endpoint = cfg.forward.endpoint_url()?;
    let store = Arc::new(PayloadStore::new(cfg.batch.size));
    let ready = Arc::new(Readiness::new());

    let sink = HttpSink::new(endpoint.clone(), cfg.forward.timeout())?;
    let forwarder = Forwarder::new(Arc::new(sink), cfg.retry.policy())
        .retry_transport_errors(cfg.retry.retry_transport_errors);
    let coordinator = FlushCoordinator::new(
        store.clone(),
        forwarder,
        cfg.batch.interval(),
        cfg.batch.size_poll(),
    );

    let stop_http = CancellationToken::new();
    let stop_flush = CancellationToken::new();

    if cfg.health.require_sink {
        start_sink_probe(&endpoint, &cfg.health, ready.clone(), stop_http.clone());
    }

    let mut flusher = tokio::spawn(coordinator.run(stop_flush.clone()));
    let state = AppState {
        cfg: cfg.clone(),
        ready: ready.clone(),
        store,
    };
    let mut server = tokio::spawn(http::serve(cfg.http.bind, state, stop_http.clone()));

    info!(endpoint = %endpoint, "webhook batcher started");

    tokio::select! {
        res = &mut flusher => {
            match res {
                Ok(Err(e)) => terminate(e),
                Ok(Ok(())) => anyhow::bail!("flush coordinator stopped unexpectedly"),
                Err(e) => anyhow::bail!("flush coordinator panicked: {e}"),
            }
        }
        res = &mut server => {
            res??;
            anyhow::bail!("http server stopped unexpectedly");
        }
        _ = shutdown_signal() => {}
    }

    ready.stop_accepting();
    info!(grace_ms = cfg.http.shutdown_grace_ms, "shutting down");
    tokio::time::sleep(Duration::from_millis(cfg.http.shutdown_grace_ms)).await;
    stop_http.cancel();
    server.await??;

    stop_flush.cancel();
    if let Err(e) = flusher.await? {
        terminate(e);
    }
    info!("shutdown complete");
    Ok(())
}

fn terminate(e: CoordinatorError) -> ! {
    error!(error = %e, "failed to send batch after retries, exiting application");
    std::process::exit(1);
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = sigterm => {},
    }
}
