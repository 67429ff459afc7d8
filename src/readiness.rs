use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::HealthCfg;

pub struct Readiness {
    pub accepting: AtomicBool,
    pub sink_ok: AtomicBool,
}

impl Readiness {
    pub fn new() -> Self {
        Self {
            accepting: AtomicBool::new(true),
            sink_ok: AtomicBool::new(false),
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Relaxed)
    }

    /// Stop taking events; `/readyz` flips to 503 and `/log` refuses bodies.
    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::Relaxed);
    }

    pub fn is_ready(&self, health: &HealthCfg) -> bool {
        self.is_accepting() && (!health.require_sink || self.sink_ok.load(Ordering::Relaxed))
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodically checks that the sink host accepts TCP connections.
pub fn start_sink_probe(
    endpoint: &reqwest::Url,
    health: &HealthCfg,
    ready: Arc<Readiness>,
    cancel: CancellationToken,
) {
    let Some(host) = endpoint.host_str().map(str::to_owned) else {
        warn!(%endpoint, "sink endpoint has no host, probe disabled");
        return;
    };
    let port = endpoint.port_or_known_default().unwrap_or(80);
    let interval = Duration::from_millis(health.probe_interval_ms);

    tokio::spawn(async move {
        use tokio::net::TcpStream;
        loop {
            let ok = match tokio::time::timeout(interval, TcpStream::connect((host.as_str(), port))).await {
                Ok(Ok(mut stream)) => {
                    let _ = stream.shutdown().await;
                    true
                }
                _ => false,
            };
            if ready.sink_ok.swap(ok, Ordering::Relaxed) != ok {
                debug!(sink_ok = ok, %host, port, "sink reachability changed");
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    });
}
