use serde::Deserialize;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use crate::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BatcherCfg {
    #[serde(default)]
    pub http: HttpCfg,
    #[serde(default)]
    pub batch: BatchCfg,
    #[serde(default)]
    pub forward: ForwardCfg,
    #[serde(default)]
    pub retry: RetryCfg,
    #[serde(default)]
    pub health: HealthCfg,
    #[serde(default)]
    pub log: LogCfg,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct HttpCfg {
    pub bind: SocketAddr,
    /// How long `/readyz` reports 503 before the listener closes.
    pub shutdown_grace_ms: u64,
}
impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            shutdown_grace_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct BatchCfg {
    pub size: usize,
    pub interval_secs: u64,
    pub size_poll_ms: u64,
}
impl Default for BatchCfg {
    fn default() -> Self {
        Self {
            size: 10,
            interval_secs: 60,
            size_poll_ms: 100,
        }
    }
}
impl BatchCfg {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn size_poll(&self) -> Duration {
        Duration::from_millis(self.size_poll_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct ForwardCfg {
    pub endpoint: String,
    pub timeout_ms: Option<u64>,
}
impl Default for ForwardCfg {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/log_data".into(),
            timeout_ms: None,
        }
    }
}
impl ForwardCfg {
    pub fn endpoint_url(&self) -> anyhow::Result<reqwest::Url> {
        let url = reqwest::Url::parse(&self.endpoint)?;
        anyhow::ensure!(
            matches!(url.scheme(), "http" | "https"),
            "forward.endpoint must be an http(s) URL, got {}",
            self.endpoint
        );
        Ok(url)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct RetryCfg {
    /// Resends after the first failed attempt.
    pub retries: u32,
    pub delay_ms: u64,
    pub retry_transport_errors: bool,
}
impl Default for RetryCfg {
    fn default() -> Self {
        Self {
            retries: 3,
            delay_ms: 2000,
            retry_transport_errors: false,
        }
    }
}
impl RetryCfg {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries,
            delay: Duration::from_millis(self.delay_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct HealthCfg {
    /// Report not-ready while the sink host refuses TCP connections.
    pub require_sink: bool,
    pub probe_interval_ms: u64,
}
impl Default for HealthCfg {
    fn default() -> Self {
        Self {
            require_sink: false,
            probe_interval_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields, default)]
pub struct LogCfg {
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080)
}

/// Flat variables understood for compatibility with existing deployments.
const LEGACY_ENV: [(&str, &str); 3] = [
    ("BATCH_SIZE", "batch.size"),
    ("BATCH_INTERVAL", "batch.interval_secs"),
    ("POST_ENDPOINT", "forward.endpoint"),
];

/// Values that win over every file and environment source.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub http_bind: Option<SocketAddr>,
    pub post_endpoint: Option<String>,
}

impl BatcherCfg {
    pub fn load(path: Option<PathBuf>, overrides: &Overrides) -> anyhow::Result<Self> {
        Self::load_with_env(path, overrides, std::env::vars().collect())
    }

    /// Like [`load`](Self::load), reading variables from `env` instead of
    /// the process environment.
    pub fn load_with_env(
        path: Option<PathBuf>,
        overrides: &Overrides,
        env: config::Map<String, String>,
    ) -> anyhow::Result<Self> {
        Self::from_builder(build_config(path, overrides, env)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.batch.size > 0, "batch.size must be at least 1");
        anyhow::ensure!(self.batch.interval_secs > 0, "batch.interval_secs must be at least 1");
        anyhow::ensure!(self.batch.size_poll_ms > 0, "batch.size_poll_ms must be at least 1");
        self.forward.endpoint_url()?;
        Ok(())
    }

    fn from_builder(cfg: config::Config) -> anyhow::Result<Self> {
        Ok(cfg.try_deserialize()?)
    }
}

fn build_config(
    path: Option<PathBuf>,
    overrides: &Overrides,
    env: config::Map<String, String>,
) -> anyhow::Result<config::Config> {
    use config::{Config, Environment, File};
    let mut builder = Config::builder().add_source(File::with_name("batcher").required(false));
    if let Some(path) = path {
        builder = builder.add_source(File::from(path));
    }
    builder = builder.add_source(
        Environment::with_prefix("BATCHER")
            .separator("__")
            .source(Some(env.clone())),
    );

    for (var, key) in LEGACY_ENV {
        if let Some(value) = env.get(var) {
            // Unparseable numbers fall back to the layered value.
            if key == "forward.endpoint" || value.trim().parse::<u64>().is_ok() {
                builder = builder.set_override(key, value.trim())?;
            }
        }
    }

    builder = builder
        .set_override_option("http.bind", overrides.http_bind.map(|b| b.to_string()))?
        .set_override_option("forward.endpoint", overrides.post_endpoint.clone())?;
    Ok(builder.build()?)
}
