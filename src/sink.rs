use std::time::Duration;

use axum::async_trait;
use reqwest::{header::CONTENT_TYPE, StatusCode, Url};

use crate::domain::Event;

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("transport: {0}")]
    Transport(String),
    #[error("rejected with status {0}")]
    Rejected(StatusCode),
}

impl SinkError {
    pub fn is_transport(&self) -> bool {
        matches!(self, SinkError::Transport(_))
    }
}

/// Downstream receiver of whole batches.
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Delivers one batch. `Ok` carries the status the sink answered with,
    /// which is always `200 OK`.
    async fn send(&self, batch: &[Event]) -> Result<StatusCode, SinkError>;
}

/// Posts batches as a JSON array to a fixed URL.
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpSink {
    pub fn new(endpoint: Url, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            endpoint,
        })
    }
}

#[async_trait]
impl BatchSink for HttpSink {
    async fn send(&self, batch: &[Event]) -> Result<StatusCode, SinkError> {
        let body = serde_json::to_vec(batch)?;
        let resp = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        match resp.status() {
            StatusCode::OK => Ok(StatusCode::OK),
            status => Err(SinkError::Rejected(status)),
        }
    }
}
