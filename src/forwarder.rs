use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use crate::domain::Event;
use crate::metrics;
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::sink::{BatchSink, SinkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Nothing to send; the sink was not contacted.
    Empty,
    Delivered { attempts: u32 },
    /// The first attempt could not reach the sink and the batch was dropped.
    Dropped,
    /// The sink never accepted the batch. Terminal for the process.
    Exhausted { attempts: u32 },
}

/// Sends batches to a sink, falling back to the retry policy when the sink
/// answers with anything but `200 OK`.
pub struct Forwarder {
    sink: Arc<dyn BatchSink>,
    retry: RetryPolicy,
    retry_transport_errors: bool,
}

impl Forwarder {
    pub fn new(sink: Arc<dyn BatchSink>, retry: RetryPolicy) -> Self {
        Self {
            sink,
            retry,
            retry_transport_errors: false,
        }
    }

    /// Route a transport failure of the first attempt through the retry
    /// policy instead of dropping the batch.
    pub fn retry_transport_errors(mut self, enabled: bool) -> Self {
        self.retry_transport_errors = enabled;
        self
    }

    pub async fn forward(&self, batch: &[Event]) -> ForwardOutcome {
        if batch.is_empty() {
            return ForwardOutcome::Empty;
        }

        match self.send(batch).await {
            Ok(()) => ForwardOutcome::Delivered { attempts: 1 },
            Err(e) if e.is_transport() && !self.retry_transport_errors => {
                error!(batch_size = batch.len(), error = %e, "failed to send batch, dropping it");
                metrics::BATCHES_DROPPED.inc();
                ForwardOutcome::Dropped
            }
            Err(_) => match self.retry.run(|_| async move { self.send(batch).await.is_ok() }).await {
                RetryOutcome::Recovered { retries } => ForwardOutcome::Delivered {
                    attempts: retries + 1,
                },
                RetryOutcome::Exhausted { retries } => {
                    error!(
                        batch_size = batch.len(),
                        attempts = retries + 1,
                        "failed to send batch after retries"
                    );
                    ForwardOutcome::Exhausted {
                        attempts: retries + 1,
                    }
                }
            },
        }
    }

    /// One attempt: serialize, post, classify.
    pub async fn send(&self, batch: &[Event]) -> Result<(), SinkError> {
        let start = Instant::now();
        match self.sink.send(batch).await {
            Ok(status) => {
                let elapsed = start.elapsed();
                info!(
                    batch_size = batch.len(),
                    status_code = status.as_u16(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "batch sent"
                );
                metrics::SEND_ATTEMPTS.with_label_values(&["ok"]).inc();
                metrics::BATCHES_FORWARDED.inc();
                metrics::BATCH_SIZE.observe(batch.len() as f64);
                metrics::SEND_DURATION.observe(elapsed.as_secs_f64());
                Ok(())
            }
            Err(e) => {
                let result = match &e {
                    SinkError::Rejected(_) => "rejected",
                    SinkError::Transport(_) => "transport",
                    SinkError::Encode(_) => "encode",
                };
                warn!(batch_size = batch.len(), error = %e, "batch send failed");
                metrics::SEND_ATTEMPTS.with_label_values(&[result]).inc();
                Err(e)
            }
        }
    }
}
