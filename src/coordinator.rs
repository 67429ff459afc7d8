use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::forwarder::{ForwardOutcome, Forwarder};
use crate::store::PayloadStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    Idle,
    Flushing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Interval,
    Size,
    Shutdown,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("sink rejected a batch of {batch_size} events {attempts} times")]
    RetriesExhausted { batch_size: usize, attempts: u32 },
}

/// Decides when the payload store is drained and forwarded.
///
/// The interval timer and the size-crossing signal feed one loop. Direct
/// [`flush_now`](Self::flush_now) callers queue on `flight`, so at most one
/// flush (retries included) is ever in flight.
pub struct FlushCoordinator {
    store: Arc<PayloadStore>,
    forwarder: Forwarder,
    interval: Duration,
    size_poll: Duration,
    state: watch::Sender<FlushState>,
    flight: Mutex<()>,
}

impl FlushCoordinator {
    pub fn new(
        store: Arc<PayloadStore>,
        forwarder: Forwarder,
        interval: Duration,
        size_poll: Duration,
    ) -> Self {
        let (state, _) = watch::channel(FlushState::Idle);
        Self {
            store,
            forwarder,
            interval,
            size_poll,
            state,
            flight: Mutex::new(()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FlushState> {
        self.state.subscribe()
    }

    /// Drains the store and forwards whatever it held. Waits for a flush
    /// already in flight before draining.
    pub async fn flush_now(&self, trigger: FlushTrigger) -> Result<ForwardOutcome, CoordinatorError> {
        let _flight = self.flight.lock().await;
        let batch = self.store.drain_all();
        if batch.is_empty() {
            debug!(?trigger, "nothing buffered, skipping flush");
            return Ok(ForwardOutcome::Empty);
        }

        self.state.send_replace(FlushState::Flushing);
        info!(?trigger, batch_size = batch.len(), "flushing batch");
        let outcome = self.forwarder.forward(&batch).await;
        self.state.send_replace(FlushState::Idle);

        match outcome {
            ForwardOutcome::Exhausted { attempts } => Err(CoordinatorError::RetriesExhausted {
                batch_size: batch.len(),
                attempts,
            }),
            other => Ok(other),
        }
    }

    /// Runs until `cancel` fires, then flushes what is left once.
    ///
    /// Returns early with an error when a batch exhausts its retries; the
    /// remaining buffer is left untouched.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), CoordinatorError> {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut poll = interval(self.size_poll);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.interval.as_secs(),
            batch_size = self.store.threshold(),
            "flush coordinator started"
        );

        loop {
            let trigger = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => FlushTrigger::Interval,
                _ = self.store.threshold_reached() => FlushTrigger::Size,
                _ = poll.tick() => FlushTrigger::Size,
            };

            if trigger == FlushTrigger::Size && self.store.len() < self.store.threshold() {
                continue;
            }
            self.flush_now(trigger).await?;
        }

        self.flush_now(FlushTrigger::Shutdown).await?;
        info!("flush coordinator stopped");
        Ok(())
    }
}
