use once_cell::sync::Lazy;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static EVENTS_RECEIVED: Lazy<IntCounter> = Lazy::new(|| {
    register(IntCounter::new(
        "batcher_events_received_total",
        "Number of events accepted on /log",
    ))
});

pub static EVENTS_REJECTED: Lazy<IntCounter> = Lazy::new(|| {
    register(IntCounter::new(
        "batcher_events_rejected_total",
        "Number of /log bodies that failed to decode",
    ))
});

pub static SEND_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register(IntCounterVec::new(
        Opts::new(
            "batcher_send_attempts_total",
            "Batch send attempts against the sink, by result",
        ),
        &["result"],
    ))
});

pub static BATCHES_FORWARDED: Lazy<IntCounter> = Lazy::new(|| {
    register(IntCounter::new(
        "batcher_batches_forwarded_total",
        "Batches the sink accepted",
    ))
});

pub static BATCHES_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    register(IntCounter::new(
        "batcher_batches_dropped_total",
        "Batches given up on after a transport failure",
    ))
});

pub static BATCH_SIZE: Lazy<Histogram> = Lazy::new(|| {
    register(Histogram::with_opts(
        HistogramOpts::new("batcher_batch_size", "Events per forwarded batch")
            .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 500.0, 1000.0]),
    ))
});

pub static SEND_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register(Histogram::with_opts(HistogramOpts::new(
        "batcher_send_duration_seconds",
        "Wall time of a successful batch send",
    )))
});

fn register<C>(metric: prometheus::Result<C>) -> C
where
    C: prometheus::core::Collector + Clone + 'static,
{
    #[allow(clippy::expect_used)]
    let metric = metric.expect("metric definition is valid");
    #[allow(clippy::expect_used)]
    REGISTRY
        .register(Box::new(metric.clone()))
        .expect("metric registered once");
    metric
}

/// Text exposition of every batcher metric.
pub fn render() -> String {
    let mut buf = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buf) {
        tracing::warn!(error = %e, "failed to encode metrics");
    }
    String::from_utf8(buf).unwrap_or_default()
}
