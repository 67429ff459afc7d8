pub mod app;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod forwarder;
pub mod http;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod readiness;
pub mod retry;
pub mod sink;
pub mod store;
