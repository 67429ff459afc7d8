use crate::app::AppState;
use crate::domain::Event;
use crate::metrics;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::{debug, error, info};

/// `POST /log`: decode one event and buffer it for the next flush.
pub async fn log_event(State(st): State<AppState>, body: Bytes) -> impl IntoResponse {
    if !st.ready.is_accepting() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down");
    }

    let event: Event = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "failed to decode JSON payload");
            metrics::EVENTS_REJECTED.inc();
            return (StatusCode::BAD_REQUEST, "");
        }
    };

    let buffered = st.store.append(event);
    metrics::EVENTS_RECEIVED.inc();
    debug!(batch_size = buffered, "event buffered");
    (StatusCode::OK, "OK")
}

/// `POST /send-data`: acknowledges a delivered batch. Lets the service act
/// as its own sink in local setups; it never triggers a flush.
pub async fn send_data(body: Bytes) -> impl IntoResponse {
    info!(bytes = body.len(), "batch received");
    "Data Received"
}
