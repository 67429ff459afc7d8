use std::net::SocketAddr;
use std::time::Duration;
use tracing::Span;

use axum::extract::{ConnectInfo, State};
use axum::http::{self, Response, StatusCode};
use axum::routing::post;
use axum::{response::IntoResponse, routing::get, Router};
use axum_prometheus::PrometheusMetricLayer;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::app::AppState;
use crate::ingest::handler;
use crate::metrics;

pub fn router(state: AppState) -> Router {
    router_with(state, Router::new())
}

/// Application routes merged with `extra`, all behind the request id,
/// tracing and panic layers.
pub fn router_with(state: AppState, extra: Router<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/log", post(handler::log_event))
        .route("/send-data", post(handler::send_data))
        .merge(extra)
        .layer(CatchPanicLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &http::Request<_>| {
                    let request_id = req
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                      "http_request",
                      method = %req.method(),
                      path = %req.uri().path(),
                      request_id = %request_id,
                      client_ip = %client_ip(req),
                    )
                })
                .on_response(|res: &Response<_>, latency: Duration, _span: &Span| {
                    tracing::info!(
                      status = %res.status(),
                      latency_ms = %latency.as_millis(),
                      "response"
                    )
                })
                .on_failure(|error: ServerErrorsFailureClass, latency: Duration, _span: &Span| {
                    tracing::warn!(%error, latency_ms = %latency.as_millis(), "request_failed");
                }),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the peer address.
fn client_ip<B>(req: &http::Request<B>) -> String {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(first) = header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_owned();
    }
    if let Some(real) = header("x-real-ip") {
        return real.to_owned();
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(peer)| peer.ip().to_string())
        .unwrap_or_else(|| "-".to_owned())
}

pub async fn serve(addr: SocketAddr, state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let (prom_layer, prom_handle) = PrometheusMetricLayer::pair();

    let metrics_route = Router::new().route(
        "/metrics",
        get(move || async move { format!("{}{}", prom_handle.render(), metrics::render()) }),
    );
    let app = router_with(state, metrics_route).layer(prom_layer);

    let listener: TcpListener = TcpListener::bind(addr).await?;
    println!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn healthz() -> impl IntoResponse {
    "OK"
}

async fn readyz(State(st): State<AppState>) -> impl IntoResponse {
    if st.ready.is_ready(&st.cfg.health) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}
