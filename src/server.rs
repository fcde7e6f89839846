//! # HTTP Server
//!
//! HTTP server for metrics, health checks, and Kubernetes probes.
//!
//! Provides endpoints:
//! - `/metrics` - Prometheus metrics in text format
//! - `/healthz` - Liveness probe (always returns 200)
//! - `/readyz` - Readiness probe (200 while the DeviceClass cache is synced and watching)
//!
//! Listens on `METRICS_PORT` (default 8080).

use crate::manager::DerivedObjectManager;
use crate::observability::metrics::REGISTRY;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use kube::Resource;
use prometheus::{Encoder, TextEncoder};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Something `/readyz` consults on every request
pub trait ReadinessCheck: Send + Sync {
    fn is_ready(&self) -> bool;
}

impl<K> ReadinessCheck for DerivedObjectManager<K>
where
    K: Resource + Clone + fmt::Debug + Send + Sync + 'static,
{
    fn is_ready(&self) -> bool {
        DerivedObjectManager::is_ready(self)
    }
}

#[derive(Default)]
pub struct ServerState {
    pub is_ready: AtomicBool,
    readiness: OnceLock<Arc<dyn ReadinessCheck>>,
}

impl fmt::Debug for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerState")
            .field("is_ready", &self.is_ready)
            .field("has_readiness_check", &self.readiness.get().is_some())
            .finish()
    }
}

impl ServerState {
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::Relaxed);
    }

    /// Gate readiness on `check` in addition to the ready flag. Set once.
    pub fn watch_readiness(&self, check: Arc<dyn ReadinessCheck>) {
        if self.readiness.set(check).is_err() {
            warn!("readiness check already registered, ignoring");
        }
    }

    fn ready(&self) -> bool {
        self.is_ready.load(Ordering::Relaxed)
            && self.readiness.get().is_none_or(|check| check.is_ready())
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state)
}

pub async fn start_server(port: u16, state: Arc<ServerState>) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_readyz_follows_ready_flag() {
        let state = Arc::new(ServerState::default());

        let resp = readyz_handler(State(Arc::clone(&state))).await.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.set_ready(true);
        let resp = readyz_handler(State(Arc::clone(&state))).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    struct Toggle(AtomicBool);

    impl ReadinessCheck for Toggle {
        fn is_ready(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_readyz_requires_registered_check() {
        let state = Arc::new(ServerState::default());
        let check = Arc::new(Toggle(AtomicBool::new(true)));
        state.watch_readiness(Arc::clone(&check) as Arc<dyn ReadinessCheck>);
        state.set_ready(true);

        let resp = readyz_handler(State(Arc::clone(&state))).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        // Cache stopped following the watch
        check.0.store(false, Ordering::SeqCst);
        let resp = readyz_handler(State(Arc::clone(&state))).await.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_renders_text_format() {
        let resp = metrics_handler().await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
