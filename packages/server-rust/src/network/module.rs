//! Listener lifecycle and router assembly.
//!
//! `new()` allocates the shutdown controller, `start()` binds, and `serve()`
//! accepts connections until shutdown. The split lets the composition root
//! learn the bound port and share the controller before serving.

use std::future::Future;
use std::sync::Arc;

use axum::extract::FromRef;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    backend_status_handler, health_handler, liveness_handler, metrics_handler,
    provider_status_handler, readiness_handler, rpc_handler, search_handler, status_handler,
    GatewayState, ProviderState, RuntimeState,
};
use super::middleware::{build_http_layers, track_in_flight};
use super::shutdown::ShutdownController;

/// Routes every listener exposes regardless of role.
fn health_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    Arc<RuntimeState>: FromRef<S>,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
}

/// Gateway routes:
/// - `POST /search`
/// - `GET /status`
/// - `GET /status/backends`
/// - health endpoints and `GET /metrics`
pub fn gateway_router(state: GatewayState, config: &NetworkConfig) -> Router {
    let shutdown = Arc::clone(&state.runtime.shutdown);
    Router::new()
        .route("/search", post(search_handler))
        .route("/status", get(status_handler))
        .route("/status/backends", get(backend_status_handler))
        .route_layer(from_fn_with_state(shutdown, track_in_flight))
        .merge(health_routes())
        .layer(build_http_layers(config))
        .with_state(state)
}

/// Provider routes:
/// - `POST /rpc/{method}`
/// - `GET /status`
/// - health endpoints and `GET /metrics`
pub fn provider_router(state: ProviderState, config: &NetworkConfig) -> Router {
    let shutdown = Arc::clone(&state.runtime.shutdown);
    Router::new()
        .route("/rpc/{method}", post(rpc_handler))
        .route("/status", get(provider_status_handler))
        .route_layer(from_fn_with_state(shutdown, track_in_flight))
        .merge(health_routes())
        .layer(build_http_layers(config))
        .with_state(state)
}

/// Owns one listener from bind to drain.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    #[must_use]
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            listener: None,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Shared lifecycle handle; hand it to [`RuntimeState`] and signal handlers.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Binds the listener and returns the bound port (OS-assigned for port 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let port = listener.local_addr()?.port();
        info!(host = %self.config.host, port, "listener bound");
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves `router` until `signal` resolves or the controller is
    /// triggered, then drains in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called or the server hits a
    /// fatal I/O error.
    pub async fn serve(
        self,
        router: Router,
        signal: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let shutdown = self.shutdown;

        shutdown.mark_ready();
        info!("serving");

        let trigger = Arc::clone(&shutdown);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    () = signal => {}
                    () = trigger.requested() => {}
                }
                info!("shutdown requested");
                trigger.trigger();
            })
            .await?;

        if shutdown.drain(self.config.drain_timeout).await {
            info!("drained");
        } else {
            warn!(
                in_flight = shutdown.in_flight(),
                "drain timeout expired with requests in flight"
            );
        }
        Ok(())
    }
}
