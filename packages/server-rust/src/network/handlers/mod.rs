//! axum handlers and the state they extract.
//!
//! Both processes share [`RuntimeState`] (lifecycle, metrics handle). The
//! gateway adds the decorated search stack and the resilience registry; a
//! provider adds its RPC router.

pub mod health;
pub mod metrics;
pub mod rpc;
pub mod search;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use metrics::metrics_handler;
pub use rpc::{provider_status_handler, rpc_handler};
pub use search::{backend_status_handler, search_handler, status_handler};

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::FromRef;
use axum::http::HeaderMap;
use mediagate_core::{SearchResult, StatusRequest};
use metrics_exporter_prometheus::PrometheusHandle;

use super::ShutdownController;
use crate::service::domain::MediaSearchGateway;
use crate::service::transport::REQUEST_ID_HEADER;
use crate::service::{BoxEndpoint, CallContext, ResilienceRegistry, RpcRouter, SearchService};

/// Process-wide state every listener carries.
pub struct RuntimeState {
    /// Name reported by `/health`.
    pub service: &'static str,
    pub shutdown: Arc<ShutdownController>,
    /// `None` when no recorder was installed; `/metrics` then answers 404.
    pub metrics: Option<PrometheusHandle>,
    pub started_at: Instant,
}

impl RuntimeState {
    #[must_use]
    pub fn new(
        service: &'static str,
        shutdown: Arc<ShutdownController>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            service,
            shutdown,
            metrics,
            started_at: Instant::now(),
        }
    }
}

/// State of the gateway listener.
#[derive(Clone)]
pub struct GatewayState {
    pub runtime: Arc<RuntimeState>,
    /// The decorated fan-out stack serving `/search` and `/status`.
    pub search: Arc<dyn SearchService<Output = SearchResult>>,
    /// The bare gateway, for backend status checks.
    pub gateway: Arc<MediaSearchGateway>,
    pub registry: Arc<ResilienceRegistry>,
    pub search_timeout: Duration,
}

impl FromRef<GatewayState> for Arc<RuntimeState> {
    fn from_ref(state: &GatewayState) -> Self {
        Arc::clone(&state.runtime)
    }
}

/// State of a provider listener.
#[derive(Clone)]
pub struct ProviderState {
    pub runtime: Arc<RuntimeState>,
    pub rpc: RpcRouter,
    /// Status endpoint of the decorated provider, for `GET /status`.
    pub status: BoxEndpoint<StatusRequest, u16>,
    /// Cap on the budget a caller may request through `x-call-timeout-ms`.
    pub max_call_timeout: Duration,
}

impl FromRef<ProviderState> for Arc<RuntimeState> {
    fn from_ref(state: &ProviderState) -> Self {
        Arc::clone(&state.runtime)
    }
}

/// Builds the call context for one HTTP request, reusing the request id the
/// HTTP layers assigned.
#[must_use]
pub fn call_context(headers: &HeaderMap, timeout: Duration) -> CallContext {
    let mut ctx = CallContext::with_timeout(timeout);
    if let Some(id) = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        ctx.request_id = id.to_string();
    }
    ctx
}
