//! Composition root: wires configuration into handler state.

use std::sync::Arc;
use std::time::Duration;

use mediagate_core::{Album, Book};
use serde::Serialize;

use crate::network::{GatewayState, ProviderState, RuntimeState};
use crate::service::domain::gateway::{AlbumBackend, BookBackend};
use crate::service::domain::MediaSearchGateway;
use crate::service::endpoint::make_status_endpoint;
use crate::service::middleware::build_service_stack;
use crate::service::{
    backend_endpoints, operation_names, GatewayConfig, ResilienceRegistry, RpcChannel, RpcRouter,
    SearchService,
};

/// Name the gateway reports in logs, metrics, and `/health`.
pub const GATEWAY_SERVICE: &str = "gateway";

/// Builds the gateway: one pooled channel per backend, resilient endpoints
/// drawn from a fresh registry, the fan-out aggregator, and its decorators.
///
/// # Errors
///
/// Returns an error if a backend URL is invalid or an HTTP client cannot be
/// built.
pub fn gateway_state(
    config: &GatewayConfig,
    runtime: Arc<RuntimeState>,
) -> anyhow::Result<GatewayState> {
    let registry = Arc::new(ResilienceRegistry::new(config.resilience.clone()));

    let books_channel = RpcChannel::connect(&config.book_backend, config.connect_timeout)?;
    let albums_channel = RpcChannel::connect(&config.album_backend, config.connect_timeout)?;

    let books: BookBackend = Arc::new(backend_endpoints::<Book>(
        &books_channel,
        operation_names::BOOKS,
        &registry,
    ));
    let albums: AlbumBackend = Arc::new(backend_endpoints::<Album>(
        &albums_channel,
        operation_names::ALBUMS,
        &registry,
    ));

    let gateway = Arc::new(MediaSearchGateway::new(books, albums, config.search_timeout));
    let search = Arc::new(build_service_stack(Arc::clone(&gateway), GATEWAY_SERVICE));

    tracing::info!(
        books = %config.book_backend,
        albums = %config.album_backend,
        "gateway wired"
    );

    Ok(GatewayState {
        runtime,
        search,
        gateway,
        registry,
        search_timeout: config.search_timeout,
    })
}

/// Decorates `provider` and exposes it through the RPC router.
///
/// `max_call_timeout` caps the budget a caller may request per call.
pub fn provider_state<S, T>(
    provider: S,
    service: &'static str,
    runtime: Arc<RuntimeState>,
    max_call_timeout: Duration,
) -> ProviderState
where
    S: SearchService<Output = Vec<T>>,
    T: Serialize + Send + Sync + 'static,
{
    let stack = Arc::new(build_service_stack(provider, service));
    let rpc = RpcRouter::for_service(Arc::clone(&stack));
    tracing::info!(service, methods = ?rpc.methods(), "provider wired");

    ProviderState {
        runtime,
        rpc,
        status: make_status_endpoint(stack),
        max_call_timeout,
    }
}
