//! Pipeline composition: the two fixed layer stacks used on either side of a hop.

use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceBuilder};

use mediagate_core::SearchError;

use super::circuit_breaker::CircuitBreakerLayer;
use super::logging::{LoggingLayer, LoggingMiddleware};
use super::metrics::{InstrumentingLayer, InstrumentingMiddleware};
use super::rate_limit::RateLimitLayer;
use super::timeout::TimeoutLayer;
use crate::service::endpoint::{BoxEndpoint, Call};
use crate::service::registry::ResilienceState;
use crate::service::search::SearchService;

/// Wraps an outbound transport endpoint with the resilience layers of one
/// named operation.
///
/// Layer order (outermost to innermost):
/// 1. `RateLimitLayer` -- take a token before anything else is consulted
/// 2. `CircuitBreakerLayer` -- fail fast while the operation is open
/// 3. `TimeoutLayer` -- bound the call; an overrun is a breaker failure
pub fn build_resilient_endpoint<R, T, S>(transport: S, state: &ResilienceState) -> BoxEndpoint<R, T>
where
    S: Service<Call<R>, Response = T, Error = SearchError> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    R: Send + 'static,
    T: Send + 'static,
{
    BoxCloneSyncService::new(
        ServiceBuilder::new()
            .layer(RateLimitLayer::new(
                state.operation.clone(),
                state.limiter.clone(),
            ))
            .layer(CircuitBreakerLayer::new(state.breaker.clone()))
            .layer(TimeoutLayer::new(state.config.call_timeout))
            .service(transport),
    )
}

/// Decorates a search service: instrumentation outermost, then logging.
///
/// Instrumentation therefore measures the whole inner chain, logging included.
pub fn build_service_stack<S: SearchService>(
    base: S,
    service: &'static str,
) -> InstrumentingMiddleware<LoggingMiddleware<S>> {
    ServiceBuilder::new()
        .layer(InstrumentingLayer::new(service))
        .layer(LoggingLayer::new(service))
        .service(base)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
