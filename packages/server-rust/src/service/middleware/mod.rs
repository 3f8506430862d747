//! Middleware for search services and endpoints.
//!
//! Service decorators (wrap a [`SearchService`](crate::service::SearchService)):
//! - [`logging`]: one structured log record per call
//! - [`metrics`]: request counter and latency histogram per call
//!
//! Endpoint layers (wrap an outbound `tower::Service<Call<R>>`):
//! - [`rate_limit`]: non-blocking token bucket
//! - [`circuit_breaker`]: consecutive-failure breaker
//! - [`timeout`]: per-call deadline
//!
//! [`pipeline`] composes each group in its fixed order.

pub mod circuit_breaker;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod rate_limit;
pub mod timeout;

pub use circuit_breaker::{BreakerPermit, CircuitBreaker, CircuitBreakerLayer, CircuitState};
pub use logging::{LoggingLayer, LoggingMiddleware};
pub use metrics::{InstrumentingLayer, InstrumentingMiddleware};
pub use pipeline::{build_resilient_endpoint, build_service_stack};
pub use rate_limit::RateLimitLayer;
pub use timeout::TimeoutLayer;
