//! Token-bucket rate limiting for outbound endpoints.
//!
//! Non-blocking: when no token is available the call fails immediately with
//! `SearchError::RateLimitExceeded` and the inner endpoint is never invoked.

use std::sync::Arc;
use std::task::{Context, Poll};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use mediagate_core::SearchError;
use metrics::counter;
use tower::{Layer, Service};

use super::metrics::RESILIENCE_REJECTIONS;
use crate::service::config::ResilienceConfig;
use crate::service::endpoint::{Call, EndpointFuture};

/// Builds the token bucket for one operation.
#[must_use]
pub fn direct_limiter(config: &ResilienceConfig) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(config.rate_limit_per_second).allow_burst(config.burst))
}

// ---------------------------------------------------------------------------
// RateLimitLayer
// ---------------------------------------------------------------------------

/// Tower layer that guards an endpoint with a shared token bucket.
#[derive(Clone)]
pub struct RateLimitLayer {
    operation: Arc<str>,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl RateLimitLayer {
    #[must_use]
    pub fn new(operation: Arc<str>, limiter: Arc<DefaultDirectRateLimiter>) -> Self {
        Self { operation, limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            operation: Arc::clone(&self.operation),
            limiter: Arc::clone(&self.limiter),
        }
    }
}

// ---------------------------------------------------------------------------
// RateLimitService
// ---------------------------------------------------------------------------

/// Service wrapper that takes one token per call.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    operation: Arc<str>,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl<S, R> Service<Call<R>> for RateLimitService<S>
where
    S: Service<Call<R>, Error = SearchError> + Send,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
{
    type Response = S::Response;
    type Error = SearchError;
    type Future = EndpointFuture<S::Response>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, call: Call<R>) -> Self::Future {
        if self.limiter.check().is_err() {
            let operation = self.operation.to_string();
            tracing::warn!(operation = %operation, "rate limit exceeded");
            counter!(RESILIENCE_REJECTIONS, "operation" => operation.clone(), "reason" => "rate_limited")
                .increment(1);
            return Box::pin(async move { Err(SearchError::RateLimitExceeded { operation }) });
        }

        let fut = self.inner.call(call);
        Box::pin(fut)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use tower::util::service_fn;
    use tower::ServiceExt;

    use super::*;
    use crate::service::endpoint::CallContext;

    fn limiter(rate: u32, burst: u32) -> Arc<DefaultDirectRateLimiter> {
        let config = ResilienceConfig {
            rate_limit_per_second: NonZeroU32::new(rate).unwrap(),
            burst: NonZeroU32::new(burst).unwrap(),
            ..ResilienceConfig::default()
        };
        Arc::new(direct_limiter(&config))
    }

    #[tokio::test]
    async fn excess_calls_fail_without_reaching_inner() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let inner = service_fn(move |_call: Call<()>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, SearchError>(()) }
        });
        let svc = RateLimitLayer::new(Arc::from("books.find"), limiter(1, 3)).layer(inner);

        let mut rejected = 0;
        for _ in 0..5 {
            let call = Call::new(CallContext::with_timeout(Duration::from_secs(1)), ());
            match svc.clone().oneshot(call).await {
                Ok(()) => {}
                Err(SearchError::RateLimitExceeded { operation }) => {
                    assert_eq!(operation, "books.find");
                    rejected += 1;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(rejected, 2);
    }

    #[tokio::test]
    async fn limiters_are_independent_per_operation() {
        let inner = service_fn(|_call: Call<()>| async { Ok::<_, SearchError>(()) });
        let books = RateLimitLayer::new(Arc::from("books.find"), limiter(1, 1)).layer(inner.clone());
        let albums = RateLimitLayer::new(Arc::from("albums.find"), limiter(1, 1)).layer(inner);
        let call = || Call::new(CallContext::with_timeout(Duration::from_secs(1)), ());

        assert!(books.clone().oneshot(call()).await.is_ok());
        assert!(books.clone().oneshot(call()).await.is_err());
        assert!(albums.clone().oneshot(call()).await.is_ok());
    }
}
