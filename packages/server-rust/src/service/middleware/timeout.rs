//! Deadline enforcement for outbound endpoints.
//!
//! Each call is bounded by the earlier of the caller's context deadline and the
//! operation's `call_timeout`. The narrowed deadline is written back into the
//! call's context so the transport can propagate it downstream.

use std::task::{Context, Poll};
use std::time::Duration;

use mediagate_core::SearchError;
use tower::{Layer, Service};

use crate::service::endpoint::{Call, EndpointFuture};

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Tower layer that caps each call at `call_timeout`.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutLayer {
    call_timeout: Duration,
}

impl TimeoutLayer {
    #[must_use]
    pub fn new(call_timeout: Duration) -> Self {
        Self { call_timeout }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            call_timeout: self.call_timeout,
        }
    }
}

// ---------------------------------------------------------------------------
// TimeoutService
// ---------------------------------------------------------------------------

/// Service wrapper that abandons the inner call once its deadline passes.
#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
    call_timeout: Duration,
}

impl<S, R> Service<Call<R>> for TimeoutService<S>
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

    fn call(&mut self, mut call: Call<R>) -> Self::Future {
        call.ctx = call.ctx.narrowed(self.call_timeout);
        let deadline = call.ctx.deadline;
        #[allow(clippy::cast_possible_truncation)]
        let timeout_ms = call.ctx.remaining().as_millis() as u64;

        let fut = self.inner.call(call);
        Box::pin(async move {
            match tokio::time::timeout_at(deadline, fut).await {
                Ok(result) => result,
                Err(_elapsed) => Err(SearchError::DeadlineExceeded { timeout_ms }),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
