//! Consecutive-failure circuit breaker for outbound endpoints.
//!
//! ```text
//! Closed   -> Open      consecutive failures reach the threshold
//! Open     -> HalfOpen  first acquire after the cooldown has elapsed
//! HalfOpen -> Closed    `half_open_max_calls` trial successes
//! HalfOpen -> Open      any trial failure
//! ```
//!
//! Outcomes are reported through a [`BreakerPermit`]. A permit dropped without
//! an outcome (the call was cancelled) counts as a failure. Outcomes from a
//! permit issued before the last state change are ignored.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use mediagate_core::SearchError;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio::time::Instant;
use tower::{Layer, Service};

use super::metrics::{CIRCUIT_STATE, RESILIENCE_REJECTIONS};
use crate::service::config::ResilienceConfig;
use crate::service::endpoint::{Call, EndpointFuture};

// ---------------------------------------------------------------------------
// CircuitState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }

    fn gauge_value(self) -> f64 {
        match self {
            Self::Closed => 0.0,
            Self::Open => 1.0,
            Self::HalfOpen => 2.0,
        }
    }
}

// ---------------------------------------------------------------------------
// CircuitBreaker
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    /// Bumped on every transition; stale permits compare against it.
    generation: u64,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trials_in_flight: u32,
    trial_successes: u32,
}

/// Breaker state for one named operation. Shared by every concurrent call.
#[derive(Debug)]
pub struct CircuitBreaker {
    operation: String,
    failure_threshold: u32,
    cooldown: Duration,
    half_open_max_calls: u32,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(operation: impl Into<String>, config: &ResilienceConfig) -> Self {
        let operation = operation.into();
        gauge!(CIRCUIT_STATE, "operation" => operation.clone()).set(CircuitState::Closed.gauge_value());
        Self {
            operation,
            failure_threshold: config.breaker_failure_threshold.max(1),
            cooldown: config.breaker_cooldown,
            half_open_max_calls: config.half_open_max_calls.max(1),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                generation: 0,
                consecutive_failures: 0,
                opened_at: None,
                trials_in_flight: 0,
                trial_successes: 0,
            }),
        }
    }

    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Current state, with the cooldown applied.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        inner.state
    }

    /// Asks to place one call.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::CircuitOpen`] while open, or while half-open with
    /// every trial slot taken.
    pub fn try_acquire(self: &Arc<Self>) -> Result<BreakerPermit, SearchError> {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);

        let admitted = match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.trials_in_flight < self.half_open_max_calls {
                    inner.trials_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        };

        if !admitted {
            drop(inner);
            counter!(RESILIENCE_REJECTIONS, "operation" => self.operation.clone(), "reason" => "circuit_open")
                .increment(1);
            return Err(SearchError::CircuitOpen {
                operation: self.operation.clone(),
            });
        }

        Ok(BreakerPermit {
            breaker: Arc::clone(self),
            generation: inner.generation,
            reported: false,
        })
    }

    fn refresh(&self, inner: &mut BreakerInner) {
        if inner.state != CircuitState::Open {
            return;
        }
        let cooled = inner
            .opened_at
            .is_some_and(|at| Instant::now() >= at + self.cooldown);
        if cooled {
            self.transition(inner, CircuitState::HalfOpen);
        }
    }

    fn record(&self, generation: u64, success: bool) {
        let mut inner = self.inner.lock();
        if generation != inner.generation {
            return;
        }
        match (inner.state, success) {
            (CircuitState::Closed, true) => inner.consecutive_failures = 0,
            (CircuitState::Closed, false) => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            (CircuitState::HalfOpen, true) => {
                inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
                inner.trial_successes += 1;
                if inner.trial_successes >= self.half_open_max_calls {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            (CircuitState::HalfOpen, false) => self.transition(&mut inner, CircuitState::Open),
            (CircuitState::Open, _) => {}
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.generation += 1;
        inner.consecutive_failures = 0;
        inner.trials_in_flight = 0;
        inner.trial_successes = 0;
        inner.opened_at = (to == CircuitState::Open).then(Instant::now);

        if to == CircuitState::Closed {
            tracing::info!(operation = %self.operation, from = from.as_str(), to = to.as_str(), "circuit breaker state change");
        } else {
            tracing::warn!(operation = %self.operation, from = from.as_str(), to = to.as_str(), "circuit breaker state change");
        }
        gauge!(CIRCUIT_STATE, "operation" => self.operation.clone()).set(to.gauge_value());
    }
}

// ---------------------------------------------------------------------------
// BreakerPermit
// ---------------------------------------------------------------------------

/// Admission for one call. Consume with [`success`](Self::success) or
/// [`failure`](Self::failure); dropping it unreported records a failure.
#[derive(Debug)]
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    generation: u64,
    reported: bool,
}

impl BreakerPermit {
    pub fn success(mut self) {
        self.reported = true;
        self.breaker.record(self.generation, true);
    }

    pub fn failure(mut self) {
        self.reported = true;
        self.breaker.record(self.generation, false);
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if !self.reported {
            self.breaker.record(self.generation, false);
        }
    }
}

// ---------------------------------------------------------------------------
// CircuitBreakerLayer
// ---------------------------------------------------------------------------

/// Tower layer that guards an endpoint with a shared [`CircuitBreaker`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerLayer {
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerLayer {
    #[must_use]
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }
}

impl<S> Layer<S> for CircuitBreakerLayer {
    type Service = CircuitBreakerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CircuitBreakerService {
            inner,
            breaker: Arc::clone(&self.breaker),
        }
    }
}

/// Service wrapper that consults the breaker before calling through and
/// reports every outcome back to it.
#[derive(Debug, Clone)]
pub struct CircuitBreakerService<S> {
    inner: S,
    breaker: Arc<CircuitBreaker>,
}

impl<S, R> Service<Call<R>> for CircuitBreakerService<S>
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
        let permit = match self.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(e) => {
                tracing::warn!(operation = %self.breaker.operation(), "circuit open, call rejected");
                return Box::pin(async move { Err(e) });
            }
        };

        let fut = self.inner.call(call);
        Box::pin(async move {
            let result = fut.await;
            if result.is_ok() {
                permit.success();
            } else {
                permit.failure();
            }
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
