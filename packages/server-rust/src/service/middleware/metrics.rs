//! Instrumenting decorator for search services.
//!
//! Records a request counter and a latency histogram per call through the
//! `metrics` facade, labelled by `service`, `method` and `error`. Recording
//! happens in a drop guard, so cancelled calls are counted as errors.

use std::time::Instant;

use async_trait::async_trait;
use mediagate_core::SearchError;
use metrics::{counter, histogram};
use tower::Layer;

use crate::service::endpoint::CallContext;
use crate::service::search::SearchService;

/// Counter of completed calls.
pub const REQUEST_COUNT: &str = "mediagate_request_count";
/// Histogram of call latency in seconds.
pub const REQUEST_LATENCY: &str = "mediagate_request_latency_seconds";
/// Counter of calls rejected by a rate limiter or an open breaker.
pub const RESILIENCE_REJECTIONS: &str = "mediagate_resilience_rejections";
/// Gauge of each breaker's state: 0 closed, 1 open, 2 half-open.
pub const CIRCUIT_STATE: &str = "mediagate_circuit_state";

// ---------------------------------------------------------------------------
// InstrumentingLayer
// ---------------------------------------------------------------------------

/// Layer producing [`InstrumentingMiddleware`], labelled with a service name.
#[derive(Debug, Clone, Copy)]
pub struct InstrumentingLayer {
    service: &'static str,
}

impl InstrumentingLayer {
    #[must_use]
    pub fn new(service: &'static str) -> Self {
        Self { service }
    }
}

impl<S> Layer<S> for InstrumentingLayer {
    type Service = InstrumentingMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InstrumentingMiddleware {
            inner,
            service: self.service,
        }
    }
}

// ---------------------------------------------------------------------------
// InstrumentingMiddleware
// ---------------------------------------------------------------------------

/// Search service wrapper that counts and times every call.
#[derive(Debug, Clone)]
pub struct InstrumentingMiddleware<S> {
    inner: S,
    service: &'static str,
}

impl<S> InstrumentingMiddleware<S> {
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: SearchService> SearchService for InstrumentingMiddleware<S> {
    type Output = S::Output;

    async fn search(&self, ctx: &CallContext, query: &str) -> Result<S::Output, SearchError> {
        let mut observation = Observation::begin(self.service, "search");
        let result = self.inner.search(ctx, query).await;
        observation.failed = result.is_err();
        result
    }

    async fn service_status(&self, ctx: &CallContext) -> Result<u16, SearchError> {
        let mut observation = Observation::begin(self.service, "service_status");
        let result = self.inner.service_status(ctx).await;
        observation.failed = result.is_err();
        result
    }
}

/// Records one sample on drop. Starts out failed until the call completes.
struct Observation {
    service: &'static str,
    method: &'static str,
    start: Instant,
    failed: bool,
}

impl Observation {
    fn begin(service: &'static str, method: &'static str) -> Self {
        Self {
            service,
            method,
            start: Instant::now(),
            failed: true,
        }
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        let error = if self.failed { "true" } else { "false" };
        counter!(REQUEST_COUNT, "service" => self.service, "method" => self.method, "error" => error)
            .increment(1);
        histogram!(REQUEST_LATENCY, "service" => self.service, "method" => self.method, "error" => error)
            .record(self.start.elapsed().as_secs_f64());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use metrics_exporter_prometheus::PrometheusBuilder;

    use super::*;

    struct FlakyService;

    #[async_trait]
    impl SearchService for FlakyService {
        type Output = Vec<String>;

        async fn search(&self, _ctx: &CallContext, query: &str) -> Result<Vec<String>, SearchError> {
            match query {
                "fail" => Err(SearchError::Upstream("boom".to_string())),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Vec::new())
                }
                _ => Ok(vec![query.to_string()]),
            }
        }

        async fn service_status(&self, _ctx: &CallContext) -> Result<u16, SearchError> {
            Ok(200)
        }
    }

    fn run<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(fut)
    }

    fn run_paused<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap()
            .block_on(fut)
    }

    #[test]
    fn records_count_and_latency_with_error_label() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            run(async {
                let svc = InstrumentingLayer::new("test").layer(FlakyService);
                let ctx = CallContext::with_timeout(Duration::from_secs(1));
                assert!(svc.search(&ctx, "ok").await.is_ok());
                assert!(svc.search(&ctx, "fail").await.is_err());
                assert_eq!(svc.service_status(&ctx).await.unwrap(), 200);
            });
        });

        let rendered = handle.render();
        let count_lines: Vec<&str> = rendered
            .lines()
            .filter(|line| line.starts_with(REQUEST_COUNT))
            .collect();
        assert_eq!(count_lines.len(), 3, "{rendered}");
        assert!(count_lines
            .iter()
            .any(|l| l.contains("method=\"search\"") && l.contains("error=\"true\"")));
        assert!(count_lines
            .iter()
            .any(|l| l.contains("method=\"search\"") && l.contains("error=\"false\"")));
        assert!(count_lines
            .iter()
            .any(|l| l.contains("method=\"service_status\"") && l.contains("error=\"false\"")));
        assert!(rendered.contains(REQUEST_LATENCY));
    }

    #[test]
    fn results_pass_through_unchanged() {
        run(async {
            let svc = InstrumentingLayer::new("test").layer(FlakyService);
            let ctx = CallContext::with_timeout(Duration::from_secs(1));
            assert_eq!(svc.search(&ctx, "x").await.unwrap(), vec!["x"]);
            assert_eq!(
                svc.search(&ctx, "fail").await.unwrap_err(),
                SearchError::Upstream("boom".to_string())
            );
        });
    }

    #[test]
    fn cancelled_call_is_counted_once_as_error() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            run_paused(async {
                let svc = InstrumentingLayer::new("test").layer(FlakyService);
                let ctx = CallContext::with_timeout(Duration::from_secs(1));
                let cancelled =
                    tokio::time::timeout(Duration::from_millis(10), svc.search(&ctx, "slow")).await;
                assert!(cancelled.is_err());
            });
        });

        let rendered = handle.render();
        let count_lines: Vec<&str> = rendered
            .lines()
            .filter(|line| line.starts_with(REQUEST_COUNT))
            .collect();
        assert_eq!(count_lines.len(), 1, "{rendered}");
        assert!(count_lines[0].contains("method=\"search\""), "{rendered}");
        assert!(count_lines[0].contains("error=\"true\""), "{rendered}");
        assert!(count_lines[0].ends_with(" 1"), "{rendered}");
    }
}
