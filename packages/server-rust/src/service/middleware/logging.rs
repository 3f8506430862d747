//! Logging decorator for search services.
//!
//! Emits exactly one structured `tracing` event per call with the fields
//! `service`, `method`, `input`, `output`, `error`, and `duration_ms`. The
//! record is written from a drop guard, so a call that is cancelled or panics
//! still produces one (with `error = "call abandoned"`). Successful calls log
//! `error = "none"`.

use std::time::Instant;

use async_trait::async_trait;
use mediagate_core::SearchError;
use serde::Serialize;
use tower::Layer;

use crate::service::endpoint::CallContext;
use crate::service::search::SearchService;

/// Placeholder logged when an output cannot be serialized.
pub const UNFORMATTABLE: &str = "<unformattable>";

// ---------------------------------------------------------------------------
// LoggingLayer
// ---------------------------------------------------------------------------

/// Layer producing [`LoggingMiddleware`], labelled with a service name.
#[derive(Debug, Clone, Copy)]
pub struct LoggingLayer {
    service: &'static str,
}

impl LoggingLayer {
    #[must_use]
    pub fn new(service: &'static str) -> Self {
        Self { service }
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingMiddleware {
            inner,
            service: self.service,
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingMiddleware
// ---------------------------------------------------------------------------

/// Search service wrapper that logs every call. Results pass through untouched.
#[derive(Debug, Clone)]
pub struct LoggingMiddleware<S> {
    inner: S,
    service: &'static str,
}

impl<S> LoggingMiddleware<S> {
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: SearchService> SearchService for LoggingMiddleware<S> {
    type Output = S::Output;

    async fn search(&self, ctx: &CallContext, query: &str) -> Result<S::Output, SearchError> {
        let record = CallRecord::begin(self.service, "search", ctx, query);
        let result = self.inner.search(ctx, query).await;
        record.finish(&result);
        result
    }

    async fn service_status(&self, ctx: &CallContext) -> Result<u16, SearchError> {
        let record = CallRecord::begin(self.service, "service_status", ctx, "");
        let result = self.inner.service_status(ctx).await;
        record.finish(&result);
        result
    }
}

// ---------------------------------------------------------------------------
// CallRecord
// ---------------------------------------------------------------------------

/// Drop guard that writes the log line for one call.
struct CallRecord<'a> {
    service: &'static str,
    method: &'static str,
    request_id: &'a str,
    input: &'a str,
    start: Instant,
    done: bool,
}

impl<'a> CallRecord<'a> {
    fn begin(
        service: &'static str,
        method: &'static str,
        ctx: &'a CallContext,
        input: &'a str,
    ) -> Self {
        Self {
            service,
            method,
            request_id: &ctx.request_id,
            input,
            start: Instant::now(),
            done: false,
        }
    }

    fn finish<T: Serialize>(mut self, result: &Result<T, SearchError>) {
        self.done = true;
        let duration_ms = elapsed_ms(self.start);
        match result {
            Ok(output) => tracing::info!(
                service = self.service,
                method = self.method,
                request_id = self.request_id,
                input = self.input,
                output = %format_output(output),
                error = "none",
                duration_ms,
                "call complete"
            ),
            Err(e) => tracing::info!(
                service = self.service,
                method = self.method,
                request_id = self.request_id,
                input = self.input,
                output = "null",
                error = %e,
                error_kind = e.kind(),
                duration_ms,
                "call complete"
            ),
        }
    }
}

impl Drop for CallRecord<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        tracing::warn!(
            service = self.service,
            method = self.method,
            request_id = self.request_id,
            input = self.input,
            output = "null",
            error = "call abandoned",
            duration_ms = elapsed_ms(self.start),
            "call complete"
        );
    }
}

/// JSON rendering of a call output, or [`UNFORMATTABLE`].
pub fn format_output<T: Serialize + ?Sized>(output: &T) -> String {
    serde_json::to_string(output).unwrap_or_else(|_| UNFORMATTABLE.to_string())
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use serde::ser::Error as _;
    use serde::Serializer;
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    type Fields = BTreeMap<String, String>;

    /// Collects the fields of every event emitted under it.
    #[derive(Clone, Default)]
    struct RecordCapture {
        records: Arc<Mutex<Vec<(tracing::Level, Fields)>>>,
    }

    impl RecordCapture {
        fn install(&self) -> tracing::subscriber::DefaultGuard {
            tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
        }

        fn records(&self) -> Vec<(tracing::Level, Fields)> {
            self.records.lock().unwrap().clone()
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for RecordCapture {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            let mut visitor = FieldVisitor(Fields::new());
            event.record(&mut visitor);
            self.records
                .lock()
                .unwrap()
                .push((*event.metadata().level(), visitor.0));
        }
    }

    struct FieldVisitor(Fields);

    impl tracing::field::Visit for FieldVisitor {
        fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
            self.0.insert(field.name().to_string(), value.to_string());
        }

        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            self.0.insert(field.name().to_string(), format!("{value:?}"));
        }
    }

    const RECORD_FIELDS: [&str; 6] = ["service", "method", "input", "output", "error", "duration_ms"];

    fn assert_record_shape(fields: &Fields) {
        for name in RECORD_FIELDS {
            assert!(fields.contains_key(name), "missing {name}: {fields:?}");
        }
        assert_eq!(fields["message"], "call complete");
    }

    struct FixedService {
        result: Result<Vec<u32>, SearchError>,
    }

    #[async_trait]
    impl SearchService for FixedService {
        type Output = Vec<u32>;

        async fn search(&self, _ctx: &CallContext, query: &str) -> Result<Vec<u32>, SearchError> {
            if query == "slow" {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            self.result.clone()
        }

        async fn service_status(&self, _ctx: &CallContext) -> Result<u16, SearchError> {
            Ok(200)
        }
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("not representable"))
        }
    }

    fn ctx() -> CallContext {
        CallContext::with_timeout(Duration::from_secs(1))
    }

    #[tokio::test]
    async fn passes_success_through() {
        let svc = LoggingLayer::new("test").layer(FixedService {
            result: Ok(vec![1, 2]),
        });
        assert_eq!(svc.search(&ctx(), "q").await.unwrap(), vec![1, 2]);
        assert_eq!(svc.service_status(&ctx()).await.unwrap(), 200);
    }

    #[tokio::test]
    async fn does_not_alter_errors() {
        let svc = LoggingLayer::new("test").layer(FixedService {
            result: Err(SearchError::Upstream("boom".to_string())),
        });
        let err = svc.search(&ctx(), "q").await.unwrap_err();
        assert_eq!(err, SearchError::Upstream("boom".to_string()));
    }

    #[test]
    fn output_placeholder_on_serialize_failure() {
        assert_eq!(format_output(&Unserializable), UNFORMATTABLE);
        let mut map = BTreeMap::new();
        map.insert("a", 1);
        assert_eq!(format_output(&map), r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn success_emits_one_complete_record() {
        let capture = RecordCapture::default();
        let _guard = capture.install();
        let svc = LoggingLayer::new("books").layer(FixedService {
            result: Ok(vec![1, 2]),
        });

        svc.search(&ctx(), "dune").await.unwrap();

        let records = capture.records();
        assert_eq!(records.len(), 1, "{records:?}");
        let (level, fields) = &records[0];
        assert_eq!(*level, tracing::Level::INFO);
        assert_record_shape(fields);
        assert_eq!(fields["service"], "books");
        assert_eq!(fields["method"], "search");
        assert_eq!(fields["input"], "dune");
        assert_eq!(fields["output"], "[1,2]");
        assert_eq!(fields["error"], "none");
    }

    #[tokio::test]
    async fn failure_record_carries_the_error() {
        let capture = RecordCapture::default();
        let _guard = capture.install();
        let svc = LoggingLayer::new("albums").layer(FixedService {
            result: Err(SearchError::Upstream("boom".to_string())),
        });

        svc.search(&ctx(), "help").await.unwrap_err();

        let records = capture.records();
        assert_eq!(records.len(), 1, "{records:?}");
        let (_, fields) = &records[0];
        assert_record_shape(fields);
        assert_eq!(fields["output"], "null");
        assert_eq!(fields["error"], "upstream error: boom");
        assert_eq!(fields["error_kind"], "upstream");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_call_emits_one_abandoned_record() {
        let capture = RecordCapture::default();
        let _guard = capture.install();
        let svc = LoggingLayer::new("books").layer(FixedService {
            result: Ok(vec![]),
        });

        let ctx = ctx();
        let cancelled =
            tokio::time::timeout(Duration::from_millis(10), svc.search(&ctx, "slow")).await;
        assert!(cancelled.is_err());

        let records = capture.records();
        assert_eq!(records.len(), 1, "{records:?}");
        let (level, fields) = &records[0];
        assert_eq!(*level, tracing::Level::WARN);
        assert_record_shape(fields);
        assert_eq!(fields["error"], "call abandoned");
        assert_eq!(fields["input"], "slow");
    }
}
