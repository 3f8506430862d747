//! Prometheus scrape endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use super::RuntimeState;

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Renders the text exposition, or 404 when no recorder is installed.
pub async fn metrics_handler(State(runtime): State<Arc<RuntimeState>>) -> Response {
    match &runtime.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use metrics_exporter_prometheus::PrometheusBuilder;

    use super::*;
    use crate::network::ShutdownController;

    #[tokio::test]
    async fn missing_recorder_is_not_found() {
        let rt = Arc::new(RuntimeState::new(
            "books",
            Arc::new(ShutdownController::new()),
            None,
        ));
        let response = metrics_handler(State(rt)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn renders_recorded_metrics() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("mediagate_request_count", "service" => "books").increment(1);
        });

        let rt = Arc::new(RuntimeState::new(
            "books",
            Arc::new(ShutdownController::new()),
            Some(handle),
        ));
        let response = metrics_handler(State(rt)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("mediagate_request_count"), "{text}");
    }
}
