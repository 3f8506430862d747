//! HTTP middleware shared by the gateway and provider listeners.
//!
//! The first layer listed is the outermost: it sees the request first and
//! the response last.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::HeaderName;
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;
use super::shutdown::{HealthState, ShutdownController};
use crate::service::transport::REQUEST_ID_HEADER;

/// The composed layer type produced by [`build_http_layers`].
type HttpLayers = tower::layer::util::Stack<
    PropagateRequestIdLayer,
    tower::layer::util::Stack<
        TimeoutLayer,
        tower::layer::util::Stack<
            CorsLayer,
            tower::layer::util::Stack<
                TraceLayer<
                    tower_http::classify::SharedClassifier<
                        tower_http::classify::ServerErrorsAsFailures,
                    >,
                >,
                tower::layer::util::Stack<
                    SetRequestIdLayer<MakeRequestUuid>,
                    tower::layer::util::Identity,
                >,
            >,
        >,
    >,
>;

/// Builds the transport-level stack applied to every route.
///
/// 1. `SetRequestId`: assigns a UUID `x-request-id` unless the caller sent one
/// 2. `Trace`: one span per request
/// 3. `CORS`
/// 4. `Timeout`: 408 once `request_timeout` elapses
/// 5. `PropagateRequestId`: echoes `x-request-id` on the response
///
/// Handlers read the request id from the headers and carry it into the
/// [`CallContext`](crate::service::CallContext) so RPC hops and call logs share it.
#[must_use]
pub fn build_http_layers(config: &NetworkConfig) -> HttpLayers {
    let x_request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&config.cors_origins))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .into_inner()
}

/// `"*"` allows any origin; otherwise only the parseable entries are allowed.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

/// Route middleware for request-serving routes.
///
/// Refuses new work with 503 once the process is draining, and otherwise
/// holds an in-flight guard for the lifetime of the request so shutdown can
/// wait for it.
pub async fn track_in_flight(
    State(shutdown): State<Arc<ShutdownController>>,
    request: Request,
    next: Next,
) -> Response {
    if matches!(
        shutdown.state(),
        HealthState::Draining | HealthState::Stopped
    ) {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    let _guard = shutdown.track();
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::header;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    use super::*;

    fn work_router(shutdown: &Arc<ShutdownController>, config: &NetworkConfig) -> Router {
        let counter = Arc::clone(shutdown);
        Router::new()
            .route(
                "/work",
                get(move || {
                    let counter = Arc::clone(&counter);
                    async move { counter.in_flight().to_string() }
                }),
            )
            .route_layer(axum::middleware::from_fn_with_state(
                Arc::clone(shutdown),
                track_in_flight,
            ))
            .layer(build_http_layers(config))
    }

    fn get_work() -> Request {
        axum::http::Request::builder()
            .uri("/work")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn request_is_counted_while_running() {
        let shutdown = Arc::new(ShutdownController::new());
        shutdown.mark_ready();

        let response = work_router(&shutdown, &NetworkConfig::default()).oneshot(get_work()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"1");
        assert_eq!(shutdown.in_flight(), 0);
    }

    #[tokio::test]
    async fn draining_refuses_new_requests() {
        let shutdown = Arc::new(ShutdownController::new());
        shutdown.mark_ready();
        shutdown.trigger();

        let response = work_router(&shutdown, &NetworkConfig::default()).oneshot(get_work()).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn caller_request_id_is_echoed() {
        let shutdown = Arc::new(ShutdownController::new());
        shutdown.mark_ready();
        let request = axum::http::Request::builder()
            .uri("/work")
            .header(REQUEST_ID_HEADER, "abc-123")
            .body(Body::empty())
            .unwrap();

        let response = work_router(&shutdown, &NetworkConfig::default()).oneshot(request).await.unwrap();
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "abc-123");
    }

    #[tokio::test]
    async fn cors_allows_only_listed_origins() {
        let shutdown = Arc::new(ShutdownController::new());
        shutdown.mark_ready();
        let config = NetworkConfig {
            cors_origins: vec!["http://localhost:3000".to_string()],
            request_timeout: Duration::from_secs(5),
            ..NetworkConfig::default()
        };
        let from = |origin: &str| {
            axum::http::Request::builder()
                .uri("/work")
                .header(header::ORIGIN, origin)
                .body(Body::empty())
                .unwrap()
        };

        let allowed = work_router(&shutdown, &config)
            .oneshot(from("http://localhost:3000"))
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
        assert_eq!(
            allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );

        let foreign = work_router(&shutdown, &config)
            .oneshot(from("http://evil.example"))
            .await
            .unwrap();
        assert!(!foreign
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn wildcard_cors_allows_any_origin() {
        let shutdown = Arc::new(ShutdownController::new());
        shutdown.mark_ready();
        let request = axum::http::Request::builder()
            .uri("/work")
            .header(header::ORIGIN, "http://anywhere.example")
            .body(Body::empty())
            .unwrap();

        let response = work_router(&shutdown, &NetworkConfig::default())
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
