//! Gateway handlers: `/search`, `/status`, and `/status/backends`.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use mediagate_core::{Reply, SearchRequest, SearchResponse, StatusResponse};
use serde::Serialize;

use super::{call_context, GatewayState};
use crate::service::domain::BackendStatus;
use crate::service::OperationSnapshot;

/// `POST /search`.
///
/// Downstream failures never fail the request; they surface as
/// `degraded: true`. An empty query is the only 400.
pub async fn search_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(request): Json<SearchRequest>,
) -> (StatusCode, Json<SearchResponse>) {
    let ctx = call_context(&headers, state.search_timeout);
    match state.search.search(&ctx, &request.query).await {
        Ok(result) => (StatusCode::OK, Json(result.into())),
        Err(e) if e.is_validation() => (StatusCode::BAD_REQUEST, Json((&e).into())),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json((&e).into())),
    }
}

/// `GET /status`: the gateway's own health.
pub async fn status_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> Json<StatusResponse> {
    let ctx = call_context(&headers, state.search_timeout);
    Json(StatusResponse::from_result(
        state.search.service_status(&ctx).await,
    ))
}

/// Body of `GET /status/backends`.
#[derive(Debug, Serialize)]
pub struct BackendReport {
    #[serde(flatten)]
    pub backends: BackendStatus,
    pub breakers: Vec<OperationSnapshot>,
}

/// `GET /status/backends`: checks each backend through its resilient status
/// endpoint and lists every breaker's current state.
pub async fn backend_status_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
) -> Json<BackendReport> {
    let ctx = call_context(&headers, state.search_timeout);
    let backends = state.gateway.backend_status(&ctx).await;
    Json(BackendReport {
        backends,
        breakers: state.registry.snapshot(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use mediagate_core::{Album, Book, SearchError};

    use super::*;
    use crate::network::handlers::RuntimeState;
    use crate::network::ShutdownController;
    use crate::service::domain::MediaSearchGateway;
    use crate::service::{CallContext, ResilienceRegistry, SearchService};

    struct Books;

    #[async_trait]
    impl SearchService for Books {
        type Output = Vec<Book>;

        async fn search(&self, _ctx: &CallContext, query: &str) -> Result<Vec<Book>, SearchError> {
            Ok(vec![Book {
                title: query.to_string(),
                author: "Anon".to_string(),
            }])
        }

        async fn service_status(&self, _ctx: &CallContext) -> Result<u16, SearchError> {
            Ok(200)
        }
    }

    struct DownAlbums;

    #[async_trait]
    impl SearchService for DownAlbums {
        type Output = Vec<Album>;

        async fn search(&self, _ctx: &CallContext, _query: &str) -> Result<Vec<Album>, SearchError> {
            Err(SearchError::DownstreamUnavailable("refused".to_string()))
        }

        async fn service_status(&self, _ctx: &CallContext) -> Result<u16, SearchError> {
            Err(SearchError::DownstreamUnavailable("refused".to_string()))
        }
    }

    fn state() -> GatewayState {
        let gateway = Arc::new(MediaSearchGateway::new(
            Arc::new(Books),
            Arc::new(DownAlbums),
            Duration::from_secs(5),
        ));
        let registry = Arc::new(ResilienceRegistry::default());
        registry.state("albums.find");
        GatewayState {
            runtime: Arc::new(RuntimeState::new(
                "gateway",
                Arc::new(ShutdownController::new()),
                None,
            )),
            search: gateway.clone(),
            gateway,
            registry,
            search_timeout: Duration::from_secs(5),
        }
    }

    fn query(text: &str) -> Json<SearchRequest> {
        Json(SearchRequest {
            query: text.to_string(),
        })
    }

    #[tokio::test]
    async fn partial_results_are_degraded_not_failed() {
        let (status, Json(body)) =
            search_handler(State(state()), HeaderMap::new(), query("dune")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.data.len(), 1);
        assert_eq!(body.data[0].title(), "dune");
        assert!(body.degraded);
        assert!(body.err.is_none());
    }

    #[tokio::test]
    async fn empty_query_is_bad_request() {
        let (status, Json(body)) =
            search_handler(State(state()), HeaderMap::new(), query("   ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.data.is_empty());
        assert_eq!(body.err.as_deref(), Some("query is empty"));
    }

    #[tokio::test]
    async fn status_reports_gateway_only() {
        let Json(body) = status_handler(State(state()), HeaderMap::new()).await;
        assert_eq!(body.status, 200);
        assert!(body.err.is_none());
    }

    #[tokio::test]
    async fn backend_report_lists_backends_and_breakers() {
        let Json(report) = backend_status_handler(State(state()), HeaderMap::new()).await;
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["books"]["code"], 200);
        assert_eq!(json["albums"]["code"], 503);
        assert_eq!(json["breakers"][0]["operation"], "albums.find");
        assert_eq!(json["breakers"][0]["state"], "closed");
    }
}
