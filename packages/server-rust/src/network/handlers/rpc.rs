//! Provider handlers: MessagePack RPC and the plain JSON status endpoint.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use mediagate_core::{Reply, SearchError, StatusRequest, StatusResponse};
use tower::ServiceExt;

use super::{call_context, ProviderState};
use crate::service::transport::{CALL_TIMEOUT_HEADER, MSGPACK_CONTENT_TYPE};
use crate::service::{Call, RpcRequest};

/// Budget the caller asked for, capped at `max`. A missing or malformed
/// header gets the full `max`.
fn requested_budget(headers: &HeaderMap, max: Duration) -> Duration {
    headers
        .get(CALL_TIMEOUT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(max, |ms| Duration::from_millis(ms).min(max))
}

/// `POST /rpc/{method}`.
///
/// Replies 200 with a MessagePack envelope whenever the method ran, even if
/// the service reported an error inside it. Transport faults map to status
/// codes: unknown method 404, undecodable body 400, anything else 500.
pub async fn rpc_handler(
    State(state): State<ProviderState>,
    Path(method): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let budget = requested_budget(&headers, state.max_call_timeout);
    let ctx = call_context(&headers, budget);
    let request = RpcRequest { method, ctx, body };

    match state.rpc.invoke(request).await {
        Ok(reply) => ([(header::CONTENT_TYPE, MSGPACK_CONTENT_TYPE)], reply).into_response(),
        Err(e) => {
            let status = match &e {
                SearchError::UnknownMethod(_) => StatusCode::NOT_FOUND,
                SearchError::TransportDecode(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            tracing::warn!(error = %e, error_kind = e.kind(), "rpc dispatch failed");
            (status, e.to_string()).into_response()
        }
    }
}

/// `GET /status` on a provider.
pub async fn provider_status_handler(
    State(state): State<ProviderState>,
    headers: HeaderMap,
) -> Json<StatusResponse> {
    let ctx = call_context(&headers, state.max_call_timeout);
    let result = state
        .status
        .clone()
        .oneshot(Call::new(ctx, StatusRequest {}))
        .await;
    Json(StatusResponse::from_result(result))
}
