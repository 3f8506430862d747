//! RPC routing: dispatches an encoded request to the endpoint registered for
//! its method name.

use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use mediagate_core::{FindResponse, Reply, SearchError, StatusResponse};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tower::util::{service_fn, BoxCloneSyncService};
use tower::{Service, ServiceExt};

use super::endpoint::{methods, BoxEndpoint, Call, CallContext, EndpointFuture, EndpointSet};
use super::search::SearchService;
use super::transport::{decode, encode};

/// One inbound RPC: method name, call context, and the undecoded body.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    pub method: String,
    pub ctx: CallContext,
    pub body: Bytes,
}

// ---------------------------------------------------------------------------
// RpcRouter
// ---------------------------------------------------------------------------

/// Routes [`RpcRequest`] values to the endpoint registered for their method.
///
/// A handler decodes the body, runs its endpoint bounded by the context
/// deadline, and encodes the outcome as a reply envelope. Business errors are
/// folded into the envelope; only an undecodable request (`TransportDecode`),
/// an unregistered method (`UnknownMethod`), or an unencodable reply
/// (`TransportEncode`) surface as `Err`.
#[derive(Clone, Default)]
pub struct RpcRouter {
    handlers: HashMap<&'static str, BoxEndpoint<Bytes, Vec<u8>>>,
}

impl RpcRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Router exposing `find` and `status` for a provider service.
    pub fn for_service<S, T>(service: Arc<S>) -> Self
    where
        S: SearchService<Output = Vec<T>>,
        T: Serialize + Send + Sync + 'static,
    {
        let endpoints = EndpointSet::from_service(service);
        let mut router = Self::new();
        router.register::<_, FindResponse<T>>(methods::FIND, endpoints.search_endpoint);
        router.register::<_, StatusResponse>(methods::STATUS, endpoints.status_endpoint);
        router
    }

    /// Registers `endpoint` under `method`, replying with envelope `W`.
    pub fn register<Req, W>(&mut self, method: &'static str, endpoint: BoxEndpoint<Req, W::Output>)
    where
        Req: DeserializeOwned + Send + 'static,
        W: Reply + Serialize + 'static,
        W::Output: Send + 'static,
    {
        let handler = service_fn(move |call: Call<Bytes>| {
            let endpoint = endpoint.clone();
            async move {
                let request: Req = decode(&call.body)?;
                let deadline = call.ctx.deadline;
                #[allow(clippy::cast_possible_truncation)]
                let timeout_ms = call.ctx.remaining().as_millis() as u64;
                let result = tokio::time::timeout_at(deadline, endpoint.oneshot(Call::new(call.ctx, request)))
                    .await
                    .unwrap_or(Err(SearchError::DeadlineExceeded { timeout_ms }));
                encode(&W::from_result(result))
            }
        });
        self.handlers.insert(method, BoxCloneSyncService::new(handler));
    }

    /// Registered method names, sorted.
    #[must_use]
    pub fn methods(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Dispatches one request.
    ///
    /// # Errors
    ///
    /// See the type-level docs for which failures are returned rather than
    /// encoded into the reply.
    pub async fn invoke(&self, request: RpcRequest) -> Result<Vec<u8>, SearchError> {
        self.clone().oneshot(request).await
    }
}

impl Service<RpcRequest> for RpcRouter {
    type Response = Vec<u8>;
    type Error = SearchError;
    type Future = EndpointFuture<Vec<u8>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: RpcRequest) -> Self::Future {
        match self.handlers.get(request.method.as_str()) {
            Some(handler) => {
                let handler = handler.clone();
                Box::pin(handler.oneshot(Call::new(request.ctx, request.body)))
            }
            None => Box::pin(async move { Err(SearchError::UnknownMethod(request.method)) }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
