//! Wire transport between the gateway and the provider services.
//!
//! Requests and replies are MessagePack (named fields) carried over
//! `POST {base}/rpc/{method}`. [`RpcChannel`] is the pooled connection handle;
//! [`RpcClient`] turns one RPC method into an outbound endpoint.

use std::marker::PhantomData;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use anyhow::Context as _;
use bytes::Bytes;
use mediagate_core::{Reply, SearchError};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tower::Service;

use super::endpoint::{Call, CallContext, EndpointFuture};

pub const MSGPACK_CONTENT_TYPE: &str = "application/msgpack";
/// Remaining call budget in milliseconds, honored by the receiving handler.
pub const CALL_TIMEOUT_HEADER: &str = "x-call-timeout-ms";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Encodes a message for the wire.
///
/// # Errors
///
/// Returns [`SearchError::TransportEncode`] if the value cannot be serialized.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, SearchError> {
    rmp_serde::to_vec_named(value).map_err(|e| SearchError::TransportEncode(e.to_string()))
}

/// Decodes a message from the wire.
///
/// # Errors
///
/// Returns [`SearchError::TransportDecode`] for malformed or mismatched payloads.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SearchError> {
    rmp_serde::from_slice(bytes).map_err(|e| SearchError::TransportDecode(e.to_string()))
}

#[allow(clippy::cast_possible_truncation)]
fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

// ---------------------------------------------------------------------------
// RpcChannel
// ---------------------------------------------------------------------------

/// Pooled connection handle to one provider service.
///
/// Clones share the underlying connection pool, so checking a handle out per
/// call is a reference-count bump.
#[derive(Debug, Clone)]
pub struct RpcChannel {
    client: reqwest::Client,
    base_url: Arc<str>,
}

impl RpcChannel {
    /// Builds a channel to `base_url` with the given connection budget.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn connect(base_url: &str, connect_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .context("failed to build rpc client")?;
        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends an encoded request and returns the encoded reply.
    ///
    /// # Errors
    ///
    /// - [`SearchError::DeadlineExceeded`] if the context has no budget left or
    ///   the exchange outlives it.
    /// - [`SearchError::DownstreamUnavailable`] if the service cannot be reached.
    /// - [`SearchError::UnknownMethod`] if the service has no such method.
    /// - [`SearchError::Upstream`] for any other non-success HTTP status.
    pub async fn invoke(
        &self,
        method: &str,
        ctx: &CallContext,
        body: Vec<u8>,
    ) -> Result<Bytes, SearchError> {
        let budget = ctx.remaining();
        if budget.is_zero() {
            return Err(SearchError::DeadlineExceeded { timeout_ms: 0 });
        }

        let url = format!("{}/rpc/{method}", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, MSGPACK_CONTENT_TYPE)
            .header(CALL_TIMEOUT_HEADER, millis(budget))
            .header(REQUEST_ID_HEADER, &ctx.request_id)
            .timeout(budget)
            .body(body)
            .send()
            .await
            .map_err(|e| map_send_error(&e, budget))?;

        match response.status() {
            status if status.is_success() => response
                .bytes()
                .await
                .map_err(|e| map_send_error(&e, budget)),
            StatusCode::NOT_FOUND => Err(SearchError::UnknownMethod(method.to_string())),
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(SearchError::Upstream(format!("{status}: {detail}")))
            }
        }
    }
}

fn map_send_error(e: &reqwest::Error, budget: Duration) -> SearchError {
    if e.is_timeout() {
        SearchError::DeadlineExceeded {
            timeout_ms: millis(budget),
        }
    } else {
        SearchError::DownstreamUnavailable(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// RpcClient
// ---------------------------------------------------------------------------

/// Outbound endpoint for one RPC method: encodes `Req`, decodes the reply
/// envelope `W`, and unfolds it into `W::Output`.
pub struct RpcClient<Req, W> {
    channel: RpcChannel,
    method: &'static str,
    _marker: PhantomData<fn(Req) -> W>,
}

impl<Req, W> RpcClient<Req, W> {
    #[must_use]
    pub fn new(channel: RpcChannel, method: &'static str) -> Self {
        Self {
            channel,
            method,
            _marker: PhantomData,
        }
    }
}

impl<Req, W> Clone for RpcClient<Req, W> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
            method: self.method,
            _marker: PhantomData,
        }
    }
}

impl<Req, W> Service<Call<Req>> for RpcClient<Req, W>
where
    Req: Serialize + Send + 'static,
    W: Reply + DeserializeOwned + 'static,
    W::Output: Send + 'static,
{
    type Response = W::Output;
    type Error = SearchError;
    type Future = EndpointFuture<W::Output>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: Call<Req>) -> Self::Future {
        let channel = self.channel.clone();
        let method = self.method;
        Box::pin(async move {
            let body = encode(&call.body)?;
            let bytes = channel.invoke(method, &call.ctx, body).await?;
            decode::<W>(&bytes)?.into_result()
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use mediagate_core::{Book, FindRequest, FindResponse, StatusRequest, StatusResponse};
    use tower::ServiceExt;

    use super::*;

    #[test]
    fn decode_rejects_malformed_payloads() {
        let err = decode::<FindRequest>(&[0xc1, 0x00, 0xff]).unwrap_err();
        assert!(matches!(err, SearchError::TransportDecode(_)));

        let wrong_shape = encode(&StatusResponse {
            status: 200,
            err: None,
        })
        .unwrap();
        let err = decode::<FindRequest>(&wrong_shape).unwrap_err();
        assert!(matches!(err, SearchError::TransportDecode(_)));
    }

    #[test]
    fn empty_status_request_decodes() {
        let bytes = encode(&StatusRequest::default()).unwrap();
        assert_eq!(decode::<StatusRequest>(&bytes).unwrap(), StatusRequest {});
    }

    #[test]
    fn channel_trims_trailing_slash() {
        let channel = RpcChannel::connect("http://127.0.0.1:8081/", Duration::from_secs(1)).unwrap();
        assert_eq!(channel.base_url(), "http://127.0.0.1:8081");
    }

    #[tokio::test]
    async fn refused_connection_is_downstream_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let channel =
            RpcChannel::connect(&format!("http://{addr}"), Duration::from_millis(500)).unwrap();
        let client: RpcClient<FindRequest, FindResponse<Book>> = RpcClient::new(channel, "find");
        let call = Call::new(
            CallContext::with_timeout(Duration::from_secs(5)),
            FindRequest {
                query: "dune".to_string(),
            },
        );
        let err = client.oneshot(call).await.unwrap_err();
        assert!(matches!(err, SearchError::DownstreamUnavailable(_)), "{err:?}");
    }

    #[tokio::test]
    async fn expired_context_fails_before_sending() {
        let channel = RpcChannel::connect("http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
        let ctx = CallContext::with_timeout(Duration::ZERO);
        let err = channel.invoke("find", &ctx, Vec::new()).await.unwrap_err();
        assert_eq!(err, SearchError::DeadlineExceeded { timeout_ms: 0 });
    }
}
