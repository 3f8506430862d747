//! Endpoint contract shared by business logic and remote invocations.
//!
//! An endpoint is any `tower::Service<Call<R>, Error = SearchError>`: a
//! [`CallContext`] plus a typed request in, a typed response or error out.
//! Server-side endpoints wrap a [`SearchService`]; client-side endpoints wrap
//! the transport. Both are collected into an [`EndpointSet`], which is itself a
//! `SearchService`, so the same decorators apply on either side of a hop.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mediagate_core::{FindRequest, SearchError, StatusRequest};
use serde::Serialize;
use tokio::time::Instant;
use tower::util::{service_fn, BoxCloneSyncService};
use tower::ServiceExt;

use super::search::SearchService;

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

/// RPC method names understood by provider services.
pub mod methods {
    pub const FIND: &str = "find";
    pub const STATUS: &str = "status";
}

/// Backend identities and the named remote operations that own resilience state.
pub mod operation_names {
    pub const BOOKS: &str = "books";
    pub const ALBUMS: &str = "albums";

    pub const BOOKS_FIND: &str = "books.find";
    pub const BOOKS_STATUS: &str = "books.status";
    pub const ALBUMS_FIND: &str = "albums.find";
    pub const ALBUMS_STATUS: &str = "albums.status";

    /// All four named operations, in fan-out order.
    pub const ALL: [&str; 4] = [BOOKS_FIND, BOOKS_STATUS, ALBUMS_FIND, ALBUMS_STATUS];

    /// `"{backend}.{method}"`.
    #[must_use]
    pub fn qualified(backend: &str, method: &str) -> String {
        format!("{backend}.{method}")
    }
}

// ---------------------------------------------------------------------------
// CallContext / Call
// ---------------------------------------------------------------------------

/// Context carried with every endpoint call.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Correlation id, propagated into log records.
    pub request_id: String,
    /// Absolute deadline; work still outstanding at this instant is abandoned.
    pub deadline: Instant,
}

impl CallContext {
    /// Fresh context with a new request id and `timeout` of budget.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            deadline: Instant::now() + timeout,
        }
    }

    /// Child context whose deadline is the earlier of the parent's and
    /// `now + budget`.
    #[must_use]
    pub fn narrowed(&self, budget: Duration) -> Self {
        Self {
            request_id: self.request_id.clone(),
            deadline: self.deadline.min(Instant::now() + budget),
        }
    }

    /// Budget left before the deadline; zero once expired.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// One endpoint invocation: context plus typed request body.
#[derive(Debug, Clone)]
pub struct Call<R> {
    pub ctx: CallContext,
    pub body: R,
}

impl<R> Call<R> {
    #[must_use]
    pub fn new(ctx: CallContext, body: R) -> Self {
        Self { ctx, body }
    }
}

/// Boxed future returned by endpoint middleware.
pub type EndpointFuture<T> = Pin<Box<dyn Future<Output = Result<T, SearchError>> + Send>>;

/// Type-erased endpoint. Cloning is cheap; each call clones and drives a copy.
pub type BoxEndpoint<R, T> = BoxCloneSyncService<Call<R>, T, SearchError>;

// ---------------------------------------------------------------------------
// Server-side endpoint constructors
// ---------------------------------------------------------------------------

/// Wraps a service's `search` operation as an endpoint.
pub fn make_search_endpoint<S>(service: Arc<S>) -> BoxEndpoint<FindRequest, S::Output>
where
    S: SearchService + ?Sized,
{
    BoxCloneSyncService::new(service_fn(move |call: Call<FindRequest>| {
        let service = Arc::clone(&service);
        async move { service.search(&call.ctx, &call.body.query).await }
    }))
}

/// Wraps a service's `service_status` operation as an endpoint.
pub fn make_status_endpoint<S>(service: Arc<S>) -> BoxEndpoint<StatusRequest, u16>
where
    S: SearchService + ?Sized,
{
    BoxCloneSyncService::new(service_fn(move |call: Call<StatusRequest>| {
        let service = Arc::clone(&service);
        async move { service.service_status(&call.ctx).await }
    }))
}

// ---------------------------------------------------------------------------
// EndpointSet
// ---------------------------------------------------------------------------

/// The pair of endpoints exposed by every search service.
///
/// Built from business logic with [`EndpointSet::from_service`], or from
/// transport endpoints on the client side. Either way it behaves as a
/// [`SearchService`] again.
pub struct EndpointSet<O> {
    pub search_endpoint: BoxEndpoint<FindRequest, O>,
    pub status_endpoint: BoxEndpoint<StatusRequest, u16>,
}

impl<O> Clone for EndpointSet<O> {
    fn clone(&self) -> Self {
        Self {
            search_endpoint: self.search_endpoint.clone(),
            status_endpoint: self.status_endpoint.clone(),
        }
    }
}

impl<O: 'static> EndpointSet<O> {
    #[must_use]
    pub fn new(
        search_endpoint: BoxEndpoint<FindRequest, O>,
        status_endpoint: BoxEndpoint<StatusRequest, u16>,
    ) -> Self {
        Self {
            search_endpoint,
            status_endpoint,
        }
    }

    /// Server side: exposes a service's operations as endpoints.
    pub fn from_service<S>(service: Arc<S>) -> Self
    where
        S: SearchService<Output = O> + ?Sized,
    {
        Self {
            search_endpoint: make_search_endpoint(Arc::clone(&service)),
            status_endpoint: make_status_endpoint(service),
        }
    }
}

#[async_trait]
impl<O> SearchService for EndpointSet<O>
where
    O: Serialize + Send + Sync + 'static,
{
    type Output = O;

    async fn search(&self, ctx: &CallContext, query: &str) -> Result<O, SearchError> {
        let call = Call::new(
            ctx.clone(),
            FindRequest {
                query: query.to_string(),
            },
        );
        self.search_endpoint.clone().oneshot(call).await
    }

    async fn service_status(&self, ctx: &CallContext) -> Result<u16, SearchError> {
        let call = Call::new(ctx.clone(), StatusRequest::default());
        self.status_endpoint.clone().oneshot(call).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Echoes the query back and counts calls.
    struct EchoService {
        calls: AtomicU32,
    }

    #[async_trait]
    impl SearchService for EchoService {
        type Output = Vec<String>;

        async fn search(&self, _ctx: &CallContext, query: &str) -> Result<Vec<String>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if query.is_empty() {
                return Err(SearchError::EmptyQuery);
            }
            Ok(vec![query.to_string()])
        }

        async fn service_status(&self, _ctx: &CallContext) -> Result<u16, SearchError> {
            Ok(200)
        }
    }

    fn echo() -> Arc<EchoService> {
        Arc::new(EchoService {
            calls: AtomicU32::new(0),
        })
    }

    #[tokio::test]
    async fn endpoint_set_round_trips_through_the_service() {
        let service = echo();
        let set = EndpointSet::from_service(Arc::clone(&service));
        let ctx = CallContext::with_timeout(Duration::from_secs(1));

        assert_eq!(set.search(&ctx, "beatles").await.unwrap(), vec!["beatles"]);
        assert_eq!(set.service_status(&ctx).await.unwrap(), 200);
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn endpoint_preserves_business_errors() {
        let endpoint = make_search_endpoint(echo());
        let call = Call::new(
            CallContext::with_timeout(Duration::from_secs(1)),
            FindRequest {
                query: String::new(),
            },
        );
        let err = endpoint.oneshot(call).await.unwrap_err();
        assert_eq!(err, SearchError::EmptyQuery);
    }

    #[tokio::test(start_paused = true)]
    async fn narrowed_context_takes_the_earlier_deadline() {
        let parent = CallContext::with_timeout(Duration::from_secs(60));
        let child = parent.narrowed(Duration::from_secs(10));
        assert_eq!(child.request_id, parent.request_id);
        assert_eq!(child.remaining(), Duration::from_secs(10));

        let wider = child.narrowed(Duration::from_secs(120));
        assert_eq!(wider.deadline, child.deadline);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(child.is_expired());
        assert_eq!(child.remaining(), Duration::ZERO);
        assert!(!parent.is_expired());
    }

    #[test]
    fn qualified_operation_names() {
        assert_eq!(
            operation_names::qualified(operation_names::BOOKS, methods::FIND),
            operation_names::BOOKS_FIND
        );
        assert_eq!(
            operation_names::qualified(operation_names::ALBUMS, methods::STATUS),
            operation_names::ALBUMS_STATUS
        );
    }
}
