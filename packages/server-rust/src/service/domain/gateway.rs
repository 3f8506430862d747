//! Fan-out search gateway.
//!
//! One query goes to both backends concurrently. A backend that fails, is
//! rejected by its resilience layers, or misses the operation deadline
//! contributes nothing and marks the result degraded; the search itself still
//! succeeds. Only an empty query fails the request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mediagate_core::{Album, Book, HealthStatus, SearchError, SearchQuery, SearchResult};
use serde::Serialize;

use crate::service::endpoint::{operation_names, CallContext};
use crate::service::search::SearchService;

/// Handle to the book backend.
pub type BookBackend = Arc<dyn SearchService<Output = Vec<Book>>>;
/// Handle to the album backend.
pub type AlbumBackend = Arc<dyn SearchService<Output = Vec<Album>>>;

/// Health of each backend as reported by its status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub books: HealthStatus,
    pub albums: HealthStatus,
}

/// The gateway's business logic.
pub struct MediaSearchGateway {
    books: BookBackend,
    albums: AlbumBackend,
    search_timeout: Duration,
}

impl MediaSearchGateway {
    /// `search_timeout` bounds one whole fan-out, both backends included.
    #[must_use]
    pub fn new(books: BookBackend, albums: AlbumBackend, search_timeout: Duration) -> Self {
        Self {
            books,
            albums,
            search_timeout,
        }
    }

    /// Checks both backends concurrently. Failures become 503 entries rather
    /// than errors.
    pub async fn backend_status(&self, ctx: &CallContext) -> BackendStatus {
        let op_ctx = ctx.narrowed(self.search_timeout);
        let (books, albums) = tokio::join!(
            check_backend(operation_names::BOOKS, self.books.as_ref(), &op_ctx),
            check_backend(operation_names::ALBUMS, self.albums.as_ref(), &op_ctx),
        );
        BackendStatus { books, albums }
    }
}

#[async_trait]
impl SearchService for MediaSearchGateway {
    type Output = SearchResult;

    async fn search(&self, ctx: &CallContext, query: &str) -> Result<SearchResult, SearchError> {
        let query = SearchQuery::parse(query)?;
        let op_ctx = ctx.narrowed(self.search_timeout);

        let (books, albums) = tokio::join!(
            fetch(operation_names::BOOKS, self.books.as_ref(), &op_ctx, &query),
            fetch(operation_names::ALBUMS, self.albums.as_ref(), &op_ctx, &query),
        );

        let degraded = books.is_none() || albums.is_none();
        let mut result = SearchResult::merge(
            books.as_deref().unwrap_or_default(),
            albums.as_deref().unwrap_or_default(),
        );
        result.degraded = degraded;
        Ok(result)
    }

    async fn service_status(&self, _ctx: &CallContext) -> Result<u16, SearchError> {
        Ok(HealthStatus::OK)
    }
}

/// Runs one backend search within the operation deadline. `None` means the
/// backend's contribution was dropped.
async fn fetch<T, S>(
    backend: &str,
    service: &S,
    ctx: &CallContext,
    query: &SearchQuery,
) -> Option<Vec<T>>
where
    S: SearchService<Output = Vec<T>> + ?Sized,
{
    let outcome = tokio::time::timeout_at(ctx.deadline, service.search(ctx, query.as_str())).await;
    match outcome {
        Ok(Ok(items)) => Some(items),
        Ok(Err(e)) => {
            tracing::warn!(
                backend,
                request_id = %ctx.request_id,
                error = %e,
                error_kind = e.kind(),
                "backend search failed, continuing without it"
            );
            None
        }
        Err(_elapsed) => {
            tracing::warn!(
                backend,
                request_id = %ctx.request_id,
                error_kind = "deadline_exceeded",
                "backend search abandoned at operation deadline"
            );
            None
        }
    }
}

async fn check_backend<S>(backend: &str, service: &S, ctx: &CallContext) -> HealthStatus
where
    S: SearchService + ?Sized,
{
    #[allow(clippy::cast_possible_truncation)]
    let timeout_ms = ctx.remaining().as_millis() as u64;
    let outcome = tokio::time::timeout_at(ctx.deadline, service.service_status(ctx))
        .await
        .unwrap_or(Err(SearchError::DeadlineExceeded { timeout_ms }));
    match outcome {
        Ok(code) => HealthStatus {
            code,
            error_message: None,
        },
        Err(e) => {
            tracing::warn!(backend, error = %e, "backend status check failed");
            HealthStatus::unavailable(&e)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
