//! The capability interface every search service implements.

use std::sync::Arc;

use async_trait::async_trait;
use mediagate_core::SearchError;
use serde::Serialize;

use super::endpoint::CallContext;

/// Search capability: the two operations shared by the gateway, the provider
/// services, and their decorators.
///
/// `Output` is what `search` yields: provider records for a provider,
/// a merged [`mediagate_core::SearchResult`] for the gateway.
#[async_trait]
pub trait SearchService: Send + Sync + 'static {
    type Output: Serialize + Send + Sync + 'static;

    /// Runs a query.
    async fn search(&self, ctx: &CallContext, query: &str) -> Result<Self::Output, SearchError>;

    /// Reports this service's own health as an HTTP-style status code.
    async fn service_status(&self, ctx: &CallContext) -> Result<u16, SearchError>;
}

#[async_trait]
impl<S> SearchService for Arc<S>
where
    S: SearchService + ?Sized,
{
    type Output = S::Output;

    async fn search(&self, ctx: &CallContext, query: &str) -> Result<Self::Output, SearchError> {
        (**self).search(ctx, query).await
    }

    async fn service_status(&self, ctx: &CallContext) -> Result<u16, SearchError> {
        (**self).service_status(ctx).await
    }
}
