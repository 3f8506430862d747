//! Client side of a provider: resilient endpoints over an [`RpcChannel`].

use mediagate_core::{FindRequest, FindResponse, StatusRequest, StatusResponse};
use serde::de::DeserializeOwned;

use super::endpoint::{methods, operation_names, EndpointSet};
use super::middleware::pipeline::build_resilient_endpoint;
use super::registry::ResilienceRegistry;
use super::transport::{RpcChannel, RpcClient};

/// Builds the resilient `find` and `status` endpoints of one backend.
///
/// Each method gets the resilience state registered as `"{backend}.{method}"`,
/// so breakers and limiters are shared with every other set built for the
/// same backend from the same registry.
pub fn backend_endpoints<T>(
    channel: &RpcChannel,
    backend: &str,
    registry: &ResilienceRegistry,
) -> EndpointSet<Vec<T>>
where
    T: DeserializeOwned + Send + 'static,
{
    let find_state = registry.state(&operation_names::qualified(backend, methods::FIND));
    let status_state = registry.state(&operation_names::qualified(backend, methods::STATUS));

    let find = RpcClient::<FindRequest, FindResponse<T>>::new(channel.clone(), methods::FIND);
    let status = RpcClient::<StatusRequest, StatusResponse>::new(channel.clone(), methods::STATUS);

    EndpointSet::new(
        build_resilient_endpoint(find, &find_state),
        build_resilient_endpoint(status, &status_state),
    )
}
