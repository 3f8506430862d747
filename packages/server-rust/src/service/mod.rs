//! Search services, their endpoints, and the layers around them.
//!
//! 1. **Capability** (`search`): the `SearchService` trait shared by every service
//! 2. **Endpoints** (`endpoint`): `(CallContext, request) -> response` tower services
//! 3. **Middleware** (`middleware`): decorators and resilience layers
//! 4. **Transport** (`transport`, `router`, `client`): MessagePack RPC on both sides
//! 5. **Domain** (`domain`): the fan-out gateway and the provider services
//! 6. **Registry** (`registry`): process-wide resilience state per operation

pub mod client;
pub mod config;
pub mod domain;
pub mod endpoint;
pub mod middleware;
pub mod registry;
pub mod router;
pub mod search;
pub mod transport;

pub use client::backend_endpoints;
pub use config::{GatewayConfig, ProviderConfig, ResilienceConfig, ResilienceSettings};
pub use endpoint::{methods, operation_names, BoxEndpoint, Call, CallContext, EndpointSet};
pub use registry::{OperationSnapshot, ResilienceRegistry, ResilienceState};
pub use router::{RpcRequest, RpcRouter};
pub use search::SearchService;
pub use transport::RpcChannel;
