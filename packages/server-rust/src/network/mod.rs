//! HTTP listeners: configuration, middleware, handlers, and lifecycle.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use config::NetworkConfig;
pub use handlers::{GatewayState, ProviderState, RuntimeState};
pub use module::{gateway_router, provider_router, NetworkModule};
pub use shutdown::{HealthState, InFlightGuard, ShutdownController};
