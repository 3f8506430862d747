//! Wire envelopes.
//!
//! - [`rpc`]: gateway-to-provider envelopes, carried as named `MsgPack`
//!   (`rmp_serde::to_vec_named()`) with camelCase field names.
//! - [`search`]: public JSON payloads of the gateway's HTTP surface.

pub mod rpc;
pub mod search;

pub use rpc::{FindRequest, FindResponse, Reply, StatusRequest, StatusResponse};
pub use search::{SearchRequest, SearchResponse};
