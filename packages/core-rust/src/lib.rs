//! `MediaGate` Core: media records, wire envelopes, and the search error taxonomy.

pub mod error;
pub mod messages;
pub mod types;

pub use error::SearchError;
pub use messages::{
    FindRequest, FindResponse, Reply, SearchRequest, SearchResponse, StatusRequest,
    StatusResponse,
};
pub use types::{Album, Book, HealthStatus, MediaItem, MediaKind, SearchQuery, SearchResult};

