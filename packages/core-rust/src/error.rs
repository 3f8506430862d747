//! Error taxonomy for search calls.
//!
//! Only [`SearchError::EmptyQuery`] is a request-level failure for gateway
//! callers. Every other variant describes why one downstream call failed and
//! is recovered by the fan-out aggregator.

/// Errors produced anywhere along a search call path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    /// The query text was empty or whitespace.
    #[error("query is empty")]
    EmptyQuery,
    /// The downstream service could not be reached.
    #[error("downstream unavailable: {0}")]
    DownstreamUnavailable(String),
    /// No rate-limit token was available for the named operation.
    #[error("rate limit exceeded for {operation}")]
    RateLimitExceeded { operation: String },
    /// The named operation's circuit breaker rejected the call.
    #[error("circuit open for {operation}")]
    CircuitOpen { operation: String },
    /// The call did not complete within its budget.
    #[error("deadline exceeded after {timeout_ms}ms")]
    DeadlineExceeded { timeout_ms: u64 },
    /// A wire payload could not be decoded.
    #[error("transport decode error: {0}")]
    TransportDecode(String),
    /// A request could not be encoded for the wire.
    #[error("transport encode error: {0}")]
    TransportEncode(String),
    /// The remote service (or its upstream API) reported a failure.
    #[error("upstream error: {0}")]
    Upstream(String),
    /// No handler is registered for the requested RPC method.
    #[error("unknown method: {0}")]
    UnknownMethod(String),
}

impl SearchError {
    /// Stable snake_case label for logs and metric labels.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "validation",
            Self::DownstreamUnavailable(_) => "downstream_unavailable",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::DeadlineExceeded { .. } => "deadline_exceeded",
            Self::TransportDecode(_) => "transport_decode",
            Self::TransportEncode(_) => "transport_encode",
            Self::Upstream(_) => "upstream",
            Self::UnknownMethod(_) => "unknown_method",
        }
    }

    /// Whether this error must be surfaced to the gateway caller.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::EmptyQuery)
    }

    /// Whether the call was rejected locally before reaching the transport.
    #[must_use]
    pub fn is_local_rejection(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded { .. } | Self::CircuitOpen { .. }
        )
    }
}
