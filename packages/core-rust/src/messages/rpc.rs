//! Request and reply envelopes exchanged between the gateway and a provider.
//!
//! Business errors travel inside the reply (`err`), never as a transport
//! failure: a provider that rejects a query still answers with a well-formed
//! envelope. The client side turns a non-empty `err` back into
//! [`SearchError::Upstream`].

use serde::{Deserialize, Serialize};

use crate::error::SearchError;
use crate::types::HealthStatus;

// ---------------------------------------------------------------------------
// Reply trait
// ---------------------------------------------------------------------------

/// Conversion between a reply envelope and the domain result it carries.
pub trait Reply: Sized {
    /// Domain value carried on success.
    type Output;

    /// Folds a handler result into an envelope (server side).
    fn from_result(result: Result<Self::Output, SearchError>) -> Self;

    /// Unfolds an envelope into a domain result (client side).
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Upstream`] when the envelope carries an error.
    fn into_result(self) -> Result<Self::Output, SearchError>;
}

/// Text placed in `err`. An upstream message is sent bare, since the receiver
/// wraps it in [`SearchError::Upstream`] again.
fn wire_message(e: SearchError) -> String {
    match e {
        SearchError::Upstream(message) => message,
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Find
// ---------------------------------------------------------------------------

/// `find` request: query text forwarded verbatim from the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindRequest {
    pub query: String,
}

/// `find` reply carrying provider records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub err: Option<String>,
}

impl<T> Reply for FindResponse<T> {
    type Output = Vec<T>;

    fn from_result(result: Result<Vec<T>, SearchError>) -> Self {
        match result {
            Ok(items) => Self { items, err: None },
            Err(e) => Self {
                items: Vec::new(),
                err: Some(wire_message(e)),
            },
        }
    }

    fn into_result(self) -> Result<Vec<T>, SearchError> {
        match self.err {
            Some(err) if !err.is_empty() => Err(SearchError::Upstream(err)),
            _ => Ok(self.items),
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// `status` request. Carries no fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRequest {}

/// `status` reply. Also the JSON body of the gateway's `GET /status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub err: Option<String>,
}

impl Reply for StatusResponse {
    type Output = u16;

    fn from_result(result: Result<u16, SearchError>) -> Self {
        match result {
            Ok(status) => Self { status, err: None },
            Err(e) => Self {
                status: HealthStatus::UNAVAILABLE,
                err: Some(wire_message(e)),
            },
        }
    }

    fn into_result(self) -> Result<u16, SearchError> {
        match self.err {
            Some(err) if !err.is_empty() => Err(SearchError::Upstream(err)),
            _ => Ok(self.status),
        }
    }
}

impl From<StatusResponse> for HealthStatus {
    fn from(resp: StatusResponse) -> Self {
        Self {
            code: resp.status,
            error_message: resp.err,
        }
    }
}
