//! Error types for remote calls and sync cycles.

use thiserror::Error;

/// Failure of a single call against the trips backend.
///
/// None of these are retried within the call. An entity whose create failed
/// keeps no server id and is offered again on the next cycle.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// No bearer token configured
    #[error("Authentication missing: no bearer token configured")]
    AuthenticationMissing,

    /// The request body could not be encoded
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Transport-level failure (DNS, connect, timeout, ...)
    #[error("Network error: {0}")]
    Network(String),

    /// The backend answered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// A response body was required but none was sent
    #[error("Empty response body")]
    EmptyBody,

    /// The response body did not match the expected record shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// The response decoded but lacks a field the caller depends on
    #[error("Unexpected response: {0}")]
    Unexpected(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RemoteError::Decode(e.to_string())
        } else {
            RemoteError::Network(e.to_string())
        }
    }
}

/// Failure of a whole sync cycle or engine operation.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A cycle is already in flight on this engine
    #[error("A sync cycle is already running")]
    AlreadyRunning,

    /// The caller's cancel token fired
    #[error("Sync cancelled")]
    Cancelled,

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Local persistence failed
    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
