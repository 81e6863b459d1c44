use thiserror::Error;

/// Result type for WLED operations
pub type Result<T> = std::result::Result<T, WledError>;

/// Errors that can occur when talking to WLED devices
#[derive(Error, Debug)]
pub enum WledError {
    /// Request timed out waiting for the device
    #[error("request timeout")]
    Timeout,

    /// Connection refused or host unreachable
    #[error("connection failed: {0}")]
    Connect(String),

    /// Device answered with a non-success HTTP status
    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    /// Response body was not the JSON document we expected
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Local network configuration could not be determined
    #[error("no local IPv4 address: {0}")]
    NoLocalAddress(String),

    /// Anything the transport reported that fits none of the above
    #[error("request failed: {0}")]
    Unknown(String),
}

impl WledError {
    /// Classify a transport error into the connectivity taxonomy.
    ///
    /// Timeouts and refused/unreachable connections are kept distinct so
    /// callers can tell a silent host from a missing one; body decode
    /// failures count as protocol errors.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WledError::Timeout
        } else if err.is_connect() {
            WledError::Connect(err.to_string())
        } else if let Some(status) = err.status() {
            WledError::UnexpectedStatus(status.as_u16())
        } else if err.is_decode() {
            WledError::Protocol(err.to_string())
        } else {
            WledError::Unknown(err.to_string())
        }
    }
}

impl From<reqwest::Error> for WledError {
    fn from(err: reqwest::Error) -> Self {
        WledError::from_transport(err)
    }
}
