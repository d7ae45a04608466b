use thiserror::Error;

/// Various errors returned while acquiring tokens or running queries.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No refresh token was passed in and none is configured.
    #[error("no refresh token available")]
    MissingCredential,

    /// The OAuth provider rejected the refresh, or answered without an access token. The
    /// provider's payload is kept as-is for diagnostics.
    #[error("token refresh failed{}: {payload}", status_suffix(.status))]
    TokenRefreshFailed {
        status: Option<u16>,
        payload: String,
    },

    /// A required argument was missing or empty. No network call was made.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Non-success response from the query endpoint.
    #[error("query failed with status {status}: {payload}")]
    QueryFailed { status: u16, payload: String },

    /// The response body could not be read in any known encoding.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Required configuration was missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A request body could not be form-encoded.
    #[error("could not encode request: {0}")]
    Encoding(#[from] serde_urlencoded::ser::Error),

    /// Transport-level failure from the HTTP client.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl ClientError {
    /// Whether this error is an authentication failure reported by the query endpoint.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ClientError::QueryFailed { status: 401, .. })
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(status) => format!(" with status {}", status),
        None => String::new(),
    }
}
