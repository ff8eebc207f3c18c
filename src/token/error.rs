use thiserror::Error;

/// Failure talking to a provider's token endpoint.
///
/// Returned by both the refresh grant and the authorization-code exchange.
/// None of these are retried.
#[derive(Error, Debug)]
pub enum RefreshError {
    /// Transport failure (DNS, connect, TLS, timeout)
    #[error("Token endpoint request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx response; `body` is the provider's raw payload
    #[error("Token endpoint returned {status}: {body}")]
    ProviderRejection {
        status: reqwest::StatusCode,
        body: String,
    },

    /// 2xx response whose body is not a usable token response
    #[error("Invalid token endpoint response: {0}")]
    InvalidResponse(String),
}

impl RefreshError {
    /// True when the provider refused the grant (revoked or invalid refresh
    /// token) rather than being unreachable.
    pub fn is_rejection(&self) -> bool {
        matches!(self, RefreshError::ProviderRejection { .. })
    }
}

/// Why the accessor could not produce a usable credential.
#[derive(Error, Debug)]
pub enum AccessError {
    /// Slot is empty, unreadable or incomplete; the user must authorize
    #[error("No stored credentials")]
    NoCredential,

    /// Stored token is expired and the refresh attempt failed
    #[error("Token refresh failed: {0}")]
    RefreshFailed(#[from] RefreshError),
}
