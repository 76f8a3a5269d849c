//! Errors raised while talking to the GitHub API.

use thiserror::Error;

/// Failure of a single outbound API call.
///
/// Variants carry strings rather than the underlying transport errors so the
/// type is `Clone`: a failed lookup is cached and handed to every caller that
/// was waiting on the same key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request never produced a response (DNS, TLS, connection reset, ...).
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-2xx status where success was required.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// GitHub refused the call because the account's API quota is spent.
    ///
    /// `reset` is the epoch second at which GitHub says the quota refills.
    #[error("GitHub API rate limit exceeded (reset at {reset:?})")]
    RateLimitExceeded { reset: Option<u64> },

    /// The response body did not have the shape we expected.
    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),

    /// A resource template referenced a placeholder with no value.
    #[error("cannot resolve resource template: {0}")]
    Template(String),

    /// A search would not be restricted to any covered organization.
    #[error("no organizations configured to scope the search")]
    NoOrganizations,
}

impl From<reqwest_middleware::Error> for ApiError {
    fn from(err: reqwest_middleware::Error) -> Self {
        ApiError::Network(err.to_string())
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network(err.to_string())
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
