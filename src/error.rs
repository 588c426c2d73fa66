use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised by market-data provider calls.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection dropped, timed out, or the provider answered with a
    /// temporary failure status. Retried by [`crate::retry::RetryPolicy`].
    #[error("transient connectivity error: {0}")]
    Transient(String),

    /// The provider has nothing usable for this symbol.
    #[error("no data available: {0}")]
    DataUnavailable(String),

    /// The provider answered but the payload could not be understood.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The provider refused the request itself (auth, quota, bad query).
    /// Asking again gives the same answer.
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Default retry predicate: only connectivity problems are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }

    /// Maps a non-success HTTP status. Only throttling and server-side
    /// failures are transient.
    pub fn from_status(status: StatusCode, context: &str) -> Self {
        let message = format!("{context}: HTTP {status}");
        if status == StatusCode::NOT_FOUND {
            FetchError::DataUnavailable(message)
        } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            FetchError::Transient(message)
        } else {
            FetchError::Rejected(message)
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return FetchError::Malformed(err.to_string());
        }
        if let Some(status) = err.status() {
            let url = err.url().map(|u| u.as_str()).unwrap_or("request");
            return FetchError::from_status(status, url);
        }
        // A body cut off mid-read is a dropped connection as well.
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            return FetchError::Transient(err.to_string());
        }
        FetchError::Rejected(err.to_string())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum IndicatorError {
    #[error("insufficient data: need {required} bars, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("invalid indicator parameter: {0}")]
    InvalidParameter(String),
}

/// Per-symbol failure. Caught by the scan orchestrator and logged; never
/// aborts a run.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Indicator(#[from] IndicatorError),

    #[error("computation failed: {0}")]
    Computation(String),
}
