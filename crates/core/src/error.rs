//! Error type for the storage and synthesis capabilities.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The requested asset does not exist in storage.
    #[error("not found: {key}")]
    NotFound { key: String },

    /// Non-success status returned by a remote service.
    #[error("api error: HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Error::Api {
            status,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Error::Api { status: 429, .. })
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Api { status, .. } if *status >= 500)
    }

    /// Timeouts, connection failures, 429 and 5xx may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            _ => self.is_rate_limit() || self.is_server_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(Error::api(429, "slow down").is_retryable());
        assert!(Error::api(503, "unavailable").is_retryable());
        assert!(!Error::api(401, "bad key").is_retryable());
        assert!(!Error::api(422, "bad text").is_retryable());
    }

    #[test]
    fn test_not_found_is_not_retried() {
        let e = Error::NotFound { key: "x/dog.wav".into() };
        assert!(e.is_not_found());
        assert!(!e.is_retryable());
    }

    #[test]
    fn test_malformed_request_is_not_retried() {
        let err = reqwest::blocking::Client::new()
            .get("not a url")
            .send()
            .unwrap_err();
        assert!(!Error::from(err).is_retryable());
    }

    #[test]
    fn test_display() {
        let e = Error::api(500, "boom");
        assert_eq!(e.to_string(), "api error: HTTP 500: boom");
    }
}
