//! Error types for triage-sources

use std::time::Duration;

use thiserror::Error;
use triage_core::ConfigError;

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Errors raised while talking to an external system.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Upstream answered with a non-success status
    #[error("{service} returned {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// Bug ID absent from the tracker
    #[error("bug {id} not found")]
    NotFound { id: u64 },

    /// Rate limited and the single retry was used up
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON parsing error
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Team configuration was invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Chat API accepted the request but reported a failure
    #[error("chat API error: {0}")]
    Chat(String),
}

impl SourceError {
    /// Whether the error only concerns a single missing bug, so a batch
    /// can skip it and continue.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::NotFound { .. })
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Http(err.to_string())
    }
}

/// Pass `resp` through when it is a 2xx, otherwise read its body into an
/// [`SourceError::Upstream`].
pub(crate) async fn ensure_success(
    service: &'static str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, SourceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SourceError::Upstream {
        service,
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found() {
        assert!(SourceError::NotFound { id: 1 }.is_not_found());
        assert!(!SourceError::Http("boom".into()).is_not_found());
    }

    #[test]
    fn test_display() {
        let err = SourceError::Upstream {
            service: "bugzilla",
            status: 503,
            body: "down".into(),
        };
        assert_eq!(err.to_string(), "bugzilla returned 503: down");
    }

    #[test]
    fn test_config_error_converts() {
        let err: SourceError = ConfigError::DuplicateTeam("Node".into()).into();
        assert!(matches!(err, SourceError::Config(_)));
    }
}
