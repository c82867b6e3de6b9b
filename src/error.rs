//! Error handling for tunelink.
//!
//! A single [`enum@Error`] covers every failure the session subsystem can
//! produce. All failures are handled locally (logged, optionally retried)
//! and none are fatal to the hosting application: the worst user-visible
//! outcome is a session that stays in a not-ready state.

use thiserror::Error;

/// Standard result type for tunelink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures produced by the playback session subsystem.
#[derive(Error, Debug)]
pub enum Error {
    /// An internal invariant did not hold.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// No valid access token is currently available.
    ///
    /// Dependents degrade to a not-ready state until the provider publishes
    /// a fresh token or re-authorization completes.
    #[error("no valid access token available")]
    CredentialUnavailable,

    /// No playback device handle is currently available.
    #[error("no playback device available")]
    DeviceNotReady,

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// The remote endpoint answered with a non-success status code.
    #[error("unexpected HTTP status: {0}")]
    StatusCode(http::StatusCode),

    #[error("parsing JSON error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("parsing URL failed: {0}")]
    UrlParse(#[from] url::ParseError),

    /// The external playback SDK reported a failure.
    #[error("playback SDK error: {0}")]
    Sdk(String),
}

impl Error {
    /// Whether the error indicates a rejected or expired credential.
    ///
    /// Used to distinguish failures that warrant re-authorization from
    /// transient network errors that warrant a plain retry.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::CredentialUnavailable => true,
            Self::StatusCode(status) => *status == http::StatusCode::UNAUTHORIZED,
            _ => false,
        }
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        Self::Assertion(e.to_string())
    }
}
