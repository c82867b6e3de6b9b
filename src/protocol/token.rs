//! Credential issuance endpoint response types.
//!
//! The issuing endpoint is a trusted collaborator that exchanges its own
//! refresh credentials for short-lived bearer tokens on this client's
//! behalf. A `null` access token means the user has not granted consent
//! yet (or revoked it); the client identification fields accompany that
//! case so the consent URL can be built.
//!
//! # Example Response
//!
//! ```json
//! {
//!     "accessToken": "secret_token",
//!     "expiresInSeconds": 3600,
//!     "clientId": "abc123",
//!     "redirectUri": "http://localhost:3000/callback"
//! }
//! ```

use std::time::Duration;

use serde::Deserialize;
use serde_with::{formats::Flexible, serde_as, DurationSeconds};
use veil::Redact;

/// Response from the credential issuance endpoint.
#[serde_as]
#[derive(Clone, PartialEq, Eq, Deserialize, Redact)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    /// Bearer token, or `None` when re-authorization is required.
    #[redact]
    pub access_token: Option<String>,

    /// How long the token remains valid.
    #[serde_as(as = "DurationSeconds<u64, Flexible>")]
    pub expires_in_seconds: Duration,

    /// OAuth client identifier, used to build the consent URL.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Redirect URI registered for the OAuth client.
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_issued_token() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"accessToken": "secret", "expiresInSeconds": 3600}"#,
        )
        .unwrap();

        assert_eq!(response.access_token.as_deref(), Some("secret"));
        assert_eq!(response.expires_in_seconds, Duration::from_secs(3600));
        assert!(response.client_id.is_none());
    }

    #[test]
    fn parses_missing_token_with_client_info() {
        let response: TokenResponse = serde_json::from_str(
            r#"{
                "accessToken": null,
                "expiresInSeconds": 0,
                "clientId": "abc123",
                "redirectUri": "http://localhost:3000/callback"
            }"#,
        )
        .unwrap();

        assert!(response.access_token.is_none());
        assert_eq!(response.client_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn debug_output_redacts_token() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"accessToken": "super-secret", "expiresInSeconds": 60}"#,
        )
        .unwrap();
        assert!(!format!("{response:?}").contains("super-secret"));
    }
}
