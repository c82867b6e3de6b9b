use std::{
    fmt,
    time::{Duration, SystemTime},
};

use veil::Redact;

/// Bearer credential authorizing calls to the remote playback provider.
///
/// Replaced wholesale on every refresh, never mutated in place. The token
/// value is redacted in debug output.
#[derive(Redact, Clone, PartialEq, Eq)]
pub struct AccessToken {
    #[redact]
    pub token: String,
    pub expires_at: SystemTime,
}

impl AccessToken {
    #[must_use]
    pub fn new(token: String, expires_in: Duration) -> Self {
        Self {
            token,
            expires_at: SystemTime::now() + expires_in,
        }
    }

    #[must_use]
    pub fn time_to_live(&self) -> Duration {
        self.expires_at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_expired() {
        let token = AccessToken::new("secret".to_string(), Duration::from_secs(3600));
        assert!(!token.is_expired());
        assert!(token.time_to_live() > Duration::from_secs(3590));
    }

    #[test]
    fn elapsed_token_is_expired() {
        let token = AccessToken::new("secret".to_string(), Duration::ZERO);
        assert!(token.is_expired());
        assert_eq!(token.time_to_live(), Duration::ZERO);
    }

    #[test]
    fn debug_output_redacts_token() {
        let token = AccessToken::new("super-secret-value".to_string(), Duration::from_secs(60));
        let debugged = format!("{token:?}");
        assert!(!debugged.contains("super-secret-value"));
    }
}
