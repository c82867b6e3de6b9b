use std::{fs, io};

use serde::Deserialize;
use url::Url;

/// Default base URL of the Spotify Web API.
const API_URL: &str = "https://api.spotify.com/v1/";

/// Default base URL of the authorization (consent) endpoint.
const ACCOUNTS_URL: &str = "https://accounts.spotify.com/authorize";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,

    /// Player name as it appears to other Spotify clients.
    pub device_name: String,

    /// Trusted endpoint that issues bearer tokens for this client.
    pub token_endpoint: Url,

    /// Base URL for Web API calls.
    pub api_url: Url,

    /// Base URL for the authorization consent page.
    pub accounts_url: Url,

    /// Path the authorization flow should return the user to, carried as the
    /// opaque `state` parameter.
    pub return_path: String,

    pub user_agent: String,
}

impl Config {
    /// # Panics
    ///
    /// Panics when the compile-time application metadata cannot form a valid
    /// `User-Agent` string.
    #[must_use]
    pub fn with_token_endpoint(token_endpoint: Url) -> Self {
        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();

        // Additional `User-Agent` string checks on top of `reqwest::HeaderValue`.
        let illegal_chars = |chr| chr == '/' || chr == ';';
        if app_name.is_empty()
            || app_name.contains(illegal_chars)
            || app_version.is_empty()
            || app_version.contains(illegal_chars)
        {
            panic!("application name and/or version invalid (\"{app_name}\"; \"{app_version}\")");
        }

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let os_version = sysinfo::System::os_version().unwrap_or_else(|| String::from("0"));
        if os_name.is_empty()
            || os_name.contains(illegal_chars)
            || os_version.is_empty()
            || os_version.contains(illegal_chars)
        {
            panic!("os name and/or version invalid (\"{os_name}\"; \"{os_version}\")");
        }

        let user_agent = format!("{app_name}/{app_version} (Rust; {os_name}/{os_version})");
        trace!("user agent: {user_agent}");

        let device_name = sysinfo::System::host_name().unwrap_or_else(|| app_name.clone());

        Self {
            app_name,
            app_version,
            device_name,
            token_endpoint,
            api_url: Url::parse(API_URL).expect("invalid api url"),
            accounts_url: Url::parse(ACCOUNTS_URL).expect("invalid accounts url"),
            return_path: String::from("/"),
            user_agent,
        }
    }
}

/// Settings as read from the optional TOML settings file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub token_endpoint: Option<Url>,
    pub device_name: Option<String>,
    pub return_path: Option<String>,
}

impl Settings {
    /// Loads settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read, is unreasonably large,
    /// or does not parse as TOML.
    pub fn from_file(settings_file: &str) -> io::Result<Self> {
        // Prevent out-of-memory condition: the settings file should be small.
        let attributes = fs::metadata(settings_file)?;
        if attributes.len() > 1024 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{settings_file} is too large"),
            ));
        }

        let contents = fs::read_to_string(settings_file)?;
        toml::from_str(&contents).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{settings_file} format is invalid: {e}"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let endpoint = Url::parse("http://localhost:3000/spotify").unwrap();
        let config = Config::with_token_endpoint(endpoint.clone());

        assert_eq!(config.token_endpoint, endpoint);
        assert_eq!(config.return_path, "/");
        assert!(config.user_agent.starts_with(&config.app_name));
        assert!(!config.device_name.is_empty());
    }

    #[test]
    fn settings_parse() {
        let settings: Settings = toml::from_str(
            r#"
            token_endpoint = "http://localhost:3000/spotify"
            device_name = "Living Room"
            "#,
        )
        .unwrap();

        assert_eq!(settings.device_name.as_deref(), Some("Living Room"));
        assert!(settings.return_path.is_none());
        assert_eq!(
            settings.token_endpoint.unwrap().as_str(),
            "http://localhost:3000/spotify"
        );
    }
}
