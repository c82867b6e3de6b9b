//! Typed client for the Spotify Web API endpoints this crate uses.
//!
//! Every call is bearer-authenticated with the latest token published by
//! the credential provider; callers never pass tokens around. Requests go
//! through the rate-limited [`crate::http::Client`].

use std::time::Duration;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use tokio::sync::watch;
use url::Url;

use crate::{
    error::{Error, Result},
    http::Client as HttpClient,
    protocol::{
        devices::DeviceList,
        player::{PlayBody, PlayerState},
        track::Track,
    },
    tokens::AccessToken,
};

/// Bearer-authenticated Web API client.
///
/// Cheap to share behind an [`std::sync::Arc`]; all methods take `&self`.
pub struct WebApi {
    http_client: HttpClient,
    api_url: Url,
    tokens: watch::Receiver<Option<AccessToken>>,
}

impl WebApi {
    /// Creates a new client against `api_url` (must end with a slash so
    /// endpoint paths join onto it).
    ///
    /// `tokens` is the credential provider's output; a request made while
    /// it holds `None` fails with [`Error::CredentialUnavailable`] without
    /// touching the network.
    #[must_use]
    pub fn new(
        http_client: HttpClient,
        api_url: Url,
        tokens: watch::Receiver<Option<AccessToken>>,
    ) -> Self {
        Self {
            http_client,
            api_url,
            tokens,
        }
    }

    /// `Authorization` header for the current token.
    fn bearer(&self) -> Result<HeaderValue> {
        let token = self
            .tokens
            .borrow()
            .as_ref()
            .map(|token| token.token.clone())
            .ok_or(Error::CredentialUnavailable)?;

        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
        value.set_sensitive(true);
        Ok(value)
    }

    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Result<Url> {
        let mut url = self.api_url.join(path)?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    /// Executes a request with the bearer header attached, mapping
    /// non-success statuses to [`Error::StatusCode`].
    async fn execute(&self, mut request: reqwest::Request) -> Result<reqwest::Response> {
        request.headers_mut().insert(AUTHORIZATION, self.bearer()?);

        let response = self.http_client.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::StatusCode(status));
        }

        Ok(response)
    }

    /// Lists the user's currently registered devices.
    ///
    /// Used as the recycled-device fallback when the SDK reports readiness
    /// without an identifier.
    pub async fn devices(&self) -> Result<DeviceList> {
        let url = self.endpoint("me/player/devices", &[])?;
        let response = self.execute(self.http_client.get(url, "")).await?;
        response.json::<DeviceList>().await.map_err(Into::into)
    }

    /// Looks up display metadata for a single track.
    pub async fn track(&self, track_id: &str) -> Result<Track> {
        let url = self.endpoint(&format!("tracks/{track_id}"), &[])?;
        let response = self.execute(self.http_client.get(url, "")).await?;
        response.json::<Track>().await.map_err(Into::into)
    }

    /// Current playback state across all of the user's devices.
    ///
    /// Returns `None` when nothing is playing anywhere (the endpoint
    /// answers `204 No Content`).
    pub async fn player_state(&self) -> Result<Option<PlayerState>> {
        let url = self.endpoint("me/player", &[])?;
        let response = self.execute(self.http_client.get(url, "")).await?;

        if response.status() == http::StatusCode::NO_CONTENT {
            return Ok(None);
        }

        response
            .json::<PlayerState>()
            .await
            .map(Some)
            .map_err(Into::into)
    }

    /// Starts playback of a track on the given device, optionally from a
    /// position other than the start.
    pub async fn play(
        &self,
        device_id: &str,
        track_id: &str,
        position: Option<Duration>,
    ) -> Result<()> {
        let url = self.endpoint(
            "me/player/play",
            &[("device_id", device_id.to_string())],
        )?;
        let body = serde_json::to_string(&PlayBody::track(track_id, position))?;
        self.execute(self.http_client.put(url, body)).await?;
        Ok(())
    }

    /// Pauses playback on the given device.
    pub async fn pause(&self, device_id: &str) -> Result<()> {
        let url = self.endpoint(
            "me/player/pause",
            &[("device_id", device_id.to_string())],
        )?;
        self.execute(self.http_client.put(url, "")).await?;
        Ok(())
    }

    /// Seeks within the current track.
    ///
    /// Without a device id the command addresses whichever device is
    /// currently active.
    pub async fn seek(&self, device_id: Option<&str>, position: Duration) -> Result<()> {
        let mut query = vec![(
            "position_ms",
            u64::try_from(position.as_millis())
                .unwrap_or(u64::MAX)
                .to_string(),
        )];
        if let Some(device_id) = device_id {
            query.push(("device_id", device_id.to_string()));
        }

        let url = self.endpoint("me/player/seek", &query)?;
        self.execute(self.http_client.put(url, "")).await?;
        Ok(())
    }

    /// Sets the playback volume as an integer percentage.
    pub async fn set_volume(&self, device_id: Option<&str>, percent: u8) -> Result<()> {
        let mut query = vec![("volume_percent", percent.min(100).to_string())];
        if let Some(device_id) = device_id {
            query.push(("device_id", device_id.to_string()));
        }

        let url = self.endpoint("me/player/volume", &query)?;
        self.execute(self.http_client.put(url, "")).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::Config;

    fn api_for(server: &MockServer, token: Option<&str>) -> WebApi {
        let config =
            Config::with_token_endpoint(Url::parse("http://localhost:3000/spotify").unwrap());
        let http_client = HttpClient::new(&config).unwrap();
        let (_tx, rx) = watch::channel(
            token.map(|token| AccessToken::new(token.to_string(), Duration::from_secs(3600))),
        );
        let api_url = Url::parse(&format!("{}/v1/", server.uri())).unwrap();
        WebApi::new(http_client, api_url, rx)
    }

    #[tokio::test]
    async fn devices_sends_bearer_and_parses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/me/player/devices"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "devices": [{"id": "dev-1", "name": "Web Player", "type": "Computer"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = api_for(&server, Some("secret"));
        let devices = api.devices().await.unwrap();
        assert_eq!(devices.first_id().as_deref(), Some("dev-1"));
    }

    #[tokio::test]
    async fn missing_token_fails_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let api = api_for(&server, None);
        assert!(matches!(
            api.devices().await,
            Err(Error::CredentialUnavailable)
        ));
    }

    #[tokio::test]
    async fn no_content_player_state_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/me/player"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let api = api_for(&server, Some("secret"));
        assert!(api.player_state().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/tracks/nope"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let api = api_for(&server, Some("secret"));
        assert!(matches!(
            api.track("nope").await,
            Err(Error::StatusCode(status)) if status == http::StatusCode::NOT_FOUND
        ));
    }

    #[tokio::test]
    async fn seek_addresses_device_and_position() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/me/player/seek"))
            .and(query_param("position_ms", "1500"))
            .and(query_param("device_id", "dev-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let api = api_for(&server, Some("secret"));
        api.seek(Some("dev-1"), Duration::from_millis(1500))
            .await
            .unwrap();
    }
}
