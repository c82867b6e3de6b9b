//! Credential lifecycle: scheduled refresh and the re-authorization flow.
//!
//! [`TokenProvider`] owns the bearer token and the single timer that
//! refreshes it. Dependents read the token through a `watch` channel and
//! must tolerate it being absent. When the issuing endpoint reports that no
//! token can be issued, the provider emits
//! [`Event::AuthorizationRequired`] with the consent URL and stops
//! scheduling; completing the consent flow restarts the session.
//!
//! The retry policy is explicit and owned here: a failed fetch clears the
//! published token and retries after a fixed delay, independent of any
//! host re-render cycle.

use std::{sync::Arc, sync::Mutex, time::Duration};

use async_trait::async_trait;
use tokio::{sync::mpsc, sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    config::Config,
    error::{Error, Result},
    events::Event,
    http::Client as HttpClient,
    protocol::token::TokenResponse,
    tokens::AccessToken,
};

/// OAuth scopes requested from the consent flow.
pub const SCOPES: &str =
    "streaming user-read-private user-read-email user-modify-playback-state user-read-playback-state";

/// How long before expiry a token is refreshed.
///
/// Refreshing with a few seconds on the clock prevents API requests from
/// racing the expiration.
const REFRESH_EARLY: Duration = Duration::from_secs(5);

/// Delay before retrying after a failed fetch.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Source of issued tokens.
///
/// The trait seam keeps the refresh schedule testable without an HTTP
/// server; [`HttpTokenFetcher`] is the production implementation.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    async fn fetch(&self) -> Result<TokenResponse>;
}

/// Fetches tokens from the trusted issuing endpoint over HTTP.
pub struct HttpTokenFetcher {
    http_client: HttpClient,
    endpoint: Url,
}

impl HttpTokenFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http_client: HttpClient::new(config)?,
            endpoint: config.token_endpoint.clone(),
        })
    }
}

#[async_trait]
impl TokenFetcher for HttpTokenFetcher {
    async fn fetch(&self) -> Result<TokenResponse> {
        let request = self.http_client.get(self.endpoint.clone(), "");
        let response = self.http_client.execute(request).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::StatusCode(status));
        }

        response.json::<TokenResponse>().await.map_err(Into::into)
    }
}

/// Owns the bearer credential and its refresh schedule.
pub struct TokenProvider {
    tokens: Arc<watch::Sender<Option<AccessToken>>>,
    accounts_url: Url,
    return_path: String,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TokenProvider {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let (tokens, _) = watch::channel(None);
        Self {
            tokens: Arc::new(tokens),
            accounts_url: config.accounts_url.clone(),
            return_path: config.return_path.clone(),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Current token output. Holds `None` until the first successful fetch
    /// and again after a failed one.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<AccessToken>> {
        self.tokens.subscribe()
    }

    /// Starts the refresh loop.
    ///
    /// Exactly one refresh timer is live at any time: starting again
    /// cancels the previous loop before spawning the new one.
    pub fn start<F>(&self, fetcher: F, events: mpsc::UnboundedSender<Event>)
    where
        F: TokenFetcher + 'static,
    {
        let mut task = self.task.lock().expect("refresh task slot poisoned");
        if let Some(previous) = task.take() {
            previous.abort();
        }

        *task = Some(tokio::spawn(refresh_loop(
            fetcher,
            Arc::clone(&self.tokens),
            events,
            self.accounts_url.clone(),
            self.return_path.clone(),
            self.cancel.child_token(),
        )));
    }

    /// Cancels the outstanding refresh timer and clears the token.
    pub fn stop(&self) {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().expect("refresh task slot poisoned").take() {
            task.abort();
        }
        self.tokens.send_replace(None);
    }
}

impl Drop for TokenProvider {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn refresh_loop<F>(
    fetcher: F,
    tokens: Arc<watch::Sender<Option<AccessToken>>>,
    events: mpsc::UnboundedSender<Event>,
    accounts_url: Url,
    return_path: String,
    cancel: CancellationToken,
) where
    F: TokenFetcher,
{
    loop {
        let delay = match fetcher.fetch().await {
            Ok(response) => {
                let Some(token) = response.access_token else {
                    // No token can be issued until the user grants consent.
                    // Scheduling stops here; the consent flow returning to
                    // the configured path restarts the session.
                    tokens.send_replace(None);
                    match authorize_url(
                        &accounts_url,
                        response.client_id.as_deref(),
                        response.redirect_uri.as_deref(),
                        &return_path,
                    ) {
                        Ok(url) => {
                            info!("no access token issued; authorization required");
                            let _ = events.send(Event::AuthorizationRequired(url));
                        }
                        Err(e) => error!("cannot build authorization URL: {e}"),
                    }
                    return;
                };

                let expires_in = response.expires_in_seconds;
                tokens.send_replace(Some(AccessToken::new(token, expires_in)));

                let delay = expires_in.saturating_sub(REFRESH_EARLY);
                debug!("access token refreshes in {}s", delay.as_secs());
                delay
            }
            Err(e) => {
                warn!("failed to fetch access token: {e}");
                tokens.send_replace(None);
                RETRY_DELAY
            }
        };

        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
    }
}

/// Builds the consent URL for the re-authorization flow.
///
/// The `state` parameter carries the return path so the flow lands the
/// user back where they started.
pub fn authorize_url(
    accounts_url: &Url,
    client_id: Option<&str>,
    redirect_uri: Option<&str>,
    return_path: &str,
) -> Result<Url> {
    let client_id = client_id.ok_or_else(|| {
        Error::Assertion("issuing endpoint did not identify the OAuth client".to_string())
    })?;
    let redirect_uri = redirect_uri.ok_or_else(|| {
        Error::Assertion("issuing endpoint did not provide a redirect URI".to_string())
    })?;

    let mut url = accounts_url.clone();
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", SCOPES)
        .append_pair("state", return_path);

    Ok(url)
}
