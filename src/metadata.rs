//! Track display metadata with stale-result suppression.
//!
//! [`MetadataCache`] reacts to track and credential changes: every change
//! bumps a generation counter and starts a fetch that remembers the
//! generation it was born under. A result arriving under a stale
//! generation is discarded instead of applied, so a slow response for the
//! previous track can never overwrite the entry for the current one.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use tokio::{
    sync::watch,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{protocol::track::Track, tokens::AccessToken, web::WebApi};

/// Display metadata for a single track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackMetadata {
    pub track_id: String,
    pub title: String,
    pub artists: Vec<String>,
    pub album_art_url: Option<Url>,
}

impl From<Track> for TrackMetadata {
    fn from(track: Track) -> Self {
        Self {
            album_art_url: track.album_art_url(),
            artists: track.artists.into_iter().map(|artist| artist.name).collect(),
            track_id: track.id,
            title: track.name,
        }
    }
}

/// Resolves and caches display metadata for the current track.
pub struct MetadataCache {
    metadata: Arc<watch::Sender<Option<TrackMetadata>>>,
    generation: Arc<AtomicU64>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MetadataCache {
    #[must_use]
    pub fn new() -> Self {
        let (metadata, _) = watch::channel(None);
        Self {
            metadata: Arc::new(metadata),
            generation: Arc::new(AtomicU64::new(0)),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Current metadata output. `None` while no track is set, no credential
    /// is available, or the last lookup failed.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<TrackMetadata>> {
        self.metadata.subscribe()
    }

    /// Starts reacting to track and credential changes. Restarting
    /// replaces a previous run.
    pub fn start(
        &self,
        api: Arc<WebApi>,
        track: watch::Receiver<Option<String>>,
        tokens: watch::Receiver<Option<AccessToken>>,
    ) {
        let mut task = self.task.lock().expect("metadata task slot poisoned");
        if let Some(previous) = task.take() {
            previous.abort();
        }

        *task = Some(tokio::spawn(run(
            api,
            track,
            tokens,
            Arc::clone(&self.metadata),
            Arc::clone(&self.generation),
            self.cancel.child_token(),
        )));
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MetadataCache {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    api: Arc<WebApi>,
    mut track: watch::Receiver<Option<String>>,
    mut tokens: watch::Receiver<Option<AccessToken>>,
    metadata: Arc<watch::Sender<Option<TrackMetadata>>>,
    generation: Arc<AtomicU64>,
    cancel: CancellationToken,
) {
    loop {
        let track_id = track.borrow_and_update().clone();
        let has_token = tokens.borrow_and_update().is_some();

        // Every input change invalidates whatever is still in flight.
        let current = generation.fetch_add(1, Ordering::SeqCst) + 1;

        if let (Some(track_id), true) = (track_id, has_token) {
            let api = Arc::clone(&api);
            let metadata = Arc::clone(&metadata);
            let generation = Arc::clone(&generation);

            // Fetched on its own task so a slow response cannot delay
            // noticing the next input change.
            tokio::spawn(async move {
                let result = api.track(&track_id).await;

                if generation.load(Ordering::SeqCst) != current {
                    trace!("discarding stale metadata result for {track_id}");
                    return;
                }

                match result {
                    Ok(track) => {
                        metadata.send_replace(Some(TrackMetadata::from(track)));
                    }
                    // Not retried; the next input change tries again.
                    Err(e) => {
                        error!("failed to fetch track metadata: {e}");
                        metadata.send_replace(None);
                    }
                }
            });
        } else {
            // A missing token or track yields no metadata without issuing
            // a request.
            metadata.send_replace(None);
        }

        tokio::select! {
            () = cancel.cancelled() => return,
            changed = track.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            changed = tokens.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::{config::Config, http::Client as HttpClient};

    fn web_api(base: &str, tokens: watch::Receiver<Option<AccessToken>>) -> Arc<WebApi> {
        let config =
            Config::with_token_endpoint(Url::parse("http://localhost:3000/spotify").unwrap());
        let http_client = HttpClient::new(&config).unwrap();
        Arc::new(WebApi::new(
            http_client,
            Url::parse(&format!("{base}/v1/")).unwrap(),
            tokens,
        ))
    }

    fn track_json(id: &str, title: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "name": title,
            "duration_ms": 200000,
            "artists": [{"name": "Artist"}],
            "album": {"images": [{"url": "https://i.scdn.co/image/art"}]}
        })
    }

    fn fresh_token() -> Option<AccessToken> {
        Some(AccessToken::new(
            "secret".to_string(),
            Duration::from_secs(3600),
        ))
    }

    #[tokio::test]
    async fn resolves_metadata_for_the_current_track() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/tracks/track-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(track_json("track-1", "First")),
            )
            .mount(&server)
            .await;

        let (_tokens_tx, tokens_rx) = watch::channel(fresh_token());
        let (_track_tx, track_rx) = watch::channel(Some("track-1".to_string()));
        let cache = MetadataCache::new();
        let mut metadata = cache.subscribe();

        cache.start(web_api(&server.uri(), tokens_rx.clone()), track_rx, tokens_rx);

        metadata.changed().await.unwrap();
        let resolved = metadata.borrow_and_update().clone().unwrap();
        assert_eq!(resolved.title, "First");
        assert_eq!(resolved.artists, vec!["Artist".to_string()]);
        assert!(resolved.album_art_url.is_some());
    }

    #[tokio::test]
    async fn slow_result_for_a_previous_track_is_discarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/tracks/track-a"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(track_json("track-a", "Stale"))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/tracks/track-b"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(track_json("track-b", "Fresh")),
            )
            .mount(&server)
            .await;

        let (_tokens_tx, tokens_rx) = watch::channel(fresh_token());
        let (track_tx, track_rx) = watch::channel(Some("track-a".to_string()));
        let cache = MetadataCache::new();
        let metadata = cache.subscribe();

        cache.start(web_api(&server.uri(), tokens_rx.clone()), track_rx, tokens_rx);

        // Switch tracks while the first lookup is still in flight.
        tokio::time::sleep(Duration::from_millis(50)).await;
        track_tx.send_replace(Some("track-b".to_string()));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(metadata.borrow().as_ref().unwrap().title, "Fresh");

        // The stale response has resolved by now; it must not win.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(metadata.borrow().as_ref().unwrap().title, "Fresh");
    }

    #[tokio::test]
    async fn no_credential_means_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (_tokens_tx, tokens_rx) = watch::channel(None);
        let (_track_tx, track_rx) = watch::channel(Some("track-1".to_string()));
        let cache = MetadataCache::new();
        let metadata = cache.subscribe();

        cache.start(web_api(&server.uri(), tokens_rx.clone()), track_rx, tokens_rx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(metadata.borrow().is_none());
    }

    #[tokio::test]
    async fn lookup_failure_yields_none_and_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/tracks/track-1"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let (_tokens_tx, tokens_rx) = watch::channel(fresh_token());
        let (_track_tx, track_rx) = watch::channel(Some("track-1".to_string()));
        let cache = MetadataCache::new();
        let metadata = cache.subscribe();

        cache.start(web_api(&server.uri(), tokens_rx.clone()), track_rx, tokens_rx);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(metadata.borrow().is_none());
    }

    #[tokio::test]
    async fn credential_arrival_triggers_the_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/tracks/track-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(track_json("track-1", "First")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (tokens_tx, tokens_rx) = watch::channel(None);
        let (_track_tx, track_rx) = watch::channel(Some("track-1".to_string()));
        let cache = MetadataCache::new();
        let metadata = cache.subscribe();

        cache.start(web_api(&server.uri(), tokens_rx.clone()), track_rx, tokens_rx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(metadata.borrow().is_none());

        tokens_tx.send_replace(fresh_token());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(metadata.borrow().as_ref().unwrap().title, "First");
    }
}
