//! Session orchestration.
//!
//! [`Session`] owns every component of the playback session (credential
//! provider, device session, state reconciler, command control, metadata
//! cache) and wires their channels together:
//!
//! ```text
//! TokenProvider ──tokens──► DeviceSession ──handle──► StateSync ──snapshot──► host
//!       │                        │                        ▲
//!       └──tokens──► WebApi ◄────┴── PlayerControl ───────┘ (optimistic intent)
//!                      ▲
//!                      └── MetadataCache (track lookups)
//! ```
//!
//! Hosts interact through [`Session::set_track`], [`Session::control`] and
//! the subscription getters; [`Session::events`] yields the notification
//! stream.

use std::sync::{Arc, Mutex};

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    auth::{HttpTokenFetcher, TokenProvider},
    config::Config,
    control::{PendingIntent, PlayerControl},
    device::{DeviceHandle, DeviceSession},
    error::Result,
    events::Event,
    http::Client as HttpClient,
    metadata::{MetadataCache, TrackMetadata},
    sdk::{PlaybackSdk, WebApiSdk},
    state::{PlaybackSnapshot, StateSync},
    tokens::AccessToken,
    web::WebApi,
};

/// A complete playback session.
///
/// Dropping the session tears everything down: timers are cancelled, the
/// player is disconnected, and in-flight work cannot resurrect it.
pub struct Session {
    config: Config,
    api: Arc<WebApi>,
    sdk: Arc<dyn PlaybackSdk>,
    tokens: TokenProvider,
    device: DeviceSession,
    sync: StateSync,
    control: Arc<PlayerControl>,
    metadata: MetadataCache,
    track: Arc<watch::Sender<Option<String>>>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
    cancel: CancellationToken,
    autoplay: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Creates a session around an externally provided playback SDK.
    pub fn new(config: Config, sdk: Arc<dyn PlaybackSdk>) -> Result<Self> {
        let tokens = TokenProvider::new(&config);
        let http_client = HttpClient::new(&config)?;
        let api = Arc::new(WebApi::new(
            http_client,
            config.api_url.clone(),
            tokens.subscribe(),
        ));

        Ok(Self::assemble(config, tokens, api, sdk))
    }

    /// Creates a headless session whose player is driven entirely through
    /// the Web API.
    ///
    /// Such a session never mints a device of its own; it adopts one that
    /// is already registered remotely through the active-devices fallback.
    pub fn with_web_api_player(config: Config) -> Result<Self> {
        let tokens = TokenProvider::new(&config);
        let http_client = HttpClient::new(&config)?;
        let api = Arc::new(WebApi::new(
            http_client,
            config.api_url.clone(),
            tokens.subscribe(),
        ));
        let sdk = Arc::new(WebApiSdk::new(Arc::clone(&api)));

        Ok(Self::assemble(config, tokens, api, sdk))
    }

    fn assemble(
        config: Config,
        tokens: TokenProvider,
        api: Arc<WebApi>,
        sdk: Arc<dyn PlaybackSdk>,
    ) -> Self {
        let device = DeviceSession::new();
        let sync = StateSync::new();
        let metadata = MetadataCache::new();
        let (track, _) = watch::channel(None);
        let track = Arc::new(track);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let control = Arc::new(PlayerControl::new(
            Arc::clone(&sdk),
            Arc::clone(&api),
            device.subscribe(),
            sync.subscribe(),
            track.subscribe(),
        ));

        Self {
            config,
            api,
            sdk,
            tokens,
            device,
            sync,
            control,
            metadata,
            track,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            cancel: CancellationToken::new(),
            autoplay: Mutex::new(None),
        }
    }

    /// Starts all lifecycle tasks.
    pub fn start(&self) -> Result<()> {
        let fetcher = HttpTokenFetcher::new(&self.config)?;
        self.tokens.start(fetcher, self.events_tx.clone());

        self.device.start(
            Arc::clone(&self.sdk),
            Arc::clone(&self.api),
            self.tokens.subscribe(),
            self.events_tx.clone(),
        );

        self.sync.start(
            Arc::clone(&self.sdk),
            self.device.subscribe(),
            self.events_tx.clone(),
        );

        self.metadata.start(
            Arc::clone(&self.api),
            self.track.subscribe(),
            self.tokens.subscribe(),
        );

        let mut autoplay = self.autoplay.lock().expect("autoplay task slot poisoned");
        if let Some(previous) = autoplay.take() {
            previous.abort();
        }
        *autoplay = Some(tokio::spawn(autoplay_loop(
            Arc::clone(&self.control),
            self.device.subscribe(),
            self.track.subscribe(),
            self.cancel.child_token(),
        )));

        Ok(())
    }

    /// Tears the session down.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.metadata.stop();
        self.sync.stop();
        self.device.stop();
        self.tokens.stop();
    }

    /// The notification stream. The first call returns it; later calls
    /// yield `None`.
    pub fn events(&self) -> Option<mpsc::UnboundedReceiver<Event>> {
        self.events_rx.lock().expect("event stream slot poisoned").take()
    }

    /// Sets (or clears) the track this session plays and displays.
    pub fn set_track(&self, track_id: Option<String>) {
        self.track.send_replace(track_id);
    }

    /// Command surface for the host UI.
    #[must_use]
    pub fn control(&self) -> &PlayerControl {
        &self.control
    }

    /// Authoritative playback snapshot output.
    #[must_use]
    pub fn snapshots(&self) -> watch::Receiver<Option<PlaybackSnapshot>> {
        self.sync.subscribe()
    }

    /// Pending local intent output.
    #[must_use]
    pub fn pending_intent(&self) -> watch::Receiver<PendingIntent> {
        self.control.subscribe_pending()
    }

    /// Track metadata output.
    #[must_use]
    pub fn track_metadata(&self) -> watch::Receiver<Option<TrackMetadata>> {
        self.metadata.subscribe()
    }

    /// Device handle output.
    #[must_use]
    pub fn device_handle(&self) -> watch::Receiver<Option<DeviceHandle>> {
        self.device.subscribe()
    }

    /// Credential output.
    #[must_use]
    pub fn access_tokens(&self) -> watch::Receiver<Option<AccessToken>> {
        self.tokens.subscribe()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Starts playback whenever the (device, track) pair changes.
///
/// Keyed on the pair, not on every input wake-up, so a credential refresh
/// does not restart the current track from the beginning. A failed start
/// is logged and retried on the next pair change.
async fn autoplay_loop(
    control: Arc<PlayerControl>,
    mut devices: watch::Receiver<Option<DeviceHandle>>,
    mut track: watch::Receiver<Option<String>>,
    cancel: CancellationToken,
) {
    let mut started: Option<(String, String)> = None;

    loop {
        let device_id = devices
            .borrow_and_update()
            .as_ref()
            .filter(|handle| handle.connected)
            .map(|handle| handle.device_id.clone());
        let track_id = track.borrow_and_update().clone();

        if let (Some(device_id), Some(track_id)) = (device_id, track_id) {
            let pair = (device_id, track_id.clone());
            if started.as_ref() != Some(&pair) {
                info!("starting playback of {track_id}");
                match control.play_track(&track_id, None).await {
                    Ok(()) => started = Some(pair),
                    Err(e) => error!("failed to start playback: {e}"),
                }
            }
        }

        tokio::select! {
            () = cancel.cancelled() => return,
            changed = devices.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            changed = track.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}
