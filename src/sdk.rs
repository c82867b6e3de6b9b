//! The external playback SDK modelled as a message-passing port.
//!
//! The browser incarnation of the SDK is a script with callback-based
//! listeners and a handful of command methods. Here it is a trait: a
//! subscribe/unsubscribe pair for notifications, a polling pull for state,
//! and the command surface the session needs. Implementations own whatever
//! runtime the real SDK requires.
//!
//! [`WebApiSdk`] is the bundled implementation for headless use: it drives
//! an already-registered Spotify Connect device purely through the Web API.
//! It never mints a device identifier of its own, so sessions using it
//! always recover their device through the active-devices fallback.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{error::Result, web::WebApi};

/// Notifications pushed by the SDK.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SdkEvent {
    /// The SDK finished registering a playback device.
    ///
    /// A `None` identifier is a known degradation: the SDK came up but
    /// failed to mint a fresh device. The session then falls back to the
    /// active-devices listing.
    Ready { device_id: Option<String> },

    /// The registered device went away.
    NotReady,

    /// The remote playback state changed (track switch, pause/resume,
    /// seek completion).
    StateChanged(SdkPlaybackState),
}

/// Raw playback state as reported by the SDK.
///
/// Unvalidated; the state reconciler turns this into an authoritative
/// snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SdkPlaybackState {
    pub paused: bool,
    pub position: Duration,
    pub duration: Duration,
    pub track_id: String,
}

/// Port to the external playback SDK.
#[async_trait]
pub trait PlaybackSdk: Send + Sync {
    /// Initializes the SDK runtime.
    ///
    /// Must be idempotent: a second session starting while the runtime is
    /// already up must not initialize it again.
    async fn load(&self) -> Result<()>;

    /// Connects the player.
    ///
    /// Returns `Ok(false)` when the SDK refused the connection; the caller
    /// stays in a not-ready state and does not retry on its own.
    async fn connect(&self) -> Result<bool>;

    /// Disconnects the player and releases its device registration.
    async fn disconnect(&self);

    /// Subscribes to SDK notifications.
    ///
    /// Every call returns an independent stream; dropping the receiver
    /// unsubscribes.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<SdkEvent>;

    /// Seeks within the current track.
    async fn seek(&self, position: Duration) -> Result<()>;

    /// Sets the playback volume as a ratio in `0.0..=1.0`.
    async fn set_volume(&self, volume: f64) -> Result<()>;

    /// Pulls the current playback state.
    ///
    /// Returns `None` when the SDK has no state to report, e.g. nothing
    /// is playing. This complements the event stream, which is not
    /// guaranteed to fire for every transition.
    async fn current_state(&self) -> Result<Option<SdkPlaybackState>>;
}

/// Fan-out holder for event subscribers.
///
/// Senders whose receiver has been dropped are pruned on the next emit.
#[derive(Default)]
struct Subscribers(Mutex<Vec<mpsc::UnboundedSender<SdkEvent>>>);

impl Subscribers {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<SdkEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.0.lock().expect("subscriber list poisoned").push(tx);
        rx
    }

    fn emit(&self, event: &SdkEvent) {
        self.0
            .lock()
            .expect("subscriber list poisoned")
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Playback SDK implementation backed entirely by the Web API.
///
/// Suitable for headless sessions that mirror and control a device that is
/// already registered remotely (another client, a speaker, a browser tab).
/// Commands without a device id address whichever device is active.
pub struct WebApiSdk {
    api: Arc<WebApi>,
    subscribers: Subscribers,
    connected: AtomicBool,
}

impl WebApiSdk {
    #[must_use]
    pub fn new(api: Arc<WebApi>) -> Self {
        Self {
            api,
            subscribers: Subscribers::default(),
            connected: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl PlaybackSdk for WebApiSdk {
    async fn load(&self) -> Result<()> {
        // No runtime to bring up: the Web API client is the runtime.
        Ok(())
    }

    async fn connect(&self) -> Result<bool> {
        self.connected.store(true, Ordering::SeqCst);

        // This implementation cannot register a device of its own, which is
        // exactly the degraded readiness shape the session knows how to
        // recover from.
        self.subscribers
            .emit(&SdkEvent::Ready { device_id: None });
        Ok(true)
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.subscribers.emit(&SdkEvent::NotReady);
        }
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<SdkEvent> {
        self.subscribers.subscribe()
    }

    async fn seek(&self, position: Duration) -> Result<()> {
        self.api.seek(None, position).await
    }

    async fn set_volume(&self, volume: f64) -> Result<()> {
        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let percent = (volume.clamp(0.0, 1.0) * 100.0).round() as u8;
        self.api.set_volume(None, percent).await
    }

    async fn current_state(&self) -> Result<Option<SdkPlaybackState>> {
        if !self.connected.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let Some(state) = self.api.player_state().await? else {
            return Ok(None);
        };
        let Some(item) = state.item else {
            return Ok(None);
        };

        Ok(Some(SdkPlaybackState {
            paused: !state.is_playing,
            position: state.progress.unwrap_or(Duration::ZERO),
            duration: item.duration,
            track_id: item.id,
        }))
    }
}
