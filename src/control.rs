//! Debounced playback commands and the optimistic intent slot.
//!
//! Dragging a seek bar or a volume slider produces a burst of values; only
//! the one the input settles on is worth a remote command. Each request
//! updates the pending-intent slot immediately (so display layers can
//! prefer it over the authoritative snapshot) and re-arms a per-kind settle
//! timer; only the timer that survives uncancelled issues the command,
//! carrying the latest requested value. At most one remote seek and one
//! remote volume request are ever in flight per settle window.
//!
//! Play/pause is not debounced: toggling issues the command immediately,
//! with the play command carrying the current optimistic position when
//! resuming.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::{
    sync::watch,
    task::JoinHandle,
};

use crate::{
    device::DeviceHandle,
    error::{Error, Result},
    sdk::PlaybackSdk,
    state::PlaybackSnapshot,
    web::WebApi,
};

/// Settle delay after the last seek request.
const SEEK_SETTLE: Duration = Duration::from_millis(300);

/// Settle delay after the last volume request.
const VOLUME_SETTLE: Duration = Duration::from_millis(300);

/// Curve steepness for the perceptual volume mapping.
const VOLUME_CURVE_EXPONENT: f64 = 2.0;

/// Maps a linear 0–100 slider percentage onto a perceptual loudness curve.
///
/// `v' = (e^(k·v) − 1) / (e^k − 1)` with `v = percent/100` and `k = 2`, so
/// equal slider steps feel like equal loudness steps. Strictly increasing,
/// with `volume_curve(0) == 0` and `volume_curve(100) == 1`.
#[must_use]
pub fn volume_curve(percent: u8) -> f64 {
    let v = f64::from(percent.min(100)) / 100.0;
    ((VOLUME_CURVE_EXPONENT * v).exp() - 1.0) / (VOLUME_CURVE_EXPONENT.exp() - 1.0)
}

/// Local intent not yet confirmed by the remote device.
///
/// Display layers prefer these values over the authoritative snapshot
/// while a drag is settling; each slot clears once its command fires.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PendingIntent {
    pub seek: Option<Duration>,
    pub volume: Option<u8>,
}

/// Issues playback commands against the current device.
pub struct PlayerControl {
    sdk: Arc<dyn PlaybackSdk>,
    api: Arc<WebApi>,
    devices: watch::Receiver<Option<DeviceHandle>>,
    snapshots: watch::Receiver<Option<PlaybackSnapshot>>,
    track: watch::Receiver<Option<String>>,
    pending: Arc<watch::Sender<PendingIntent>>,
    seek_timer: Mutex<Option<JoinHandle<()>>>,
    volume_timer: Mutex<Option<JoinHandle<()>>>,
}

impl PlayerControl {
    #[must_use]
    pub fn new(
        sdk: Arc<dyn PlaybackSdk>,
        api: Arc<WebApi>,
        devices: watch::Receiver<Option<DeviceHandle>>,
        snapshots: watch::Receiver<Option<PlaybackSnapshot>>,
        track: watch::Receiver<Option<String>>,
    ) -> Self {
        let (pending, _) = watch::channel(PendingIntent::default());
        Self {
            sdk,
            api,
            devices,
            snapshots,
            track,
            pending: Arc::new(pending),
            seek_timer: Mutex::new(None),
            volume_timer: Mutex::new(None),
        }
    }

    /// Pending local intent output.
    #[must_use]
    pub fn subscribe_pending(&self) -> watch::Receiver<PendingIntent> {
        self.pending.subscribe()
    }

    /// Requests a seek to `position`.
    ///
    /// The displayed value updates immediately; the remote command fires
    /// once the input has settled, superseding any seek still pending.
    pub fn request_seek(&self, position: Duration) {
        self.pending.send_modify(|intent| intent.seek = Some(position));

        let sdk = Arc::clone(&self.sdk);
        let pending = Arc::clone(&self.pending);

        let mut timer = self.seek_timer.lock().expect("seek timer slot poisoned");
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(SEEK_SETTLE).await;

            trace!("seeking to {}ms", position.as_millis());
            if let Err(e) = sdk.seek(position).await {
                // The next poll or event tick corrects the display.
                error!("seek command failed: {e}");
            }

            // Clear the optimistic slot unless a newer drag started.
            pending.send_modify(|intent| {
                if intent.seek == Some(position) {
                    intent.seek = None;
                }
            });
        }));
    }

    /// Requests a volume change to `percent` (0–100).
    ///
    /// Same settle behavior as [`request_seek`](Self::request_seek); the
    /// transmitted value is curve-mapped with [`volume_curve`].
    pub fn request_volume(&self, percent: u8) {
        let percent = percent.min(100);
        self.pending
            .send_modify(|intent| intent.volume = Some(percent));

        let sdk = Arc::clone(&self.sdk);
        let pending = Arc::clone(&self.pending);

        let mut timer = self
            .volume_timer
            .lock()
            .expect("volume timer slot poisoned");
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(VOLUME_SETTLE).await;

            let mapped = volume_curve(percent);
            trace!("setting volume to {percent}% (curve-mapped {mapped:.3})");
            if let Err(e) = sdk.set_volume(mapped).await {
                error!("volume command failed: {e}");
            }

            pending.send_modify(|intent| {
                if intent.volume == Some(percent) {
                    intent.volume = None;
                }
            });
        }));
    }

    /// Toggles between play and pause, immediately.
    ///
    /// Resuming issues a play command that names the current track and
    /// carries the optimistic position; otherwise a pause command is sent.
    pub async fn toggle_play_pause(&self) -> Result<()> {
        let handle = self
            .devices
            .borrow()
            .clone()
            .ok_or(Error::DeviceNotReady)?;
        let snapshot = self.snapshots.borrow().clone();
        let paused = snapshot.as_ref().is_none_or(|snapshot| snapshot.paused);

        if paused {
            let track_id = self
                .track
                .borrow()
                .clone()
                .or_else(|| {
                    snapshot
                        .as_ref()
                        .map(|snapshot| snapshot.track_id.clone())
                        .filter(|track_id| !track_id.is_empty())
                })
                .ok_or_else(|| Error::Assertion("no track to play".to_string()))?;

            let position = self
                .pending
                .borrow()
                .seek
                .or_else(|| snapshot.as_ref().map(|snapshot| snapshot.position));

            self.api.play(&handle.device_id, &track_id, position).await
        } else {
            self.api.pause(&handle.device_id).await
        }
    }

    /// Starts playback of a specific track on the current device.
    pub async fn play_track(&self, track_id: &str, position: Option<Duration>) -> Result<()> {
        let handle = self
            .devices
            .borrow()
            .clone()
            .ok_or(Error::DeviceNotReady)?;
        self.api.play(&handle.device_id, track_id, position).await
    }
}

impl Drop for PlayerControl {
    fn drop(&mut self) {
        for timer in [&self.seek_timer, &self.volume_timer] {
            if let Ok(mut timer) = timer.lock() {
                if let Some(task) = timer.take() {
                    task.abort();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use url::Url;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::{
        config::Config, http::Client as HttpClient, sdk::mock::MockSdk, tokens::AccessToken,
    };

    fn web_api(base: &str) -> Arc<WebApi> {
        let config =
            Config::with_token_endpoint(Url::parse("http://localhost:3000/spotify").unwrap());
        let http_client = HttpClient::new(&config).unwrap();
        let (_tx, rx) = watch::channel(Some(AccessToken::new(
            "secret".to_string(),
            Duration::from_secs(3600),
        )));
        Arc::new(WebApi::new(
            http_client,
            Url::parse(&format!("{base}/v1/")).unwrap(),
            rx,
        ))
    }

    struct Channels {
        devices: watch::Sender<Option<DeviceHandle>>,
        snapshots: watch::Sender<Option<PlaybackSnapshot>>,
        track: watch::Sender<Option<String>>,
    }

    fn control_with(sdk: Arc<MockSdk>, api: Arc<WebApi>) -> (PlayerControl, Channels) {
        let (devices, devices_rx) = watch::channel(Some(DeviceHandle {
            device_id: "dev-1".to_string(),
            connected: true,
        }));
        let (snapshots, snapshots_rx) = watch::channel(None);
        let (track, track_rx) = watch::channel(None);
        let control = PlayerControl::new(sdk, api, devices_rx, snapshots_rx, track_rx);
        (
            control,
            Channels {
                devices,
                snapshots,
                track,
            },
        )
    }

    #[test]
    fn volume_curve_endpoints_and_monotonicity() {
        assert!(volume_curve(0).abs() < 1e-9);
        assert!((volume_curve(100) - 1.0).abs() < 1e-9);

        let mut previous = volume_curve(0);
        for percent in 1..=100 {
            let mapped = volume_curve(percent);
            assert!(mapped > previous, "curve must be strictly increasing");
            previous = mapped;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_seeks_collapse_to_one_command() {
        let sdk = MockSdk::new();
        let (control, _channels) = control_with(sdk.clone(), web_api("http://127.0.0.1:9"));

        for i in 0..5_u64 {
            control.request_seek(Duration::from_millis(1_000 * (i + 1)));
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        // Last request at t=200ms; its timer fires at t=500ms.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(sdk.seeks().is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sdk.seeks(), vec![Duration::from_millis(5_000)]);
    }

    #[tokio::test(start_paused = true)]
    async fn second_volume_request_supersedes_the_first() {
        let sdk = MockSdk::new();
        let (control, _channels) = control_with(sdk.clone(), web_api("http://127.0.0.1:9"));

        control.request_volume(50);
        tokio::time::sleep(Duration::from_millis(100)).await;
        control.request_volume(80);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(sdk.volumes().is_empty());

        // ~300ms after the second request.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let volumes = sdk.volumes();
        assert_eq!(volumes.len(), 1);
        assert!((volumes[0] - volume_curve(80)).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn seek_and_volume_settle_independently() {
        let sdk = MockSdk::new();
        let (control, _channels) = control_with(sdk.clone(), web_api("http://127.0.0.1:9"));

        control.request_seek(Duration::from_millis(7_000));
        tokio::time::sleep(Duration::from_millis(100)).await;
        control.request_volume(30);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(sdk.seeks().len(), 1);
        assert_eq!(sdk.volumes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_intent_clears_after_the_command_fires() {
        let sdk = MockSdk::new();
        let (control, _channels) = control_with(sdk.clone(), web_api("http://127.0.0.1:9"));
        let pending = control.subscribe_pending();

        control.request_seek(Duration::from_millis(9_000));
        assert_eq!(
            pending.borrow().seek,
            Some(Duration::from_millis(9_000))
        );

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(pending.borrow().seek.is_none());
    }

    #[tokio::test]
    async fn toggle_from_paused_plays_with_optimistic_position() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/me/player/play"))
            .and(query_param("device_id", "dev-1"))
            .and(body_json(serde_json::json!({
                "uris": ["spotify:track:track-7"],
                "position_ms": 9000
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let sdk = MockSdk::new();
        let (control, channels) = control_with(sdk, web_api(&server.uri()));
        channels.track.send_replace(Some("track-7".to_string()));
        channels.snapshots.send_replace(Some(PlaybackSnapshot {
            paused: true,
            position: Duration::from_millis(9_000),
            duration: Duration::from_millis(200_000),
            track_id: "track-7".to_string(),
        }));

        control.toggle_play_pause().await.unwrap();
    }

    #[tokio::test]
    async fn toggle_while_playing_pauses() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/me/player/pause"))
            .and(query_param("device_id", "dev-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let sdk = MockSdk::new();
        let (control, channels) = control_with(sdk, web_api(&server.uri()));
        channels.snapshots.send_replace(Some(PlaybackSnapshot {
            paused: false,
            position: Duration::from_millis(5_000),
            duration: Duration::from_millis(200_000),
            track_id: "track-7".to_string(),
        }));

        control.toggle_play_pause().await.unwrap();
    }

    #[tokio::test]
    async fn commands_without_a_device_fail_fast() {
        let sdk = MockSdk::new();
        let (control, channels) = control_with(sdk, web_api("http://127.0.0.1:9"));
        channels.devices.send_replace(None);

        assert!(matches!(
            control.play_track("track-7", None).await,
            Err(Error::DeviceNotReady)
        ));
    }
}
