//! Playback state reconciliation.
//!
//! Two independent producers feed one authoritative snapshot: the SDK
//! event subscription, which fires on discrete transitions, and a fixed
//! 500 ms poll, which catches everything the event channel misses (notably
//! slow position drift during playback). Updates are applied in arrival
//! order (the latest write wins, with no sequence numbers), so a slow
//! poll response can briefly overwrite a fresher event-driven update. That
//! transient flicker is inherited from the original design and corrected
//! by the next tick.
//!
//! Both producers are torn down when the device handle goes away and
//! re-established when a new one appears; no timers run against a dead
//! handle.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

use crate::{
    device::DeviceHandle,
    events::Event,
    sdk::{PlaybackSdk, SdkEvent, SdkPlaybackState},
};

/// Fixed cadence of the state poll.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Authoritative local copy of remote playback state at a point in time.
///
/// Replaced wholesale on every reconciled update, never partially mutated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub paused: bool,
    pub position: Duration,
    pub duration: Duration,
    pub track_id: String,
}

impl From<SdkPlaybackState> for PlaybackSnapshot {
    /// Builds a snapshot from raw SDK state, clamping the position into
    /// the track duration. Unknown (zero) durations pass the position
    /// through unchanged.
    fn from(state: SdkPlaybackState) -> Self {
        let position = if state.duration > Duration::ZERO {
            state.position.min(state.duration)
        } else {
            state.position
        };

        Self {
            paused: state.paused,
            position,
            duration: state.duration,
            track_id: state.track_id,
        }
    }
}

/// Reconciles the SDK event stream and the state poll into one snapshot.
pub struct StateSync {
    snapshots: Arc<watch::Sender<Option<PlaybackSnapshot>>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StateSync {
    #[must_use]
    pub fn new() -> Self {
        let (snapshots, _) = watch::channel(None);
        Self {
            snapshots: Arc::new(snapshots),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Current snapshot output. `None` until the first reconciled update
    /// and again after the device handle is lost.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<PlaybackSnapshot>> {
        self.snapshots.subscribe()
    }

    /// Starts the reconciler. Restarting replaces a previous run.
    pub fn start(
        &self,
        sdk: Arc<dyn PlaybackSdk>,
        devices: watch::Receiver<Option<DeviceHandle>>,
        events: mpsc::UnboundedSender<Event>,
    ) {
        let mut task = self.task.lock().expect("state task slot poisoned");
        if let Some(previous) = task.take() {
            previous.abort();
        }

        *task = Some(tokio::spawn(run(
            sdk,
            devices,
            Arc::clone(&self.snapshots),
            events,
            self.cancel.child_token(),
        )));
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Default for StateSync {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StateSync {
    fn drop(&mut self) {
        self.stop();
    }
}

fn is_connected(handle: &Option<DeviceHandle>) -> bool {
    handle.as_ref().is_some_and(|handle| handle.connected)
}

async fn run(
    sdk: Arc<dyn PlaybackSdk>,
    mut devices: watch::Receiver<Option<DeviceHandle>>,
    snapshots: Arc<watch::Sender<Option<PlaybackSnapshot>>>,
    events: mpsc::UnboundedSender<Event>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            result = devices.wait_for(is_connected) => {
                if result.is_err() {
                    return;
                }
            }
        }

        debug!("device ready; starting state producers");
        let mut sdk_events = sdk.subscribe();
        let mut poll = tokio::time::interval(POLL_INTERVAL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                changed = devices.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if !is_connected(&devices.borrow_and_update()) {
                        debug!("device lost; stopping state producers");
                        snapshots.send_replace(None);
                        break;
                    }
                }
                event = sdk_events.recv() => match event {
                    Some(SdkEvent::StateChanged(state)) => {
                        apply(state, &snapshots, &events);
                    }
                    Some(_) => {}
                    None => {
                        debug!("SDK event stream closed");
                        snapshots.send_replace(None);
                        return;
                    }
                },
                _ = poll.tick() => {
                    match sdk.current_state().await {
                        Ok(Some(state)) => apply(state, &snapshots, &events),
                        Ok(None) => {}
                        // Left for the next tick to correct.
                        Err(e) => debug!("state poll failed: {e}"),
                    }
                }
            }
        }
    }
}

/// Applies one update in arrival order and emits transition events.
fn apply(
    state: SdkPlaybackState,
    snapshots: &watch::Sender<Option<PlaybackSnapshot>>,
    events: &mpsc::UnboundedSender<Event>,
) {
    let next = PlaybackSnapshot::from(state);
    let previous = snapshots.borrow().clone();

    if let Some(previous) = &previous {
        if previous.paused != next.paused {
            let _ = events.send(if next.paused { Event::Pause } else { Event::Play });
        }
        if previous.track_id != next.track_id {
            let _ = events.send(Event::TrackChanged);
        }
    }

    snapshots.send_replace(Some(next));
}
