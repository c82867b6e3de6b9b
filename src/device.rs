//! Playback device lifecycle.
//!
//! [`DeviceSession`] boots the external playback SDK once a credential is
//! available, resolves a usable device identifier (freshly minted or
//! recycled from the active-devices listing), and tears the player down on
//! credential loss or session teardown. The resulting handle is published
//! on a `watch` channel; readers must tolerate it being `None` and stop
//! all activity while it is.

use std::sync::{Arc, Mutex};

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    events::Event,
    sdk::{PlaybackSdk, SdkEvent},
    tokens::AccessToken,
    web::WebApi,
};

/// Provider-side identifier of the playback endpoint this session drives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceHandle {
    pub device_id: String,
    pub connected: bool,
}

/// Owns the playback device registration.
///
/// At most one active [`DeviceHandle`] exists per session instance.
pub struct DeviceSession {
    devices: Arc<watch::Sender<Option<DeviceHandle>>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceSession {
    #[must_use]
    pub fn new() -> Self {
        let (devices, _) = watch::channel(None);
        Self {
            devices: Arc::new(devices),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Current device handle output.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<DeviceHandle>> {
        self.devices.subscribe()
    }

    /// Starts the device lifecycle task. Restarting replaces a previous
    /// run.
    pub fn start(
        &self,
        sdk: Arc<dyn PlaybackSdk>,
        api: Arc<WebApi>,
        tokens: watch::Receiver<Option<AccessToken>>,
        events: mpsc::UnboundedSender<Event>,
    ) {
        let mut task = self.task.lock().expect("device task slot poisoned");
        if let Some(previous) = task.take() {
            previous.abort();
        }

        *task = Some(tokio::spawn(run(
            sdk,
            api,
            tokens,
            Arc::clone(&self.devices),
            events,
            self.cancel.child_token(),
        )));
    }

    /// Requests teardown.
    ///
    /// The lifecycle task disconnects the player and clears the handle
    /// asynchronously; a connect still in flight cannot resurrect the
    /// player afterwards.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Default for DeviceSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    sdk: Arc<dyn PlaybackSdk>,
    api: Arc<WebApi>,
    mut tokens: watch::Receiver<Option<AccessToken>>,
    devices: Arc<watch::Sender<Option<DeviceHandle>>>,
    events: mpsc::UnboundedSender<Event>,
    cancel: CancellationToken,
) {
    loop {
        // Nothing to do without a credential.
        tokio::select! {
            () = cancel.cancelled() => return,
            result = tokens.wait_for(Option::is_some) => {
                if result.is_err() {
                    return;
                }
            }
        }

        if let Err(e) = sdk.load().await {
            error!("failed to load playback SDK: {e}");
            if tokens.changed().await.is_err() {
                return;
            }
            continue;
        }

        let mut sdk_events = sdk.subscribe();

        match sdk.connect().await {
            Ok(true) => debug!("playback SDK connected"),
            // Not retried here: the natural reconnect happens when the
            // credential transitions again.
            Ok(false) => error!("playback SDK refused to connect"),
            Err(e) => error!("playback SDK connect failed: {e}"),
        }

        // The connect may have resolved after teardown was requested; it
        // must not resurrect the player.
        if cancel.is_cancelled() {
            sdk.disconnect().await;
            drop_handle(&devices, &events);
            return;
        }

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    sdk.disconnect().await;
                    drop_handle(&devices, &events);
                    return;
                }
                changed = tokens.changed() => {
                    if changed.is_err() {
                        sdk.disconnect().await;
                        drop_handle(&devices, &events);
                        return;
                    }
                    if tokens.borrow_and_update().is_none() {
                        info!("credential lost; disconnecting playback device");
                        sdk.disconnect().await;
                        drop_handle(&devices, &events);
                        break;
                    }
                    // Refreshed credential: the SDK pulls the latest value
                    // through its supplier; nothing to do here.
                }
                event = sdk_events.recv() => match event {
                    Some(SdkEvent::Ready { device_id }) => {
                        adopt(&api, device_id, &devices, &events).await;
                    }
                    Some(SdkEvent::NotReady) => {
                        warn!("playback device went away");
                        drop_handle(&devices, &events);
                    }
                    Some(SdkEvent::StateChanged(_)) => {
                        // The state reconciler has its own subscription.
                    }
                    None => {
                        debug!("playback SDK event stream closed");
                        sdk.disconnect().await;
                        drop_handle(&devices, &events);
                        return;
                    }
                }
            }
        }
    }
}

/// Resolves and publishes the device handle for a readiness report.
async fn adopt(
    api: &WebApi,
    device_id: Option<String>,
    devices: &watch::Sender<Option<DeviceHandle>>,
    events: &mpsc::UnboundedSender<Event>,
) {
    let device_id = match device_id {
        Some(id) => Some(id),
        None => {
            // Known SDK degradation: readiness without a fresh device. A
            // device registered by an earlier session may still be usable.
            debug!("ready without a device id; querying active devices");
            match api.devices().await {
                Ok(list) => list.first_id(),
                Err(e) => {
                    error!("device listing fallback failed: {e}");
                    None
                }
            }
        }
    };

    match device_id {
        Some(device_id) => {
            info!("adopted playback device {device_id}");
            let replaced = devices.send_replace(Some(DeviceHandle {
                device_id,
                connected: true,
            }));
            if replaced.is_none() {
                let _ = events.send(Event::Connected);
            }
        }
        // Stay not-ready until a future readiness event.
        None => warn!("no usable playback device found"),
    }
}

fn drop_handle(
    devices: &watch::Sender<Option<DeviceHandle>>,
    events: &mpsc::UnboundedSender<Event>,
) {
    if devices.send_replace(None).is_some() {
        let _ = events.send(Event::Disconnected);
    }
}
