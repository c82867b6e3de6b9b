//! Events emitted by the playback session.
//!
//! Hosts subscribe to these to drive their UI: playback transitions, device
//! connection changes, and the one case that needs user interaction, namely
//! a required re-authorization.

use std::fmt;

use url::Url;

/// Significant state changes in the playback session.
///
/// Playback events ([`Play`](Self::Play), [`Pause`](Self::Pause),
/// [`TrackChanged`](Self::TrackChanged)) are derived from reconciled
/// snapshots, so a burst of raw updates that ends where it started emits
/// nothing. Connection events reflect the device handle lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Playback has started or resumed.
    Play,

    /// Playback has paused.
    Pause,

    /// The current track changed.
    TrackChanged,

    /// A playback device was adopted and is ready for commands.
    Connected,

    /// The playback device went away; commands will fail until a new
    /// device is adopted.
    Disconnected,

    /// No credential could be issued; the user must complete the consent
    /// flow at the given URL before the session can proceed.
    ///
    /// The URL carries the configured return path in its `state` parameter
    /// so the flow lands the user back where they started.
    AuthorizationRequired(Url),
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Play => write!(f, "playback started"),
            Self::Pause => write!(f, "playback paused"),
            Self::TrackChanged => write!(f, "track changed"),
            Self::Connected => write!(f, "playback device connected"),
            Self::Disconnected => write!(f, "playback device disconnected"),
            Self::AuthorizationRequired(url) => {
                write!(f, "authorization required: {url}")
            }
        }
    }
}
