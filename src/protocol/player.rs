//! Player state responses and playback command bodies.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{formats::Flexible, serde_as, DurationMilliSeconds};

use super::{devices::Device, track::Track};

/// Player state as returned by the current-playback endpoint.
///
/// The endpoint answers `204 No Content` when nothing is playing anywhere;
/// callers represent that as the absence of this value.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PlayerState {
    pub device: Device,

    pub is_playing: bool,

    /// Playback progress. Absent for some content types.
    #[serde_as(as = "Option<DurationMilliSeconds<u64, Flexible>>")]
    #[serde(rename = "progress_ms", default)]
    pub progress: Option<Duration>,

    /// Currently playing track, if any.
    #[serde(default)]
    pub item: Option<Track>,
}

/// Body of the play command.
///
/// Carries the track URIs to (re)start and an optional start position. An
/// empty body resumes whatever was playing, which this client never wants:
/// it always names the track explicitly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlayBody {
    pub uris: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_ms: Option<u64>,
}

impl PlayBody {
    /// Builds a play body for a single track URI.
    #[must_use]
    pub fn track(track_id: &str, position: Option<Duration>) -> Self {
        Self {
            uris: vec![format!("spotify:track:{track_id}")],
            position_ms: position.map(|position| u64::try_from(position.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}
