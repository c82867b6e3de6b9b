//! Track lookup responses from the Web API.

use std::time::Duration;

use serde::Deserialize;
use serde_with::{formats::Flexible, serde_as, DurationMilliSeconds};
use url::Url;

/// A track object as returned by the track lookup endpoint.
///
/// Only the fields the session needs are parsed; the endpoint returns many
/// more.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artists: Vec<Artist>,
    pub album: Album,

    #[serde_as(as = "DurationMilliSeconds<u64, Flexible>")]
    #[serde(rename = "duration_ms", default)]
    pub duration: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Artist {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Album {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub images: Vec<Image>,
}

/// Album artwork in one of several sizes, largest first.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Image {
    pub url: Url,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Track {
    /// URL of the primary (largest) album artwork, if any.
    #[must_use]
    pub fn album_art_url(&self) -> Option<Url> {
        self.album.images.first().map(|image| image.url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_track_lookup_response() {
        let track: Track = serde_json::from_str(
            r#"{
                "id": "11dFghVXANMlKmJXsNCbNl",
                "name": "Cut To The Feeling",
                "duration_ms": 207959,
                "artists": [{"name": "Carly Rae Jepsen"}],
                "album": {
                    "name": "Cut To The Feeling",
                    "images": [
                        {"url": "https://i.scdn.co/image/large", "width": 640, "height": 640},
                        {"url": "https://i.scdn.co/image/small", "width": 64, "height": 64}
                    ]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(track.name, "Cut To The Feeling");
        assert_eq!(track.duration, Duration::from_millis(207_959));
        assert_eq!(
            track.album_art_url().unwrap().as_str(),
            "https://i.scdn.co/image/large"
        );
    }

    #[test]
    fn missing_artwork_is_none() {
        let track: Track = serde_json::from_str(
            r#"{
                "id": "x",
                "name": "Untitled",
                "duration_ms": 1000,
                "artists": [],
                "album": {}
            }"#,
        )
        .unwrap();

        assert!(track.album_art_url().is_none());
    }
}
