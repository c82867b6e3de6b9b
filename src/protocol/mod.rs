//! Wire types for the Spotify endpoints this crate talks to.
//!
//! # Submodules
//!
//! * [`token`] - Credential issuance endpoint responses
//! * [`devices`] - Active device listings
//! * [`track`] - Track lookup responses
//! * [`player`] - Player state and playback command bodies
//!
//! All numeric durations cross the wire as integer seconds or milliseconds
//! and are converted to [`std::time::Duration`] with `serde_with`, matching
//! what the endpoints actually emit.

pub mod devices;
pub mod player;
pub mod token;
pub mod track;
