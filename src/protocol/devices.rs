//! Active device listings from the Web API.
//!
//! Used only as a fallback: when the playback SDK reports readiness without
//! minting a fresh device identifier, a previously registered device may
//! still be usable and is recovered from this listing.
//!
//! # Example Response
//!
//! ```json
//! {
//!     "devices": [
//!         {
//!             "id": "dev-1",
//!             "is_active": true,
//!             "name": "Web Player",
//!             "type": "Computer",
//!             "volume_percent": 70
//!         }
//!     ]
//! }
//! ```

use serde::Deserialize;

/// Response of the "list my active devices" endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct DeviceList {
    pub devices: Vec<Device>,
}

/// A single device descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Device {
    /// Device identifier. The Web API may return `null` for restricted
    /// devices.
    pub id: Option<String>,

    pub name: String,

    /// Device class, e.g. `Computer` or `Smartphone`.
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub is_active: bool,

    #[serde(default)]
    pub volume_percent: Option<u8>,
}

impl DeviceList {
    /// First device in the listing that actually carries an identifier.
    #[must_use]
    pub fn first_id(&self) -> Option<String> {
        self.devices.iter().find_map(|device| device.id.clone())
    }
}
